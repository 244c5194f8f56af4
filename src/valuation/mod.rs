//! Portfolio valuation
//!
//! USD value of token holdings from bonding-curve state, token supply and a
//! SOL/USD quote, memoized per holding.

pub mod cache;
pub mod price;

pub use cache::{
    compute_valuation, BalanceChanged, PortfolioValuationCache, Valuation, ValuationCacheEntry,
};
pub use price::{HttpPriceQuote, PriceQuote};
