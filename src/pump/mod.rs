//! Pump.fun protocol module
//!
//! # WARNING: Protocol Instability
//! Pump.fun has historically changed program behavior without notice.
//! The constants and structures in this module may break silently.
//! Monitor pump.fun announcements and be prepared to update.

pub mod accounts;
pub mod price;
pub mod program;

// Re-export commonly used types
pub use accounts::BondingCurve;
pub use price::{lamports_to_sol, sol_to_lamports, DEFAULT_TOKEN_DECIMALS};
pub use program::{derive_bonding_curve, PUMP_PROGRAM_ID, PUMP_PROGRAM_ID_STR};
