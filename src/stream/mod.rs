//! Stream module - bounded hand-off between push subscriptions and consumers

pub mod backpressure;

pub use backpressure::{BackpressureChannel, DropPolicy};
