//! Crypto signal bot: candles in, scored LONG/SHORT/NEUTRAL signals out.
//!
//! The analysis core (`series`, `indicator`, `bundle`, `scorer`) is pure and
//! synchronous. `source`, `dedup` and `notifier` hold the I/O collaborators and
//! `pipeline` wires one evaluation through them.

pub mod bundle;
pub mod config;
pub mod dedup;
pub mod error;
pub mod indicator;
pub mod model;
pub mod notifier;
pub mod pipeline;
pub mod scorer;
pub mod series;
pub mod source;
