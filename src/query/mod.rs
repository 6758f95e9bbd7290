//! Query composition: filters, strategies and the statements built from them.

pub mod chart;
pub mod filter;
pub mod ident;
pub mod listing;
pub mod params;
pub mod stats;
pub mod strategy;
