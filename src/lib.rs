//! Sandwich Stats - analytical query and caching engine behind a
//! sandwich-attack monitoring dashboard.
//!
//! Turns dashboard filters into parameterized Postgres aggregates:
//! - Block and sandwich totals with a per-builder breakdown
//! - Time-bucketed series for the busiest builders
//! - Paged listings and criteria search over detected attacks

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod service;
pub mod store;
pub mod web;
