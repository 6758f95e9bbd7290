//! Row types and the executor seam between query composition and the database

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::error::Result;
use crate::query::params::Query;

/// Block counts over a range. `builder_*` counts only builder-attributed blocks.
#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct TotalsRow {
    pub total_blocks: i64,
    pub sandwich_blocks: i64,
    pub builder_blocks: i64,
    pub sandwich_builder_blocks: i64,
    pub earliest_block: Option<i64>,
    pub latest_block: Option<i64>,
}

/// Counts for a single builder.
#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct BuilderTotalsRow {
    pub total_blocks: i64,
    pub sandwich_blocks: i64,
    pub earliest_block: Option<i64>,
    pub latest_block: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct BreakdownRow {
    pub builder_name: String,
    pub blocks: i64,
    pub sandwich_blocks: i64,
}

/// Profit for one (builder, token) pair.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ProfitRow {
    pub builder_name: String,
    pub token: Option<String>,
    pub attack_count: i64,
    /// Raw sum in the token's smallest unit, as decimal text.
    pub raw_amount: String,
    /// Sum divided by 10^18, zero for tokens outside the stable allow-list.
    pub stable_amount: f64,
}

/// One bucket of a time series. `builder_name` is `None` for buckets where no
/// selected builder produced a block; the overall figures are still present.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SeriesRow {
    pub bucket: NaiveDateTime,
    pub builder_name: Option<String>,
    pub blocks: i64,
    pub sandwiches: i64,
    pub overall_total: i64,
    pub overall_sandwiches: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct SandwichRow {
    pub id: i64,
    pub block_number: i64,
    pub block_time: DateTime<Utc>,
    pub builder_name: Option<String>,
    pub front_tx_hash: String,
    pub front_to: Option<String>,
    pub victim_tx_hash: String,
    pub victim_to: Option<String>,
    pub backrun_tx_hashes: Vec<String>,
    pub profit_amount: String,
    pub profit_token: Option<String>,
    pub is_bundle: bool,
    pub bundle_size: Option<i32>,
}

/// Executes composed queries. Each method decodes one row shape; the SQL is
/// entirely decided by the caller.
#[async_trait]
pub trait SandwichStore: Send + Sync {
    async fn fetch_totals(&self, query: &Query) -> Result<TotalsRow>;

    async fn fetch_builder_totals(&self, query: &Query) -> Result<BuilderTotalsRow>;

    async fn fetch_breakdown(&self, query: &Query) -> Result<Vec<BreakdownRow>>;

    async fn fetch_profit(&self, query: &Query) -> Result<Vec<ProfitRow>>;

    async fn fetch_names(&self, query: &Query) -> Result<Vec<String>>;

    async fn fetch_series(&self, query: &Query) -> Result<Vec<SeriesRow>>;

    async fn fetch_sandwiches(&self, query: &Query) -> Result<Vec<SandwichRow>>;

    async fn fetch_count(&self, query: &Query) -> Result<i64>;
}
