//! Recording fake for the store seam.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sandwich_stats::error::{Error, Result};
use sandwich_stats::query::filter::FilterLists;
use sandwich_stats::query::ident::TableNames;
use sandwich_stats::query::params::Query;
use sandwich_stats::service::SandwichService;
use sandwich_stats::store::{
    BreakdownRow, BuilderTotalsRow, ProfitRow, SandwichRow, SandwichStore, SeriesRow, TotalsRow,
};

/// Answers every query with canned rows and remembers the SQL it was given.
#[derive(Default)]
pub struct FakeStore {
    calls: AtomicUsize,
    fail: AtomicBool,
    seen: Mutex<Vec<String>>,
    pub totals: Mutex<TotalsRow>,
    pub builder_totals: Mutex<BuilderTotalsRow>,
    pub breakdown: Mutex<Vec<BreakdownRow>>,
    pub profit: Mutex<Vec<ProfitRow>>,
    pub names: Mutex<Vec<String>>,
    pub series: Mutex<Vec<SeriesRow>>,
    pub sandwiches: Mutex<Vec<SandwichRow>>,
    pub count: Mutex<i64>,
}

impl FakeStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    /// Make every following query fail as if the pool were exhausted.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn record(&self, query: &Query) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(query.sql().to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::PoolExhausted);
        }
        Ok(())
    }
}

#[async_trait]
impl SandwichStore for FakeStore {
    async fn fetch_totals(&self, query: &Query) -> Result<TotalsRow> {
        self.record(query)?;
        Ok(self.totals.lock().unwrap().clone())
    }

    async fn fetch_builder_totals(&self, query: &Query) -> Result<BuilderTotalsRow> {
        self.record(query)?;
        Ok(self.builder_totals.lock().unwrap().clone())
    }

    async fn fetch_breakdown(&self, query: &Query) -> Result<Vec<BreakdownRow>> {
        self.record(query)?;
        Ok(self.breakdown.lock().unwrap().clone())
    }

    async fn fetch_profit(&self, query: &Query) -> Result<Vec<ProfitRow>> {
        self.record(query)?;
        Ok(self.profit.lock().unwrap().clone())
    }

    async fn fetch_names(&self, query: &Query) -> Result<Vec<String>> {
        self.record(query)?;
        Ok(self.names.lock().unwrap().clone())
    }

    async fn fetch_series(&self, query: &Query) -> Result<Vec<SeriesRow>> {
        self.record(query)?;
        Ok(self.series.lock().unwrap().clone())
    }

    async fn fetch_sandwiches(&self, query: &Query) -> Result<Vec<SandwichRow>> {
        self.record(query)?;
        Ok(self.sandwiches.lock().unwrap().clone())
    }

    async fn fetch_count(&self, query: &Query) -> Result<i64> {
        self.record(query)?;
        Ok(*self.count.lock().unwrap())
    }
}

pub const WBNB: &str = "0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c";
pub const USDT: &str = "0x55d398326f99059ff775485246999027b3197955";
pub const PANCAKE_V2: &str = "0x10ed43c718714eb63d5aa57b78b54704e256024e";

pub fn lists() -> FilterLists {
    FilterLists::new("test", WBNB, &[USDT.to_string()], &[PANCAKE_V2.to_string()])
}

pub fn service(store: Arc<FakeStore>) -> SandwichService {
    SandwichService::new(store, TableNames::with_schema("public").unwrap(), lists())
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn breakdown(name: &str, blocks: i64, sandwich_blocks: i64) -> BreakdownRow {
    BreakdownRow {
        builder_name: name.to_string(),
        blocks,
        sandwich_blocks,
    }
}

pub fn series(bucket: &str, builder: Option<&str>, blocks: i64, sandwiches: i64, total: i64, total_sw: i64) -> SeriesRow {
    SeriesRow {
        bucket: date(bucket).and_hms_opt(0, 0, 0).unwrap(),
        builder_name: builder.map(str::to_string),
        blocks,
        sandwiches,
        overall_total: total,
        overall_sandwiches: total_sw,
    }
}

pub fn sandwich(id: i64, block_number: i64) -> SandwichRow {
    SandwichRow {
        id,
        block_number,
        block_time: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        builder_name: Some("titan".to_string()),
        front_tx_hash: format!("0xfront{id}"),
        front_to: Some(PANCAKE_V2.to_string()),
        victim_tx_hash: format!("0xvictim{id}"),
        victim_to: None,
        backrun_tx_hashes: vec![format!("0xback{id}a"), format!("0xback{id}b")],
        profit_amount: "1500000000000000000".to_string(),
        profit_token: Some(USDT.to_string()),
        is_bundle: true,
        bundle_size: Some(3),
    }
}
