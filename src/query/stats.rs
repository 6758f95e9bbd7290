//! Aggregate sandwich statistics: totals, per-builder breakdown and profit.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use super::filter::{DateRange, FilterLists};
use super::params::Query;
use super::strategy::{AggregationStrategy, QueryContext};
use crate::error::Result;
use crate::store::{BreakdownRow, BuilderTotalsRow, ProfitRow, SandwichStore, TotalsRow};

/// Maximum builders returned in a breakdown.
pub const BREAKDOWN_LIMIT: i64 = 100;

/// `100 * numerator / denominator` rounded to 4 decimal places, 0 when the
/// denominator is 0.
pub fn percentage(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round4(100.0 * numerator as f64 / denominator as f64)
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenProfit {
    pub token: Option<String>,
    /// Raw sum in the token's smallest unit.
    pub amount: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderBreakdown {
    pub builder_name: String,
    pub blocks: i64,
    pub sandwich_blocks: i64,
    /// Share of this builder's own blocks that carried a sandwich.
    pub sandwich_percentage: f64,
    /// Share of all blocks in range produced by this builder.
    pub mined_rate: f64,
    pub total_profit_stable: f64,
    pub total_profit_native: String,
    pub profit_by_token: Vec<TokenProfit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandwichStats {
    pub start_date: String,
    pub end_date: String,
    pub total_blocks: i64,
    pub sandwich_blocks: i64,
    pub builder_blocks: i64,
    pub sandwich_builder_blocks: i64,
    pub sandwich_percentage: f64,
    pub sandwich_percentage_on_builder: f64,
    pub earliest_block: Option<i64>,
    pub latest_block: Option<i64>,
    pub builder_breakdown: Vec<BuilderBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderStats {
    pub builder_name: String,
    pub start_date: String,
    pub end_date: String,
    pub total_blocks: i64,
    pub sandwich_blocks: i64,
    pub sandwich_percentage: f64,
    pub earliest_block: Option<i64>,
    pub latest_block: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stats {
    Builder(BuilderStats),
    Overall(SandwichStats),
}

pub fn totals_query(strategy: &dyn AggregationStrategy, ctx: &QueryContext<'_>) -> Query {
    let hit = strategy.hit_expr();
    let mut query = Query::new("");
    strategy.push_prelude(&mut query, ctx);
    query
        .push("SELECT COUNT(*)::bigint AS total_blocks, ")
        .push(&format!("COUNT(*) FILTER (WHERE {hit})::bigint AS sandwich_blocks, "))
        .push("COUNT(*) FILTER (WHERE o.builder_name IS NOT NULL)::bigint AS builder_blocks, ")
        .push(&format!(
            "COUNT(*) FILTER (WHERE {hit} AND o.builder_name IS NOT NULL)::bigint AS sandwich_builder_blocks, "
        ))
        .push("MIN(o.block_number) AS earliest_block, MAX(o.block_number) AS latest_block FROM ")
        .push(&ctx.tables.overview)
        .push(" o");
    strategy.push_joins(&mut query);
    query.push(" WHERE ").push_fragment(&ctx.block_scope());
    query
}

pub fn breakdown_query(strategy: &dyn AggregationStrategy, ctx: &QueryContext<'_>) -> Query {
    let hit = strategy.hit_expr();
    let mut query = Query::new("");
    strategy.push_prelude(&mut query, ctx);
    query
        .push("SELECT o.builder_name, COUNT(*)::bigint AS blocks, ")
        .push(&format!("COUNT(*) FILTER (WHERE {hit})::bigint AS sandwich_blocks FROM "))
        .push(&ctx.tables.overview)
        .push(" o");
    strategy.push_joins(&mut query);
    query
        .push(" WHERE ")
        .push_fragment(&ctx.block_scope())
        .push(" AND o.builder_name IS NOT NULL GROUP BY o.builder_name ORDER BY ")
        .push(&format!("COUNT(*) FILTER (WHERE {hit})::float8 / COUNT(*) DESC, "))
        .push("COUNT(*) DESC, o.builder_name LIMIT ")
        .push_bind(BREAKDOWN_LIMIT);
    query
}

pub fn profit_query(strategy: &dyn AggregationStrategy, ctx: &QueryContext<'_>) -> Query {
    let mut query = Query::new(
        "SELECT o.builder_name, LOWER(a.profit_token) AS token, COUNT(*)::bigint AS attack_count, \
         COALESCE(SUM(a.profit_amount), 0)::text AS raw_amount, \
         (COALESCE(SUM(a.profit_amount) FILTER (WHERE LOWER(a.profit_token) = ANY(",
    );
    query
        .push_bind(ctx.lists.stable_tokens.clone())
        .push(")), 0) / 1e18)::float8 AS stable_amount FROM ")
        .push(&ctx.tables.attack)
        .push(" a JOIN ")
        .push(&ctx.tables.overview)
        .push(" o ON o.block_number = a.block_number WHERE ")
        .push_fragment(&ctx.block_scope())
        .push(" AND o.builder_name IS NOT NULL")
        .and(strategy.attack_predicate())
        .push(" GROUP BY o.builder_name, LOWER(a.profit_token)");
    query
}

pub fn builder_totals_query(builder: &str, ctx: &QueryContext<'_>) -> Query {
    let mut query = Query::new(
        "SELECT COUNT(*)::bigint AS total_blocks, \
         COUNT(*) FILTER (WHERE o.has_sandwich)::bigint AS sandwich_blocks, \
         MIN(o.block_number) AS earliest_block, MAX(o.block_number) AS latest_block FROM ",
    );
    query
        .push(&ctx.tables.overview)
        .push(" o WHERE ")
        .push_fragment(&ctx.block_scope())
        .push(" AND o.builder_name = ")
        .push_bind(builder);
    query
}

/// Run totals, breakdown and profit concurrently and shape the result.
/// Any failing branch fails the whole computation.
pub async fn compute_stats(
    store: &dyn SandwichStore,
    strategy: &dyn AggregationStrategy,
    ctx: &QueryContext<'_>,
) -> Result<SandwichStats> {
    let totals = totals_query(strategy, ctx);
    let breakdown = breakdown_query(strategy, ctx);
    let profit = profit_query(strategy, ctx);

    let (totals, breakdown, profit) = tokio::try_join!(
        store.fetch_totals(&totals),
        store.fetch_breakdown(&breakdown),
        store.fetch_profit(&profit),
    )?;

    Ok(shape_stats(&ctx.range, totals, breakdown, profit, ctx.lists))
}

pub async fn compute_builder_stats(
    store: &dyn SandwichStore,
    builder: &str,
    ctx: &QueryContext<'_>,
) -> Result<BuilderStats> {
    let row = store.fetch_builder_totals(&builder_totals_query(builder, ctx)).await?;
    Ok(shape_builder_stats(builder, &ctx.range, row))
}

fn sandwich_ratio(row: &BreakdownRow) -> f64 {
    if row.blocks == 0 {
        0.0
    } else {
        row.sandwich_blocks as f64 / row.blocks as f64
    }
}

/// Shared by both strategies so the output schema cannot drift between them.
pub fn shape_stats(
    range: &DateRange,
    totals: TotalsRow,
    mut breakdown: Vec<BreakdownRow>,
    profit: Vec<ProfitRow>,
    lists: &FilterLists,
) -> SandwichStats {
    breakdown.sort_by(|x, y| {
        sandwich_ratio(y)
            .partial_cmp(&sandwich_ratio(x))
            .unwrap_or(Ordering::Equal)
            .then_with(|| y.blocks.cmp(&x.blocks))
            .then_with(|| x.builder_name.cmp(&y.builder_name))
    });
    breakdown.truncate(BREAKDOWN_LIMIT as usize);

    let mut profit_by_builder: HashMap<String, Vec<ProfitRow>> = HashMap::new();
    for row in profit {
        profit_by_builder.entry(row.builder_name.clone()).or_default().push(row);
    }

    let builder_breakdown = breakdown
        .into_iter()
        .map(|row| {
            let rows = profit_by_builder.remove(&row.builder_name).unwrap_or_default();
            shape_builder(row, rows, totals.total_blocks, lists)
        })
        .collect();

    SandwichStats {
        start_date: range.start.to_string(),
        end_date: range.end.to_string(),
        total_blocks: totals.total_blocks,
        sandwich_blocks: totals.sandwich_blocks,
        builder_blocks: totals.builder_blocks,
        sandwich_builder_blocks: totals.sandwich_builder_blocks,
        sandwich_percentage: percentage(totals.sandwich_blocks, totals.total_blocks),
        sandwich_percentage_on_builder: percentage(totals.sandwich_builder_blocks, totals.builder_blocks),
        earliest_block: totals.earliest_block,
        latest_block: totals.latest_block,
        builder_breakdown,
    }
}

fn shape_builder(
    row: BreakdownRow,
    mut profit: Vec<ProfitRow>,
    total_blocks: i64,
    lists: &FilterLists,
) -> BuilderBreakdown {
    profit.sort_by(|x, y| y.attack_count.cmp(&x.attack_count).then_with(|| x.token.cmp(&y.token)));

    // An empty f64 sum is -0.0, which would serialize as such.
    let total_profit_stable = profit.iter().fold(0.0, |acc, p| acc + p.stable_amount);
    // One row per token, so the native token's row already holds the full sum.
    let total_profit_native = profit
        .iter()
        .find(|p| p.token.as_deref() == Some(lists.native_token.as_str()))
        .map(|p| p.raw_amount.clone())
        .unwrap_or_else(|| "0".to_string());

    BuilderBreakdown {
        sandwich_percentage: percentage(row.sandwich_blocks, row.blocks),
        mined_rate: percentage(row.blocks, total_blocks),
        builder_name: row.builder_name,
        blocks: row.blocks,
        sandwich_blocks: row.sandwich_blocks,
        total_profit_stable,
        total_profit_native,
        profit_by_token: profit
            .into_iter()
            .map(|p| TokenProfit {
                token: p.token,
                amount: p.raw_amount,
                count: p.attack_count,
            })
            .collect(),
    }
}

pub fn shape_builder_stats(builder: &str, range: &DateRange, row: BuilderTotalsRow) -> BuilderStats {
    BuilderStats {
        builder_name: builder.to_string(),
        start_date: range.start.to_string(),
        end_date: range.end.to_string(),
        total_blocks: row.total_blocks,
        sandwich_blocks: row.sandwich_blocks,
        sandwich_percentage: percentage(row.sandwich_blocks, row.total_blocks),
        earliest_block: row.earliest_block,
        latest_block: row.latest_block,
    }
}
