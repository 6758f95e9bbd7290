//! Time-bucketed sandwich series per builder, with overall figures per bucket.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use super::filter::{
    clean_name, AmountRange, BundleFilter, CompiledFilter, DateRange, FilterLists, FilterRequest,
    RawFilterParams, RouterClass,
};
use super::params::Query;
use super::stats::percentage;
use super::strategy::{AggregationStrategy, QueryContext};
use crate::error::Result;
use crate::store::{SandwichStore, SeriesRow};

/// Builders charted when the request names none.
pub const AUTO_BUILDER_COUNT: i64 = 10;

/// Upper bound on explicitly requested builders.
pub const MAX_CHART_BUILDERS: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Hourly,
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Interval {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("hour" | "hourly" | "1h") => Interval::Hourly,
            Some("week" | "weekly" | "1w") => Interval::Weekly,
            Some("month" | "monthly") => Interval::Monthly,
            _ => Interval::Daily,
        }
    }

    /// Unit passed to `DATE_TRUNC`. Never taken from request text.
    pub fn trunc_unit(self) -> &'static str {
        match self {
            Interval::Hourly => "hour",
            Interval::Daily => "day",
            Interval::Weekly => "week",
            Interval::Monthly => "month",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChartParams {
    pub interval: Option<String>,
    /// Comma-separated builder names.
    pub builders: Option<String>,
    pub snapshot_block: Option<String>,
    #[serde(flatten)]
    pub filter: RawFilterParams,
}

/// Canonical chart request. Builders are kept sorted and deduplicated so the
/// cache key does not depend on the order they were given in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRequest {
    pub interval: Interval,
    pub range: DateRange,
    pub builders: Vec<String>,
    pub bundle: BundleFilter,
    pub amount: AmountRange,
    pub router: RouterClass,
    pub snapshot_block: Option<i64>,
}

impl ChartRequest {
    pub fn new(interval: Interval, filter: FilterRequest) -> Self {
        Self {
            interval,
            range: filter.range,
            builders: Vec::new(),
            bundle: filter.bundle,
            amount: filter.amount,
            router: filter.router,
            snapshot_block: None,
        }
    }

    pub fn from_params(raw: &RawChartParams, today: chrono::NaiveDate) -> Self {
        let filter = FilterRequest::from_params(&raw.filter, today);
        let builders = raw
            .builders
            .as_deref()
            .map(|s| s.split(',').map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_default();
        let snapshot_block = raw
            .snapshot_block
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|b| *b >= 0);

        Self::new(Interval::parse(raw.interval.as_deref()), filter)
            .with_builders(builders)
            .with_snapshot(snapshot_block)
    }

    pub fn with_builders<I, S>(mut self, builders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = builders
            .into_iter()
            .filter_map(|b| clean_name(Some(b.as_ref())))
            .collect();
        names.sort();
        names.dedup();
        if names.len() > MAX_CHART_BUILDERS {
            warn!(
                "Chart limited to {} builders, ignoring {:?}",
                MAX_CHART_BUILDERS,
                &names[MAX_CHART_BUILDERS..]
            );
            names.truncate(MAX_CHART_BUILDERS);
        }
        self.builders = names;
        self
    }

    pub fn with_snapshot(mut self, snapshot_block: Option<i64>) -> Self {
        self.snapshot_block = snapshot_block;
        self
    }

    pub fn compile(&self, lists: &FilterLists) -> CompiledFilter {
        super::filter::compile(self.bundle, &self.amount, self.router, lists)
    }

    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub blocks: i64,
    pub sandwiches: i64,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartBucket {
    pub overall_total: i64,
    pub overall_sandwiches: i64,
    pub overall_rate: f64,
    pub builders: BTreeMap<String, SeriesPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSummary {
    pub total_blocks: i64,
    pub total_sandwiches: i64,
    pub avg_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartResult {
    pub interval: Interval,
    pub start_date: String,
    pub end_date: String,
    pub builders: Vec<String>,
    /// Keyed by ISO-8601 UTC bucket start, then by builder name.
    pub data: BTreeMap<String, ChartBucket>,
    pub summary: ChartSummary,
}

pub fn top_builders_query(ctx: &QueryContext<'_>) -> Query {
    let mut query = Query::new("SELECT o.builder_name FROM ");
    query
        .push(&ctx.tables.overview)
        .push(" o WHERE ")
        .push_fragment(&ctx.block_scope())
        .push(" AND o.builder_name IS NOT NULL GROUP BY o.builder_name ORDER BY COUNT(*) DESC, o.builder_name LIMIT ")
        .push_bind(AUTO_BUILDER_COUNT);
    query
}

pub fn series_query(
    strategy: &dyn AggregationStrategy,
    ctx: &QueryContext<'_>,
    interval: Interval,
    builders: &[String],
) -> Query {
    let hit = strategy.hit_expr();
    let bucket = format!(
        "DATE_TRUNC('{}', o.block_time AT TIME ZONE 'UTC')",
        interval.trunc_unit()
    );

    let mut query = Query::new("");
    strategy.push_prelude(&mut query, ctx);
    query
        .push("SELECT ov.bucket, pb.builder_name, ")
        .push("COALESCE(pb.blocks, 0)::bigint AS blocks, COALESCE(pb.sandwiches, 0)::bigint AS sandwiches, ")
        .push("ov.total::bigint AS overall_total, ov.sandwiches::bigint AS overall_sandwiches FROM (")
        .push(&format!(
            "SELECT {bucket} AS bucket, COUNT(*) AS total, COUNT(*) FILTER (WHERE {hit}) AS sandwiches FROM "
        ))
        .push(&ctx.tables.overview)
        .push(" o");
    strategy.push_joins(&mut query);
    query
        .push(" WHERE ")
        .push_fragment(&ctx.block_scope())
        .push(" GROUP BY 1) ov LEFT JOIN (")
        .push(&format!(
            "SELECT {bucket} AS bucket, o.builder_name, COUNT(*) AS blocks, \
             COUNT(*) FILTER (WHERE {hit}) AS sandwiches FROM "
        ))
        .push(&ctx.tables.overview)
        .push(" o");
    strategy.push_joins(&mut query);
    query
        .push(" WHERE ")
        .push_fragment(&ctx.block_scope())
        .push(" AND o.builder_name = ANY(")
        .push_bind(builders.to_vec())
        .push(") GROUP BY 1, 2) pb ON pb.bucket = ov.bucket ORDER BY ov.bucket, pb.builder_name");
    query
}

/// Resolve the builder set, then fetch and shape the series.
pub async fn compute_chart(
    store: &dyn SandwichStore,
    strategy: &dyn AggregationStrategy,
    ctx: &QueryContext<'_>,
    interval: Interval,
    requested: &[String],
) -> Result<ChartResult> {
    let builders = if requested.is_empty() {
        store.fetch_names(&top_builders_query(ctx)).await?
    } else {
        requested.to_vec()
    };

    let rows = store
        .fetch_series(&series_query(strategy, ctx, interval, &builders))
        .await?;
    Ok(shape_series(interval, &ctx.range, builders, rows))
}

/// Overall figures are taken once per bucket, however many builder rows
/// repeat them, and the summary sums unique buckets only.
pub fn shape_series(
    interval: Interval,
    range: &DateRange,
    builders: Vec<String>,
    rows: Vec<SeriesRow>,
) -> ChartResult {
    let mut data: BTreeMap<String, ChartBucket> = BTreeMap::new();

    for row in rows {
        let date = row.bucket.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true);
        let bucket = data.entry(date).or_insert_with(|| ChartBucket {
            overall_total: row.overall_total,
            overall_sandwiches: row.overall_sandwiches,
            overall_rate: percentage(row.overall_sandwiches, row.overall_total),
            builders: BTreeMap::new(),
        });

        if let Some(name) = row.builder_name {
            bucket.builders.insert(
                name,
                SeriesPoint {
                    blocks: row.blocks,
                    sandwiches: row.sandwiches,
                    rate: percentage(row.sandwiches, row.blocks),
                },
            );
        }
    }

    let total_blocks = data.values().map(|b| b.overall_total).sum();
    let total_sandwiches = data.values().map(|b| b.overall_sandwiches).sum();

    ChartResult {
        interval,
        start_date: range.start.to_string(),
        end_date: range.end.to_string(),
        builders,
        data,
        summary: ChartSummary {
            total_blocks,
            total_sandwiches,
            avg_rate: percentage(total_sandwiches, total_blocks),
        },
    }
}
