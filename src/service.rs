//! Public operations of the engine, with result caching in front of the
//! aggregate queries.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{ResultCache, DEFAULT_CAPACITY, DEFAULT_TTL_SECS};
use crate::config::Config;
use crate::error::Result;
use crate::query::chart::{compute_chart, ChartRequest, ChartResult, Interval};
use crate::query::filter::{DateRange, FilterLists, FilterRequest};
use crate::query::ident::TableNames;
use crate::query::listing::{
    builder_listing_queries, fetch_page, search_queries, Listing, PageGuard, SearchCriteria,
    SortBy, BUILDER_DEFAULT_LIMIT, SEARCH_DEFAULT_LIMIT,
};
use crate::query::stats::{compute_builder_stats, compute_stats, Stats};
use crate::query::strategy::{strategy_for, QueryContext};
use crate::store::{SandwichRow, SandwichStore};

pub struct SandwichService {
    store: Arc<dyn SandwichStore>,
    tables: TableNames,
    lists: FilterLists,
    guard: PageGuard,
    builder_default_limit: i64,
    search_default_limit: i64,
    stats_cache: ResultCache<String, Stats>,
    chart_cache: ResultCache<String, ChartResult>,
}

impl SandwichService {
    pub fn new(store: Arc<dyn SandwichStore>, tables: TableNames, lists: FilterLists) -> Self {
        Self {
            store,
            tables,
            lists,
            guard: PageGuard::default(),
            builder_default_limit: BUILDER_DEFAULT_LIMIT,
            search_default_limit: SEARCH_DEFAULT_LIMIT,
            stats_cache: ResultCache::new("stats", DEFAULT_TTL_SECS, DEFAULT_CAPACITY),
            chart_cache: ResultCache::new("chart", DEFAULT_TTL_SECS, DEFAULT_CAPACITY),
        }
    }

    pub fn from_config(store: Arc<dyn SandwichStore>, config: &Config) -> anyhow::Result<Self> {
        let pagination = &config.pagination;
        Ok(Self::new(store, config.table_names()?, config.filter_lists())
            .with_cache(config.cache.ttl_secs, config.cache.capacity)
            .with_pagination(
                config.page_guard(),
                pagination.builder_default_limit,
                pagination.search_default_limit,
            ))
    }

    pub fn with_cache(mut self, ttl_secs: u64, capacity: usize) -> Self {
        self.stats_cache = ResultCache::new("stats", ttl_secs, capacity);
        self.chart_cache = ResultCache::new("chart", ttl_secs, capacity);
        self
    }

    pub fn with_pagination(mut self, guard: PageGuard, builder_default: i64, search_default: i64) -> Self {
        self.guard = guard;
        self.builder_default_limit = builder_default;
        self.search_default_limit = search_default;
        self
    }

    pub fn filter_lists(&self) -> &FilterLists {
        &self.lists
    }

    /// Block and sandwich counts for the range. A named builder gets its own
    /// counts only; otherwise the full per-builder breakdown is returned.
    pub async fn get_sandwich_stats(&self, request: &FilterRequest) -> Result<Stats> {
        let key = request.cache_key();
        if let Some(stats) = self.stats_cache.get(&key) {
            return Ok(stats);
        }

        let ctx = QueryContext::new(&self.tables, &self.lists, request.range);
        let stats = match &request.builder {
            Some(builder) => {
                debug!(builder = %builder, "Computing single-builder stats");
                Stats::Builder(compute_builder_stats(self.store.as_ref(), builder, &ctx).await?)
            }
            None => {
                let strategy = strategy_for(request.compile(&self.lists));
                debug!(path = ?strategy.path(), "Computing sandwich stats");
                Stats::Overall(compute_stats(self.store.as_ref(), strategy.as_ref(), &ctx).await?)
            }
        };

        self.stats_cache.set(key, stats.clone());
        Ok(stats)
    }

    pub async fn get_chart_data(&self, request: &ChartRequest) -> Result<ChartResult> {
        let key = request.cache_key();
        if let Some(chart) = self.chart_cache.get(&key) {
            return Ok(chart);
        }

        let ctx = QueryContext::new(&self.tables, &self.lists, request.range)
            .with_snapshot(request.snapshot_block);
        let strategy = strategy_for(request.compile(&self.lists));
        debug!(
            path = ?strategy.path(),
            interval = request.interval.trunc_unit(),
            builders = request.builders.len(),
            "Computing chart series"
        );
        let chart = compute_chart(
            self.store.as_ref(),
            strategy.as_ref(),
            &ctx,
            request.interval,
            &request.builders,
        )
        .await?;

        self.chart_cache.set(key, chart.clone());
        Ok(chart)
    }

    /// One builder's sandwiches, newest first. Pages past the limit are
    /// refused before any query runs.
    pub async fn get_builder_sandwiches(
        &self,
        builder: &str,
        page: Option<i64>,
        limit: Option<i64>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Listing<SandwichRow>> {
        let window = match self.guard.check(page, limit, self.builder_default_limit) {
            Ok(window) => window,
            Err(exceeded) => {
                debug!(builder = %builder, ?page, "Builder listing page limit exceeded");
                return Ok(Listing::LimitExceeded(exceeded));
            }
        };

        let range = DateRange::resolve(start, end, today());
        let (page_query, count_query) = builder_listing_queries(&self.tables, builder.trim(), &range, window);
        let page = fetch_page(self.store.as_ref(), &page_query, &count_query, window).await?;
        Ok(Listing::Page(page))
    }

    pub async fn search_sandwiches(
        &self,
        criteria: &SearchCriteria,
        page: Option<i64>,
        limit: Option<i64>,
        sort: SortBy,
    ) -> Result<Listing<SandwichRow>> {
        let window = match self.guard.check(page, limit, self.search_default_limit) {
            Ok(window) => window,
            Err(exceeded) => {
                debug!(?page, "Search page limit exceeded");
                return Ok(Listing::LimitExceeded(exceeded));
            }
        };

        let (page_query, count_query) = search_queries(&self.tables, &self.lists, criteria, sort, window);
        let page = fetch_page(self.store.as_ref(), &page_query, &count_query, window).await?;
        Ok(Listing::Page(page))
    }

    pub fn clear_cache(&self) {
        self.stats_cache.clear();
        self.chart_cache.clear();
        info!("Result caches cleared");
    }

    /// Precompute the default dashboard views: trailing-window stats and the
    /// daily chart.
    pub async fn warm_cache(&self) {
        let filter = FilterRequest::new(DateRange::trailing(today()));
        let chart = ChartRequest::new(Interval::Daily, filter.clone());

        info!("Warming cache for {} to {}...", filter.range.start, filter.range.end);

        let (stats, chart) = tokio::join!(self.get_sandwich_stats(&filter), self.get_chart_data(&chart));
        if let Err(e) = stats {
            warn!("Failed to warm stats cache: {}", e);
        }
        if let Err(e) = chart {
            warn!("Failed to warm chart cache: {}", e);
        }

        info!("Cache warmed");
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
