//! Paged sandwich listings and the page-depth guard in front of them.

use serde::{Deserialize, Serialize};

use super::filter::{
    clean_name, compile, AmountRange, BundleFilter, DateRange, FilterLists, FilterRequest,
    RawFilterParams, RouterClass,
};
use super::ident::TableNames;
use super::params::{Fragment, Query};
use crate::error::Result;
use crate::store::{SandwichRow, SandwichStore};

pub const DEFAULT_MAX_PAGE: i64 = 100;
pub const DEFAULT_MAX_LIMIT: i64 = 100;
pub const BUILDER_DEFAULT_LIMIT: i64 = 50;
pub const SEARCH_DEFAULT_LIMIT: i64 = 12;

/// Returned instead of a page when the caller asks for one past the limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLimitExceeded {
    pub error: String,
    pub max_page: i64,
    pub message: String,
}

impl PageLimitExceeded {
    pub fn new(max_page: i64) -> Self {
        Self {
            error: "page_limit_exceeded".to_string(),
            max_page,
            message: format!(
                "Only the first {max_page} pages can be browsed. Narrow the date range to see older results."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Page(Page<T>),
    LimitExceeded(PageLimitExceeded),
}

/// A coerced page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub limit: i64,
}

impl PageWindow {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageGuard {
    pub max_page: i64,
    pub max_limit: i64,
}

impl Default for PageGuard {
    fn default() -> Self {
        Self {
            max_page: DEFAULT_MAX_PAGE,
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }
}

impl PageGuard {
    /// Coerce page to at least 1 and limit into `[1, max_limit]`, then reject
    /// pages beyond `max_page`.
    pub fn check(
        &self,
        page: Option<i64>,
        limit: Option<i64>,
        default_limit: i64,
    ) -> std::result::Result<PageWindow, PageLimitExceeded> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(default_limit).clamp(1, self.max_limit.max(1));
        if page > self.max_page {
            return Err(PageLimitExceeded::new(self.max_page));
        }
        Ok(PageWindow { page, limit })
    }
}

/// Lenient integer parsing for page/limit query parameters.
pub fn parse_number(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Newest,
    Oldest,
    Profit,
    BundleSize,
}

impl SortBy {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("oldest" | "time_asc") => SortBy::Oldest,
            Some("profit" | "profit_desc") => SortBy::Profit,
            Some("bundle_size" | "bundle") => SortBy::BundleSize,
            _ => SortBy::Newest,
        }
    }

    fn order_clause(self) -> &'static str {
        match self {
            SortBy::Newest => "a.block_number DESC, a.id DESC",
            SortBy::Oldest => "a.block_number ASC, a.id ASC",
            SortBy::Profit => "a.profit_amount DESC NULLS LAST, a.id DESC",
            SortBy::BundleSize => "a.bundle_size DESC NULLS LAST, a.block_number DESC, a.id DESC",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSearchParams {
    pub q: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    #[serde(flatten)]
    pub filter: RawFilterParams,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawListingParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Free text plus the regular filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    /// Matched against tx hashes and builder names; a numeric value also
    /// matches the block number exactly.
    pub text: Option<String>,
    pub builder: Option<String>,
    pub range: DateRange,
    pub bundle: BundleFilter,
    pub amount: AmountRange,
    pub router: RouterClass,
}

impl SearchCriteria {
    pub fn new(text: Option<&str>, filter: FilterRequest) -> Self {
        Self {
            text: clean_name(text),
            builder: filter.builder,
            range: filter.range,
            bundle: filter.bundle,
            amount: filter.amount,
            router: filter.router,
        }
    }
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn text_predicate(tables: &TableNames, text: &str) -> Fragment {
    let pattern = format!("%{}%", escape_like(text));
    let mut fragment = Fragment::sql("(a.front_tx_hash ILIKE ");
    fragment
        .push_bind(pattern.clone())
        .push(" OR a.victim_tx_hash ILIKE ")
        .push_bind(pattern.clone())
        .push(" OR o.builder_name ILIKE ")
        .push_bind(pattern.clone())
        .push(format!(
            " OR EXISTS (SELECT 1 FROM {} b2 WHERE b2.attack_id = a.id AND b2.tx_hash ILIKE ",
            tables.backrun
        ))
        .push_bind(pattern)
        .push(")");
    if let Ok(block_number) = text.parse::<i64>() {
        fragment.push(" OR a.block_number = ").push_bind(block_number);
    }
    fragment.push(")");
    fragment
}

fn page_query(tables: &TableNames, filter: &Fragment, sort: SortBy, window: PageWindow) -> Query {
    let mut query = Query::new(
        "SELECT a.id, a.block_number, a.block_time, o.builder_name, a.front_tx_hash, a.front_to, \
         a.victim_tx_hash, a.victim_to, \
         COALESCE(ARRAY_REMOVE(ARRAY_AGG(b.tx_hash ORDER BY b.seq), NULL), ARRAY[]::text[]) AS backrun_tx_hashes, \
         COALESCE(a.profit_amount, 0)::text AS profit_amount, a.profit_token, \
         COALESCE(a.is_bundle, FALSE) AS is_bundle, a.bundle_size FROM ",
    );
    query
        .push(&tables.attack)
        .push(" a JOIN ")
        .push(&tables.overview)
        .push(" o ON o.block_number = a.block_number LEFT JOIN ")
        .push(&tables.backrun)
        .push(" b ON b.attack_id = a.id WHERE ")
        .push_fragment(filter)
        .push(" GROUP BY a.id, o.builder_name ORDER BY ")
        .push(sort.order_clause())
        .push(" LIMIT ")
        .push_bind(window.limit)
        .push(" OFFSET ")
        .push_bind(window.offset());
    query
}

fn count_query(tables: &TableNames, filter: &Fragment) -> Query {
    let mut query = Query::new("SELECT COUNT(*)::bigint FROM ");
    query
        .push(&tables.attack)
        .push(" a JOIN ")
        .push(&tables.overview)
        .push(" o ON o.block_number = a.block_number WHERE ")
        .push_fragment(filter);
    query
}

/// Page and count queries for one builder's sandwiches.
pub fn builder_listing_queries(
    tables: &TableNames,
    builder: &str,
    range: &DateRange,
    window: PageWindow,
) -> (Query, Query) {
    let mut by_builder = Fragment::sql("o.builder_name = ");
    by_builder.push_bind(builder);
    let filter = Fragment::and_all([range.predicate("a.block_time"), by_builder]);
    (
        page_query(tables, &filter, SortBy::Newest, window),
        count_query(tables, &filter),
    )
}

/// Page and count queries for a criteria search.
pub fn search_queries(
    tables: &TableNames,
    lists: &FilterLists,
    criteria: &SearchCriteria,
    sort: SortBy,
    window: PageWindow,
) -> (Query, Query) {
    let mut parts = vec![criteria.range.predicate("a.block_time")];
    if let Some(builder) = &criteria.builder {
        let mut by_builder = Fragment::sql("o.builder_name = ");
        by_builder.push_bind(builder.clone());
        parts.push(by_builder);
    }
    if let Some(text) = &criteria.text {
        parts.push(text_predicate(tables, text));
    }
    parts.push(compile(criteria.bundle, &criteria.amount, criteria.router, lists).predicate);

    let filter = Fragment::and_all(parts);
    (
        page_query(tables, &filter, sort, window),
        count_query(tables, &filter),
    )
}

/// Fetch a page and the total count concurrently.
pub async fn fetch_page(
    store: &dyn SandwichStore,
    page: &Query,
    count: &Query,
    window: PageWindow,
) -> Result<Page<SandwichRow>> {
    let (items, total) = tokio::try_join!(store.fetch_sandwiches(page), store.fetch_count(count))?;
    let total_pages = if total == 0 { 0 } else { (total + window.limit - 1) / window.limit };
    Ok(Page {
        has_more: window.page < total_pages,
        items,
        page: window.page,
        limit: window.limit,
        total,
        total_pages,
    })
}
