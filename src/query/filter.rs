//! Filter compilation: request parameters into SQL predicates.
//!
//! Request input is coerced rather than rejected. Unparseable dates and
//! amounts behave as if they were not supplied, and only cleaned values are
//! ever bound into a query.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::params::Fragment;

/// Days covered when a request names no date range.
pub const DEFAULT_RANGE_DAYS: u64 = 30;

/// Divisor applied to raw token amounts before comparing against amount bounds.
const TOKEN_SCALE: &str = "1e18";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleFilter {
    #[default]
    All,
    Bundle,
    NonBundle,
}

impl BundleFilter {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("bundle" | "bundle_only" | "bundled") => BundleFilter::Bundle,
            Some("non_bundle" | "non-bundle" | "nonbundle" | "non_bundle_only") => BundleFilter::NonBundle,
            _ => BundleFilter::All,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterClass {
    #[default]
    All,
    Public,
    Customized,
}

impl RouterClass {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("public") => RouterClass::Public,
            Some("customized" | "custom" | "private") => RouterClass::Customized,
            _ => RouterClass::All,
        }
    }
}

/// Profit bounds in whole stable-token units. Each bound is independent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: Option<String>,
    pub max: Option<String>,
}

impl AmountRange {
    pub fn parse(min: Option<&str>, max: Option<&str>) -> Self {
        Self {
            min: min.and_then(|s| clean_amount("min", s)),
            max: max.and_then(|s| clean_amount("max", s)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

/// Returns the trimmed amount if it is a finite, non-negative decimal.
fn clean_amount(bound: &str, raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Some(trimmed.to_string()),
        _ => {
            warn!("Ignoring malformed {} amount filter: {:?}", bound, raw);
            None
        }
    }
}

/// Parse `YYYY-MM-DD` or an RFC 3339 timestamp (date part, UTC).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).date_naive())
        })
        .or_else(|| {
            warn!("Ignoring malformed date filter: {:?}", raw);
            None
        })
}

/// Inclusive calendar-day range, rendered as a half-open UTC window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Fill in missing ends: the range defaults to the trailing
    /// [`DEFAULT_RANGE_DAYS`] ending today, and a single given end anchors it.
    pub fn resolve(start: Option<NaiveDate>, end: Option<NaiveDate>, today: NaiveDate) -> Self {
        let back = Days::new(DEFAULT_RANGE_DAYS);
        match (start, end) {
            (Some(start), Some(end)) => Self { start, end },
            (Some(start), None) => Self { start, end: today },
            (None, Some(end)) => Self {
                start: end.checked_sub_days(back).unwrap_or(end),
                end,
            },
            (None, None) => Self {
                start: today.checked_sub_days(back).unwrap_or(today),
                end: today,
            },
        }
    }

    pub fn trailing(today: NaiveDate) -> Self {
        Self::resolve(None, None, today)
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Midnight after the end date.
    pub fn end_exclusive(&self) -> DateTime<Utc> {
        let next = self.end.checked_add_days(Days::new(1)).unwrap_or(self.end);
        next.and_time(NaiveTime::MIN).and_utc()
    }

    /// `column >= start AND column < end_exclusive`
    pub fn predicate(&self, column: &str) -> Fragment {
        let mut fragment = Fragment::sql(format!("{column} >= "));
        fragment
            .push_bind(self.start_time())
            .push(format!(" AND {column} < "))
            .push_bind(self.end_exclusive());
        fragment
    }
}

/// Loosely typed request parameters, as they arrive from a query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFilterParams {
    pub builder: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub bundle: Option<String>,
    pub min_amount: Option<String>,
    pub max_amount: Option<String>,
    pub router: Option<String>,
}

/// Canonical filter set. Field order is fixed, so serializing it is a pure
/// function of its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRequest {
    pub builder: Option<String>,
    pub range: DateRange,
    pub bundle: BundleFilter,
    pub amount: AmountRange,
    pub router: RouterClass,
}

impl FilterRequest {
    pub fn new(range: DateRange) -> Self {
        Self {
            builder: None,
            range,
            bundle: BundleFilter::All,
            amount: AmountRange::default(),
            router: RouterClass::All,
        }
    }

    pub fn from_params(raw: &RawFilterParams, today: NaiveDate) -> Self {
        let start = raw.start_date.as_deref().and_then(parse_date);
        let end = raw.end_date.as_deref().and_then(parse_date);
        Self {
            builder: clean_name(raw.builder.as_deref()),
            range: DateRange::resolve(start, end, today),
            bundle: BundleFilter::parse(raw.bundle.as_deref()),
            amount: AmountRange::parse(raw.min_amount.as_deref(), raw.max_amount.as_deref()),
            router: RouterClass::parse(raw.router.as_deref()),
        }
    }

    pub fn with_builder(mut self, builder: impl Into<String>) -> Self {
        self.builder = clean_name(Some(&builder.into()));
        self
    }

    pub fn with_bundle(mut self, bundle: BundleFilter) -> Self {
        self.bundle = bundle;
        self
    }

    pub fn with_amount(mut self, amount: AmountRange) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_router(mut self, router: RouterClass) -> Self {
        self.router = router;
        self
    }

    pub fn uses_extra_filters(&self) -> bool {
        self.bundle != BundleFilter::All || self.amount.is_active() || self.router != RouterClass::All
    }

    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

pub(crate) fn clean_name(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Address allow-lists the filters compare against. Loaded from
/// configuration; addresses are normalized to lower case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterLists {
    pub version: String,
    pub native_token: String,
    pub stable_tokens: Vec<String>,
    pub public_routers: Vec<String>,
}

impl FilterLists {
    pub fn new(
        version: impl Into<String>,
        native_token: &str,
        stable_tokens: &[String],
        public_routers: &[String],
    ) -> Self {
        let normalize = |list: &[String]| {
            let mut out: Vec<String> = list.iter().map(|a| a.trim().to_lowercase()).collect();
            out.sort();
            out.dedup();
            out
        };
        Self {
            version: version.into(),
            native_token: native_token.trim().to_lowercase(),
            stable_tokens: normalize(stable_tokens),
            public_routers: normalize(public_routers),
        }
    }
}

/// Extra predicate over the attack table (alias `a`) plus path selection.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub predicate: Fragment,
    pub uses_extra_filters: bool,
}

/// Compile the non-date, non-builder filters of a request.
///
/// An active amount range restricts profit to the stable-token allow-list, so
/// attacks paid in any other token drop out of every filtered aggregate.
pub fn compile(
    bundle: BundleFilter,
    amount: &AmountRange,
    router: RouterClass,
    lists: &FilterLists,
) -> CompiledFilter {
    let mut parts = Vec::new();

    match bundle {
        BundleFilter::All => {}
        BundleFilter::Bundle => parts.push(Fragment::sql("a.is_bundle = TRUE")),
        BundleFilter::NonBundle => parts.push(Fragment::sql("a.is_bundle = FALSE")),
    }

    if amount.is_active() {
        let mut part = Fragment::sql("LOWER(a.profit_token) = ANY(");
        part.push_bind(lists.stable_tokens.clone()).push(")");
        if let Some(min) = &amount.min {
            part.push(format!(" AND a.profit_amount / {TOKEN_SCALE} >= "))
                .push_bind(min.clone())
                .push("::numeric");
        }
        if let Some(max) = &amount.max {
            part.push(format!(" AND a.profit_amount / {TOKEN_SCALE} <= "))
                .push_bind(max.clone())
                .push("::numeric");
        }
        parts.push(part);
    }

    match router {
        RouterClass::All => {}
        RouterClass::Public => {
            let mut part = Fragment::sql("LOWER(a.front_to) = ANY(");
            part.push_bind(lists.public_routers.clone()).push(")");
            parts.push(part);
        }
        RouterClass::Customized => {
            let mut part = Fragment::sql("NOT (COALESCE(LOWER(a.front_to), '') = ANY(");
            part.push_bind(lists.public_routers.clone()).push("))");
            parts.push(part);
        }
    }

    let uses_extra_filters = !parts.is_empty();
    CompiledFilter {
        predicate: Fragment::and_all(parts),
        uses_extra_filters,
    }
}

impl FilterRequest {
    pub fn compile(&self, lists: &FilterLists) -> CompiledFilter {
        compile(self.bundle, &self.amount, self.router, lists)
    }
}
