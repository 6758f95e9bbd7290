//! Aggregation strategies.
//!
//! Every aggregate reads `block_overview` under alias `o` and needs to know
//! which blocks count as sandwich blocks. The fast path trusts the
//! denormalized `has_sandwich` flag. The filtered path recomputes the set from
//! the attack table, because the flag means "any sandwich in the block" while
//! a filtered view needs "any sandwich in the block that passes the filter".
//! Query shapes are shared; only the sandwich-block source differs.

use super::filter::{CompiledFilter, DateRange, FilterLists};
use super::ident::TableNames;
use super::params::{Fragment, Query};

/// Which of the two query shapes served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPath {
    Fast,
    Filtered,
}

/// Everything a query needs besides the strategy.
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    pub tables: &'a TableNames,
    pub lists: &'a FilterLists,
    pub range: DateRange,
    pub snapshot_block: Option<i64>,
}

impl<'a> QueryContext<'a> {
    pub fn new(tables: &'a TableNames, lists: &'a FilterLists, range: DateRange) -> Self {
        Self {
            tables,
            lists,
            range,
            snapshot_block: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot_block: Option<i64>) -> Self {
        self.snapshot_block = snapshot_block;
        self
    }

    /// Date window and snapshot cutoff on alias `o`.
    pub fn block_scope(&self) -> Fragment {
        let mut parts = vec![self.range.predicate("o.block_time")];
        if let Some(snapshot) = self.snapshot_block {
            let mut cutoff = Fragment::sql("o.block_number <= ");
            cutoff.push_bind(snapshot);
            parts.push(cutoff);
        }
        Fragment::and_all(parts)
    }
}

pub trait AggregationStrategy: Send + Sync {
    fn path(&self) -> QueryPath;

    /// Leading `WITH ...` clause, if the strategy needs one.
    fn push_prelude(&self, query: &mut Query, ctx: &QueryContext<'_>);

    /// Joins appended right after `FROM <overview> o`.
    fn push_joins(&self, query: &mut Query);

    /// Boolean SQL expression that is true for a sandwich block.
    fn hit_expr(&self) -> &'static str;

    /// Predicate over attack alias `a`. Empty on the fast path.
    fn attack_predicate(&self) -> &Fragment;
}

/// Reads only `block_overview` for block counts.
#[derive(Debug, Default)]
pub struct OverviewStrategy {
    empty: Fragment,
}

impl AggregationStrategy for OverviewStrategy {
    fn path(&self) -> QueryPath {
        QueryPath::Fast
    }

    fn push_prelude(&self, _query: &mut Query, _ctx: &QueryContext<'_>) {}

    fn push_joins(&self, _query: &mut Query) {}

    fn hit_expr(&self) -> &'static str {
        "o.has_sandwich"
    }

    fn attack_predicate(&self) -> &Fragment {
        &self.empty
    }
}

/// Joins the attack table and counts a block only when one of its attacks
/// passes the extra predicate.
#[derive(Debug)]
pub struct AttackJoinStrategy {
    predicate: Fragment,
}

impl AttackJoinStrategy {
    pub fn new(predicate: Fragment) -> Self {
        Self { predicate }
    }
}

impl AggregationStrategy for AttackJoinStrategy {
    fn path(&self) -> QueryPath {
        QueryPath::Filtered
    }

    fn push_prelude(&self, query: &mut Query, ctx: &QueryContext<'_>) {
        query
            .push("WITH matched AS (SELECT DISTINCT a.block_number FROM ")
            .push(&ctx.tables.attack)
            .push(" a WHERE ")
            .push_fragment(&ctx.range.predicate("a.block_time"))
            .and(&self.predicate)
            .push(") ");
    }

    fn push_joins(&self, query: &mut Query) {
        query.push(" LEFT JOIN matched m ON m.block_number = o.block_number");
    }

    fn hit_expr(&self) -> &'static str {
        "m.block_number IS NOT NULL"
    }

    fn attack_predicate(&self) -> &Fragment {
        &self.predicate
    }
}

/// Pick the strategy for a compiled filter.
pub fn strategy_for(filter: CompiledFilter) -> Box<dyn AggregationStrategy> {
    if filter.uses_extra_filters {
        Box::new(AttackJoinStrategy::new(filter.predicate))
    } else {
        Box::new(OverviewStrategy::default())
    }
}
