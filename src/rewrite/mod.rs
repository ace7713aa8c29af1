//! Rewrite pipeline.
//!
//! Query-level passes run before the plan is built; tree-level passes run on
//! the built plan before emission. Each pass takes its input by value and
//! returns the rewritten value, and passes run in a fixed order:
//!
//! 1. [`TimeRangePass`] resolves relative time ranges to absolute bounds
//! 2. [`RowCapPass`] enforces the configured row cap
//! 3. [`PercentOfTotalPass`] fetches grand totals through the executor
//! 4. [`ComparisonJoinPass`] swaps the exact comparison join for a one-sided one (opt-in)
//! 5. [`NormalizePass`] forces grouping on joined blocks for relaxed-grouping backends
//!
//! A failing pass aborts the pipeline; the error names the pass.

mod comparison_join;
mod normalize;
mod percent_of_total;
mod row_cap;
pub mod time_range;

pub use comparison_join::ComparisonJoinPass;
pub use normalize::NormalizePass;
pub use percent_of_total::PercentOfTotalPass;
pub use row_cap::RowCapPass;
pub use time_range::TimeRangePass;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{CompileError, CompileResult};
use crate::executor::{CancelSignal, Executor, ExecutorError};
use crate::model::{InvalidDuration, MetricsView, Query};
use crate::plan::PlanTree;
use crate::sql::SqlDialect;

/// Names the pass an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewritePass {
    TimeRange,
    RowCap,
    PercentOfTotal,
    ComparisonJoin,
    Normalize,
}

impl std::fmt::Display for RewritePass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RewritePass::TimeRange => "time range",
            RewritePass::RowCap => "row cap",
            RewritePass::PercentOfTotal => "percent of total",
            RewritePass::ComparisonJoin => "comparison join",
            RewritePass::Normalize => "normalize",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error(transparent)]
    InvalidDuration(#[from] InvalidDuration),

    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),

    #[error("limit {limit} exceeds the row cap of {cap}")]
    CapExceeded { limit: i64, cap: u64 },

    #[error("no executor is configured to compute grand totals")]
    MissingExecutor,

    #[error("grand-total sub-query failed: {0}")]
    SubqueryFailed(#[source] ExecutorError),

    #[error("{0}")]
    Cancelled(String),

    #[error("approximate comparisons are not supported by the {dialect} dialect")]
    UnsupportedApproximateComparison { dialect: String },
}

pub type RewriteResult<T> = Result<T, RewriteError>;

/// Everything a pass may read besides its input.
pub struct PassContext<'a> {
    pub view: &'a MetricsView,
    pub dialect: &'a dyn SqlDialect,
    /// Anchor for relative time ranges.
    pub execution_time: DateTime<Utc>,
    /// Configured cap; `None` falls back to the dialect default.
    pub row_cap: Option<u64>,
    pub approximate_comparisons: bool,
    pub executor: Option<&'a dyn Executor>,
    pub cancel: &'a CancelSignal,
    pub subquery_timeout: Duration,
}

/// A pass over the query model.
#[async_trait]
pub trait QueryPass: Send + Sync {
    fn kind(&self) -> RewritePass;

    async fn apply(&self, query: Query, ctx: &PassContext<'_>) -> RewriteResult<Query>;
}

/// A pass over the built plan.
pub trait TreePass: Send + Sync {
    fn kind(&self) -> RewritePass;

    fn apply(&self, tree: PlanTree, query: &Query, ctx: &PassContext<'_>) -> RewriteResult<PlanTree>;
}

/// The ordered pass lists.
pub struct Pipeline {
    query_passes: Vec<Box<dyn QueryPass>>,
    tree_passes: Vec<Box<dyn TreePass>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            query_passes: vec![
                Box::new(TimeRangePass),
                Box::new(RowCapPass),
                Box::new(PercentOfTotalPass),
            ],
            tree_passes: vec![Box::new(ComparisonJoinPass), Box::new(NormalizePass)],
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the query-level passes in order.
    pub async fn rewrite_query(&self, mut query: Query, ctx: &PassContext<'_>) -> CompileResult<Query> {
        for pass in &self.query_passes {
            query = pass
                .apply(query, ctx)
                .await
                .map_err(|e| CompileError::from_pass(pass.kind(), e))?;
        }
        Ok(query)
    }

    /// Run the tree-level passes in order.
    pub fn rewrite_tree(
        &self,
        mut tree: PlanTree,
        query: &Query,
        ctx: &PassContext<'_>,
    ) -> CompileResult<PlanTree> {
        for pass in &self.tree_passes {
            tree = pass
                .apply(tree, query, ctx)
                .map_err(|e| CompileError::from_pass(pass.kind(), e))?;
        }
        Ok(tree)
    }
}
