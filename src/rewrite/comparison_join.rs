use super::{PassContext, RewriteError, RewritePass, RewriteResult, TreePass};
use crate::model::{MeasureCompute, Query};
use crate::plan::{JoinKind, PlanTree};
use crate::sql::TokenStream;

/// Replaces the exact full join between comparison periods with a one-sided
/// join anchored on the period the primary sort reads.
///
/// Rows present only in the other period are dropped; rows of the sorted-by
/// period never are. Only runs when approximate comparisons are enabled.
pub struct ComparisonJoinPass;

/// Which period keeps all its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Base,
    Comparison,
}

impl TreePass for ComparisonJoinPass {
    fn kind(&self) -> RewritePass {
        RewritePass::ComparisonJoin
    }

    fn apply(&self, mut tree: PlanTree, query: &Query, ctx: &PassContext<'_>) -> RewriteResult<PlanTree> {
        let Some(periods) = tree.comparison.clone() else {
            return Ok(tree);
        };
        if !ctx.approximate_comparisons {
            tracing::trace!(target: "metricsql::rewrite", "approximate comparisons disabled");
            return Ok(tree);
        }
        if !ctx.dialect.supports_approximate_comparisons() {
            return Err(RewriteError::UnsupportedApproximateComparison {
                dialect: ctx.dialect.name().to_string(),
            });
        }

        let Some(sort) = query.sort.first() else {
            tracing::trace!(target: "metricsql::rewrite", "comparison join kept: no sort");
            return Ok(tree);
        };
        if !sort.desc && !ctx.dialect.supports_nulls_ordering() {
            tracing::trace!(
                target: "metricsql::rewrite",
                "comparison join kept: ascending sort without NULLS LAST"
            );
            return Ok(tree);
        }

        let anchor = if query.dimension_by_output(&sort.name).is_some() {
            Some(Anchor::Base)
        } else {
            match query.measure_by_name(&sort.name).map(|m| &m.compute) {
                Some(Some(MeasureCompute::ComparisonValue { .. })) => Some(Anchor::Comparison),
                Some(Some(MeasureCompute::ComparisonDelta { .. }))
                | Some(Some(MeasureCompute::ComparisonRatio { .. })) => None,
                _ => Some(Anchor::Base),
            }
        };
        let Some(anchor) = anchor else {
            tracing::trace!(target: "metricsql::rewrite", sort = %sort.name, "comparison join kept: sort reads both periods");
            return Ok(tree);
        };

        let (kind, anchor_alias) = match anchor {
            Anchor::Base => (JoinKind::Left, periods.base.as_str()),
            Anchor::Comparison => (JoinKind::Right, periods.comparison.as_str()),
        };

        let rewritten = match tree.root_mut() {
            Ok(root) => match root
                .joins
                .iter_mut()
                .find(|j| j.block == periods.comparison && j.kind == JoinKind::Full)
            {
                Some(join) => {
                    join.kind = kind;
                    for dim in &mut root.dimensions {
                        dim.expr = TokenStream::qualified(anchor_alias, &dim.name);
                    }
                    true
                }
                None => false,
            },
            Err(_) => false,
        };
        if rewritten {
            tracing::debug!(target: "metricsql::rewrite", join = %kind, sort = %sort.name, "approximated comparison join");
        }
        Ok(tree)
    }
}
