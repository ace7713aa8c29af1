use super::{PassContext, RewritePass, RewriteResult, TreePass};
use crate::model::Query;
use crate::plan::PlanTree;

/// Forces explicit grouping on blocks that join children.
///
/// Backends with relaxed grouping rules (Druid) reject a joined block whose
/// measures are neither grouped nor aggregated. Such blocks group by their
/// dimensions and wrap every measure in the dialect's any-value aggregate.
/// Other dialects are left untouched.
pub struct NormalizePass;

impl TreePass for NormalizePass {
    fn kind(&self) -> RewritePass {
        RewritePass::Normalize
    }

    fn apply(&self, mut tree: PlanTree, _query: &Query, ctx: &PassContext<'_>) -> RewriteResult<PlanTree> {
        if !ctx.dialect.requires_aggregate_normalization() {
            return Ok(tree);
        }

        for block in tree.blocks_mut() {
            if block.normalized || block.joins.is_empty() {
                continue;
            }
            block.group_by = true;
            for m in &mut block.measures {
                m.expr = ctx.dialect.any_value(&m.expr);
            }
            block.normalized = true;
            tracing::debug!(target: "metricsql::rewrite", block = %block.alias, "normalized joined block");
        }
        Ok(tree)
    }
}
