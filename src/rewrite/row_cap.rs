use async_trait::async_trait;

use super::{PassContext, QueryPass, RewriteError, RewritePass, RewriteResult};
use crate::model::Query;

/// Enforces the row cap.
///
/// With cap `C`, a query without a limit gets `LIMIT C + 1` and records `C`
/// so the caller can detect truncation from the row count; a query whose
/// limit exceeds `C` is rejected. A cap of 0 disables the pass.
pub struct RowCapPass;

#[async_trait]
impl QueryPass for RowCapPass {
    fn kind(&self) -> RewritePass {
        RewritePass::RowCap
    }

    async fn apply(&self, mut query: Query, ctx: &PassContext<'_>) -> RewriteResult<Query> {
        let cap = ctx.row_cap.unwrap_or_else(|| ctx.dialect.default_row_cap());
        if cap == 0 || query.effective_row_cap == Some(cap) {
            tracing::trace!(target: "metricsql::rewrite", cap, "row cap pass skipped");
            return Ok(query);
        }

        match query.limit {
            None => {
                let probe = i64::try_from(cap.saturating_add(1)).unwrap_or(i64::MAX);
                query.limit = Some(probe);
                query.effective_row_cap = Some(cap);
                tracing::debug!(target: "metricsql::rewrite", cap, limit = probe, "applied row cap");
            }
            Some(limit) if u64::try_from(limit).is_ok_and(|l| l > cap) => {
                return Err(RewriteError::CapExceeded { limit, cap });
            }
            Some(_) => {}
        }
        Ok(query)
    }
}
