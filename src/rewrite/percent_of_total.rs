use std::collections::HashMap;

use async_trait::async_trait;

use super::{PassContext, QueryPass, RewriteError, RewritePass, RewriteResult};
use crate::model::{Measure, MeasureCompute, Query};

/// Fetches grand totals for percent-of-total measures.
///
/// For each distinct base measure, the executor runs the measure with no
/// dimensions over the same time range and where clause. The total is stored
/// on the measure and later bound as an argument. The call races the
/// caller's cancel signal and the configured timeout; either one aborts the
/// compilation.
pub struct PercentOfTotalPass;

#[async_trait]
impl QueryPass for PercentOfTotalPass {
    fn kind(&self) -> RewritePass {
        RewritePass::PercentOfTotal
    }

    async fn apply(&self, mut query: Query, ctx: &PassContext<'_>) -> RewriteResult<Query> {
        let mut pending: Vec<String> = Vec::new();
        for m in &query.measures {
            if let Some(MeasureCompute::PercentOfTotal {
                measure,
                total: None,
            }) = &m.compute
            {
                if !pending.contains(measure) {
                    pending.push(measure.clone());
                }
            }
        }
        if pending.is_empty() {
            tracing::trace!(target: "metricsql::rewrite", "percent of total pass skipped");
            return Ok(query);
        }

        let executor = ctx.executor.ok_or(RewriteError::MissingExecutor)?;
        let mut totals: HashMap<String, f64> = HashMap::new();
        for measure in pending {
            let scalar = Query {
                metrics_view: query.metrics_view.clone(),
                measures: vec![Measure::new(&measure)],
                filter: query.filter.clone(),
                time_range: query.time_range.clone(),
                time_zone: query.time_zone.clone(),
                ..Default::default()
            };

            let total = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    return Err(RewriteError::Cancelled(format!(
                        "cancelled while computing the total of '{measure}'"
                    )));
                }
                result = tokio::time::timeout(ctx.subquery_timeout, executor.query_scalar(scalar, ctx.cancel)) => {
                    match result {
                        Err(_) => {
                            return Err(RewriteError::Cancelled(format!(
                                "total of '{measure}' timed out after {:?}",
                                ctx.subquery_timeout
                            )));
                        }
                        Ok(Err(e)) => return Err(RewriteError::SubqueryFailed(e)),
                        Ok(Ok(value)) => value.unwrap_or(0.0),
                    }
                }
            };
            if !total.is_finite() {
                return Err(RewriteError::SubqueryFailed(
                    format!("total of '{measure}' is not a finite number: {total}").into(),
                ));
            }

            tracing::debug!(target: "metricsql::rewrite", measure = %measure, total, "captured grand total");
            totals.insert(measure, total);
        }

        for m in &mut query.measures {
            if let Some(MeasureCompute::PercentOfTotal { measure, total }) = &mut m.compute {
                if total.is_none() {
                    *total = totals.get(measure.as_str()).copied();
                }
            }
        }
        Ok(query)
    }
}
