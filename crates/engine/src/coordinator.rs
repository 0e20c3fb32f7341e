//! Bounded retry protocol over the plan alternative list.
//!
//! Two axes of state: which alternative is being tried, and how many
//! enhanced aggregate push-down retries have been applied to the current
//! alternative. The push-down chain is an explicit loop carrying
//! `(try_times, plan)` with a single visible termination guard; every retry
//! boundary is also a mandatory cancellation checkpoint.

use std::sync::Arc;

use tracing::{debug, info};

use qx_common::{MetricsRegistry, QxError, Result};
use qx_planner::rewrite::aggregate_pushdown;
use qx_planner::RelRef;

use crate::context::QueryContext;
use crate::exec::{ExecuteResult, PlanExec};

/// Upper bound on enhanced push-down retries per alternative.
pub const MAX_TRY_TIMES_OPTIMIZED: usize = 10;

/// Drives execution of the alternative list on the distributed evaluator.
pub struct RetryCoordinator {
    distributed: Arc<dyn PlanExec>,
    metrics: MetricsRegistry,
}

impl RetryCoordinator {
    pub fn new(distributed: Arc<dyn PlanExec>, metrics: MetricsRegistry) -> Self {
        Self {
            distributed,
            metrics,
        }
    }

    /// Attempt alternatives strictly in order; first success wins. On a
    /// realization-match failure the enhanced push-down chain runs before
    /// advancing. On an `Unsupported` failure the coordinator advances when
    /// another alternative remains, else rethrows unchanged. Any other
    /// failure is terminal.
    pub fn execute_alternatives(
        &self,
        alternatives: &[RelRef],
        ctx: &mut QueryContext,
    ) -> Result<ExecuteResult> {
        let total = alternatives.len();
        let mut last_err = QxError::Execution("no plan alternatives produced".to_string());

        for (i, alt) in alternatives.iter().enumerate() {
            ctx.check_cancelled()?;
            ctx.clear_match_state();
            ctx.last_used_plan = Some(alt.digest());

            match self.distributed.execute_to_iterable(alt, ctx) {
                Ok(result) => return Ok(result),
                Err(QxError::NoRealizationFound(msg)) => {
                    debug!(alternative = i, "no realization matched: {msg}");
                    if let Some(result) = self.enhance_and_retry(alt, ctx)? {
                        return Ok(result);
                    }
                    last_err = QxError::NoRealizationFound(msg);
                }
                Err(QxError::Unsupported(msg)) if i + 1 < total => {
                    info!(
                        alternative = i,
                        "evaluator cannot run this plan, advancing to the next alternative: {msg}"
                    );
                    last_err = QxError::Unsupported(msg);
                }
                Err(other) => return Err(other),
            }
        }

        ctx.last_error = Some(last_err.to_string());
        Err(last_err)
    }

    /// Enhanced aggregate push-down chain for one alternative.
    ///
    /// Loop state is `(try_times, plan)`; the guards are the whole
    /// termination condition: no unmatched join digests, the try bound, or
    /// (after the first retry) a disarmed push-down flag. Each retry clears
    /// match state and the digest set and disarms the flag; the distributed
    /// evaluator re-arms it on its next match failure.
    ///
    /// `Ok(None)` means the chain gave up and the caller should fall back to
    /// the next alternative with the original error.
    fn enhance_and_retry(
        &self,
        plan: &RelRef,
        ctx: &mut QueryContext,
    ) -> Result<Option<ExecuteResult>> {
        let mut try_times = 1usize;
        let mut plan = Arc::clone(plan);

        loop {
            ctx.check_cancelled()?;
            if ctx.unmatched_join_digests.is_empty() || try_times > MAX_TRY_TIMES_OPTIMIZED {
                return Ok(None);
            }
            if try_times > 1 && !ctx.enhanced_agg_pushdown {
                return Ok(None);
            }

            ctx.clear_match_state();
            ctx.unmatched_join_digests.clear();
            ctx.enhanced_agg_pushdown = false;
            plan = aggregate_pushdown(&plan);
            ctx.last_used_plan = Some(plan.digest());
            self.metrics.record_pushdown_retry(&ctx.project);
            debug!(try_times, "retrying with enhanced aggregate push-down");

            match self.distributed.execute_to_iterable(&plan, ctx) {
                Ok(result) => return Ok(Some(result)),
                Err(QxError::NoRealizationFound(msg)) => {
                    debug!(try_times, "push-down retry still unmatched: {msg}");
                    try_times += 1;
                }
                Err(cancelled @ QxError::Cancelled(_)) => return Err(cancelled),
                Err(other) => {
                    ctx.check_cancelled()?;
                    ctx.last_error = Some(other.to_string());
                    return Ok(None);
                }
            }
        }
    }
}
