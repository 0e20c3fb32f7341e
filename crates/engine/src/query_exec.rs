//! Query execution entry point.
//!
//! Pipeline: parse → cost optimize → zero-output-column short-circuit →
//! heuristic rewrite alternatives → route the primary alternative →
//! local evaluator or retry coordinator → result. A failure classified as a
//! recoverable backend fault flips the process-wide read-backend switch and
//! re-runs the whole pipeline exactly once.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use qx_common::{
    switch_on_allowed_fault, EngineConfig, MetricsRegistry, QxError, Result,
};
use qx_planner::{explain_rel, post_optimize, sql_frontend, CatalogReader, CostOptimizer, Literal};

use crate::context::{CancelFlag, QueryContext};
use crate::coordinator::RetryCoordinator;
use crate::diagnostics::{build_report, wrap_error};
use crate::exec::{AsyncResultSink, ColumnMeta, ExecuteResult, PlanExec};
use crate::local::LocalPlanExec;
use crate::router::{self, EngineKind};

/// Per-call options: positional parameters, named context variables and the
/// asynchronous-query tag.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub params: Vec<Literal>,
    pub context_vars: BTreeMap<String, String>,
    pub async_query: bool,
}

/// Outcome of one query: rows, or the plan-only diagnostic report produced
/// by dry-run mode.
#[derive(Debug)]
pub enum QueryOutcome {
    Rows(ExecuteResult),
    DryRun(String),
}

impl QueryOutcome {
    /// Unwrap the row result; dry-run outcomes are an execution error here.
    pub fn into_rows(self) -> Result<ExecuteResult> {
        match self {
            QueryOutcome::Rows(r) => Ok(r),
            QueryOutcome::DryRun(report) => Err(QxError::Execution(report)),
        }
    }
}

/// One query-execution image: per-project configuration, its own catalog
/// reader and optimizer instance, and the two evaluators. Not shared
/// mutably across concurrent queries.
pub struct QueryExec {
    project: String,
    config: EngineConfig,
    catalog: Arc<dyn CatalogReader>,
    optimizer: CostOptimizer,
    local: Arc<dyn PlanExec>,
    distributed: Arc<dyn PlanExec>,
    sink: Option<Arc<dyn AsyncResultSink>>,
    metrics: MetricsRegistry,
    cancel: CancelFlag,
}

impl QueryExec {
    pub fn new(
        project: impl Into<String>,
        config: EngineConfig,
        catalog: Arc<dyn CatalogReader>,
        distributed: Arc<dyn PlanExec>,
    ) -> Self {
        let optimizer = CostOptimizer::new(config.max_optimizer_passes);
        Self {
            project: project.into(),
            config,
            catalog,
            optimizer,
            local: Arc::new(LocalPlanExec),
            distributed,
            sink: None,
            metrics: MetricsRegistry::new(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AsyncResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Cooperative cancellation handle for this image's queries.
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn execute_query(&self, sql: &str) -> Result<QueryOutcome> {
        self.execute_query_with(sql, QueryOptions::default())
    }

    pub fn execute_query_with(&self, sql: &str, opts: QueryOptions) -> Result<QueryOutcome> {
        let mut ctx = self.new_context(sql, &opts);
        match self.run_once(&mut ctx, &opts.params) {
            Ok(result) => Ok(self.finish(&ctx, result)),
            Err(QxError::DryRunComplete(plan_text)) => {
                self.metrics
                    .record_query(&self.project, engine_label(&ctx), "dry_run");
                Ok(QueryOutcome::DryRun(build_report(
                    &ctx,
                    "none (dry run completed)",
                    Some(&plan_text),
                )))
            }
            Err(err) if switch_on_allowed_fault(&err, &self.config.backend_fault_allow_list) => {
                // one whole-query retry on the backup read backend; a second
                // recoverable fault in the same invocation is terminal
                self.metrics.record_backend_switch(&self.project);
                warn!("re-running query on the backup read backend after: {err}");
                let mut retry_ctx = self.new_context(sql, &opts);
                match self.run_once(&mut retry_ctx, &opts.params) {
                    Ok(result) => Ok(self.finish(&retry_ctx, result)),
                    Err(QxError::DryRunComplete(plan_text)) => {
                        self.metrics
                            .record_query(&self.project, engine_label(&retry_ctx), "dry_run");
                        Ok(QueryOutcome::DryRun(build_report(
                            &retry_ctx,
                            "none (dry run completed)",
                            Some(&plan_text),
                        )))
                    }
                    Err(retry_err) => {
                        self.metrics
                            .record_query(&self.project, engine_label(&retry_ctx), "error");
                        Err(wrap_error(&retry_ctx, retry_err))
                    }
                }
            }
            Err(err) => {
                self.metrics
                    .record_query(&self.project, engine_label(&ctx), "error");
                Err(wrap_error(&ctx, err))
            }
        }
    }

    /// Validated output column metadata for a statement, without executing.
    pub fn get_column_metadata(&self, sql: &str) -> Result<Vec<ColumnMeta>> {
        let (_, row_type) = sql_frontend::parse(sql, &[], self.catalog.as_ref())?;
        Ok(ColumnMeta::from_row_type(&row_type))
    }

    fn new_context(&self, sql: &str, opts: &QueryOptions) -> QueryContext {
        let mut ctx = QueryContext::new(self.project.clone(), sql, self.cancel.clone());
        ctx.dry_run = self.config.dry_run_enabled
            || opts.context_vars.get("dry-run").map(String::as_str) == Some("true");
        ctx.async_query = opts.async_query;
        ctx.enhanced_agg_pushdown = self.config.rewrites.enhanced_aggregate_pushdown;
        ctx.context_vars = opts.context_vars.clone();
        ctx
    }

    fn run_once(&self, ctx: &mut QueryContext, params: &[Literal]) -> Result<ExecuteResult> {
        ctx.check_cancelled()?;
        ctx.trace.start_span("sql_parse");
        let (plan, row_type) = sql_frontend::parse(&ctx.sql, params, self.catalog.as_ref())?;

        // a fully masked (e.g. ACL-filtered) statement has nothing to route
        // or execute
        if row_type.is_empty() {
            debug!(query_id = %ctx.query_id, "zero output columns, returning empty result");
            self.metrics.record_query(&self.project, "none", "ok");
            return Ok(ExecuteResult::empty(vec![]));
        }
        ctx.column_names = row_type.column_names();

        ctx.trace.start_span("plan_optimization");
        let plan = self.optimizer.optimize(plan)?;
        let alternatives = post_optimize(
            &plan,
            &self.config.rewrites,
            self.config.allow_alternative_plans,
        );
        let primary = &alternatives[0];

        let engine = router::route(primary);
        ctx.engine = Some(engine);
        debug!(query_id = %ctx.query_id, ?engine, alternatives = alternatives.len(), "routed");

        // the pipeline stops here on dry run; evaluators are never invoked
        if ctx.dry_run {
            ctx.last_used_plan = Some(primary.digest());
            return Err(QxError::DryRunComplete(explain_rel(primary)));
        }

        ctx.trace.start_span("execution");
        let result = match engine {
            EngineKind::Local if !ctx.async_query && self.config.run_constant_query_locally => {
                ctx.constant_query = true;
                ctx.last_used_plan = Some(primary.digest());
                self.local.execute_to_iterable(primary, ctx)?
            }
            _ => {
                let coordinator =
                    RetryCoordinator::new(Arc::clone(&self.distributed), self.metrics.clone());
                coordinator.execute_alternatives(&alternatives, ctx)?
            }
        };
        ctx.trace.end_span();
        self.metrics.record_query(&self.project, engine_label(ctx), "ok");
        Ok(result)
    }

    /// On success, asynchronous queries hand their row source to the sink
    /// and return metadata only. A sink failure is logged, never surfaced.
    fn finish(&self, ctx: &QueryContext, result: ExecuteResult) -> QueryOutcome {
        if !ctx.async_query {
            return QueryOutcome::Rows(result);
        }
        let Some(sink) = &self.sink else {
            return QueryOutcome::Rows(result);
        };
        let columns = result.columns.clone();
        if let Err(e) = sink.persist(result, ctx) {
            warn!(query_id = %ctx.query_id, "async result sink failed: {e}");
        }
        QueryOutcome::Rows(ExecuteResult::empty(columns))
    }
}

fn engine_label(ctx: &QueryContext) -> &'static str {
    match ctx.engine {
        Some(EngineKind::Local) => "local",
        Some(EngineKind::Distributed) => "distributed",
        None => "none",
    }
}
