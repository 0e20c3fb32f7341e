//! Per-invocation query execution state.
//!
//! One [`QueryContext`] exists per `execute_query` call and is threaded
//! `&mut` through every stage. It is never shared across concurrent queries
//! and is dropped on every exit path, so no stale state survives a query.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use qx_common::{QueryId, QxError, Result};

use crate::router::EngineKind;

/// Cooperative cancellation flag shared between the caller and the retry
/// coordinator. Cheap to clone; all clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Ordered record of named pipeline phases with wall-clock durations.
/// Starting a span closes the previous one; at most one span is open.
#[derive(Debug, Default)]
pub struct QueryTrace {
    spans: Vec<(String, Duration)>,
    open: Option<(String, Instant)>,
}

impl QueryTrace {
    pub fn start_span(&mut self, name: &str) {
        self.end_span();
        self.open = Some((name.to_string(), Instant::now()));
    }

    pub fn end_span(&mut self) {
        if let Some((name, started)) = self.open.take() {
            self.spans.push((name, started.elapsed()));
        }
    }

    pub fn spans(&self) -> &[(String, Duration)] {
        &self.spans
    }
}

/// Physical realization matched to one sub-plan region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Realization {
    pub model: String,
    pub index_type: String,
    pub layout_id: i64,
}

/// Match outcome for one logically distinct sub-query region, recorded by
/// the distributed evaluator during plan analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubPlanMatch {
    pub id: usize,
    /// `None` means the region went unmatched.
    pub realization: Option<Realization>,
    /// User-facing hint shown for unmatched regions.
    pub hint: String,
}

/// Mutable state for one query invocation.
#[derive(Debug)]
pub struct QueryContext {
    pub query_id: QueryId,
    pub project: String,
    pub sql: String,

    // mode flags
    pub dry_run: bool,
    pub async_query: bool,
    pub constant_query: bool,
    /// Single-shot arm of the enhanced aggregate push-down retry chain.
    /// Disarmed when a retry is entered; re-armed only by the distributed
    /// evaluator on its next realization-match failure.
    pub enhanced_agg_pushdown: bool,

    /// Digests of join sub-plans that went unmatched on the last attempt.
    pub unmatched_join_digests: HashSet<String>,
    pub column_names: Vec<String>,
    /// Which engine the primary alternative was routed to, once decided.
    pub engine: Option<EngineKind>,

    // diagnostic pointers
    pub last_used_plan: Option<String>,
    pub last_error: Option<String>,
    pub match_contexts: Vec<SubPlanMatch>,

    pub context_vars: BTreeMap<String, String>,
    pub trace: QueryTrace,
    cancel: CancelFlag,
}

impl QueryContext {
    pub fn new(project: impl Into<String>, sql: impl Into<String>, cancel: CancelFlag) -> Self {
        Self {
            query_id: QueryId::next(),
            project: project.into(),
            sql: sql.into(),
            dry_run: false,
            async_query: false,
            constant_query: false,
            enhanced_agg_pushdown: false,
            unmatched_join_digests: HashSet::new(),
            column_names: Vec::new(),
            engine: None,
            last_used_plan: None,
            last_error: None,
            match_contexts: Vec::new(),
            context_vars: BTreeMap::new(),
            trace: QueryTrace::default(),
            cancel,
        }
    }

    /// Drop all sub-plan match state. Called before every execution attempt
    /// so one attempt never sees the previous attempt's match results.
    pub fn clear_match_state(&mut self) {
        self.match_contexts.clear();
    }

    /// Mandatory cancellation checkpoint at retry boundaries.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(QxError::Cancelled(format!("query {}", self.query_id)));
        }
        Ok(())
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}
