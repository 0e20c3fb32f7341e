use std::sync::Arc;

use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};

/// Process metrics for the query-execution core.
///
/// Cheap to clone; all handles share one registry.
#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    queries_total: CounterVec,
    pushdown_retries_total: CounterVec,
    backend_switches_total: CounterVec,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    /// Count one finished query. `engine` is `local`/`distributed`/`none`,
    /// `outcome` is `ok`/`error`/`dry_run`.
    pub fn record_query(&self, project: &str, engine: &str, outcome: &str) {
        self.inner
            .queries_total
            .with_label_values(&[project, engine, outcome])
            .inc();
    }

    /// Count one enhanced aggregate push-down retry attempt.
    pub fn record_pushdown_retry(&self, project: &str) {
        self.inner
            .pushdown_retries_total
            .with_label_values(&[project])
            .inc();
    }

    /// Count one whole-query retry after a read-backend switch.
    pub fn record_backend_switch(&self, project: &str) {
        self.inner
            .backend_switches_total
            .with_label_values(&[project])
            .inc();
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn prometheus_text(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&metric_families, &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();
        let queries_total = CounterVec::new(
            Opts::new("qx_queries_total", "Finished queries by engine and outcome"),
            &["project", "engine", "outcome"],
        )
        .expect("metric opts");
        let pushdown_retries_total = CounterVec::new(
            Opts::new(
                "qx_pushdown_retries_total",
                "Enhanced aggregate push-down retry attempts",
            ),
            &["project"],
        )
        .expect("metric opts");
        let backend_switches_total = CounterVec::new(
            Opts::new(
                "qx_backend_switches_total",
                "Whole-query retries after a read-backend switch",
            ),
            &["project"],
        )
        .expect("metric opts");

        registry
            .register(Box::new(queries_total.clone()))
            .expect("register queries_total");
        registry
            .register(Box::new(pushdown_retries_total.clone()))
            .expect("register pushdown_retries_total");
        registry
            .register(Box::new(backend_switches_total.clone()))
            .expect("register backend_switches_total");

        Self {
            registry,
            queries_total,
            pushdown_retries_total,
            backend_switches_total,
        }
    }
}
