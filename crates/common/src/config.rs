use serde::{Deserialize, Serialize};

/// Feature flags for the heuristic rewrite passes.
///
/// Recognized option names (pass order is fixed regardless of which are on):
/// - `enable-sum-expression-rewrite`
/// - `enable-count-distinct-rewrite`
/// - `enable-aggregate-push-down`
/// - `enable-sum-cast-double-rewrite`
/// - `enable-filter-reduction`
/// - `enable-enhanced-aggregate-push-down`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RewriteFlags {
    pub sum_expression: bool,
    pub count_distinct: bool,
    pub aggregate_pushdown: bool,
    pub sum_cast_double: bool,
    pub filter_reduction: bool,
    /// Enhanced aggregate push-down retries after a realization-match failure.
    pub enhanced_aggregate_pushdown: bool,
}

impl Default for RewriteFlags {
    fn default() -> Self {
        Self {
            sum_expression: true,
            count_distinct: true,
            aggregate_pushdown: true,
            sum_cast_double: true,
            filter_reduction: true,
            enhanced_aggregate_pushdown: false,
        }
    }
}

impl RewriteFlags {
    /// Parse a `name=true/false` option map entry. Unknown names are ignored
    /// so operator configs can carry options for other engine versions.
    pub fn set_option(&mut self, name: &str, value: bool) {
        match name {
            "enable-sum-expression-rewrite" => self.sum_expression = value,
            "enable-count-distinct-rewrite" => self.count_distinct = value,
            "enable-aggregate-push-down" => self.aggregate_pushdown = value,
            "enable-sum-cast-double-rewrite" => self.sum_cast_double = value,
            "enable-filter-reduction" => self.filter_reduction = value,
            "enable-enhanced-aggregate-push-down" => self.enhanced_aggregate_pushdown = value,
            _ => {}
        }
    }
}

/// Per-execution configuration snapshot. One instance per [`QueryExec`]
/// image; never shared mutably across concurrent queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Answer constant, capability-safe queries on the local evaluator.
    pub run_constant_query_locally: bool,
    /// Produce a plan-only diagnostic report instead of executing.
    pub dry_run_enabled: bool,
    /// Allow the heuristic rewriter to emit `[transformed, original]`.
    pub allow_alternative_plans: bool,
    /// Fixpoint bound for the cost-based optimizer driver.
    pub max_optimizer_passes: usize,
    pub rewrites: RewriteFlags,
    /// Substring patterns of recoverable backend faults that permit one
    /// whole-query retry on the backup read backend.
    pub backend_fault_allow_list: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_constant_query_locally: true,
            dry_run_enabled: false,
            allow_alternative_plans: true,
            max_optimizer_passes: 16,
            rewrites: RewriteFlags::default(),
            backend_fault_allow_list: Vec::new(),
        }
    }
}
