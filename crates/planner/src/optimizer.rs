//! Cost-based optimizer driver.
//!
//! The driver owns the search only: leaves-up cost propagation through a
//! pluggable [`CostModel`] and rule firing until a fixpoint or the pass
//! bound. Correctness of individual rewrites is the rule set's business;
//! rule errors propagate, they are never swallowed, and there is no retry
//! at this level.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use qx_common::Result;

use crate::relplan::{RelNode, RelRef};

/// Leaves-up cost estimation for one operator given its input costs.
pub trait CostModel: Send + Sync {
    fn node_cost(&self, node: &RelNode, input_costs: &[f64]) -> f64;
}

/// Default model: coarse per-operator weights, deterministic for a fixed
/// plan shape. Scans dominate; everything else is bookkeeping on top.
#[derive(Debug, Default)]
pub struct DefaultCostModel;

impl CostModel for DefaultCostModel {
    fn node_cost(&self, node: &RelNode, input_costs: &[f64]) -> f64 {
        let inputs: f64 = input_costs.iter().sum();
        let own = match node {
            RelNode::TableScan { .. } => 1000.0,
            RelNode::Values { rows, .. } => rows.len() as f64,
            RelNode::Project { exprs, .. } => 1.0 + exprs.len() as f64 * 0.1,
            RelNode::Filter { .. } => 1.0,
            RelNode::Aggregate { agg_calls, .. } => 10.0 + agg_calls.len() as f64,
            RelNode::Join { .. } => 100.0,
            RelNode::Limit { .. } => 0.1,
        };
        inputs + own
    }
}

/// Total plan cost, propagated leaves-up.
pub fn plan_cost(model: &dyn CostModel, node: &RelNode) -> f64 {
    let input_costs: Vec<f64> = node
        .inputs()
        .iter()
        .map(|i| plan_cost(model, i))
        .collect();
    model.node_cost(node, &input_costs)
}

/// A cost-based rewrite rule: returns an equivalent plan or `None` when it
/// does not apply. The driver keeps the rewrite only when it is cheaper.
pub trait CostRule: Send + Sync {
    /// Stable rule name used by the registry.
    fn name(&self) -> &str;
    fn rewrite(&self, plan: &RelRef) -> Result<Option<RelRef>>;
}

/// Rule-driven plan search. Deterministic for a fixed rule set and cost
/// model: rules fire in name order, passes repeat until no rule improves
/// the plan or `max_passes` is reached.
pub struct CostOptimizer {
    rules: RwLock<HashMap<String, Arc<dyn CostRule>>>,
    model: Arc<dyn CostModel>,
    max_passes: usize,
}

impl std::fmt::Debug for CostOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.rules.read().map(|m| m.len()).unwrap_or_default();
        f.debug_struct("CostOptimizer")
            .field("rules", &count)
            .field("max_passes", &self.max_passes)
            .finish()
    }
}

impl CostOptimizer {
    /// Optimizer with the built-in rule set.
    pub fn new(max_passes: usize) -> Self {
        let opt = Self::empty(Arc::new(DefaultCostModel), max_passes);
        opt.register_rule(Arc::new(FilterMergeRule));
        opt.register_rule(Arc::new(ProjectMergeRule));
        opt
    }

    /// Optimizer with no rules and a custom cost model.
    pub fn empty(model: Arc<dyn CostModel>, max_passes: usize) -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            model,
            max_passes,
        }
    }

    /// Register or replace a rule. Returns `true` when an existing rule
    /// with the same name was replaced.
    pub fn register_rule(&self, rule: Arc<dyn CostRule>) -> bool {
        self.rules
            .write()
            .expect("optimizer rule lock poisoned")
            .insert(rule.name().to_string(), rule)
            .is_some()
    }

    /// Deregister a rule by name. Returns `true` when a rule was removed.
    pub fn deregister_rule(&self, name: &str) -> bool {
        self.rules
            .write()
            .expect("optimizer rule lock poisoned")
            .remove(name)
            .is_some()
    }

    pub fn optimize(&self, plan: RelRef) -> Result<RelRef> {
        let mut rules = self
            .rules
            .read()
            .expect("optimizer rule lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect::<Vec<_>>();
        rules.sort_by(|a, b| a.0.cmp(&b.0));

        let mut best = plan;
        let mut best_cost = plan_cost(self.model.as_ref(), &best);
        for pass in 0..self.max_passes {
            let mut improved = false;
            for (name, rule) in &rules {
                if let Some(candidate) = rule.rewrite(&best)? {
                    let cost = plan_cost(self.model.as_ref(), &candidate);
                    if cost < best_cost {
                        debug!(rule = %name, pass, old = best_cost, new = cost, "rule improved plan");
                        best = candidate;
                        best_cost = cost;
                        improved = true;
                    }
                }
            }
            if !improved {
                break;
            }
        }
        Ok(best)
    }
}

// -----------------------------
// Built-in rules
// -----------------------------

/// Filter(Filter(x)) => Filter(x) with a merged predicate.
pub struct FilterMergeRule;

impl CostRule for FilterMergeRule {
    fn name(&self) -> &str {
        "filter_merge"
    }

    fn rewrite(&self, plan: &RelRef) -> Result<Option<RelRef>> {
        let out = merge_filters(plan);
        Ok(if out != *plan { Some(out) } else { None })
    }
}

fn merge_filters(plan: &RelRef) -> RelRef {
    use crate::relplan::ScalarExpr;
    match plan.as_ref() {
        RelNode::Filter { predicate, input } => {
            let input = merge_filters(input);
            if let RelNode::Filter {
                predicate: inner_pred,
                input: inner_input,
            } = input.as_ref()
            {
                Arc::new(RelNode::Filter {
                    predicate: ScalarExpr::And(
                        Box::new(inner_pred.clone()),
                        Box::new(predicate.clone()),
                    ),
                    input: Arc::clone(inner_input),
                })
            } else {
                Arc::new(RelNode::Filter {
                    predicate: predicate.clone(),
                    input,
                })
            }
        }
        _ => map_inputs(plan, merge_filters),
    }
}

/// Project(Project(x)) => Project(x) when the outer projection is a pure
/// column selection over the inner one.
pub struct ProjectMergeRule;

impl CostRule for ProjectMergeRule {
    fn name(&self) -> &str {
        "project_merge"
    }

    fn rewrite(&self, plan: &RelRef) -> Result<Option<RelRef>> {
        let out = merge_projects(plan);
        Ok(if out != *plan { Some(out) } else { None })
    }
}

fn merge_projects(plan: &RelRef) -> RelRef {
    use crate::relplan::ScalarExpr;
    match plan.as_ref() {
        RelNode::Project { exprs, input } => {
            let input = merge_projects(input);
            if let RelNode::Project {
                exprs: inner_exprs,
                input: inner_input,
            } = input.as_ref()
            {
                let mut merged = Vec::with_capacity(exprs.len());
                for (e, name) in exprs {
                    match e {
                        ScalarExpr::Column(c) => {
                            match inner_exprs.iter().find(|(_, n)| n == c) {
                                Some((inner_e, _)) => merged.push((inner_e.clone(), name.clone())),
                                None => {
                                    return Arc::new(RelNode::Project {
                                        exprs: exprs.clone(),
                                        input,
                                    })
                                }
                            }
                        }
                        _ => {
                            return Arc::new(RelNode::Project {
                                exprs: exprs.clone(),
                                input,
                            })
                        }
                    }
                }
                return Arc::new(RelNode::Project {
                    exprs: merged,
                    input: Arc::clone(inner_input),
                });
            }
            Arc::new(RelNode::Project {
                exprs: exprs.clone(),
                input,
            })
        }
        _ => map_inputs(plan, merge_projects),
    }
}

/// Rebuild a node with each input mapped through `f`, reusing the original
/// allocation when nothing changed.
pub(crate) fn map_inputs(plan: &RelRef, f: impl Fn(&RelRef) -> RelRef + Copy) -> RelRef {
    let rebuilt = match plan.as_ref() {
        RelNode::TableScan { .. } | RelNode::Values { .. } => return Arc::clone(plan),
        RelNode::Project { exprs, input } => RelNode::Project {
            exprs: exprs.clone(),
            input: f(input),
        },
        RelNode::Filter { predicate, input } => RelNode::Filter {
            predicate: predicate.clone(),
            input: f(input),
        },
        RelNode::Aggregate {
            group_exprs,
            agg_calls,
            input,
        } => RelNode::Aggregate {
            group_exprs: group_exprs.clone(),
            agg_calls: agg_calls.clone(),
            input: f(input),
        },
        RelNode::Join {
            left,
            right,
            on,
            join_type,
        } => RelNode::Join {
            left: f(left),
            right: f(right),
            on: on.clone(),
            join_type: *join_type,
        },
        RelNode::Limit { n, input } => RelNode::Limit {
            n: *n,
            input: f(input),
        },
    };
    if rebuilt == **plan {
        Arc::clone(plan)
    } else {
        Arc::new(rebuilt)
    }
}
