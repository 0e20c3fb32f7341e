//! Engine routing: classify a candidate plan as answerable by the local
//! constant-query evaluator or as requiring the distributed evaluator.

use qx_planner::{RelNode, ScalarExpr};

/// Which evaluator a plan is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Local,
    Distributed,
}

/// Scalar functions the local evaluator can interpret.
const LOCAL_SCALAR_FNS: &[&str] = &["UPPER", "LOWER", "LENGTH", "ABS", "CONCAT", "TRIM"];

/// Aggregate functions the local evaluator can compute. The bitmap-build
/// family is the known gap.
const LOCAL_AGG_FNS: &[&str] = &["COUNT", "COUNT_DISTINCT", "SUM", "MIN", "MAX", "AVG"];

/// Route a candidate plan. `Local` iff the plan touches no stored data and
/// contains nothing the local evaluator cannot run.
pub fn route(plan: &RelNode) -> EngineKind {
    if is_constant_query(plan) && is_local_capable(plan) {
        EngineKind::Local
    } else {
        EngineKind::Distributed
    }
}

/// True iff no node in the tree is a data scan. A single scan anywhere
/// forces the distributed evaluator.
pub fn is_constant_query(plan: &RelNode) -> bool {
    !plan.contains_scan()
}

/// Recursive capability probe over every node of the tree.
pub fn is_local_capable(plan: &RelNode) -> bool {
    let here = match plan {
        RelNode::Project { exprs, .. } => exprs.iter().all(|(e, _)| expr_supported(e)),
        RelNode::Aggregate {
            agg_calls, input, ..
        } => {
            let funcs_ok = agg_calls
                .iter()
                .all(|c| LOCAL_AGG_FNS.contains(&c.func.as_str()));
            // distinct aggregation directly over literal values is a known
            // local-evaluator gap
            let distinct_over_values = matches!(input.as_ref(), RelNode::Values { .. })
                && agg_calls
                    .iter()
                    .any(|c| c.distinct || c.func == "COUNT_DISTINCT");
            funcs_ok && !distinct_over_values
        }
        RelNode::TableScan { .. }
        | RelNode::Values { .. }
        | RelNode::Filter { .. }
        | RelNode::Join { .. }
        | RelNode::Limit { .. } => true,
    };
    here && plan.inputs().iter().all(|i| is_local_capable(i))
}

fn expr_supported(e: &ScalarExpr) -> bool {
    match e {
        ScalarExpr::Column(_) | ScalarExpr::Literal(_) => true,
        ScalarExpr::BinaryOp { left, right, .. } => expr_supported(left) && expr_supported(right),
        ScalarExpr::And(a, b) | ScalarExpr::Or(a, b) => expr_supported(a) && expr_supported(b),
        ScalarExpr::Not(x) => expr_supported(x),
        ScalarExpr::Cast { expr, .. } => expr_supported(expr),
        ScalarExpr::ScalarFn { name, args } => {
            LOCAL_SCALAR_FNS.contains(&name.as_str()) && args.iter().all(expr_supported)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::DataType;
    use qx_planner::{AggCall, ColumnField, Literal, RelRef, RowType};
    use std::sync::Arc;

    fn one_row_values() -> RelRef {
        Arc::new(RelNode::Values {
            row_type: RowType::default(),
            rows: vec![vec![]],
        })
    }

    fn scan() -> RelRef {
        Arc::new(RelNode::TableScan {
            table: "t".to_string(),
            schema: RowType::new(vec![ColumnField::new("x", DataType::Int64, false)]),
        })
    }

    #[test]
    fn constant_projection_routes_local() {
        let plan = RelNode::Project {
            exprs: vec![(
                ScalarExpr::Literal(Literal::Int64(1)),
                "EXPR$0".to_string(),
            )],
            input: one_row_values(),
        };
        assert_eq!(route(&plan), EngineKind::Local);
    }

    #[test]
    fn any_scan_forces_distributed() {
        let plan = RelNode::Project {
            exprs: vec![(ScalarExpr::Column("x".to_string()), "x".to_string())],
            input: scan(),
        };
        assert!(!is_constant_query(&plan));
        assert_eq!(route(&plan), EngineKind::Distributed);

        // scan buried under a join is still a scan
        let joined = RelNode::Join {
            left: one_row_values(),
            right: scan(),
            on: vec![],
            join_type: qx_planner::JoinType::Inner,
        };
        assert_eq!(route(&joined), EngineKind::Distributed);
    }

    #[test]
    fn unsupported_scalar_fn_forces_distributed() {
        let plan = RelNode::Project {
            exprs: vec![(
                ScalarExpr::ScalarFn {
                    name: "INTERSECT_COUNT".to_string(),
                    args: vec![],
                },
                "c".to_string(),
            )],
            input: one_row_values(),
        };
        assert!(is_constant_query(&plan));
        assert_eq!(route(&plan), EngineKind::Distributed);
    }

    #[test]
    fn bitmap_aggregate_forces_distributed() {
        let plan = RelNode::Aggregate {
            group_exprs: vec![],
            agg_calls: vec![AggCall {
                func: "BITMAP_BUILD".to_string(),
                distinct: false,
                arg: Some(ScalarExpr::Literal(Literal::Int64(1))),
                name: "b".to_string(),
            }],
            input: one_row_values(),
        };
        assert_eq!(route(&plan), EngineKind::Distributed);
    }

    #[test]
    fn distinct_aggregate_over_values_forces_distributed() {
        let plan = RelNode::Aggregate {
            group_exprs: vec![],
            agg_calls: vec![AggCall {
                func: "COUNT".to_string(),
                distinct: true,
                arg: Some(ScalarExpr::Literal(Literal::Int64(1))),
                name: "c".to_string(),
            }],
            input: one_row_values(),
        };
        assert_eq!(route(&plan), EngineKind::Distributed);

        // the rewritten form is the same gap
        let rewritten = RelNode::Aggregate {
            group_exprs: vec![],
            agg_calls: vec![AggCall {
                func: "COUNT_DISTINCT".to_string(),
                distinct: false,
                arg: Some(ScalarExpr::Literal(Literal::Int64(1))),
                name: "c".to_string(),
            }],
            input: one_row_values(),
        };
        assert_eq!(route(&rewritten), EngineKind::Distributed);
    }

    #[test]
    fn plain_aggregate_over_values_routes_local() {
        let plan = RelNode::Aggregate {
            group_exprs: vec![],
            agg_calls: vec![AggCall {
                func: "COUNT".to_string(),
                distinct: false,
                arg: None,
                name: "c".to_string(),
            }],
            input: one_row_values(),
        };
        assert_eq!(route(&plan), EngineKind::Local);
    }
}
