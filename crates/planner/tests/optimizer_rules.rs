use std::sync::Arc;

use arrow_schema::DataType;
use qx_planner::{
    plan_cost, BinaryOp, ColumnField, CostOptimizer, CostRule, DefaultCostModel, Literal, RelNode,
    RelRef, RowType, ScalarExpr,
};

fn scan() -> RelRef {
    Arc::new(RelNode::TableScan {
        table: "t".to_string(),
        schema: RowType::new(vec![
            ColumnField::new("x", DataType::Int64, false),
            ColumnField::new("y", DataType::Int64, false),
        ]),
    })
}

fn gt(col: &str, v: i64) -> ScalarExpr {
    ScalarExpr::BinaryOp {
        left: Box::new(ScalarExpr::Column(col.to_string())),
        op: BinaryOp::Gt,
        right: Box::new(ScalarExpr::Literal(Literal::Int64(v))),
    }
}

#[test]
fn filter_merge_collapses_stacked_filters() {
    let plan: RelRef = Arc::new(RelNode::Filter {
        predicate: gt("x", 10),
        input: Arc::new(RelNode::Filter {
            predicate: gt("y", 5),
            input: scan(),
        }),
    });

    let optimizer = CostOptimizer::new(16);
    let optimized = optimizer.optimize(plan).expect("optimize");
    match optimized.as_ref() {
        RelNode::Filter { predicate, input } => {
            assert!(matches!(predicate, ScalarExpr::And(_, _)));
            assert!(matches!(input.as_ref(), RelNode::TableScan { .. }));
        }
        other => panic!("expected merged filter, got {other:?}"),
    }
}

#[test]
fn project_merge_collapses_column_selection() {
    let plan: RelRef = Arc::new(RelNode::Project {
        exprs: vec![(ScalarExpr::Column("a".to_string()), "a".to_string())],
        input: Arc::new(RelNode::Project {
            exprs: vec![
                (gt("x", 1), "a".to_string()),
                (ScalarExpr::Column("y".to_string()), "b".to_string()),
            ],
            input: scan(),
        }),
    });

    let optimizer = CostOptimizer::new(16);
    let optimized = optimizer.optimize(plan).expect("optimize");
    match optimized.as_ref() {
        RelNode::Project { exprs, input } => {
            assert_eq!(exprs.len(), 1);
            assert_eq!(exprs[0].1, "a");
            // outer column reference replaced by the inner computed expression
            assert!(matches!(&exprs[0].0, ScalarExpr::BinaryOp { .. }));
            assert!(matches!(input.as_ref(), RelNode::TableScan { .. }));
        }
        other => panic!("expected merged projection, got {other:?}"),
    }
}

#[test]
fn rule_errors_propagate_unswallowed() {
    struct FailingRule;
    impl CostRule for FailingRule {
        fn name(&self) -> &str {
            "failing_rule"
        }
        fn rewrite(&self, _plan: &RelRef) -> qx_common::Result<Option<RelRef>> {
            Err(qx_common::QxError::Execution("rule blew up".to_string()))
        }
    }

    let optimizer = CostOptimizer::empty(Arc::new(DefaultCostModel), 16);
    optimizer.register_rule(Arc::new(FailingRule));
    let err = optimizer.optimize(scan()).unwrap_err();
    assert!(matches!(err, qx_common::QxError::Execution(_)), "got {err:?}");
}

#[test]
fn custom_rule_registration_and_deregistration() {
    // replaces a Limit bound with a tighter one; cheaper under the default model
    struct TightenLimitRule;
    impl CostRule for TightenLimitRule {
        fn name(&self) -> &str {
            "tighten_limit"
        }
        fn rewrite(&self, plan: &RelRef) -> qx_common::Result<Option<RelRef>> {
            if let RelNode::Limit { n, input } = plan.as_ref() {
                if *n > 1 {
                    return Ok(Some(Arc::new(RelNode::Limit {
                        n: 1,
                        input: Arc::new(RelNode::Values {
                            row_type: input.row_type(),
                            rows: vec![],
                        }),
                    })));
                }
            }
            Ok(None)
        }
    }

    let optimizer = CostOptimizer::empty(Arc::new(DefaultCostModel), 16);
    assert!(!optimizer.register_rule(Arc::new(TightenLimitRule)));
    // registering under the same name reports replacement
    assert!(optimizer.register_rule(Arc::new(TightenLimitRule)));

    let plan: RelRef = Arc::new(RelNode::Limit {
        n: 100,
        input: scan(),
    });
    let optimized = optimizer.optimize(Arc::clone(&plan)).expect("optimize");
    assert!(matches!(optimized.as_ref(), RelNode::Limit { n: 1, .. }));

    assert!(optimizer.deregister_rule("tighten_limit"));
    assert!(!optimizer.deregister_rule("tighten_limit"));
    let unchanged = optimizer.optimize(Arc::clone(&plan)).expect("optimize");
    assert_eq!(unchanged, plan);
}

#[test]
fn rewrites_are_kept_only_when_cheaper() {
    // rewrites to a strictly more expensive shape; the driver must reject it
    struct PessimizingRule;
    impl CostRule for PessimizingRule {
        fn name(&self) -> &str {
            "pessimizing"
        }
        fn rewrite(&self, plan: &RelRef) -> qx_common::Result<Option<RelRef>> {
            if matches!(plan.as_ref(), RelNode::TableScan { .. }) {
                return Ok(Some(Arc::new(RelNode::Filter {
                    predicate: ScalarExpr::Literal(Literal::Boolean(true)),
                    input: Arc::clone(plan),
                })));
            }
            Ok(None)
        }
    }

    let optimizer = CostOptimizer::empty(Arc::new(DefaultCostModel), 16);
    optimizer.register_rule(Arc::new(PessimizingRule));
    let plan = scan();
    let before = plan_cost(&DefaultCostModel, &plan);
    let optimized = optimizer.optimize(Arc::clone(&plan)).expect("optimize");
    assert_eq!(optimized, plan);
    assert_eq!(plan_cost(&DefaultCostModel, &optimized), before);
}
