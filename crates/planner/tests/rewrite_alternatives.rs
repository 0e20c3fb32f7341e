use std::sync::Arc;

use arrow_schema::DataType;
use qx_common::RewriteFlags;
use qx_planner::rewrite::{aggregate_pushdown, filter_reduction, post_optimize};
use qx_planner::{
    AggCall, BinaryOp, ColumnField, JoinType, Literal, RelNode, RelRef, RowType, ScalarExpr,
};

fn sales_scan() -> RelRef {
    Arc::new(RelNode::TableScan {
        table: "sales".to_string(),
        schema: RowType::new(vec![
            ColumnField::new("region", DataType::Utf8, false),
            ColumnField::new("amount", DataType::Float64, true),
            ColumnField::new("qty", DataType::Int64, false),
            ColumnField::new("cust_id", DataType::Int64, false),
        ]),
    })
}

fn customers_scan() -> RelRef {
    Arc::new(RelNode::TableScan {
        table: "customers".to_string(),
        schema: RowType::new(vec![
            ColumnField::new("cust_id", DataType::Int64, false),
            ColumnField::new("name", DataType::Utf8, false),
        ]),
    })
}

fn col(name: &str) -> ScalarExpr {
    ScalarExpr::Column(name.to_string())
}

fn sum_call(arg: ScalarExpr, name: &str) -> AggCall {
    AggCall {
        func: "SUM".to_string(),
        distinct: false,
        arg: Some(arg),
        name: name.to_string(),
    }
}

#[test]
fn unchanged_plan_yields_single_alternative() {
    let plan: RelRef = Arc::new(RelNode::Project {
        exprs: vec![(col("region"), "region".to_string())],
        input: sales_scan(),
    });
    let alts = post_optimize(&plan, &RewriteFlags::default(), true);
    assert_eq!(alts.len(), 1);
    assert_eq!(alts[0], plan);
}

#[test]
fn changed_plan_yields_transformed_then_original() {
    // COUNT(DISTINCT region) triggers the count-distinct pass
    let plan: RelRef = Arc::new(RelNode::Aggregate {
        group_exprs: vec![],
        agg_calls: vec![AggCall {
            func: "COUNT".to_string(),
            distinct: true,
            arg: Some(col("region")),
            name: "c".to_string(),
        }],
        input: sales_scan(),
    });

    let alts = post_optimize(&plan, &RewriteFlags::default(), true);
    assert_eq!(alts.len(), 2);
    assert_eq!(alts[1], plan, "original must come second");
    match alts[0].as_ref() {
        RelNode::Aggregate { agg_calls, .. } => {
            assert_eq!(agg_calls[0].func, "COUNT_DISTINCT");
            assert!(!agg_calls[0].distinct);
        }
        other => panic!("expected aggregate, got {other:?}"),
    }

    // alternatives disabled: only the transformed plan comes back
    let alts = post_optimize(&plan, &RewriteFlags::default(), false);
    assert_eq!(alts.len(), 1);
    assert_ne!(alts[0], plan);
}

#[test]
fn passes_are_idempotent() {
    let join: RelRef = Arc::new(RelNode::Join {
        left: sales_scan(),
        right: customers_scan(),
        on: vec![("cust_id".to_string(), "cust_id".to_string())],
        join_type: JoinType::Inner,
    });
    let plan: RelRef = Arc::new(RelNode::Aggregate {
        group_exprs: vec![col("cust_id")],
        agg_calls: vec![sum_call(
            ScalarExpr::BinaryOp {
                left: Box::new(col("amount")),
                op: BinaryOp::Multiply,
                right: Box::new(ScalarExpr::Literal(Literal::Float64(1.1))),
            },
            "total",
        )],
        input: join,
    });

    let flags = RewriteFlags::default();
    let once = post_optimize(&plan, &flags, false).remove(0);
    assert_ne!(once, plan);
    let twice = post_optimize(&once, &flags, false).remove(0);
    assert_eq!(twice, once, "second application must be a no-op");
}

#[test]
fn sum_expression_moves_computed_arg_below_aggregate() {
    let plan: RelRef = Arc::new(RelNode::Aggregate {
        group_exprs: vec![col("region")],
        agg_calls: vec![sum_call(
            ScalarExpr::BinaryOp {
                left: Box::new(col("amount")),
                op: BinaryOp::Plus,
                right: Box::new(ScalarExpr::Literal(Literal::Float64(1.0))),
            },
            "total",
        )],
        input: sales_scan(),
    });

    let out = qx_planner::rewrite::sum_expression_rewrite(&plan);
    match out.as_ref() {
        RelNode::Aggregate {
            agg_calls, input, ..
        } => {
            assert!(matches!(
                &agg_calls[0].arg,
                Some(ScalarExpr::Column(c)) if c == "__sum_expr_0"
            ));
            match input.as_ref() {
                RelNode::Project { exprs, .. } => {
                    // passthrough input columns plus one synthetic column
                    assert_eq!(exprs.len(), 5);
                    assert_eq!(exprs[4].1, "__sum_expr_0");
                }
                other => panic!("expected projection below aggregate, got {other:?}"),
            }
        }
        other => panic!("expected aggregate root, got {other:?}"),
    }
}

#[test]
fn aggregate_pushes_below_join_when_left_side_only() {
    let plan: RelRef = Arc::new(RelNode::Aggregate {
        group_exprs: vec![col("cust_id")],
        agg_calls: vec![sum_call(col("amount"), "total")],
        input: Arc::new(RelNode::Join {
            left: sales_scan(),
            right: customers_scan(),
            on: vec![("cust_id".to_string(), "cust_id".to_string())],
            join_type: JoinType::Inner,
        }),
    });

    let out = aggregate_pushdown(&plan);
    match out.as_ref() {
        RelNode::Join { left, .. } => match left.as_ref() {
            RelNode::Aggregate { input, .. } => {
                assert!(matches!(input.as_ref(), RelNode::TableScan { table, .. } if table == "sales"));
            }
            other => panic!("expected aggregate on join left, got {other:?}"),
        },
        other => panic!("expected join root after pushdown, got {other:?}"),
    }
    // pushing again finds no aggregate-over-join and changes nothing
    assert_eq!(aggregate_pushdown(&out), out);
}

#[test]
fn aggregate_pushdown_skips_right_side_references() {
    // grouping by a right-side column must block the push
    let plan: RelRef = Arc::new(RelNode::Aggregate {
        group_exprs: vec![col("name")],
        agg_calls: vec![sum_call(col("amount"), "total")],
        input: Arc::new(RelNode::Join {
            left: sales_scan(),
            right: customers_scan(),
            on: vec![("cust_id".to_string(), "cust_id".to_string())],
            join_type: JoinType::Inner,
        }),
    });
    assert_eq!(aggregate_pushdown(&plan), plan);
}

#[test]
fn aggregate_pushdown_requires_join_keys_in_group_keys() {
    // aggregating away the left join key would break the join
    let plan: RelRef = Arc::new(RelNode::Aggregate {
        group_exprs: vec![col("region")],
        agg_calls: vec![sum_call(col("amount"), "total")],
        input: Arc::new(RelNode::Join {
            left: sales_scan(),
            right: customers_scan(),
            on: vec![("cust_id".to_string(), "cust_id".to_string())],
            join_type: JoinType::Inner,
        }),
    });
    assert_eq!(aggregate_pushdown(&plan), plan);
}

#[test]
fn filter_reduction_folds_constant_predicates() {
    let scan = sales_scan();

    let always_true: RelRef = Arc::new(RelNode::Filter {
        predicate: ScalarExpr::BinaryOp {
            left: Box::new(ScalarExpr::Literal(Literal::Int64(1))),
            op: BinaryOp::Eq,
            right: Box::new(ScalarExpr::Literal(Literal::Int64(1))),
        },
        input: Arc::clone(&scan),
    });
    assert_eq!(filter_reduction(&always_true), scan);

    let always_false: RelRef = Arc::new(RelNode::Filter {
        predicate: ScalarExpr::And(
            Box::new(ScalarExpr::Literal(Literal::Boolean(false))),
            Box::new(ScalarExpr::BinaryOp {
                left: Box::new(col("qty")),
                op: BinaryOp::Gt,
                right: Box::new(ScalarExpr::Literal(Literal::Int64(0))),
            }),
        ),
        input: Arc::clone(&scan),
    });
    match filter_reduction(&always_false).as_ref() {
        RelNode::Values { row_type, rows } => {
            assert!(rows.is_empty());
            assert_eq!(*row_type, scan.row_type(), "row type must be preserved");
        }
        other => panic!("expected empty values, got {other:?}"),
    }

    // a non-constant predicate survives folding
    let dynamic: RelRef = Arc::new(RelNode::Filter {
        predicate: ScalarExpr::BinaryOp {
            left: Box::new(col("qty")),
            op: BinaryOp::Gt,
            right: Box::new(ScalarExpr::Literal(Literal::Int64(0))),
        },
        input: scan,
    });
    assert!(matches!(
        filter_reduction(&dynamic).as_ref(),
        RelNode::Filter { .. }
    ));
}

#[test]
fn sum_cast_double_drops_redundant_cast_only() {
    let redundant: RelRef = Arc::new(RelNode::Aggregate {
        group_exprs: vec![],
        agg_calls: vec![sum_call(
            ScalarExpr::Cast {
                expr: Box::new(col("amount")),
                to_type: DataType::Float64,
            },
            "total",
        )],
        input: sales_scan(),
    });
    match qx_planner::rewrite::sum_cast_double_rewrite(&redundant).as_ref() {
        RelNode::Aggregate { agg_calls, .. } => {
            assert!(matches!(&agg_calls[0].arg, Some(ScalarExpr::Column(c)) if c == "amount"));
        }
        other => panic!("expected aggregate, got {other:?}"),
    }

    // widening an integer column is not redundant and must stay
    let widening: RelRef = Arc::new(RelNode::Aggregate {
        group_exprs: vec![],
        agg_calls: vec![sum_call(
            ScalarExpr::Cast {
                expr: Box::new(col("qty")),
                to_type: DataType::Float64,
            },
            "total",
        )],
        input: sales_scan(),
    });
    assert_eq!(qx_planner::rewrite::sum_cast_double_rewrite(&widening), widening);
}
