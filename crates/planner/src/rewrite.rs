//! Heuristic rewrite passes applied after cost-based optimization.
//!
//! Pass order is fixed and configuration-driven; every pass is idempotent,
//! which the retry coordinator relies on when it re-applies the aggregate
//! push-down pass between realization-match retries.

use std::sync::Arc;

use tracing::debug;

use qx_common::RewriteFlags;

use crate::optimizer::map_inputs;
use crate::relplan::{
    expr_columns, expr_type, AggCall, BinaryOp, JoinType, Literal, RelNode, RelRef, ScalarExpr,
};

/// Apply each enabled pass in fixed order and produce the ordered plan
/// alternative list: `[transformed, original]` when the plan changed
/// structurally and alternatives are allowed, else `[transformed]`.
pub fn post_optimize(plan: &RelRef, flags: &RewriteFlags, allow_alternatives: bool) -> Vec<RelRef> {
    let mut transformed = Arc::clone(plan);
    if flags.sum_expression {
        transformed = sum_expression_rewrite(&transformed);
    }
    if flags.count_distinct {
        transformed = count_distinct_rewrite(&transformed);
    }
    if flags.aggregate_pushdown {
        transformed = aggregate_pushdown(&transformed);
    }
    if flags.sum_cast_double {
        transformed = sum_cast_double_rewrite(&transformed);
    }
    if flags.filter_reduction {
        transformed = filter_reduction(&transformed);
    }

    if transformed != *plan {
        debug!("heuristic rewrite produced a transformed plan");
        if allow_alternatives {
            return vec![transformed, Arc::clone(plan)];
        }
        return vec![transformed];
    }
    vec![transformed]
}

/// Decompose SUM over a computed expression: the expression moves into a
/// projection below the aggregate and the call sums the computed column.
/// A second application finds only column arguments and changes nothing.
pub fn sum_expression_rewrite(plan: &RelRef) -> RelRef {
    match plan.as_ref() {
        RelNode::Aggregate {
            group_exprs,
            agg_calls,
            input,
        } => {
            let input = sum_expression_rewrite(input);
            let needs_rewrite = agg_calls.iter().any(|c| {
                c.func == "SUM" && matches!(&c.arg, Some(a) if !matches!(a, ScalarExpr::Column(_)))
            });
            if !needs_rewrite {
                return rebuild_aggregate(plan, group_exprs, agg_calls.clone(), input);
            }

            let in_type = input.row_type();
            let mut below: Vec<(ScalarExpr, String)> = in_type
                .fields()
                .iter()
                .map(|f| (ScalarExpr::Column(f.name.clone()), f.name.clone()))
                .collect();
            let mut new_calls = Vec::with_capacity(agg_calls.len());
            for (i, call) in agg_calls.iter().enumerate() {
                match (&call.func[..], &call.arg) {
                    ("SUM", Some(arg)) if !matches!(arg, ScalarExpr::Column(_)) => {
                        let synth = format!("__sum_expr_{i}");
                        below.push((arg.clone(), synth.clone()));
                        new_calls.push(AggCall {
                            arg: Some(ScalarExpr::Column(synth)),
                            ..call.clone()
                        });
                    }
                    _ => new_calls.push(call.clone()),
                }
            }
            Arc::new(RelNode::Aggregate {
                group_exprs: group_exprs.clone(),
                agg_calls: new_calls,
                input: Arc::new(RelNode::Project {
                    exprs: below,
                    input,
                }),
            })
        }
        _ => map_inputs(plan, sum_expression_rewrite),
    }
}

/// COUNT(DISTINCT x) => COUNT_DISTINCT(x), the form realizations index.
pub fn count_distinct_rewrite(plan: &RelRef) -> RelRef {
    match plan.as_ref() {
        RelNode::Aggregate {
            group_exprs,
            agg_calls,
            input,
        } => {
            let input = count_distinct_rewrite(input);
            let new_calls: Vec<AggCall> = agg_calls
                .iter()
                .map(|c| {
                    if c.func == "COUNT" && c.distinct {
                        AggCall {
                            func: "COUNT_DISTINCT".to_string(),
                            distinct: false,
                            ..c.clone()
                        }
                    } else {
                        c.clone()
                    }
                })
                .collect();
            rebuild_aggregate(plan, group_exprs, new_calls, input)
        }
        _ => map_inputs(plan, count_distinct_rewrite),
    }
}

/// Push an aggregate below an inner join onto the join's left leaf when the
/// aggregation only touches left-side columns and groups by every left join
/// key. Only leaf left sides are pushed into, so re-running the pass on its
/// own output is a no-op.
pub fn aggregate_pushdown(plan: &RelRef) -> RelRef {
    match plan.as_ref() {
        RelNode::Aggregate {
            group_exprs,
            agg_calls,
            input,
        } => {
            let input = aggregate_pushdown(input);
            if let RelNode::Join {
                left,
                right,
                on,
                join_type: JoinType::Inner,
            } = input.as_ref()
            {
                if pushdown_applies(group_exprs, agg_calls, left, on) {
                    debug!(join = %left.digest(), "aggregate pushed below join");
                    return Arc::new(RelNode::Join {
                        left: Arc::new(RelNode::Aggregate {
                            group_exprs: group_exprs.clone(),
                            agg_calls: agg_calls.clone(),
                            input: Arc::clone(left),
                        }),
                        right: Arc::clone(right),
                        on: on.clone(),
                        join_type: JoinType::Inner,
                    });
                }
            }
            rebuild_aggregate(plan, group_exprs, agg_calls.clone(), input)
        }
        _ => map_inputs(plan, aggregate_pushdown),
    }
}

fn pushdown_applies(
    group_exprs: &[ScalarExpr],
    agg_calls: &[AggCall],
    left: &RelRef,
    on: &[(String, String)],
) -> bool {
    if !matches!(left.as_ref(), RelNode::TableScan { .. } | RelNode::Values { .. }) {
        return false;
    }
    let left_type = left.row_type();

    let mut referenced = Vec::new();
    for g in group_exprs {
        expr_columns(g, &mut referenced);
    }
    for call in agg_calls {
        if let Some(arg) = &call.arg {
            expr_columns(arg, &mut referenced);
        }
    }
    if referenced.iter().any(|c| left_type.field(c).is_none()) {
        return false;
    }

    // every left join key must survive the aggregation as a group key
    let group_cols: Vec<String> = group_exprs
        .iter()
        .filter_map(|g| match g {
            ScalarExpr::Column(c) => Some(crate::relplan::strip_qualifier(c).to_string()),
            _ => None,
        })
        .collect();
    on.iter()
        .all(|(lk, _)| group_cols.iter().any(|g| g == crate::relplan::strip_qualifier(lk)))
}

/// Drop redundant casts to DOUBLE inside SUM arguments when the argument is
/// already DOUBLE-typed.
pub fn sum_cast_double_rewrite(plan: &RelRef) -> RelRef {
    use arrow_schema::DataType;
    match plan.as_ref() {
        RelNode::Aggregate {
            group_exprs,
            agg_calls,
            input,
        } => {
            let input = sum_cast_double_rewrite(input);
            let in_type = input.row_type();
            let new_calls: Vec<AggCall> = agg_calls
                .iter()
                .map(|c| {
                    if c.func != "SUM" {
                        return c.clone();
                    }
                    match &c.arg {
                        Some(ScalarExpr::Cast { expr, to_type })
                            if *to_type == DataType::Float64
                                && expr_type(expr, &in_type).0 == DataType::Float64 =>
                        {
                            AggCall {
                                arg: Some((**expr).clone()),
                                ..c.clone()
                            }
                        }
                        _ => c.clone(),
                    }
                })
                .collect();
            rebuild_aggregate(plan, group_exprs, new_calls, input)
        }
        _ => map_inputs(plan, sum_cast_double_rewrite),
    }
}

/// Constant-fold filter predicates; drop always-true filters and replace
/// always-false filters with an empty Values of the same row type.
pub fn filter_reduction(plan: &RelRef) -> RelRef {
    match plan.as_ref() {
        RelNode::Filter { predicate, input } => {
            let input = filter_reduction(input);
            match fold_constants(predicate.clone()) {
                ScalarExpr::Literal(Literal::Boolean(true)) => input,
                ScalarExpr::Literal(Literal::Boolean(false)) => Arc::new(RelNode::Values {
                    row_type: input.row_type(),
                    rows: vec![],
                }),
                folded => Arc::new(RelNode::Filter {
                    predicate: folded,
                    input,
                }),
            }
        }
        _ => map_inputs(plan, filter_reduction),
    }
}

fn rebuild_aggregate(
    original: &RelRef,
    group_exprs: &[ScalarExpr],
    agg_calls: Vec<AggCall>,
    input: RelRef,
) -> RelRef {
    let rebuilt = RelNode::Aggregate {
        group_exprs: group_exprs.to_vec(),
        agg_calls,
        input,
    };
    if rebuilt == **original {
        Arc::clone(original)
    } else {
        Arc::new(rebuilt)
    }
}

// -----------------------------
// Constant folding
// -----------------------------

pub fn fold_constants(e: ScalarExpr) -> ScalarExpr {
    match e {
        ScalarExpr::Not(inner) => {
            let inner = fold_constants(*inner);
            match inner {
                ScalarExpr::Literal(Literal::Boolean(b)) => {
                    ScalarExpr::Literal(Literal::Boolean(!b))
                }
                _ => ScalarExpr::Not(Box::new(inner)),
            }
        }
        ScalarExpr::And(a, b) => {
            let a = fold_constants(*a);
            let b = fold_constants(*b);
            match (&a, &b) {
                (ScalarExpr::Literal(Literal::Boolean(false)), _)
                | (_, ScalarExpr::Literal(Literal::Boolean(false))) => {
                    ScalarExpr::Literal(Literal::Boolean(false))
                }
                (ScalarExpr::Literal(Literal::Boolean(true)), _) => b,
                (_, ScalarExpr::Literal(Literal::Boolean(true))) => a,
                _ => ScalarExpr::And(Box::new(a), Box::new(b)),
            }
        }
        ScalarExpr::Or(a, b) => {
            let a = fold_constants(*a);
            let b = fold_constants(*b);
            match (&a, &b) {
                (ScalarExpr::Literal(Literal::Boolean(true)), _)
                | (_, ScalarExpr::Literal(Literal::Boolean(true))) => {
                    ScalarExpr::Literal(Literal::Boolean(true))
                }
                (ScalarExpr::Literal(Literal::Boolean(false)), _) => b,
                (_, ScalarExpr::Literal(Literal::Boolean(false))) => a,
                _ => ScalarExpr::Or(Box::new(a), Box::new(b)),
            }
        }
        ScalarExpr::BinaryOp { left, op, right } => {
            let l = fold_constants(*left);
            let r = fold_constants(*right);
            if let (ScalarExpr::Literal(lv), ScalarExpr::Literal(rv)) = (&l, &r) {
                if let Some(out) = eval_binary(lv.clone(), op, rv.clone()) {
                    return ScalarExpr::Literal(out);
                }
            }
            ScalarExpr::BinaryOp {
                left: Box::new(l),
                op,
                right: Box::new(r),
            }
        }
        ScalarExpr::Cast { expr, to_type } => ScalarExpr::Cast {
            expr: Box::new(fold_constants(*expr)),
            to_type,
        },
        ScalarExpr::ScalarFn { name, args } => ScalarExpr::ScalarFn {
            name,
            args: args.into_iter().map(fold_constants).collect(),
        },
        other => other,
    }
}

pub fn eval_binary(l: Literal, op: BinaryOp, r: Literal) -> Option<Literal> {
    use Literal::*;
    match (l, op, r) {
        (Boolean(a), BinaryOp::Eq, Boolean(b)) => Some(Boolean(a == b)),
        (Boolean(a), BinaryOp::NotEq, Boolean(b)) => Some(Boolean(a != b)),

        (Int64(a), BinaryOp::Plus, Int64(b)) => Some(Int64(a.wrapping_add(b))),
        (Int64(a), BinaryOp::Minus, Int64(b)) => Some(Int64(a.wrapping_sub(b))),
        (Int64(a), BinaryOp::Multiply, Int64(b)) => Some(Int64(a.wrapping_mul(b))),
        (Int64(a), BinaryOp::Divide, Int64(b)) if b != 0 => Some(Int64(a / b)),
        (Int64(a), BinaryOp::Eq, Int64(b)) => Some(Boolean(a == b)),
        (Int64(a), BinaryOp::NotEq, Int64(b)) => Some(Boolean(a != b)),
        (Int64(a), BinaryOp::Lt, Int64(b)) => Some(Boolean(a < b)),
        (Int64(a), BinaryOp::LtEq, Int64(b)) => Some(Boolean(a <= b)),
        (Int64(a), BinaryOp::Gt, Int64(b)) => Some(Boolean(a > b)),
        (Int64(a), BinaryOp::GtEq, Int64(b)) => Some(Boolean(a >= b)),

        (Float64(a), BinaryOp::Plus, Float64(b)) => Some(Float64(a + b)),
        (Float64(a), BinaryOp::Minus, Float64(b)) => Some(Float64(a - b)),
        (Float64(a), BinaryOp::Multiply, Float64(b)) => Some(Float64(a * b)),
        (Float64(a), BinaryOp::Divide, Float64(b)) if b != 0.0 => Some(Float64(a / b)),
        (Float64(a), BinaryOp::Eq, Float64(b)) => Some(Boolean(a == b)),
        (Float64(a), BinaryOp::NotEq, Float64(b)) => Some(Boolean(a != b)),
        (Float64(a), BinaryOp::Lt, Float64(b)) => Some(Boolean(a < b)),
        (Float64(a), BinaryOp::LtEq, Float64(b)) => Some(Boolean(a <= b)),
        (Float64(a), BinaryOp::Gt, Float64(b)) => Some(Boolean(a > b)),
        (Float64(a), BinaryOp::GtEq, Float64(b)) => Some(Boolean(a >= b)),

        (Utf8(a), BinaryOp::Eq, Utf8(b)) => Some(Boolean(a == b)),
        (Utf8(a), BinaryOp::NotEq, Utf8(b)) => Some(Boolean(a != b)),
        _ => None,
    }
}
