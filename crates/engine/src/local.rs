//! Local constant-query evaluator.
//!
//! Interprets plans that touch no stored data: literal rows flow through
//! projections, filters, aggregates and limits entirely in memory. The
//! router guarantees only capability-safe plans arrive here; anything else
//! fails with a typed `Unsupported` error.

use qx_common::{QxError, Result};
use qx_planner::{AggCall, Literal, RelNode, RelRef, RowType, ScalarExpr};

use crate::context::QueryContext;
use crate::exec::{ColumnMeta, ExecuteResult, PlanExec, Row};

#[derive(Debug, Default)]
pub struct LocalPlanExec;

impl PlanExec for LocalPlanExec {
    fn execute_to_iterable(
        &self,
        plan: &RelRef,
        ctx: &mut QueryContext,
    ) -> Result<ExecuteResult> {
        ctx.check_cancelled()?;
        let columns = ColumnMeta::from_row_type(&plan.row_type());
        let rows = eval_node(plan)?;
        Ok(ExecuteResult::from_rows(columns, rows))
    }
}

fn eval_node(plan: &RelNode) -> Result<Vec<Row>> {
    match plan {
        RelNode::Values { rows, .. } => Ok(rows.clone()),
        RelNode::TableScan { table, .. } => Err(QxError::Unsupported(format!(
            "local evaluator cannot scan stored data (table '{table}')"
        ))),
        RelNode::Join { .. } => Err(QxError::Unsupported(
            "local evaluator cannot join".to_string(),
        )),
        RelNode::Project { exprs, input } => {
            let in_type = input.row_type();
            let in_rows = eval_node(input)?;
            in_rows
                .iter()
                .map(|row| {
                    exprs
                        .iter()
                        .map(|(e, _)| eval_expr(e, &in_type, row))
                        .collect()
                })
                .collect()
        }
        RelNode::Filter { predicate, input } => {
            let in_type = input.row_type();
            let mut out = Vec::new();
            for row in eval_node(input)? {
                if matches!(
                    eval_expr(predicate, &in_type, &row)?,
                    Literal::Boolean(true)
                ) {
                    out.push(row);
                }
            }
            Ok(out)
        }
        RelNode::Aggregate {
            group_exprs,
            agg_calls,
            input,
        } => eval_aggregate(group_exprs, agg_calls, input),
        RelNode::Limit { n, input } => {
            let mut rows = eval_node(input)?;
            rows.truncate(*n);
            Ok(rows)
        }
    }
}

fn eval_aggregate(
    group_exprs: &[ScalarExpr],
    agg_calls: &[AggCall],
    input: &RelRef,
) -> Result<Vec<Row>> {
    let in_type = input.row_type();
    let in_rows = eval_node(input)?;

    // literal keys are not hashable (floats), so grouping is a linear scan;
    // constant-query inputs are tiny
    let mut groups: Vec<(Vec<Literal>, Vec<Row>)> = Vec::new();
    for row in in_rows {
        let key: Vec<Literal> = group_exprs
            .iter()
            .map(|g| eval_expr(g, &in_type, &row))
            .collect::<Result<_>>()?;
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, rows)) => rows.push(row),
            None => groups.push((key, vec![row])),
        }
    }
    // global aggregation over zero rows still yields one output row
    if groups.is_empty() && group_exprs.is_empty() {
        groups.push((vec![], vec![]));
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, rows) in groups {
        let mut result_row = key;
        for call in agg_calls {
            result_row.push(eval_agg_call(call, &in_type, &rows)?);
        }
        out.push(result_row);
    }
    Ok(out)
}

fn eval_agg_call(call: &AggCall, in_type: &RowType, rows: &[Row]) -> Result<Literal> {
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        match &call.arg {
            Some(arg) => {
                let v = eval_expr(arg, in_type, row)?;
                if v != Literal::Null {
                    values.push(v);
                }
            }
            None => values.push(Literal::Int64(1)),
        }
    }
    if call.distinct || call.func == "COUNT_DISTINCT" {
        let mut distinct: Vec<Literal> = Vec::new();
        for v in values {
            if !distinct.contains(&v) {
                distinct.push(v);
            }
        }
        values = distinct;
    }

    match call.func.as_str() {
        "COUNT" | "COUNT_DISTINCT" => Ok(Literal::Int64(values.len() as i64)),
        "SUM" => sum_literals(&values),
        "AVG" => {
            if values.is_empty() {
                return Ok(Literal::Null);
            }
            let n = values.len() as f64;
            match sum_literals(&values)? {
                Literal::Int64(s) => Ok(Literal::Float64(s as f64 / n)),
                Literal::Float64(s) => Ok(Literal::Float64(s / n)),
                _ => Ok(Literal::Null),
            }
        }
        "MIN" => Ok(fold_by_cmp(values, std::cmp::Ordering::Less)),
        "MAX" => Ok(fold_by_cmp(values, std::cmp::Ordering::Greater)),
        other => Err(QxError::Unsupported(format!(
            "local evaluator cannot compute aggregate {other}()"
        ))),
    }
}

fn sum_literals(values: &[Literal]) -> Result<Literal> {
    if values.is_empty() {
        return Ok(Literal::Null);
    }
    if values.iter().any(|v| matches!(v, Literal::Float64(_))) {
        let mut acc = 0.0f64;
        for v in values {
            acc += match v {
                Literal::Int64(i) => *i as f64,
                Literal::Float64(f) => *f,
                other => {
                    return Err(QxError::Execution(format!("SUM over non-number: {other:?}")))
                }
            };
        }
        Ok(Literal::Float64(acc))
    } else {
        let mut acc = 0i64;
        for v in values {
            acc += match v {
                Literal::Int64(i) => *i,
                other => {
                    return Err(QxError::Execution(format!("SUM over non-number: {other:?}")))
                }
            };
        }
        Ok(Literal::Int64(acc))
    }
}

fn fold_by_cmp(values: Vec<Literal>, keep: std::cmp::Ordering) -> Literal {
    let mut best: Option<Literal> = None;
    for v in values {
        best = Some(match best {
            None => v,
            Some(b) => {
                if literal_cmp(&v, &b) == Some(keep) {
                    v
                } else {
                    b
                }
            }
        });
    }
    best.unwrap_or(Literal::Null)
}

fn literal_cmp(a: &Literal, b: &Literal) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Literal::Int64(x), Literal::Int64(y)) => Some(x.cmp(y)),
        (Literal::Float64(x), Literal::Float64(y)) => x.partial_cmp(y),
        (Literal::Int64(x), Literal::Float64(y)) => (*x as f64).partial_cmp(y),
        (Literal::Float64(x), Literal::Int64(y)) => x.partial_cmp(&(*y as f64)),
        (Literal::Utf8(x), Literal::Utf8(y)) => Some(x.cmp(y)),
        (Literal::Boolean(x), Literal::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn eval_expr(e: &ScalarExpr, in_type: &RowType, row: &Row) -> Result<Literal> {
    match e {
        ScalarExpr::Literal(v) => Ok(v.clone()),
        ScalarExpr::Column(name) => {
            let idx = in_type
                .fields()
                .iter()
                .position(|f| {
                    f.name == *name
                        || qx_planner::relplan::strip_qualifier(&f.name)
                            == qx_planner::relplan::strip_qualifier(name)
                })
                .ok_or_else(|| QxError::Execution(format!("column '{name}' out of scope")))?;
            row.get(idx)
                .cloned()
                .ok_or_else(|| QxError::Execution(format!("row too short for column '{name}'")))
        }
        ScalarExpr::BinaryOp { left, op, right } => {
            let l = eval_expr(left, in_type, row)?;
            let r = eval_expr(right, in_type, row)?;
            if l == Literal::Null || r == Literal::Null {
                return Ok(Literal::Null);
            }
            qx_planner::rewrite::eval_binary(l.clone(), *op, r.clone()).ok_or_else(|| {
                QxError::Execution(format!("cannot apply {op:?} to {l:?} and {r:?}"))
            })
        }
        ScalarExpr::And(a, b) => eval_bool2(a, b, in_type, row, |x, y| x && y),
        ScalarExpr::Or(a, b) => eval_bool2(a, b, in_type, row, |x, y| x || y),
        ScalarExpr::Not(x) => match eval_expr(x, in_type, row)? {
            Literal::Boolean(b) => Ok(Literal::Boolean(!b)),
            Literal::Null => Ok(Literal::Null),
            other => Err(QxError::Execution(format!("NOT over non-boolean: {other:?}"))),
        },
        ScalarExpr::Cast { expr, to_type } => {
            let v = eval_expr(expr, in_type, row)?;
            cast_literal(v, to_type)
        }
        ScalarExpr::ScalarFn { name, args } => {
            let args = args
                .iter()
                .map(|a| eval_expr(a, in_type, row))
                .collect::<Result<Vec<_>>>()?;
            eval_scalar_fn(name, &args)
        }
    }
}

fn eval_bool2(
    a: &ScalarExpr,
    b: &ScalarExpr,
    in_type: &RowType,
    row: &Row,
    f: impl Fn(bool, bool) -> bool,
) -> Result<Literal> {
    match (eval_expr(a, in_type, row)?, eval_expr(b, in_type, row)?) {
        (Literal::Boolean(x), Literal::Boolean(y)) => Ok(Literal::Boolean(f(x, y))),
        (Literal::Null, _) | (_, Literal::Null) => Ok(Literal::Null),
        (x, y) => Err(QxError::Execution(format!(
            "boolean operator over non-booleans: {x:?}, {y:?}"
        ))),
    }
}

fn cast_literal(v: Literal, to_type: &arrow_schema::DataType) -> Result<Literal> {
    use arrow_schema::DataType;
    if v == Literal::Null {
        return Ok(Literal::Null);
    }
    let out = match (to_type, &v) {
        (DataType::Int64, Literal::Int64(_)) => v,
        (DataType::Int64, Literal::Float64(f)) => Literal::Int64(*f as i64),
        (DataType::Int64, Literal::Utf8(s)) => Literal::Int64(
            s.trim()
                .parse()
                .map_err(|_| QxError::Execution(format!("cannot cast '{s}' to BIGINT")))?,
        ),
        (DataType::Float64, Literal::Float64(_)) => v,
        (DataType::Float64, Literal::Int64(i)) => Literal::Float64(*i as f64),
        (DataType::Float64, Literal::Utf8(s)) => Literal::Float64(
            s.trim()
                .parse()
                .map_err(|_| QxError::Execution(format!("cannot cast '{s}' to DOUBLE")))?,
        ),
        (DataType::Utf8, Literal::Utf8(_)) => v,
        (DataType::Utf8, Literal::Int64(i)) => Literal::Utf8(i.to_string()),
        (DataType::Utf8, Literal::Float64(f)) => Literal::Utf8(f.to_string()),
        (DataType::Utf8, Literal::Boolean(b)) => Literal::Utf8(b.to_string()),
        (DataType::Boolean, Literal::Boolean(_)) => v,
        (t, v) => {
            return Err(QxError::Execution(format!(
                "cannot cast {v:?} to {t:?}"
            )))
        }
    };
    Ok(out)
}

fn eval_scalar_fn(name: &str, args: &[Literal]) -> Result<Literal> {
    if args.iter().any(|a| *a == Literal::Null) {
        return Ok(Literal::Null);
    }
    match (name, args) {
        ("UPPER", [Literal::Utf8(s)]) => Ok(Literal::Utf8(s.to_uppercase())),
        ("LOWER", [Literal::Utf8(s)]) => Ok(Literal::Utf8(s.to_lowercase())),
        ("TRIM", [Literal::Utf8(s)]) => Ok(Literal::Utf8(s.trim().to_string())),
        ("LENGTH", [Literal::Utf8(s)]) => Ok(Literal::Int64(s.chars().count() as i64)),
        ("ABS", [Literal::Int64(i)]) => Ok(Literal::Int64(i.abs())),
        ("ABS", [Literal::Float64(f)]) => Ok(Literal::Float64(f.abs())),
        ("CONCAT", parts) => {
            let mut out = String::new();
            for p in parts {
                match p {
                    Literal::Utf8(s) => out.push_str(s),
                    Literal::Int64(i) => out.push_str(&i.to_string()),
                    Literal::Float64(f) => out.push_str(&f.to_string()),
                    Literal::Boolean(b) => out.push_str(&b.to_string()),
                    Literal::Null => {}
                }
            }
            Ok(Literal::Utf8(out))
        }
        _ => Err(QxError::Unsupported(format!(
            "local evaluator cannot interpret {name}()"
        ))),
    }
}
