use crate::relplan::{AggCall, RelNode, ScalarExpr};

/// Render a relational plan as human-readable multiline text.
pub fn explain_rel(plan: &RelNode) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

fn fmt_plan(plan: &RelNode, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        RelNode::TableScan { table, schema } => {
            out.push_str(&format!(
                "{pad}TableScan table={table} columns={}\n",
                schema.fields().len()
            ));
        }
        RelNode::Values { row_type, rows } => {
            out.push_str(&format!(
                "{pad}Values columns={} rows={}\n",
                row_type.fields().len(),
                rows.len()
            ));
        }
        RelNode::Project { exprs, input } => {
            out.push_str(&format!("{pad}Project\n"));
            for (e, name) in exprs {
                out.push_str(&format!("{pad}  {name} := {}\n", fmt_expr(e)));
            }
            fmt_plan(input, indent + 1, out);
        }
        RelNode::Filter { predicate, input } => {
            out.push_str(&format!("{pad}Filter {}\n", fmt_expr(predicate)));
            fmt_plan(input, indent + 1, out);
        }
        RelNode::Aggregate {
            group_exprs,
            agg_calls,
            input,
        } => {
            out.push_str(&format!("{pad}Aggregate\n"));
            out.push_str(&format!("{pad}  group_by={}\n", group_exprs.len()));
            for g in group_exprs {
                out.push_str(&format!("{pad}    {}\n", fmt_expr(g)));
            }
            out.push_str(&format!("{pad}  aggs={}\n", agg_calls.len()));
            for call in agg_calls {
                out.push_str(&format!("{pad}    {} := {}\n", call.name, fmt_agg(call)));
            }
            fmt_plan(input, indent + 1, out);
        }
        RelNode::Join {
            left,
            right,
            on,
            join_type,
        } => {
            out.push_str(&format!("{pad}Join type={join_type:?}\n"));
            out.push_str(&format!("{pad}  on={:?}\n", on));
            out.push_str(&format!("{pad}  left:\n"));
            fmt_plan(left, indent + 2, out);
            out.push_str(&format!("{pad}  right:\n"));
            fmt_plan(right, indent + 2, out);
        }
        RelNode::Limit { n, input } => {
            out.push_str(&format!("{pad}Limit n={n}\n"));
            fmt_plan(input, indent + 1, out);
        }
    }
}

fn fmt_agg(call: &AggCall) -> String {
    let arg = match &call.arg {
        Some(a) => fmt_expr(a),
        None => "*".to_string(),
    };
    if call.distinct {
        format!("{}(DISTINCT {arg})", call.func)
    } else {
        format!("{}({arg})", call.func)
    }
}

fn fmt_expr(e: &ScalarExpr) -> String {
    match e {
        ScalarExpr::Column(c) => c.clone(),
        ScalarExpr::Literal(v) => format!("{v:?}"),
        ScalarExpr::Cast { expr, to_type } => format!("cast({} as {to_type:?})", fmt_expr(expr)),
        ScalarExpr::Not(x) => format!("NOT ({})", fmt_expr(x)),
        ScalarExpr::And(a, b) => format!("({}) AND ({})", fmt_expr(a), fmt_expr(b)),
        ScalarExpr::Or(a, b) => format!("({}) OR ({})", fmt_expr(a), fmt_expr(b)),
        ScalarExpr::BinaryOp { left, op, right } => {
            format!("({}) {:?} ({})", fmt_expr(left), op, fmt_expr(right))
        }
        ScalarExpr::ScalarFn { name, args } => format!(
            "{}({})",
            name,
            args.iter().map(fmt_expr).collect::<Vec<_>>().join(", ")
        ),
    }
}
