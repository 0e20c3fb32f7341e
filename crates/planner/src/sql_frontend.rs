//! SQL frontend: parse and validate SQL text against the catalog, producing
//! a relational plan root plus its validated row type.

use arrow_schema::DataType;
use sqlparser::ast::{
    BinaryOperator as SqlBinaryOp, DataType as SqlDataType, DuplicateTreatment,
    Expr as SqlExpr, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, Ident,
    JoinConstraint, JoinOperator, ObjectName, Query, SelectItem, SetExpr, Statement, TableFactor,
    TableWithJoins, UnaryOperator, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;

use qx_common::{QxError, Result};

use crate::catalog::CatalogReader;
use crate::relplan::{
    AggCall, BinaryOp, JoinType, Literal, RelNode, RelRef, RowType, ScalarExpr,
};

/// Aggregate functions the frontend recognizes.
const AGG_FUNCS: &[&str] = &["COUNT", "SUM", "MIN", "MAX", "AVG", "BITMAP_BUILD"];

/// Parse and validate one SQL statement, binding 0-based positional
/// parameters, and return the plan root with its validated row type.
pub fn parse(
    sql: &str,
    params: &[Literal],
    catalog: &dyn CatalogReader,
) -> Result<(RelRef, RowType)> {
    let stmts = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|e| QxError::Parse(e.to_string()))?;
    if stmts.len() != 1 {
        return Err(QxError::Unsupported(
            "only single-statement SQL is supported".to_string(),
        ));
    }
    let mut binder = ParamBinder { params, next: 0 };
    let plan = match &stmts[0] {
        Statement::Query(q) => query_to_plan(q, &mut binder, catalog)?,
        _ => {
            return Err(QxError::Unsupported(
                "only SELECT queries are supported".to_string(),
            ))
        }
    };
    let row_type = plan.row_type();
    Ok((plan, row_type))
}

/// Binds `?` (sequential) and `$N` (explicit, 1-based) placeholders against
/// a 0-based positional parameter list.
struct ParamBinder<'a> {
    params: &'a [Literal],
    next: usize,
}

impl ParamBinder<'_> {
    fn bind(&mut self, placeholder: &str) -> Result<Literal> {
        let idx = if placeholder == "?" {
            let i = self.next;
            self.next += 1;
            i
        } else {
            let digits = placeholder.trim_start_matches(['$', ':']);
            let n: usize = digits.parse().map_err(|_| {
                QxError::Parse(format!("bad parameter placeholder: {placeholder}"))
            })?;
            n.checked_sub(1)
                .ok_or_else(|| QxError::Parse(format!("bad parameter placeholder: {placeholder}")))?
        };
        self.params.get(idx).cloned().ok_or_else(|| {
            QxError::Parse(format!(
                "missing positional parameter {idx} (placeholder={placeholder})"
            ))
        })
    }
}

fn query_to_plan(
    q: &Query,
    binder: &mut ParamBinder<'_>,
    catalog: &dyn CatalogReader,
) -> Result<RelRef> {
    let select = match &*q.body {
        SetExpr::Select(s) => s.as_ref(),
        _ => {
            return Err(QxError::Unsupported(
                "only simple SELECT is supported (no UNION/EXCEPT/INTERSECT)".to_string(),
            ))
        }
    };

    // FROM + JOINs; a missing FROM becomes a single-row Values input.
    let mut plan = from_to_plan(&select.from, catalog)?;
    let input_type = plan.row_type();

    // WHERE
    if let Some(selection) = &select.selection {
        let predicate = sql_expr_to_expr(selection, binder, &input_type)?;
        plan = Arc::new(RelNode::Filter {
            predicate,
            input: plan,
        });
    }

    // GROUP BY
    let group_exprs = group_by_exprs(&select.group_by, binder, &input_type)?;
    let mut agg_calls: Vec<AggCall> = vec![];
    let mut proj_exprs: Vec<(ScalarExpr, String)> = vec![];

    // SELECT list. Aggregate calls (or a GROUP BY) force an Aggregate node
    // below the shaping Projection.
    let mut saw_agg = false;
    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(e) => {
                if let Some(call) = try_parse_agg(e, None, binder, &input_type)? {
                    saw_agg = true;
                    proj_exprs.push((ScalarExpr::Column(call.name.clone()), call.name.clone()));
                    agg_calls.push(call);
                } else {
                    let expr = sql_expr_to_expr(e, binder, &input_type)?;
                    let name = fallback_name(&expr, proj_exprs.len());
                    proj_exprs.push((expr, name));
                }
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                let alias_name = alias.value.clone();
                if let Some(call) = try_parse_agg(expr, Some(alias_name.clone()), binder, &input_type)? {
                    saw_agg = true;
                    proj_exprs.push((ScalarExpr::Column(call.name.clone()), call.name.clone()));
                    agg_calls.push(call);
                } else {
                    let expr = sql_expr_to_expr(expr, binder, &input_type)?;
                    proj_exprs.push((expr, alias_name));
                }
            }
            SelectItem::Wildcard(_) => {
                // Expanded from the catalog-visible schema; a fully masked
                // table legitimately expands to zero columns.
                for f in input_type.fields() {
                    proj_exprs.push((ScalarExpr::Column(f.name.clone()), f.name.clone()));
                }
            }
            SelectItem::QualifiedWildcard(_, _) => {
                return Err(QxError::Unsupported(
                    "qualified wildcard is not supported".to_string(),
                ))
            }
        }
    }

    if saw_agg || !group_exprs.is_empty() {
        plan = Arc::new(RelNode::Aggregate {
            group_exprs,
            agg_calls,
            input: plan,
        });
    }
    plan = Arc::new(RelNode::Project {
        exprs: proj_exprs,
        input: plan,
    });

    if let Some(limit_expr) = &q.limit {
        let n = sql_limit_to_usize(limit_expr, binder, &input_type)?;
        plan = Arc::new(RelNode::Limit { n, input: plan });
    }

    Ok(plan)
}

fn from_to_plan(from: &[TableWithJoins], catalog: &dyn CatalogReader) -> Result<RelRef> {
    if from.is_empty() {
        // SELECT without FROM: one empty tuple to project constants from.
        return Ok(Arc::new(RelNode::Values {
            row_type: RowType::default(),
            rows: vec![vec![]],
        }));
    }
    if from.len() != 1 {
        return Err(QxError::Unsupported(
            "only one FROM source is supported".to_string(),
        ));
    }
    let twj = &from[0];
    let mut left = table_factor_to_scan(&twj.relation, catalog)?;

    for j in &twj.joins {
        let right = table_factor_to_scan(&j.relation, catalog)?;
        match &j.join_operator {
            JoinOperator::Inner(constraint) => {
                let on = join_constraint_to_on_pairs(constraint, &left, &right)?;
                left = Arc::new(RelNode::Join {
                    left,
                    right,
                    on,
                    join_type: JoinType::Inner,
                });
            }
            JoinOperator::LeftOuter(constraint) => {
                let on = join_constraint_to_on_pairs(constraint, &left, &right)?;
                left = Arc::new(RelNode::Join {
                    left,
                    right,
                    on,
                    join_type: JoinType::Left,
                });
            }
            _ => {
                return Err(QxError::Unsupported(
                    "only INNER and LEFT JOIN are supported".to_string(),
                ))
            }
        }
    }
    Ok(left)
}

fn table_factor_to_scan(tf: &TableFactor, catalog: &dyn CatalogReader) -> Result<RelRef> {
    match tf {
        TableFactor::Table { name, .. } => {
            let table = object_name_to_string(name);
            let schema = catalog.table_schema(&table)?;
            Ok(Arc::new(RelNode::TableScan { table, schema }))
        }
        _ => Err(QxError::Unsupported(
            "only simple table names in FROM are supported".to_string(),
        )),
    }
}

fn join_constraint_to_on_pairs(
    constraint: &JoinConstraint,
    left: &RelRef,
    right: &RelRef,
) -> Result<Vec<(String, String)>> {
    match constraint {
        JoinConstraint::On(expr) => {
            let mut pairs = vec![];
            collect_equi_join_pairs(expr, &mut pairs)?;
            if pairs.is_empty() {
                return Err(QxError::Unsupported(
                    "JOIN ... ON must contain at least one equi-condition (a = b)".to_string(),
                ));
            }
            let (lt, rt) = (left.row_type(), right.row_type());
            for (lk, rk) in &pairs {
                if lt.field(lk).is_none() {
                    return Err(QxError::Parse(format!(
                        "join key '{lk}' not found on left side"
                    )));
                }
                if rt.field(rk).is_none() {
                    return Err(QxError::Parse(format!(
                        "join key '{rk}' not found on right side"
                    )));
                }
            }
            Ok(pairs)
        }
        _ => Err(QxError::Unsupported("JOIN requires ON ...".to_string())),
    }
}

fn collect_equi_join_pairs(expr: &SqlExpr, out: &mut Vec<(String, String)>) -> Result<()> {
    match expr {
        SqlExpr::BinaryOp { left, op, right } => {
            if *op == SqlBinaryOp::Eq {
                let l = sql_ident_expr_to_col(left)?;
                let r = sql_ident_expr_to_col(right)?;
                out.push((l, r));
                return Ok(());
            }
            if *op == SqlBinaryOp::And {
                collect_equi_join_pairs(left, out)?;
                collect_equi_join_pairs(right, out)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn group_by_exprs(
    g: &GroupByExpr,
    binder: &mut ParamBinder<'_>,
    input: &RowType,
) -> Result<Vec<ScalarExpr>> {
    match g {
        GroupByExpr::Expressions(es, _mods) => es
            .iter()
            .map(|e| sql_expr_to_expr(e, binder, input))
            .collect(),
        GroupByExpr::All(_mods) => Err(QxError::Unsupported(
            "GROUP BY ALL is not supported".to_string(),
        )),
    }
}

fn try_parse_agg(
    e: &SqlExpr,
    alias: Option<String>,
    binder: &mut ParamBinder<'_>,
    input: &RowType,
) -> Result<Option<AggCall>> {
    let func = match e {
        SqlExpr::Function(f) => f,
        _ => return Ok(None),
    };
    let fname = object_name_to_string(&func.name).to_uppercase();
    if !AGG_FUNCS.contains(&fname.as_str()) {
        return Ok(None);
    }

    let (distinct, args) = match &func.args {
        FunctionArguments::List(list) => (
            list.duplicate_treatment == Some(DuplicateTreatment::Distinct),
            list.args.as_slice(),
        ),
        _ => (false, &[][..]),
    };

    let arg = match args.first() {
        Some(FunctionArg::Unnamed(FunctionArgExpr::Wildcard)) => None,
        Some(FunctionArg::Unnamed(FunctionArgExpr::Expr(inner))) => {
            Some(sql_expr_to_expr(inner, binder, input)?)
        }
        Some(_) => {
            return Err(QxError::Unsupported(
                "unsupported aggregate argument form".to_string(),
            ))
        }
        None if fname == "COUNT" => None,
        None => {
            return Err(QxError::Parse(format!("{fname}() requires one argument")));
        }
    };
    if arg.is_none() && fname != "COUNT" {
        return Err(QxError::Unsupported(format!(
            "{fname}(*) is not supported (use an explicit column)"
        )));
    }

    let name = alias.unwrap_or_else(|| format!("{fname}()"));
    Ok(Some(AggCall {
        func: fname,
        distinct,
        arg,
        name,
    }))
}

fn sql_expr_to_expr(
    e: &SqlExpr,
    binder: &mut ParamBinder<'_>,
    input: &RowType,
) -> Result<ScalarExpr> {
    match e {
        SqlExpr::Identifier(id) => resolve_column(&id.value, input),
        SqlExpr::CompoundIdentifier(parts) => {
            resolve_column(&compound_ident_to_string(parts), input)
        }
        SqlExpr::Value(v) => sql_value_to_literal(v, binder),
        SqlExpr::Nested(inner) => sql_expr_to_expr(inner, binder, input),
        SqlExpr::BinaryOp { left, op, right } => {
            if *op == SqlBinaryOp::And {
                return Ok(ScalarExpr::And(
                    Box::new(sql_expr_to_expr(left, binder, input)?),
                    Box::new(sql_expr_to_expr(right, binder, input)?),
                ));
            }
            if *op == SqlBinaryOp::Or {
                return Ok(ScalarExpr::Or(
                    Box::new(sql_expr_to_expr(left, binder, input)?),
                    Box::new(sql_expr_to_expr(right, binder, input)?),
                ));
            }
            Ok(ScalarExpr::BinaryOp {
                left: Box::new(sql_expr_to_expr(left, binder, input)?),
                op: sql_binop_to_binop(op)?,
                right: Box::new(sql_expr_to_expr(right, binder, input)?),
            })
        }
        SqlExpr::UnaryOp { op, expr } => match op {
            UnaryOperator::Not => Ok(ScalarExpr::Not(Box::new(sql_expr_to_expr(
                expr, binder, input,
            )?))),
            UnaryOperator::Minus => Ok(ScalarExpr::BinaryOp {
                left: Box::new(ScalarExpr::Literal(Literal::Int64(0))),
                op: BinaryOp::Minus,
                right: Box::new(sql_expr_to_expr(expr, binder, input)?),
            }),
            _ => Err(QxError::Unsupported(format!("unsupported unary op: {op}"))),
        },
        SqlExpr::Cast {
            expr, data_type, ..
        } => Ok(ScalarExpr::Cast {
            expr: Box::new(sql_expr_to_expr(expr, binder, input)?),
            to_type: sql_type_to_arrow(data_type)?,
        }),
        SqlExpr::Function(f) => {
            let name = object_name_to_string(&f.name).to_uppercase();
            if AGG_FUNCS.contains(&name.as_str()) {
                return Err(QxError::Parse(format!(
                    "aggregate {name}() is not allowed here"
                )));
            }
            let args = match &f.args {
                FunctionArguments::List(list) => list
                    .args
                    .iter()
                    .map(|a| match a {
                        FunctionArg::Unnamed(FunctionArgExpr::Expr(inner)) => {
                            sql_expr_to_expr(inner, binder, input)
                        }
                        _ => Err(QxError::Unsupported(
                            "unsupported function argument form".to_string(),
                        )),
                    })
                    .collect::<Result<Vec<_>>>()?,
                FunctionArguments::None => vec![],
                _ => {
                    return Err(QxError::Unsupported(
                        "unsupported function argument form".to_string(),
                    ))
                }
            };
            Ok(ScalarExpr::ScalarFn { name, args })
        }
        _ => Err(QxError::Unsupported(format!(
            "unsupported SQL expression: {e}"
        ))),
    }
}

fn resolve_column(name: &str, input: &RowType) -> Result<ScalarExpr> {
    match input.field(name) {
        Some(f) => Ok(ScalarExpr::Column(f.name.clone())),
        None => Err(QxError::Parse(format!("column '{name}' not found"))),
    }
}

fn sql_value_to_literal(v: &Value, binder: &mut ParamBinder<'_>) -> Result<ScalarExpr> {
    match v {
        Value::Number(s, _) => {
            if s.contains('.') {
                let f: f64 = s
                    .parse()
                    .map_err(|_| QxError::Parse(format!("bad number: {s}")))?;
                Ok(ScalarExpr::Literal(Literal::Float64(f)))
            } else {
                let i: i64 = s
                    .parse()
                    .map_err(|_| QxError::Parse(format!("bad number: {s}")))?;
                Ok(ScalarExpr::Literal(Literal::Int64(i)))
            }
        }
        Value::SingleQuotedString(s) => Ok(ScalarExpr::Literal(Literal::Utf8(s.clone()))),
        Value::Boolean(b) => Ok(ScalarExpr::Literal(Literal::Boolean(*b))),
        Value::Null => Ok(ScalarExpr::Literal(Literal::Null)),
        Value::Placeholder(ph) => Ok(ScalarExpr::Literal(binder.bind(ph)?)),
        _ => Err(QxError::Unsupported(format!("unsupported SQL literal: {v}"))),
    }
}

fn sql_limit_to_usize(
    e: &SqlExpr,
    binder: &mut ParamBinder<'_>,
    input: &RowType,
) -> Result<usize> {
    match sql_expr_to_expr(e, binder, input)? {
        ScalarExpr::Literal(Literal::Int64(i)) if i >= 0 => Ok(i as usize),
        ScalarExpr::Literal(Literal::Int64(_)) => {
            Err(QxError::Parse("LIMIT must be non-negative".to_string()))
        }
        _ => Err(QxError::Parse(
            "LIMIT must be a literal integer or bound parameter".to_string(),
        )),
    }
}

fn sql_binop_to_binop(op: &SqlBinaryOp) -> Result<BinaryOp> {
    Ok(match op {
        SqlBinaryOp::Eq => BinaryOp::Eq,
        SqlBinaryOp::NotEq => BinaryOp::NotEq,
        SqlBinaryOp::Lt => BinaryOp::Lt,
        SqlBinaryOp::LtEq => BinaryOp::LtEq,
        SqlBinaryOp::Gt => BinaryOp::Gt,
        SqlBinaryOp::GtEq => BinaryOp::GtEq,
        SqlBinaryOp::Plus => BinaryOp::Plus,
        SqlBinaryOp::Minus => BinaryOp::Minus,
        SqlBinaryOp::Multiply => BinaryOp::Multiply,
        SqlBinaryOp::Divide => BinaryOp::Divide,
        _ => {
            return Err(QxError::Unsupported(format!(
                "unsupported binary operator: {op}"
            )))
        }
    })
}

fn sql_type_to_arrow(t: &SqlDataType) -> Result<DataType> {
    Ok(match t {
        SqlDataType::Double | SqlDataType::DoublePrecision | SqlDataType::Float8
        | SqlDataType::Real => DataType::Float64,
        SqlDataType::Int(_) | SqlDataType::Integer(_) | SqlDataType::BigInt(_) => DataType::Int64,
        SqlDataType::Varchar(_) | SqlDataType::Text | SqlDataType::String(_) => DataType::Utf8,
        SqlDataType::Boolean => DataType::Boolean,
        _ => {
            return Err(QxError::Unsupported(format!(
                "unsupported CAST target type: {t}"
            )))
        }
    })
}

fn object_name_to_string(n: &ObjectName) -> String {
    n.0.iter()
        .map(|i| i.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

fn compound_ident_to_string(parts: &[Ident]) -> String {
    parts
        .iter()
        .map(|i| i.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

fn sql_ident_expr_to_col(e: &SqlExpr) -> Result<String> {
    match e {
        SqlExpr::Identifier(id) => Ok(id.value.clone()),
        SqlExpr::CompoundIdentifier(parts) => Ok(compound_ident_to_string(parts)),
        _ => Err(QxError::Unsupported(
            "JOIN keys must be column identifiers".to_string(),
        )),
    }
}

fn fallback_name(e: &ScalarExpr, position: usize) -> String {
    match e {
        ScalarExpr::Column(c) => c.clone(),
        ScalarExpr::Literal(_) => format!("EXPR${position}"),
        _ => format!("EXPR${position}"),
    }
}
