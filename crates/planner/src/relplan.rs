//! Immutable relational plan tree.
//!
//! Nodes form a closed sum type over operator kinds; children are shared
//! `Arc`s and rewriting always allocates new nodes, so a plan reachable from
//! a previously returned root never changes underneath its holder.

use arrow_schema::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use qx_common::{QxError, Result};

/// Shared handle to an immutable plan node.
pub type RelRef = Arc<RelNode>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
    Null,
}

impl Literal {
    pub fn data_type(&self) -> DataType {
        match self {
            Literal::Int64(_) => DataType::Int64,
            Literal::Float64(_) => DataType::Float64,
            Literal::Utf8(_) => DataType::Utf8,
            Literal::Boolean(_) => DataType::Boolean,
            Literal::Null => DataType::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarExpr {
    Column(String),
    Literal(Literal),
    BinaryOp {
        left: Box<ScalarExpr>,
        op: BinaryOp,
        right: Box<ScalarExpr>,
    },
    And(Box<ScalarExpr>, Box<ScalarExpr>),
    Or(Box<ScalarExpr>, Box<ScalarExpr>),
    Not(Box<ScalarExpr>),
    Cast {
        expr: Box<ScalarExpr>,
        to_type: DataType,
    },
    ScalarFn {
        name: String,
        args: Vec<ScalarExpr>,
    },
}

/// One aggregate invocation inside an [`RelNode::Aggregate`].
///
/// `func` is the uppercase function name; `arg` is `None` for `COUNT(*)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggCall {
    pub func: String,
    pub distinct: bool,
    pub arg: Option<ScalarExpr>,
    /// Output column name of this call.
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
}

/// A named, typed, nullable output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnField {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnField {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

/// Ordered list of output columns; the validated row type of a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowType {
    fields: Vec<ColumnField>,
}

impl RowType {
    pub fn new(fields: Vec<ColumnField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[ColumnField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&ColumnField> {
        self.fields
            .iter()
            .find(|f| f.name == name || strip_qualifier(&f.name) == strip_qualifier(name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Concatenate two row types (join output shape).
    pub fn join(&self, other: &RowType) -> RowType {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.clone());
        RowType::new(fields)
    }
}

/// Drop a leading `table.` qualifier from a column name.
pub fn strip_qualifier(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((_, tail)) => tail,
        None => name,
    }
}

/// One logical operator in a query plan tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelNode {
    TableScan {
        table: String,
        schema: RowType,
    },
    Values {
        row_type: RowType,
        rows: Vec<Vec<Literal>>,
    },
    Project {
        exprs: Vec<(ScalarExpr, String)>,
        input: RelRef,
    },
    Filter {
        predicate: ScalarExpr,
        input: RelRef,
    },
    Aggregate {
        group_exprs: Vec<ScalarExpr>,
        agg_calls: Vec<AggCall>,
        input: RelRef,
    },
    Join {
        left: RelRef,
        right: RelRef,
        on: Vec<(String, String)>,
        join_type: JoinType,
    },
    Limit {
        n: usize,
        input: RelRef,
    },
}

impl RelNode {
    /// Ordered child plans.
    pub fn inputs(&self) -> Vec<&RelRef> {
        match self {
            RelNode::TableScan { .. } | RelNode::Values { .. } => vec![],
            RelNode::Project { input, .. }
            | RelNode::Filter { input, .. }
            | RelNode::Aggregate { input, .. }
            | RelNode::Limit { input, .. } => vec![input],
            RelNode::Join { left, right, .. } => vec![left, right],
        }
    }

    /// Derive the output row type of this operator.
    pub fn row_type(&self) -> RowType {
        match self {
            RelNode::TableScan { schema, .. } => schema.clone(),
            RelNode::Values { row_type, .. } => row_type.clone(),
            RelNode::Project { exprs, input } => {
                let in_type = input.row_type();
                RowType::new(
                    exprs
                        .iter()
                        .map(|(e, name)| {
                            let (data_type, nullable) = expr_type(e, &in_type);
                            ColumnField::new(name.clone(), data_type, nullable)
                        })
                        .collect(),
                )
            }
            RelNode::Filter { input, .. } | RelNode::Limit { input, .. } => input.row_type(),
            RelNode::Aggregate {
                group_exprs,
                agg_calls,
                input,
            } => {
                let in_type = input.row_type();
                let mut fields = Vec::with_capacity(group_exprs.len() + agg_calls.len());
                for g in group_exprs {
                    let (data_type, nullable) = expr_type(g, &in_type);
                    fields.push(ColumnField::new(expr_name(g), data_type, nullable));
                }
                for call in agg_calls {
                    let (data_type, nullable) = agg_type(call, &in_type);
                    fields.push(ColumnField::new(call.name.clone(), data_type, nullable));
                }
                RowType::new(fields)
            }
            RelNode::Join { left, right, .. } => left.row_type().join(&right.row_type()),
        }
    }

    /// Stable one-line digest of this sub-plan's shape. Join digests identify
    /// sub-plan regions that went unmatched during realization lookup.
    pub fn digest(&self) -> String {
        match self {
            RelNode::TableScan { table, .. } => format!("Scan({table})"),
            RelNode::Values { rows, .. } => format!("Values(rows={})", rows.len()),
            RelNode::Project { exprs, input } => {
                format!("Project(n={},{})", exprs.len(), input.digest())
            }
            RelNode::Filter { input, .. } => format!("Filter({})", input.digest()),
            RelNode::Aggregate {
                group_exprs,
                agg_calls,
                input,
            } => format!(
                "Agg(g={},a={},{})",
                group_exprs.len(),
                agg_calls.len(),
                input.digest()
            ),
            RelNode::Join {
                left,
                right,
                on,
                join_type,
            } => format!(
                "Join({join_type:?},on={:?},{},{})",
                on,
                left.digest(),
                right.digest()
            ),
            RelNode::Limit { n, input } => format!("Limit({n},{})", input.digest()),
        }
    }

    /// True iff any node in the tree (self included) is a data scan.
    pub fn contains_scan(&self) -> bool {
        if matches!(self, RelNode::TableScan { .. }) {
            return true;
        }
        self.inputs().iter().any(|i| i.contains_scan())
    }

    /// JSON rendering for verbose diagnostics and plan persistence.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| QxError::Execution(format!("plan encode failed: {e}")))
    }
}

impl fmt::Display for RelNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digest())
    }
}

/// Fallback output name for a group expression.
pub fn expr_name(e: &ScalarExpr) -> String {
    match e {
        ScalarExpr::Column(c) => c.clone(),
        ScalarExpr::Literal(_) => "lit".to_string(),
        _ => "expr".to_string(),
    }
}

/// Infer `(type, nullable)` of a scalar expression over an input row type.
pub fn expr_type(e: &ScalarExpr, input: &RowType) -> (DataType, bool) {
    match e {
        ScalarExpr::Column(c) => input
            .field(c)
            .map(|f| (f.data_type.clone(), f.nullable))
            .unwrap_or((DataType::Null, true)),
        ScalarExpr::Literal(v) => (v.data_type(), matches!(v, Literal::Null)),
        ScalarExpr::BinaryOp { left, op, right } => {
            if op.is_comparison() {
                (DataType::Boolean, true)
            } else {
                let (lt, ln) = expr_type(left, input);
                let (rt, rn) = expr_type(right, input);
                let out = if lt == DataType::Float64 || rt == DataType::Float64 {
                    DataType::Float64
                } else {
                    DataType::Int64
                };
                (out, ln || rn)
            }
        }
        ScalarExpr::And(_, _) | ScalarExpr::Or(_, _) | ScalarExpr::Not(_) => {
            (DataType::Boolean, true)
        }
        ScalarExpr::Cast { to_type, expr } => {
            let (_, nullable) = expr_type(expr, input);
            (to_type.clone(), nullable)
        }
        ScalarExpr::ScalarFn { name, args } => match name.as_str() {
            "UPPER" | "LOWER" | "CONCAT" | "TRIM" => (DataType::Utf8, true),
            "LENGTH" => (DataType::Int64, true),
            "ABS" => args
                .first()
                .map(|a| expr_type(a, input))
                .unwrap_or((DataType::Float64, true)),
            _ => (DataType::Float64, true),
        },
    }
}

/// Infer `(type, nullable)` of an aggregate call over an input row type.
pub fn agg_type(call: &AggCall, input: &RowType) -> (DataType, bool) {
    match call.func.as_str() {
        "COUNT" | "COUNT_DISTINCT" => (DataType::Int64, false),
        "AVG" => (DataType::Float64, true),
        "BITMAP_BUILD" | "BITMAP_UUID" => (DataType::Binary, true),
        // SUM/MIN/MAX keep the argument type
        _ => call
            .arg
            .as_ref()
            .map(|a| {
                let (t, _) = expr_type(a, input);
                (t, true)
            })
            .unwrap_or((DataType::Int64, true)),
    }
}

/// Columns referenced by an expression (qualifier stripped).
pub fn expr_columns(e: &ScalarExpr, out: &mut Vec<String>) {
    match e {
        ScalarExpr::Column(c) => out.push(strip_qualifier(c).to_string()),
        ScalarExpr::Literal(_) => {}
        ScalarExpr::BinaryOp { left, right, .. } => {
            expr_columns(left, out);
            expr_columns(right, out);
        }
        ScalarExpr::And(a, b) | ScalarExpr::Or(a, b) => {
            expr_columns(a, out);
            expr_columns(b, out);
        }
        ScalarExpr::Not(x) => expr_columns(x, out),
        ScalarExpr::Cast { expr, .. } => expr_columns(expr, out),
        ScalarExpr::ScalarFn { args, .. } => {
            for a in args {
                expr_columns(a, out);
            }
        }
    }
}
