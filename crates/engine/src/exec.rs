//! Executor interfaces and the execution result shape.

use arrow_schema::DataType;
use serde::Serialize;

use qx_common::Result;
use qx_planner::{Literal, RelRef, RowType};

use crate::context::QueryContext;

/// Output column metadata: name, type, nullability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnMeta {
    pub fn from_row_type(row_type: &RowType) -> Vec<ColumnMeta> {
        row_type
            .fields()
            .iter()
            .map(|f| ColumnMeta {
                name: f.name.clone(),
                data_type: f.data_type.clone(),
                nullable: f.nullable,
            })
            .collect()
    }
}

/// One result row, positionally aligned with the column metadata.
pub type Row = Vec<Literal>;

/// Column metadata plus a lazily-produced, single-pass row sequence.
///
/// The row iterator is finite and not restartable; consuming it twice is
/// undefined, callers must capture it once.
pub struct ExecuteResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Box<dyn Iterator<Item = Result<Row>> + Send>,
}

impl ExecuteResult {
    pub fn empty(columns: Vec<ColumnMeta>) -> Self {
        Self {
            columns,
            rows: Box::new(std::iter::empty()),
        }
    }

    pub fn from_rows(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: Box::new(rows.into_iter().map(Ok)),
        }
    }

    /// Drain the row source into memory. Consumes the single pass.
    pub fn collect_rows(self) -> Result<Vec<Row>> {
        self.rows.collect()
    }
}

impl std::fmt::Debug for ExecuteResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteResult")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// Plan evaluator interface, implemented by the local constant-query
/// evaluator and by the distributed evaluator.
///
/// Failure contract: `NoRealizationFound` when no physical access path
/// matches the plan shape, `Unsupported` when the plan uses a construct the
/// evaluator cannot run, `Execution` for anything else.
pub trait PlanExec: Send + Sync {
    fn execute_to_iterable(&self, plan: &RelRef, ctx: &mut QueryContext)
        -> Result<ExecuteResult>;
}

/// Optional sink for queries tagged asynchronous: it consumes the result's
/// row source for persistence. A sink failure must never mask the query's
/// own outcome; callers log it and return the column metadata regardless.
pub trait AsyncResultSink: Send + Sync {
    fn persist(&self, result: ExecuteResult, ctx: &QueryContext) -> Result<()>;
}
