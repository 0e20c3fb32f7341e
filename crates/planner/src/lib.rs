//! SQL frontend, relational plan model, cost-based optimizer and heuristic
//! rewriter.
//!
//! The pipeline is: `sql_frontend::parse` builds a validated [`RelRef`] tree
//! from SQL text against a [`CatalogReader`], [`CostOptimizer::optimize`]
//! runs the rule-driven cost search, and [`rewrite::post_optimize`] applies
//! the feature-flagged heuristic passes and produces the ordered plan
//! alternative list the execution layer walks.

pub mod catalog;
pub mod explain;
pub mod optimizer;
pub mod relplan;
pub mod rewrite;
pub mod sql_frontend;

pub use catalog::{CatalogReader, InMemoryCatalog};
pub use explain::explain_rel;
pub use optimizer::{CostModel, CostOptimizer, CostRule, DefaultCostModel, plan_cost};
pub use relplan::{
    AggCall, BinaryOp, ColumnField, JoinType, Literal, RelNode, RelRef, RowType, ScalarExpr,
};
pub use rewrite::{aggregate_pushdown, post_optimize};
