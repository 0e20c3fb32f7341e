//! Query execution core: routing, retries and diagnostics.
//!
//! Architecture role:
//! - [`query_exec::QueryExec`] is the entry point; it owns the pipeline
//!   from SQL text to an executed result
//! - [`router`] classifies candidate plans as local or distributed
//! - [`coordinator::RetryCoordinator`] drives the alternative list and the
//!   bounded enhanced push-down retry chain
//! - [`diagnostics`] assembles the multi-section failure / dry-run report
//!
//! The local evaluator ships in-crate ([`local::LocalPlanExec`]); the
//! distributed evaluator is injected behind [`exec::PlanExec`].

pub mod context;
pub mod coordinator;
pub mod diagnostics;
pub mod exec;
pub mod local;
pub mod query_exec;
pub mod router;


pub use context::{CancelFlag, QueryContext, QueryTrace, Realization, SubPlanMatch};
pub use coordinator::{RetryCoordinator, MAX_TRY_TIMES_OPTIMIZED};
pub use diagnostics::{build_report, DRY_RUN_TIP};
pub use exec::{AsyncResultSink, ColumnMeta, ExecuteResult, PlanExec, Row};
pub use local::LocalPlanExec;
pub use query_exec::{QueryExec, QueryOptions, QueryOutcome};
pub use router::{route, EngineKind};
