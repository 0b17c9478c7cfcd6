//! flow-core: progresión de runs sobre un pipeline lineal fijo.
pub mod constants;
pub mod dispatch;
pub mod errors;
pub mod executor;
pub mod handler;
pub mod hashing;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod rollup;
pub mod store;

pub use dispatch::{Dispatcher, InMemoryDispatcher, StepTask};
pub use errors::FlowError;
pub use executor::{StepExecutor, StepOutcome};
pub use handler::{HandlerContext, HandlerError, HandlerRegistry, StepHandler};
pub use model::{Artifact, NewRun, Run, RunReport, RunStatus, Step, StepStatus};
pub use orchestrator::{CycleReport, Orchestrator, RunAdvance};
pub use pipeline::{pipeline_hash, Pipeline, PipelineEntry, LOCKED_PIPELINE};
pub use rollup::{derive_run_status, in_flight_count, rollup, FailReason, Rollup};
pub use store::{ArtifactReader, ClaimOutcome, InMemoryRunStore, RunStore};
