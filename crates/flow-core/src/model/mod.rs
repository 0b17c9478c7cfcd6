//! Modelos del core (Run, Step, Artifact y sus estados).

pub mod artifact;
pub mod run;
pub mod status;
pub mod step;

pub use artifact::{artifact_kind_for, payload_hash, Artifact};
pub use run::{NewRun, Run, RunReport};
pub use status::{RunStatus, StepStatus};
pub use step::{truncate_error, Step};
