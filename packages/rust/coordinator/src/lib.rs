//! Phase coordination for the content production pipeline.
//!
//! Phases form a DAG declared in registration order. A phase runs its
//! producers concurrently on a bounded pool, collects their output into a
//! [`PhaseManifest`], and only promotes that manifest once every producer has
//! succeeded. Later phases see nothing but the manifests of their declared
//! predecessors.

pub mod advisory;
pub mod engine;
pub mod manifest;
pub mod producer;
pub mod producers;
pub mod registry;

pub use advisory::{CollaboratorSuggestion, advise_collaborators};
pub use engine::{PhaseCoordinator, PhaseResult, PhaseStats, PhaseStatus, PipelineResult};
pub use manifest::{PhaseManifest, ProducerFailure};
pub use producer::{PhaseContext, Producer};
pub use registry::ProducerRegistry;
