//! The producer seam: opaque content workers behind a typed trait.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tiercast_shared::{Module, Result};

use crate::manifest::PhaseManifest;

/// A content producer.
///
/// Producers are opaque: they receive the manifests of their phase's
/// predecessors and return structured modules. They must not reach any other
/// pipeline state.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Registry name, unique within a [`ProducerRegistry`](crate::ProducerRegistry).
    fn name(&self) -> &str;

    /// Keywords used by the collaborator advisory.
    fn keywords(&self) -> &[String] {
        &[]
    }

    /// Produce modules for one attempt.
    async fn produce(&self, ctx: PhaseContext) -> Result<Vec<Module>>;
}

/// Everything a producer may see for one attempt.
#[derive(Debug, Clone)]
pub struct PhaseContext {
    pub run_id: Uuid,
    pub phase: String,
    /// 1-based attempt number.
    pub attempt: u32,
    inputs: BTreeMap<String, Arc<PhaseManifest>>,
    cancel: CancellationToken,
}

impl PhaseContext {
    pub fn new(
        run_id: Uuid,
        phase: impl Into<String>,
        inputs: BTreeMap<String, Arc<PhaseManifest>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            phase: phase.into(),
            attempt: 1,
            inputs,
            cancel,
        }
    }

    pub(crate) fn with_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }

    /// Manifest of one declared predecessor.
    pub fn input(&self, phase: &str) -> Option<&PhaseManifest> {
        self.inputs.get(phase).map(Arc::as_ref)
    }

    /// Manifests of every declared predecessor, by phase name.
    pub fn inputs(&self) -> impl Iterator<Item = &PhaseManifest> {
        self.inputs.values().map(Arc::as_ref)
    }

    /// Every module from every predecessor manifest.
    pub fn input_modules(&self) -> impl Iterator<Item = &Module> {
        self.inputs().flat_map(|m| m.modules.iter())
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
