//! Per-phase output manifests and the collector that assembles them.

use std::collections::HashSet;

use serde::Serialize;

use tiercast_shared::Module;

/// The promoted output of a completed phase.
///
/// Modules are ordered by producer declaration order, then by the order each
/// producer returned them, regardless of completion timing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseManifest {
    pub phase: String,
    pub modules: Vec<Module>,
    /// `(producer, module count)` in declaration order.
    pub producers: Vec<(String, usize)>,
}

impl PhaseManifest {
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// A producer that did not succeed within its retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProducerFailure {
    pub producer: String,
    pub attempts: u32,
    pub error: String,
}

/// What a producer task reports back over the channel.
#[derive(Debug)]
pub(crate) struct ProducerReport {
    pub slot: usize,
    pub producer: String,
    pub attempts: u32,
    pub outcome: std::result::Result<Vec<Module>, String>,
}

/// Single consumer of producer reports for one phase run.
///
/// Output stays staged here until [`ManifestCollector::finish`]; a phase with
/// any failure never yields a manifest.
pub(crate) struct ManifestCollector {
    phase: String,
    producers: Vec<String>,
    staged: Vec<Option<Vec<Module>>>,
    failures: Vec<ProducerFailure>,
    attempts: u32,
    staged_modules: usize,
}

impl ManifestCollector {
    pub fn new(phase: &str, producers: &[String]) -> Self {
        Self {
            phase: phase.to_string(),
            producers: producers.to_vec(),
            staged: vec![None; producers.len()],
            failures: Vec::new(),
            attempts: 0,
            staged_modules: 0,
        }
    }

    pub fn accept(&mut self, report: ProducerReport) {
        self.attempts += report.attempts;
        match report.outcome {
            Ok(modules) => {
                self.staged_modules += modules.len();
                if let Some(slot) = self.staged.get_mut(report.slot) {
                    *slot = Some(modules);
                }
            }
            Err(error) => self.failures.push(ProducerFailure {
                producer: report.producer,
                attempts: report.attempts,
                error,
            }),
        }
    }

    pub fn fail(&mut self, producer: &str, attempts: u32, error: impl Into<String>) {
        self.failures.push(ProducerFailure {
            producer: producer.to_string(),
            attempts,
            error: error.into(),
        });
    }

    /// Total attempts across all reports so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Modules received, promoted or not.
    pub fn staged_modules(&self) -> usize {
        self.staged_modules
    }

    /// Promote the staged output, or return every failure.
    pub fn finish(mut self) -> std::result::Result<PhaseManifest, Vec<ProducerFailure>> {
        for (slot, producer) in self.staged.iter().zip(&self.producers) {
            let reported = self.failures.iter().any(|f| &f.producer == producer);
            if slot.is_none() && !reported {
                self.failures.push(ProducerFailure {
                    producer: producer.clone(),
                    attempts: 0,
                    error: "producer ended without reporting".into(),
                });
            }
        }
        if !self.failures.is_empty() {
            return Err(self.failures);
        }

        let mut seen = HashSet::new();
        let mut modules = Vec::with_capacity(self.staged_modules);
        let mut counts = Vec::with_capacity(self.producers.len());

        for (slot, producer) in self.staged.into_iter().zip(self.producers) {
            let batch = slot.unwrap_or_default();
            counts.push((producer.clone(), batch.len()));
            for module in batch {
                if !seen.insert(module.id.clone()) {
                    return Err(vec![ProducerFailure {
                        producer,
                        attempts: 0,
                        error: format!(
                            "duplicate module id `{}` in phase `{}`",
                            module.id, self.phase
                        ),
                    }]);
                }
                modules.push(module);
            }
        }

        Ok(PhaseManifest {
            phase: self.phase,
            modules,
            producers: counts,
        })
    }
}
