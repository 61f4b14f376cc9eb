//! Phase coordinator: ordering, bounded concurrency, retries, promotion.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use tiercast_shared::{AppConfig, ExecutionPolicy, Module, Result, TiercastError, is_identifier};

use crate::manifest::{ManifestCollector, PhaseManifest, ProducerFailure, ProducerReport};
use crate::producer::{PhaseContext, Producer};
use crate::registry::ProducerRegistry;

// ---------------------------------------------------------------------------
// Status & results
// ---------------------------------------------------------------------------

/// Lifecycle of one phase: `pending → running → completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.pad(s)
    }
}

/// Timing and attempt counters for one phase run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseStats {
    pub producers: usize,
    /// Attempts across all producers, including the first.
    pub attempts: u32,
    /// Modules received during the run, promoted or not.
    pub staged_modules: usize,
    pub elapsed_ms: u64,
}

/// Outcome of one `run_phase` call.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseResult {
    pub phase: String,
    pub status: PhaseStatus,
    /// Promoted module count (zero unless completed).
    pub modules: usize,
    pub failures: Vec<ProducerFailure>,
    pub stats: PhaseStats,
}

impl PhaseResult {
    pub fn is_completed(&self) -> bool {
        self.status == PhaseStatus::Completed
    }
}

/// Outcome of `run_all`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    /// One entry per phase that was run, in order. Stops at the first failure.
    pub phases: Vec<PhaseResult>,
    /// Running total of promoted modules across completed phases.
    pub module_count: usize,
}

impl PipelineResult {
    pub fn succeeded(&self) -> bool {
        self.phases.iter().all(PhaseResult::is_completed)
    }

    /// The phase that halted the run, if any.
    pub fn failed_phase(&self) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| !p.is_completed())
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PhaseEntry {
    name: String,
    predecessors: Vec<String>,
    producers: Vec<String>,
    status: PhaseStatus,
    manifest: Option<Arc<PhaseManifest>>,
    /// Child of the coordinator token; replaced after a cancelled run.
    cancel: CancellationToken,
}

/// Runs registered phases against a producer registry.
pub struct PhaseCoordinator {
    registry: Arc<ProducerRegistry>,
    policy: ExecutionPolicy,
    phases: Vec<PhaseEntry>,
    run_id: Uuid,
    cancel: CancellationToken,
    module_count: usize,
}

impl PhaseCoordinator {
    pub fn new(registry: Arc<ProducerRegistry>, policy: ExecutionPolicy) -> Self {
        Self {
            registry,
            policy,
            phases: Vec::new(),
            run_id: Uuid::now_v7(),
            cancel: CancellationToken::new(),
            module_count: 0,
        }
    }

    /// Build a coordinator and register every `[[phases]]` entry.
    pub fn from_config(config: &AppConfig, registry: Arc<ProducerRegistry>) -> Result<Self> {
        let mut coordinator = Self::new(registry, ExecutionPolicy::from(config));
        for phase in &config.phases {
            coordinator.register_phase(
                &phase.name,
                phase.predecessors.clone(),
                phase.producers.clone(),
            )?;
        }
        Ok(coordinator)
    }

    /// Register a phase. Predecessors must already be registered, which keeps
    /// the graph acyclic and registration order topological.
    pub fn register_phase(
        &mut self,
        name: &str,
        predecessors: Vec<String>,
        producers: Vec<String>,
    ) -> Result<()> {
        if !is_identifier(name) {
            return Err(TiercastError::validation(format!(
                "phase name `{name}` is not a lowercase identifier"
            )));
        }
        if self.entry(name).is_some() {
            return Err(TiercastError::validation(format!(
                "phase `{name}` is already registered"
            )));
        }
        if let Some(pred) = predecessors.iter().find(|p| self.entry(p).is_none()) {
            return Err(TiercastError::validation(format!(
                "phase `{name}` depends on unregistered phase `{pred}`"
            )));
        }
        if producers.is_empty() {
            return Err(TiercastError::validation(format!(
                "phase `{name}` has no producers"
            )));
        }
        if let Some(missing) = producers.iter().find(|p| !self.registry.contains(p)) {
            return Err(TiercastError::validation(format!(
                "phase `{name}` references unknown producer `{missing}`"
            )));
        }
        for (i, producer) in producers.iter().enumerate() {
            if producers[..i].contains(producer) {
                return Err(TiercastError::validation(format!(
                    "phase `{name}` lists producer `{producer}` twice"
                )));
            }
        }

        debug!(phase = name, ?predecessors, ?producers, "phase registered");
        self.phases.push(PhaseEntry {
            name: name.to_string(),
            predecessors,
            producers,
            status: PhaseStatus::Pending,
            manifest: None,
            cancel: self.cancel.child_token(),
        });
        Ok(())
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Token for the whole coordinator.
    ///
    /// Cancelling it fails the running phase and every later run, including
    /// phases that have not started yet. Use [`Self::phase_cancellation_token`]
    /// to stop a single phase.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Token that cancels the current (or next) run of `phase` only.
    ///
    /// Once a run ends cancelled the phase gets a fresh token, so the phase
    /// can be re-run; fetch the token again for that run.
    pub fn phase_cancellation_token(&self, phase: &str) -> Option<CancellationToken> {
        self.entry(phase).map(|e| e.cancel.clone())
    }

    /// Registered phase names, in registration order.
    pub fn phase_names(&self) -> impl Iterator<Item = &str> {
        self.phases.iter().map(|p| p.name.as_str())
    }

    pub fn status(&self, phase: &str) -> Option<PhaseStatus> {
        self.entry(phase).map(|e| e.status)
    }

    /// Promoted manifest of a completed phase.
    pub fn manifest(&self, phase: &str) -> Option<Arc<PhaseManifest>> {
        self.entry(phase).and_then(|e| e.manifest.clone())
    }

    /// Modules promoted so far, across all completed phases.
    pub fn module_count(&self) -> usize {
        self.module_count
    }

    fn entry(&self, name: &str) -> Option<&PhaseEntry> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Run one phase.
    ///
    /// Producer failures are reported in the returned [`PhaseResult`]; `Err`
    /// is reserved for calls that cannot run at all (unknown phase, ordering,
    /// re-running a completed phase).
    #[instrument(skip_all, fields(run_id = %self.run_id, phase = %name))]
    pub async fn run_phase(&mut self, name: &str) -> Result<PhaseResult> {
        let index = self
            .phases
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| TiercastError::UnknownPhase(name.to_string()))?;

        let entry = &self.phases[index];
        if entry.status == PhaseStatus::Completed {
            return Err(TiercastError::validation(format!(
                "phase `{name}` has already completed"
            )));
        }

        let waiting_on: Vec<String> = entry
            .predecessors
            .iter()
            .filter(|p| self.status(p) != Some(PhaseStatus::Completed))
            .cloned()
            .collect();
        if !waiting_on.is_empty() {
            return Err(TiercastError::PhaseOrdering {
                phase: name.to_string(),
                waiting_on,
            });
        }

        let inputs: BTreeMap<String, Arc<PhaseManifest>> = entry
            .predecessors
            .iter()
            .filter_map(|p| self.manifest(p).map(|m| (p.clone(), m)))
            .collect();
        let producers = entry.producers.clone();

        self.phases[index].status = PhaseStatus::Running;
        info!(producers = producers.len(), "phase started");

        let start = Instant::now();
        let token = self.phases[index].cancel.clone();
        let ctx = PhaseContext::new(self.run_id, name, inputs, token.clone());
        let collector = self.execute(&producers, ctx, &token).await;
        let attempts = collector.attempts();
        let staged_modules = collector.staged_modules();
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let (status, modules, failures) = match collector.finish() {
            Ok(manifest) => {
                let count = manifest.len();
                self.module_count += count;
                let entry = &mut self.phases[index];
                entry.status = PhaseStatus::Completed;
                entry.manifest = Some(Arc::new(manifest));
                info!(
                    modules = count,
                    total_modules = self.module_count,
                    attempts,
                    elapsed_ms,
                    "phase completed"
                );
                (PhaseStatus::Completed, count, Vec::new())
            }
            Err(failures) => {
                let fresh = self.cancel.child_token();
                let entry = &mut self.phases[index];
                entry.status = PhaseStatus::Failed;
                entry.manifest = None;
                if token.is_cancelled() {
                    entry.cancel = fresh;
                }
                warn!(
                    failures = failures.len(),
                    discarded_modules = staged_modules,
                    attempts,
                    "phase failed, staged output discarded"
                );
                (PhaseStatus::Failed, 0, failures)
            }
        };

        Ok(PhaseResult {
            phase: name.to_string(),
            status,
            modules,
            failures,
            stats: PhaseStats {
                producers: producers.len(),
                attempts,
                staged_modules,
                elapsed_ms,
            },
        })
    }

    /// Run every pending or failed phase in registration order, halting at
    /// the first failure.
    #[instrument(skip_all, fields(run_id = %self.run_id, phases = self.phases.len()))]
    pub async fn run_all(&mut self) -> Result<PipelineResult> {
        let names: Vec<String> = self
            .phases
            .iter()
            .filter(|p| p.status != PhaseStatus::Completed)
            .map(|p| p.name.clone())
            .collect();

        let mut phases = Vec::with_capacity(names.len());
        for name in names {
            let result = self.run_phase(&name).await?;
            let failed = !result.is_completed();
            phases.push(result);
            if failed {
                warn!(phase = %name, "pipeline halted");
                break;
            }
        }

        Ok(PipelineResult {
            run_id: self.run_id,
            phases,
            module_count: self.module_count,
        })
    }

    /// Spawn every producer on the bounded pool and funnel reports into one collector.
    async fn execute(
        &self,
        producers: &[String],
        ctx: PhaseContext,
        token: &CancellationToken,
    ) -> ManifestCollector {
        let mut collector = ManifestCollector::new(&ctx.phase, producers);
        let semaphore = Arc::new(Semaphore::new(self.policy.concurrency.max(1)));
        let (tx, mut rx) = mpsc::channel::<ProducerReport>(producers.len().max(1));

        let mut handles = Vec::with_capacity(producers.len());
        for (slot, name) in producers.iter().enumerate() {
            let Some(producer) = self.registry.get(name) else {
                collector.fail(name, 0, "producer is not registered");
                continue;
            };
            let tx = tx.clone();
            let sem = semaphore.clone();
            let policy = self.policy.clone();
            let ctx = ctx.clone();
            let token = token.clone();
            let name = name.clone();

            handles.push((
                name.clone(),
                tokio::spawn(async move {
                    let (attempts, outcome) = match sem.acquire_owned().await {
                        Ok(_permit) => run_with_retries(producer.as_ref(), &ctx, &policy, &token).await,
                        Err(_) => (0, Err("worker pool closed".to_string())),
                    };
                    let _ = tx
                        .send(ProducerReport {
                            slot,
                            producer: name,
                            attempts,
                            outcome,
                        })
                        .await;
                }),
            ));
        }
        drop(tx);

        while let Some(report) = rx.recv().await {
            collector.accept(report);
        }

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                collector.fail(&name, 0, format!("producer task panicked: {e}"));
            }
        }

        collector
    }
}

/// Run attempts until one succeeds, the retry budget is spent, or the phase
/// is cancelled. Returns the number of attempts made.
async fn run_with_retries(
    producer: &dyn Producer,
    base: &PhaseContext,
    policy: &ExecutionPolicy,
    token: &CancellationToken,
) -> (u32, std::result::Result<Vec<Module>, String>) {
    let max_attempts = policy.max_retries.saturating_add(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let ctx = base.with_attempt(attempt);
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(TiercastError::Cancelled { phase: base.phase.clone() }),
            r = run_attempt(producer, ctx, policy.producer_timeout) => r,
        };

        match result {
            Ok(modules) => {
                debug!(producer = producer.name(), attempt, modules = modules.len(), "producer succeeded");
                return (attempt, Ok(modules));
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(producer = producer.name(), attempt, error = %e, "producer attempt failed, retrying");
            }
            Err(e) => {
                warn!(producer = producer.name(), attempt, error = %e, "producer failed");
                return (attempt, Err(e.to_string()));
            }
        }
    }
}

async fn run_attempt(
    producer: &dyn Producer,
    ctx: PhaseContext,
    timeout: Duration,
) -> Result<Vec<Module>> {
    match tokio::time::timeout(timeout, producer.produce(ctx)).await {
        Ok(result) => result,
        Err(_) => Err(TiercastError::ProducerTimeout {
            producer: producer.name().to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
