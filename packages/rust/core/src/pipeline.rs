//! End-to-end `build` pipeline: producers → phases → multiplier → library → spec.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use tiercast_compiler::{RoutingSpec, compile, write_spec};
use tiercast_coordinator::{PhaseCoordinator, PhaseResult, ProducerRegistry};
use tiercast_multiplier::{Multiplier, expected_count};
use tiercast_shared::{AppConfig, Module, ModuleLibrary, Result, TiercastError};

/// Where a build reads relative inputs from and writes its spec to.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Destination of the routing spec.
    pub output: PathBuf,
    /// Directory relative producer paths resolve against.
    pub base_dir: PathBuf,
}

impl BuildOptions {
    pub fn new(output: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            base_dir: base_dir.into(),
        }
    }
}

/// Result of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub run_id: Uuid,
    pub phases: Vec<PhaseResult>,
    pub base_modules: usize,
    /// `(axis, variants after the axis)` in application order.
    pub stages: Vec<(String, usize)>,
    pub total_modules: usize,
    pub library_version: String,
    pub content_digest: String,
    pub spec_path: PathBuf,
    pub elapsed_ms: u64,
}

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn stage(&self, name: &str);
    /// Called after each production phase finishes.
    fn phase_finished(&self, result: &PhaseResult);
    /// Called when the build completes.
    fn done(&self, report: &BuildReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _name: &str) {}
    fn phase_finished(&self, _result: &PhaseResult) {}
    fn done(&self, _report: &BuildReport) {}
}

/// Run the full build.
///
/// 1. Run every production phase in order
/// 2. Gather base modules from the configured base phases
/// 3. Multiply across the adaptation axes
/// 4. Assemble the module library
/// 5. Compile and write the routing spec
///
/// Any failure before step 5 leaves a previously written spec untouched.
#[instrument(skip_all, fields(output = %options.output.display()))]
pub async fn build_catalog(
    config: &AppConfig,
    options: &BuildOptions,
    progress: &dyn ProgressReporter,
) -> Result<BuildReport> {
    let start = Instant::now();
    config.validate()?;

    // --- Phase 1: Production ---
    progress.stage("Running production phases");
    let registry = ProducerRegistry::from_config(&config.producers, &options.base_dir)?;
    let mut coordinator = PhaseCoordinator::from_config(config, Arc::new(registry))?;
    info!(run_id = %coordinator.run_id(), phases = config.phases.len(), "starting build");

    let pipeline = coordinator.run_all().await?;
    for phase in &pipeline.phases {
        progress.phase_finished(phase);
    }
    if let Some(failed) = pipeline.failed_phase() {
        warn!(phase = %failed.phase, "build halted, previous spec left in place");
        return Err(TiercastError::PhaseFailed {
            phase: failed.phase.clone(),
            failures: failed
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.producer, f.error))
                .collect(),
        });
    }

    // --- Phase 2: Base modules ---
    let modules = base_modules(config, &coordinator)?;

    // --- Phase 3: Multiply ---
    progress.stage("Multiplying across adaptation axes");
    let outcome = Multiplier::new().run(&modules, &config.axes);
    let expected = expected_count(modules.len(), &config.axes);
    if outcome.variants.len() != expected {
        return Err(TiercastError::validation(format!(
            "multiplier produced {} variants, expected {expected}",
            outcome.variants.len()
        )));
    }
    let stages = outcome
        .stages
        .iter()
        .map(|s| (s.axis.clone(), s.variants))
        .collect();

    // --- Phase 4: Library ---
    progress.stage("Assembling module library");
    let library = ModuleLibrary::new(config.axes.clone(), outcome.variants)?;

    // --- Phase 5: Compile & write ---
    progress.stage("Compiling routing spec");
    let spec = compile_from_config(config, &library)?;
    write_spec(&spec, &options.output)?;

    let report = BuildReport {
        run_id: pipeline.run_id,
        phases: pipeline.phases,
        base_modules: modules.len(),
        stages,
        total_modules: spec.total_modules,
        library_version: spec.library_version.clone(),
        content_digest: spec.content_digest.clone(),
        spec_path: options.output.clone(),
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    progress.done(&report);

    info!(
        base_modules = report.base_modules,
        total_modules = report.total_modules,
        digest = %report.content_digest,
        elapsed_ms = report.elapsed_ms,
        "build complete"
    );

    Ok(report)
}

/// Compile `library` with the routing tables from `config`.
pub fn compile_from_config(config: &AppConfig, library: &ModuleLibrary) -> Result<RoutingSpec> {
    compile(
        library,
        &config.axes,
        &config.degradation,
        &config.routing_steps,
        &config.endpoints,
    )
}

/// Modules of the base phases (every phase when none are configured), in phase order.
fn base_modules(config: &AppConfig, coordinator: &PhaseCoordinator) -> Result<Vec<Module>> {
    let phases: Vec<String> = if config.library.base_phases.is_empty() {
        coordinator.phase_names().map(str::to_string).collect()
    } else {
        config.library.base_phases.clone()
    };

    let mut seen = HashSet::new();
    let mut modules = Vec::new();
    for phase in &phases {
        let manifest = coordinator.manifest(phase).ok_or_else(|| {
            TiercastError::validation(format!("phase `{phase}` has no promoted manifest"))
        })?;
        for module in &manifest.modules {
            if !seen.insert(module.id.clone()) {
                return Err(TiercastError::validation(format!(
                    "module id `{}` is produced by more than one base phase",
                    module.id
                )));
            }
            modules.push(module.clone());
        }
    }
    Ok(modules)
}
