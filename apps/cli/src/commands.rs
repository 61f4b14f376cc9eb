//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use tiercast_compiler::{RoutingSpec, read_spec};
use tiercast_coordinator::{PhaseResult, ProducerRegistry, advise_collaborators};
use tiercast_core::{BuildOptions, BuildReport, CatalogService, ProgressReporter, build_catalog};
use tiercast_router::Responses;
use tiercast_shared::{
    AppConfig, DegradationLevel, Program, init_config, load_config, load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Tiercast: build adaptive module libraries and routing specs.
#[derive(Parser)]
#[command(
    name = "tiercast",
    version,
    about = "Build adaptive module libraries and query their routing specs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.tiercast/tiercast.toml).
    #[arg(long, env = "TIERCAST_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run every production phase and write the routing spec.
    Build {
        /// Spec output path (defaults to `library.output` from config).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Classify questionnaire answers into a profile.
    Classify {
        /// Answer as `question=answer` (repeatable).
        #[arg(short, long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, String)>,
    },

    /// Select the full-length program for a questionnaire.
    Select {
        /// Compiled routing spec (defaults to `library.output` from config).
        #[arg(long)]
        spec: Option<PathBuf>,

        /// Answer as `question=answer` (repeatable).
        #[arg(short, long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, String)>,

        /// Print JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Select a program and degrade it to a shorter level.
    Degrade {
        /// Target level: program, phase, day, session, emergency.
        #[arg(short, long)]
        level: DegradationLevel,

        /// Compiled routing spec (defaults to `library.output` from config).
        #[arg(long)]
        spec: Option<PathBuf>,

        /// Answer as `question=answer` (repeatable).
        #[arg(short, long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, String)>,

        /// Print JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Validate a compiled spec and print its summary.
    Inspect {
        /// Compiled routing spec (defaults to `library.output` from config).
        #[arg(long)]
        spec: Option<PathBuf>,
    },

    /// Suggest collaborators for a producer by keyword overlap.
    Advise {
        /// Producer name.
        producer: String,

        /// Maximum suggestions.
        #[arg(long, default_value = "5")]
        limit: usize,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Create a default config file.
    Init,
    /// Print the effective configuration.
    Show,
}

fn parse_answer(raw: &str) -> std::result::Result<(String, String), String> {
    let (question, answer) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `question=answer`, got `{raw}`"))?;
    let question = question.trim();
    if question.is_empty() {
        return Err(format!("empty question in `{raw}`"));
    }
    Ok((question.to_string(), answer.trim().to_string()))
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "tiercast=info",
        1 => "tiercast=debug",
        _ => "tiercast=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Build { out } => cmd_build(config_path, out).await,
        Command::Classify { answers } => cmd_classify(config_path, answers),
        Command::Select {
            spec,
            answers,
            json,
        } => cmd_select(config_path, spec, answers, json),
        Command::Degrade {
            level,
            spec,
            answers,
            json,
        } => cmd_degrade(config_path, level, spec, answers, json),
        Command::Inspect { spec } => cmd_inspect(config_path, spec),
        Command::Advise { producer, limit } => cmd_advise(config_path, &producer, limit),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

/// Loaded config plus the directory relative producer paths resolve against.
fn resolve_config(path: Option<&Path>) -> Result<(AppConfig, PathBuf)> {
    let cwd =
        std::env::current_dir().map_err(|e| eyre!("cannot determine working directory: {e}"))?;
    match path {
        Some(path) => {
            let config = load_config_from(path)?;
            let base = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => cwd,
            };
            Ok((config, base))
        }
        None => Ok((load_config()?, cwd)),
    }
}

/// Explicit spec path, else `library.output` under `base_dir`.
fn spec_path(config: &AppConfig, base_dir: &Path, spec: Option<PathBuf>) -> PathBuf {
    spec.unwrap_or_else(|| base_dir.join(&config.library.output))
}

fn load_service(
    config: &AppConfig,
    base_dir: &Path,
    spec: Option<PathBuf>,
) -> Result<CatalogService> {
    let path = spec_path(config, base_dir, spec);
    let spec = read_spec(&path)
        .map_err(|e| eyre!("cannot load routing spec {}: {e}", path.display()))?;
    Ok(CatalogService::from_spec(&spec, &config.classifier)?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_build(config_path: Option<&Path>, out: Option<PathBuf>) -> Result<()> {
    let (config, base_dir) = resolve_config(config_path)?;
    let output = spec_path(&config, &base_dir, out);
    let options = BuildOptions::new(output, base_dir);

    info!(
        phases = config.phases.len(),
        producers = config.producers.len(),
        axes = config.axes.len(),
        "building routing spec"
    );

    let reporter = CliProgress::new();
    let report = build_catalog(&config, &options, &reporter).await?;

    println!();
    println!("  Routing spec built successfully!");
    println!("  Run:      {}", report.run_id);
    println!("  Phases:   {}", report.phases.len());
    println!("  Base:     {} modules", report.base_modules);
    for (axis, count) in &report.stages {
        println!("    x {axis:<12} {count}");
    }
    println!("  Total:    {} variants", report.total_modules);
    println!("  Library:  {}", report.library_version);
    println!("  Digest:   {}", report.content_digest);
    println!("  Path:     {}", report.spec_path.display());
    println!("  Time:     {:.1}s", report.elapsed_ms as f64 / 1000.0);
    println!();

    Ok(())
}

fn cmd_classify(config_path: Option<&Path>, answers: Vec<(String, String)>) -> Result<()> {
    let (config, _) = resolve_config(config_path)?;
    let classifier = tiercast_router::Classifier::from_config(&config)?;
    let responses: Responses = answers.into_iter().collect();

    let profile = classifier.classify(&responses);
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

fn cmd_select(
    config_path: Option<&Path>,
    spec: Option<PathBuf>,
    answers: Vec<(String, String)>,
    json: bool,
) -> Result<()> {
    let (config, base_dir) = resolve_config(config_path)?;
    let service = load_service(&config, &base_dir, spec)?;
    let responses: Responses = answers.into_iter().collect();

    let profile = service.classify_profile(&responses);
    let selected = service.select_program(&profile);

    if json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
        return Ok(());
    }

    print_program(&selected.program);
    for fallback in &selected.fallbacks {
        println!(
            "  Fallback: {} requested {} used {}",
            fallback.axis,
            fallback.requested.as_deref().unwrap_or("(none)"),
            fallback.used
        );
    }
    if !selected.skipped_modules.is_empty() {
        println!("  Skipped:  {}", selected.skipped_modules.join(", "));
    }
    println!();
    Ok(())
}

fn cmd_degrade(
    config_path: Option<&Path>,
    level: DegradationLevel,
    spec: Option<PathBuf>,
    answers: Vec<(String, String)>,
    json: bool,
) -> Result<()> {
    let (config, base_dir) = resolve_config(config_path)?;
    let service = load_service(&config, &base_dir, spec)?;
    let responses: Responses = answers.into_iter().collect();

    let profile = service.classify_profile(&responses);
    let selected = service.select_program(&profile);
    let degraded = service.degrade_program(&selected.program, level)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&degraded)?);
        return Ok(());
    }

    print_program(&degraded.program);
    for step in &degraded.applied {
        println!(
            "  {} -> {}: {} steps / {} min -> {} steps / {} min [{}]",
            step.from,
            step.to,
            step.steps_before,
            step.duration_before,
            step.steps_after,
            step.duration_after,
            step.operations.join(", ")
        );
    }
    println!();
    Ok(())
}

fn cmd_inspect(config_path: Option<&Path>, spec: Option<PathBuf>) -> Result<()> {
    let (config, base_dir) = resolve_config(config_path)?;
    let path = spec_path(&config, &base_dir, spec);
    let spec: RoutingSpec = read_spec(&path)?;

    println!();
    println!("  Spec:       {}", path.display());
    println!("  Schema:     {}", spec.version.schema);
    println!("  Build:      {}", spec.version.build_id);
    println!("  Compiled:   {}", spec.version.compiled_at.to_rfc3339());
    println!("  Library:    {}", spec.library_version);
    println!("  Digest:     {}", spec.content_digest);
    println!(
        "  Modules:    {} base, {} variants",
        spec.base_modules, spec.total_modules
    );
    println!("  Axes:");
    for axis in &spec.axes {
        println!(
            "    {:<12} {} (default {})",
            axis.name(),
            axis.values().join(", "),
            axis.default_value()
        );
    }
    println!("  Levels:");
    for level in &spec.degradation_levels.levels {
        println!(
            "    {:<12} <= {} min, {} rules",
            level.level.as_str(),
            level.duration_ceiling,
            level.rules.len()
        );
    }
    let steps: Vec<&str> = spec
        .routing_algorithm_steps
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    println!("  Routing:    {}", steps.join(" -> "));
    println!("  Endpoints:  {}", spec.endpoints.0.len());
    println!();
    Ok(())
}

fn cmd_advise(config_path: Option<&Path>, producer: &str, limit: usize) -> Result<()> {
    let (config, base_dir) = resolve_config(config_path)?;
    let registry = ProducerRegistry::from_config(&config.producers, &base_dir)?;

    let suggestions = advise_collaborators(&registry, producer, limit)?;
    if suggestions.is_empty() {
        println!("No producers share keywords with `{producer}`.");
        return Ok(());
    }
    for suggestion in suggestions {
        println!(
            "  {:<16} {:.2}  {}",
            suggestion.producer,
            suggestion.score,
            suggestion.shared_keywords.join(", ")
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let (config, _) = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_program(program: &Program) {
    println!();
    println!("  Level:    {}", program.level);
    println!("  Library:  {}", program.library_version);
    let profile: Vec<String> = program
        .profile
        .axis_values
        .iter()
        .map(|(axis, value)| format!("{axis}={value}"))
        .collect();
    println!("  Profile:  {}", profile.join(" "));
    println!(
        "  Steps:    {} ({} min)",
        program.steps.len(),
        program.total_duration()
    );
    for step in &program.steps {
        println!("    {:>4} min  {}", step.duration, step.id);
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn phase_finished(&self, result: &PhaseResult) {
        self.spinner.println(format!(
            "  {:<20} {:<10} {} modules, {} attempts",
            result.phase, result.status, result.modules, result.stats.attempts
        ));
        for failure in &result.failures {
            self.spinner.println(format!(
                "    {} failed after {} attempts: {}",
                failure.producer, failure.attempts, failure.error
            ));
        }
    }

    fn done(&self, _report: &BuildReport) {
        self.spinner.finish_and_clear();
    }
}
