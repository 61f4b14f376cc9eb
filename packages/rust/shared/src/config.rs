//! Application configuration for Tiercast.
//!
//! User config lives at `~/.tiercast/tiercast.toml`.
//! CLI flags override config file values, which override defaults.
//! The whole pipeline definition (axes, degradation table, producers, phases)
//! is data: it is loaded once and checked by [`AppConfig::validate`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TiercastError};
use crate::table::{DegradationTable, EndpointTable, RoutingStep, default_routing_steps};
use crate::types::{AdaptationAxis, is_identifier};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tiercast.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tiercast";

// ---------------------------------------------------------------------------
// Config structs (matching tiercast.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Producer execution policy.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Library assembly and output settings.
    #[serde(default)]
    pub library: LibraryConfig,

    /// Ordered adaptation axes (the multiplier chain).
    #[serde(default = "default_axes")]
    pub axes: Vec<AdaptationAxis>,

    /// Duration ceilings and per-transition rule sets.
    #[serde(default)]
    pub degradation: DegradationTable,

    /// Questionnaire signals.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Logical operation → path.
    #[serde(default)]
    pub endpoints: EndpointTable,

    /// Routing algorithm description compiled into the spec.
    #[serde(default = "default_routing_steps")]
    pub routing_steps: Vec<RoutingStep>,

    /// Registered producers.
    #[serde(default = "default_producers")]
    pub producers: Vec<ProducerConfig>,

    /// Pipeline phases, in run order.
    #[serde(default = "default_phases")]
    pub phases: Vec<PhaseConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionConfig::default(),
            library: LibraryConfig::default(),
            axes: default_axes(),
            degradation: DegradationTable::default(),
            classifier: ClassifierConfig::default(),
            endpoints: EndpointTable::default(),
            routing_steps: default_routing_steps(),
            producers: default_producers(),
            phases: default_phases(),
        }
    }
}

/// `[execution]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Retries per producer after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Timeout for a single producer attempt, in seconds.
    #[serde(default = "default_producer_timeout")]
    pub producer_timeout_secs: u64,

    /// Maximum producers running at once within a phase.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            producer_timeout_secs: default_producer_timeout(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}
fn default_producer_timeout() -> u64 {
    30
}
fn default_concurrency() -> usize {
    4
}

/// `[library]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Phases whose manifests form the base module set. Empty means all phases.
    #[serde(default)]
    pub base_phases: Vec<String>,

    /// Where the compiled routing spec is written.
    #[serde(default = "default_spec_output")]
    pub output: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            base_phases: Vec::new(),
            output: default_spec_output(),
        }
    }
}

fn default_spec_output() -> String {
    "var/spec/routing-spec.json".into()
}

/// `[classifier]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub signals: Vec<Signal>,
}

/// `[[classifier.signals]]` entry: an answer that votes for an axis value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub question: String,
    /// Matched case-insensitively after trimming.
    pub answer: String,
    pub axis: String,
    pub value: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// `[[producers]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    pub name: String,
    /// Keywords used by the collaborator advisory.
    #[serde(default)]
    pub keywords: Vec<String>,
    pub source: ProducerSource,
}

/// The generator type behind a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProducerSource {
    /// Modules read from a JSON array file.
    JsonFile { path: PathBuf },
    /// `count` modules generated from a template.
    Template {
        prefix: String,
        count: usize,
        category: String,
        base_duration: u32,
        #[serde(default)]
        tags: Vec<String>,
        /// Tag every n-th module (1-based) as preparatory.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preparatory_every: Option<usize>,
        /// Tag every n-th module (1-based) as optional.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        optional_every: Option<usize>,
    },
    /// Validation producer: inspects predecessor manifests and emits nothing.
    Guard {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_duration: Option<u32>,
        #[serde(default)]
        forbidden_tags: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_modules: Option<usize>,
    },
}

/// `[[phases]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub name: String,
    #[serde(default)]
    pub predecessors: Vec<String>,
    pub producers: Vec<String>,
}

fn default_axes() -> Vec<AdaptationAxis> {
    let axis = |name: &str, values: &[&str]| {
        AdaptationAxis::new(name, values.iter().copied()).expect("built-in axis is valid")
    };
    vec![
        axis("tone", &["gentle", "direct", "playful"]),
        axis("age_band", &["teen", "young_adult", "adult", "midlife", "senior"]),
        axis("modality", &["visual", "auditory", "kinesthetic"]),
    ]
}

fn template(name: &str, prefix: &str, count: usize, category: &str, minutes: u32) -> ProducerConfig {
    ProducerConfig {
        name: name.into(),
        keywords: vec![category.into()],
        source: ProducerSource::Template {
            prefix: prefix.into(),
            count,
            category: category.into(),
            base_duration: minutes,
            tags: Vec::new(),
            preparatory_every: None,
            optional_every: None,
        },
    }
}

fn default_producers() -> Vec<ProducerConfig> {
    let mut techniques = template("techniques", "tech", 180, "technique", 10);
    techniques.keywords.push("breathing".into());
    let mut exercises = template("exercises", "ex", 180, "exercise", 15);
    if let ProducerSource::Template {
        optional_every, ..
    } = &mut exercises.source
    {
        *optional_every = Some(3);
    }
    let scripts = template("scripts", "script", 60, "script", 5);
    let mut protocols = template("protocols", "proto", 40, "protocol", 30);
    protocols.keywords.extend(["technique".into(), "exercise".into()]);
    if let ProducerSource::Template {
        preparatory_every, ..
    } = &mut protocols.source
    {
        *preparatory_every = Some(4);
    }

    vec![
        techniques,
        exercises,
        scripts,
        protocols,
        ProducerConfig {
            name: "safety".into(),
            keywords: vec!["safety".into(), "validation".into()],
            source: ProducerSource::Guard {
                max_duration: Some(120),
                forbidden_tags: vec!["unsafe".into()],
                min_modules: Some(1),
            },
        },
    ]
}

fn default_phases() -> Vec<PhaseConfig> {
    vec![
        PhaseConfig {
            name: "content_creation".into(),
            predecessors: vec![],
            producers: vec!["techniques".into(), "exercises".into(), "scripts".into()],
        },
        PhaseConfig {
            name: "integration".into(),
            predecessors: vec!["content_creation".into()],
            producers: vec!["protocols".into()],
        },
        PhaseConfig {
            name: "safety_validation".into(),
            predecessors: vec!["content_creation".into(), "integration".into()],
            producers: vec!["safety".into()],
        },
    ]
}

// ---------------------------------------------------------------------------
// Runtime execution policy (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime producer execution policy.
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Timeout for one attempt.
    pub producer_timeout: Duration,
    /// Maximum concurrent producers within a phase.
    pub concurrency: usize,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for ExecutionPolicy {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            producer_timeout: Duration::from_secs(config.producer_timeout_secs),
            concurrency: config.concurrency.max(1),
        }
    }
}

impl From<&AppConfig> for ExecutionPolicy {
    fn from(config: &AppConfig) -> Self {
        Self::from(&config.execution)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Look up an axis by name.
    pub fn axis(&self, name: &str) -> Option<&AdaptationAxis> {
        self.axes.iter().find(|a| a.name() == name)
    }

    /// Check every cross-reference in the configuration.
    ///
    /// All problems are collected and reported together.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.execution.producer_timeout_secs == 0 {
            problems.push("execution.producer_timeout_secs must be at least 1".to_string());
        }
        if self.execution.concurrency == 0 {
            problems.push("execution.concurrency must be at least 1".to_string());
        }

        let mut axis_names = BTreeSet::new();
        for axis in &self.axes {
            if !axis_names.insert(axis.name()) {
                problems.push(format!("axis `{}` is declared twice", axis.name()));
            }
        }

        problems.extend(self.degradation.problems());
        for (level, axis, value) in self.degradation.referenced_axes() {
            match self.axis(axis) {
                None => problems.push(format!("{level}: rule references unknown axis `{axis}`")),
                Some(a) => {
                    if let Some(v) = value.filter(|v| !a.contains(v)) {
                        problems.push(format!(
                            "{level}: rule references unknown value `{v}` of axis `{axis}`"
                        ));
                    }
                }
            }
        }

        for signal in &self.classifier.signals {
            match self.axis(&signal.axis) {
                None => problems.push(format!(
                    "signal `{}` targets unknown axis `{}`",
                    signal.question, signal.axis
                )),
                Some(a) if !a.contains(&signal.value) => problems.push(format!(
                    "signal `{}` targets unknown value `{}` of axis `{}`",
                    signal.question, signal.value, signal.axis
                )),
                Some(_) => {}
            }
        }

        problems.extend(self.endpoints.problems());

        if self.routing_steps.is_empty() {
            problems.push("routing_steps must not be empty".into());
        }

        let mut producer_names = BTreeSet::new();
        for producer in &self.producers {
            if !is_identifier(&producer.name) {
                problems.push(format!(
                    "producer name `{}` is not a lowercase identifier",
                    producer.name
                ));
            }
            if !producer_names.insert(producer.name.as_str()) {
                problems.push(format!("producer `{}` is declared twice", producer.name));
            }
            if let ProducerSource::Template {
                preparatory_every,
                optional_every,
                ..
            } = &producer.source
            {
                if preparatory_every == &Some(0) || optional_every == &Some(0) {
                    problems.push(format!(
                        "producer `{}`: tag intervals must be at least 1",
                        producer.name
                    ));
                }
            }
        }

        let mut phase_names = BTreeSet::new();
        for phase in &self.phases {
            for pred in &phase.predecessors {
                if !phase_names.contains(pred.as_str()) {
                    problems.push(format!(
                        "phase `{}` lists `{pred}` as predecessor but it is not declared earlier",
                        phase.name
                    ));
                }
            }
            if phase.producers.is_empty() {
                problems.push(format!("phase `{}` has no producers", phase.name));
            }
            for producer in &phase.producers {
                if !producer_names.contains(producer.as_str()) {
                    problems.push(format!(
                        "phase `{}` references unknown producer `{producer}`",
                        phase.name
                    ));
                }
            }
            if !phase_names.insert(phase.name.as_str()) {
                problems.push(format!("phase `{}` is declared twice", phase.name));
            }
        }

        for base in &self.library.base_phases {
            if !phase_names.contains(base.as_str()) {
                problems.push(format!("library.base_phases references unknown phase `{base}`"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(TiercastError::config(problems.join("; ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tiercast/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| TiercastError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tiercast/tiercast.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TiercastError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| TiercastError::config(format!("failed to parse {}: {e}", path.display())))?;

    config.validate()?;
    tracing::debug!(
        ?path,
        axes = config.axes.len(),
        phases = config.phases.len(),
        "config loaded"
    );
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TiercastError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TiercastError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TiercastError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
