//! Shared types, error model, and configuration for Tiercast.
//!
//! This crate is the foundation depended on by all other Tiercast crates.
//! It provides:
//! - [`TiercastError`]: the unified error type
//! - Domain types ([`Module`], [`ModuleVariant`], [`AdaptationAxis`], [`DegradationLevel`])
//! - The degradation table and routing tables ([`DegradationTable`], [`EndpointTable`])
//! - The compiled [`ModuleLibrary`] and consumer [`Program`]s
//! - Configuration ([`AppConfig`], [`ExecutionPolicy`], config loading)

pub mod config;
pub mod error;
pub mod library;
pub mod program;
pub mod table;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClassifierConfig, ExecutionConfig, ExecutionPolicy, LibraryConfig, PhaseConfig,
    ProducerConfig, ProducerSource, Signal, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{Result, TiercastError};
pub use library::ModuleLibrary;
pub use program::{Program, ProgramStep, StepForm};
pub use table::{
    DegradationRule, DegradationTable, EndpointTable, LevelSpec, REQUIRED_ENDPOINTS,
    RoutingStep, StepSelector, default_routing_steps,
};
pub use types::{
    AdaptationAxis, DegradationLevel, Module, ModuleVariant, ProfileFallback,
    PsychographicProfile, TAG_OPTIONAL, TAG_PREPARATORY, is_identifier, multiplier_factor,
};
