//! Programs: ordered steps selected for one consumer at one degradation level.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{
    DegradationLevel, ModuleVariant, PsychographicProfile, TAG_OPTIONAL, TAG_PREPARATORY,
};

/// How a step relates to the variants it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepForm {
    /// A single variant at full length.
    Full,
    /// Several consecutive steps merged into one.
    Merged,
    /// A shortened summary of a step.
    Summary,
}

/// One step of a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramStep {
    pub id: String,
    /// Variants this step draws content from.
    pub variant_ids: Vec<String>,
    /// Base modules this step draws content from.
    pub source_module_ids: Vec<String>,
    pub category: String,
    /// Minutes.
    pub duration: u32,
    pub tags: BTreeSet<String>,
    /// Axis values shared by every variant in the step.
    pub axis_values: BTreeMap<String, String>,
    pub form: StepForm,
}

impl ProgramStep {
    pub fn from_variant(variant: &ModuleVariant) -> Self {
        Self {
            id: variant.id.clone(),
            variant_ids: vec![variant.id.clone()],
            source_module_ids: vec![variant.source_module_id.clone()],
            category: variant.category.clone(),
            duration: variant.base_duration,
            tags: variant.tags.clone(),
            axis_values: variant.axis_values.clone(),
            form: StepForm::Full,
        }
    }

    pub fn is_preparatory(&self) -> bool {
        self.tags.contains(TAG_PREPARATORY)
    }

    pub fn is_optional(&self) -> bool {
        self.tags.contains(TAG_OPTIONAL)
    }
}

/// A consumer's program at one level of the degradation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Version of the library the steps were selected from.
    pub library_version: String,
    pub level: DegradationLevel,
    pub profile: PsychographicProfile,
    pub steps: Vec<ProgramStep>,
}

impl Program {
    /// Total duration in minutes.
    pub fn total_duration(&self) -> u32 {
        self.steps.iter().map(|s| s.duration).sum()
    }

    pub fn has_preparatory_step(&self) -> bool {
        self.steps.iter().any(ProgramStep::is_preparatory)
    }

    /// Every base module the program draws from.
    pub fn source_module_ids(&self) -> BTreeSet<&str> {
        self.steps
            .iter()
            .flat_map(|s| s.source_module_ids.iter().map(String::as_str))
            .collect()
    }
}
