//! Profile-driven module selection.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, instrument, warn};

use tiercast_shared::{
    DegradationLevel, ModuleLibrary, ModuleVariant, ProfileFallback, Program, ProgramStep,
    PsychographicProfile,
};

/// A full-level program plus the routing metadata produced while selecting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedProgram {
    pub program: Program,
    /// Axes where a default stood in for the requested value.
    pub fallbacks: Vec<ProfileFallback>,
    /// Source modules with no reachable variant, even after fallback.
    pub skipped_modules: Vec<String>,
}

impl SelectedProgram {
    pub fn used_fallback(&self) -> bool {
        !self.fallbacks.is_empty()
    }
}

/// Select one variant per source module for `profile`.
///
/// Axes are resolved in library order. For each axis the profile's value is
/// used when some variant of the module still matches it, otherwise the axis
/// default. Output is deterministic for a fixed library and profile.
#[instrument(skip_all, fields(library = library.version(), sources = library.source_count()))]
pub fn select_modules(profile: &PsychographicProfile, library: &ModuleLibrary) -> SelectedProgram {
    let mut fallbacks = BTreeSet::new();
    let mut skipped_modules = Vec::new();
    let mut steps = Vec::with_capacity(library.source_count());

    for source in library.source_ids() {
        let candidates: Vec<&ModuleVariant> = library.variants_of(source).collect();
        match resolve(profile, library, &candidates, &mut fallbacks) {
            Some(variant) => steps.push(ProgramStep::from_variant(variant)),
            None => {
                debug!(source, "no reachable variant");
                skipped_modules.push(source.to_string());
            }
        }
    }

    let fallbacks: Vec<ProfileFallback> = fallbacks.into_iter().collect();
    for fb in &fallbacks {
        warn!(
            axis = %fb.axis,
            requested = fb.requested.as_deref().unwrap_or("<none>"),
            used = %fb.used,
            "profile fallback used"
        );
    }

    SelectedProgram {
        program: Program {
            library_version: library.version().to_string(),
            level: DegradationLevel::Program,
            profile: profile.clone(),
            steps,
        },
        fallbacks,
        skipped_modules,
    }
}

fn resolve<'a>(
    profile: &PsychographicProfile,
    library: &ModuleLibrary,
    candidates: &[&'a ModuleVariant],
    fallbacks: &mut BTreeSet<ProfileFallback>,
) -> Option<&'a ModuleVariant> {
    let mut chosen: BTreeMap<&str, &str> = BTreeMap::new();

    for axis in library.axes() {
        let reachable = |value: &str| {
            candidates
                .iter()
                .any(|v| compatible(v, &chosen) && v.axis_values.get(axis.name()).map(String::as_str) == Some(value))
        };

        let requested = profile.get(axis.name());
        let value = match requested {
            Some(value) if reachable(value) => value,
            _ => {
                let default = axis.default_value();
                if !reachable(default) {
                    return None;
                }
                if requested != Some(default) {
                    fallbacks.insert(ProfileFallback {
                        axis: axis.name().to_string(),
                        requested: requested.map(str::to_string),
                        used: default.to_string(),
                    });
                }
                default
            }
        };
        chosen.insert(axis.name(), value);
    }

    candidates.iter().copied().find(|v| compatible(v, &chosen))
}

fn compatible(variant: &ModuleVariant, chosen: &BTreeMap<&str, &str>) -> bool {
    chosen
        .iter()
        .all(|(axis, value)| variant.axis_values.get(*axis).map(String::as_str) == Some(*value))
}
