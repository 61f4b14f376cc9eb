//! Multiplier pipeline: fan base modules out across the adaptation axes.
//!
//! Axes are applied strictly in declared order. After axis *k* the in-flight
//! variant count is `base × Π cardinality[0..=k]`. Each step is the pure
//! function [`adapt`], so a stage can be sharded across the rayon pool; the
//! collection keeps sequential order, which makes variant ids and order
//! identical across runs.

use rayon::prelude::*;
use tracing::{debug, info, instrument};

use tiercast_shared::{AdaptationAxis, Module, ModuleVariant, multiplier_factor};

/// Separator between the source id and the axis values in a variant id.
const ID_AXIS_SEPARATOR: char = '@';

/// Separator between axis values in a variant id.
const ID_VALUE_SEPARATOR: char = '.';

/// Variant count at which a stage switches to the parallel path.
const DEFAULT_PARALLEL_THRESHOLD: usize = 1024;

/// Count of in-flight variants after one axis was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCount {
    pub axis: String,
    pub cardinality: usize,
    pub variants: usize,
}

/// Output of a multiplier run.
#[derive(Debug, Clone)]
pub struct MultiplyOutcome {
    pub variants: Vec<ModuleVariant>,
    pub base_count: usize,
    /// One entry per axis, in application order.
    pub stages: Vec<StageCount>,
}

/// Multiplier pipeline with a configurable parallelism threshold.
#[derive(Debug, Clone)]
pub struct Multiplier {
    parallel_threshold: usize,
}

impl Default for Multiplier {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl Multiplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages smaller than `threshold` variants run on the calling thread.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Apply every axis to every module.
    #[instrument(skip_all, fields(base = modules.len(), axes = axes.len()))]
    pub fn run(&self, modules: &[Module], axes: &[AdaptationAxis]) -> MultiplyOutcome {
        let mut variants: Vec<ModuleVariant> = modules.iter().map(ModuleVariant::from_base).collect();
        let mut stages = Vec::with_capacity(axes.len());

        for axis in axes {
            variants = self.apply_axis(&variants, axis);
            debug!(
                axis = axis.name(),
                cardinality = axis.cardinality(),
                variants = variants.len(),
                "axis applied"
            );
            stages.push(StageCount {
                axis: axis.name().to_string(),
                cardinality: axis.cardinality(),
                variants: variants.len(),
            });
        }

        info!(
            base = modules.len(),
            variants = variants.len(),
            factor = multiplier_factor(axes),
            "multiplication complete"
        );

        MultiplyOutcome {
            variants,
            base_count: modules.len(),
            stages,
        }
    }

    fn apply_axis(&self, variants: &[ModuleVariant], axis: &AdaptationAxis) -> Vec<ModuleVariant> {
        let fan_out = |variant: &ModuleVariant| -> Vec<ModuleVariant> {
            axis.values()
                .iter()
                .map(|value| adapt(variant, axis, value))
                .collect()
        };

        if variants.len() * axis.cardinality() >= self.parallel_threshold {
            variants.par_iter().flat_map_iter(fan_out).collect()
        } else {
            variants.iter().flat_map(fan_out).collect()
        }
    }
}

/// Apply `axes` to `modules` with default settings.
pub fn apply(modules: &[Module], axes: &[AdaptationAxis]) -> Vec<ModuleVariant> {
    Multiplier::default().run(modules, axes).variants
}

/// The variant count the multiplier invariant promises.
pub fn expected_count(base_count: usize, axes: &[AdaptationAxis]) -> usize {
    base_count * multiplier_factor(axes)
}

/// Specialize one variant to one value of `axis`.
///
/// Pure: the result depends only on `variant`, `axis`, and `value`.
pub fn adapt(variant: &ModuleVariant, axis: &AdaptationAxis, value: &str) -> ModuleVariant {
    let id = if variant.axis_values.is_empty() {
        format!("{}{ID_AXIS_SEPARATOR}{value}", variant.id)
    } else {
        format!("{}{ID_VALUE_SEPARATOR}{value}", variant.id)
    };

    let mut axis_values = variant.axis_values.clone();
    axis_values.insert(axis.name().to_string(), value.to_string());

    let mut adapted = ModuleVariant {
        id,
        source_module_id: variant.source_module_id.clone(),
        category: variant.category.clone(),
        base_duration: variant.base_duration,
        tags: variant.tags.clone(),
        axis_values,
        payload: variant.payload.clone(),
        content_hash: String::new(),
    };
    adapted.content_hash = adapted.compute_content_hash();
    adapted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashSet};

    fn modules(n: usize) -> Vec<Module> {
        (0..n)
            .map(|i| {
                Module::new(format!("m{i:03}"), "content_creation", "technique", 10)
                    .with_payload(serde_json::json!({ "n": i }))
            })
            .collect()
    }

    fn axis(name: &str, values: &[&str]) -> AdaptationAxis {
        AdaptationAxis::new(name, values.iter().copied()).unwrap()
    }

    #[test]
    fn two_modules_gender_by_age_yield_twelve_variants() {
        let axes = vec![axis("gender", &["m", "f", "n"]), axis("age", &["teen", "adult"])];
        let variants = apply(&modules(2), &axes);
        assert_eq!(variants.len(), 12);

        for source in ["m000", "m001"] {
            let pairs: BTreeSet<(String, String)> = variants
                .iter()
                .filter(|v| v.source_module_id == source)
                .map(|v| (v.axis_values["gender"].clone(), v.axis_values["age"].clone()))
                .collect();
            assert_eq!(pairs.len(), 6, "unique (gender, age) pairs for {source}");
        }

        assert_eq!(variants[0].id, "m000@m.teen");
        assert_eq!(variants[11].id, "m001@n.adult");
    }

    #[test]
    fn catalog_scale_invariant() {
        let axes = vec![
            axis("tone", &["a", "b", "c"]),
            axis("age", &["t", "y", "a", "m", "s"]),
            axis("modality", &["v", "u", "k"]),
        ];
        let outcome = Multiplier::new().run(&modules(460), &axes);
        assert_eq!(outcome.variants.len(), 20_700);
        assert_eq!(expected_count(460, &axes), 20_700);

        let counts: Vec<usize> = outcome.stages.iter().map(|s| s.variants).collect();
        assert_eq!(counts, [1_380, 6_900, 20_700]);

        let ids: HashSet<&str> = outcome.variants.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids.len(), 20_700);
    }

    #[test]
    fn parallel_and_sequential_paths_agree() {
        let axes = vec![axis("tone", &["a", "b", "c"]), axis("age", &["x", "y"])];
        let base = modules(50);
        let sequential = Multiplier::new()
            .with_parallel_threshold(usize::MAX)
            .run(&base, &axes);
        let parallel = Multiplier::new().with_parallel_threshold(0).run(&base, &axes);
        assert_eq!(sequential.variants, parallel.variants);
    }

    #[test]
    fn deterministic_across_runs() {
        let axes = vec![axis("tone", &["a", "b"]), axis("age", &["x", "y", "z"])];
        let first = apply(&modules(7), &axes);
        let second = apply(&modules(7), &axes);
        assert_eq!(first, second);
    }

    #[test]
    fn cardinality_one_axis_keeps_count() {
        let axes = vec![axis("tone", &["a", "b"]), axis("locale", &["en"])];
        let base = modules(3);
        let with_single = apply(&base, &axes);
        let without = apply(&base, &axes[..1]);
        assert_eq!(with_single.len(), without.len());
        assert!(with_single.iter().all(|v| v.axis_values["locale"] == "en"));
    }

    #[test]
    fn no_axes_yields_base_modules() {
        let base = modules(4);
        let variants = apply(&base, &[]);
        assert_eq!(variants.len(), 4);
        for (module, variant) in base.iter().zip(&variants) {
            assert_eq!(variant.id, module.id);
            assert_eq!(variant.payload, module.payload);
            assert!(variant.axis_values.is_empty());
        }
    }

    #[test]
    fn adapt_is_pure_and_hashes_content() {
        let tone = axis("tone", &["a", "b"]);
        let base = ModuleVariant::from_base(&modules(1)[0]);
        let a1 = adapt(&base, &tone, "a");
        let a2 = adapt(&base, &tone, "a");
        let b = adapt(&base, &tone, "b");
        assert_eq!(a1, a2);
        assert_ne!(a1.content_hash, b.content_hash);
        assert_ne!(a1.content_hash, base.content_hash);
    }
}
