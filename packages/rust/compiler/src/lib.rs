//! Routing-spec compiler.
//!
//! Turns a built [`ModuleLibrary`] plus the routing configuration into the
//! immutable [`RoutingSpec`] document consumed by the downstream runtime.
//!
//! - [`compile`]: validate and emit
//! - [`write_spec`] / [`read_spec`]: atomic persistence with a digest check

mod spec;
mod validate;

pub use spec::{RoutingSpec, SCHEMA_VERSION, SpecVersion, library_from_spec, read_spec, write_spec};
pub use validate::problems;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use tiercast_shared::{
    AdaptationAxis, DegradationTable, EndpointTable, ModuleLibrary, Result, RoutingStep,
    TiercastError,
};

/// Compile a routing spec.
///
/// Two calls with identical inputs produce identical documents apart from
/// `version`. Every consistency problem is collected before failing.
#[instrument(skip_all, fields(library = library.version(), variants = library.len()))]
pub fn compile(
    library: &ModuleLibrary,
    axes: &[AdaptationAxis],
    degradation_table: &DegradationTable,
    algorithm_steps: &[RoutingStep],
    endpoints: &EndpointTable,
) -> Result<RoutingSpec> {
    let mut spec = RoutingSpec {
        version: SpecVersion {
            schema: SCHEMA_VERSION,
            build_id: Uuid::now_v7(),
            compiled_at: Utc::now(),
        },
        library_version: library.version().to_string(),
        total_modules: library.len(),
        base_modules: library.source_count(),
        content_digest: String::new(),
        axes: axes.to_vec(),
        degradation_levels: degradation_table.clone(),
        routing_algorithm_steps: algorithm_steps.to_vec(),
        endpoints: endpoints.clone(),
        modules: library.variants().to_vec(),
    };

    let mut found = Vec::new();
    if library.axes() != axes {
        found.push("library axes differ from the declared axes".to_string());
    }
    found.extend(problems(&spec));
    if !found.is_empty() {
        return Err(TiercastError::SpecValidation { problems: found });
    }

    spec.content_digest = spec.compute_digest()?;
    info!(
        digest = %spec.content_digest,
        total_modules = spec.total_modules,
        base_modules = spec.base_modules,
        "routing spec compiled"
    );
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiercast_multiplier::apply;
    use tiercast_shared::{DegradationRule, Module, StepSelector, default_routing_steps};

    fn axes() -> Vec<AdaptationAxis> {
        vec![
            AdaptationAxis::new("gender", ["m", "f", "n"]).unwrap(),
            AdaptationAxis::new("age", ["teen", "adult"]).unwrap(),
        ]
    }

    fn library() -> ModuleLibrary {
        let modules = vec![
            Module::new("m000", "content_creation", "technique", 10),
            Module::new("m001", "content_creation", "exercise", 15).with_tag("optional"),
        ];
        let axes = axes();
        ModuleLibrary::new(axes.clone(), apply(&modules, &axes)).unwrap()
    }

    fn compile_default(library: &ModuleLibrary) -> Result<RoutingSpec> {
        compile(
            library,
            &axes(),
            &DegradationTable::default(),
            &default_routing_steps(),
            &EndpointTable::default(),
        )
    }

    #[test]
    fn compiles_two_module_library() {
        let spec = compile_default(&library()).unwrap();
        assert_eq!(spec.total_modules, 12);
        assert_eq!(spec.base_modules, 2);
        assert_eq!(spec.version.schema, SCHEMA_VERSION);
        assert_eq!(spec.content_digest.len(), 64);
        assert_eq!(spec.degradation_levels.levels.len(), 5);
    }

    #[test]
    fn identical_inputs_differ_only_in_version() {
        let library = library();
        let a = compile_default(&library).unwrap();
        let mut b = compile_default(&library).unwrap();
        assert_eq!(a.content_digest, b.content_digest);
        assert_ne!(a.version.build_id, b.version.build_id);

        b.version = a.version.clone();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn collects_every_problem() {
        let mut table = DegradationTable::default();
        table.levels[2].rules.push(DegradationRule::Drop {
            selector: StepSelector::axis_value("mood", "calm"),
        });
        table.levels[4].duration_ceiling = 30;

        let mut endpoints = EndpointTable::default();
        endpoints.0.remove("emergency_help");
        endpoints.0.insert("track_progress".into(), "v1/progress".into());

        let err = compile(&library(), &axes(), &table, &[], &endpoints).unwrap_err();
        let TiercastError::SpecValidation { problems } = err else {
            panic!("expected spec validation error");
        };
        let joined = problems.join("\n");
        assert!(joined.contains("unknown axis `mood`"), "{joined}");
        assert!(joined.contains("emergency"), "{joined}");
        assert!(joined.contains("routing"), "{joined}");
        assert!(joined.contains("emergency_help"), "{joined}");
        assert!(joined.contains("v1/progress"), "{joined}");
        assert!(problems.len() >= 5);
    }

    #[test]
    fn rejects_axis_mismatch_and_bad_counts() {
        let library = library();
        let mut declared = axes();
        declared.push(AdaptationAxis::new("modality", ["visual", "auditory"]).unwrap());

        let err = compile(
            &library,
            &declared,
            &DegradationTable::default(),
            &default_routing_steps(),
            &EndpointTable::default(),
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("library axes differ"), "{msg}");
        assert!(msg.contains("total_modules 12"), "{msg}");
    }

    #[test]
    fn duplicate_routing_steps_rejected() {
        let mut steps = default_routing_steps();
        steps.push(steps[0].clone());
        let err = compile(
            &library(),
            &axes(),
            &DegradationTable::default(),
            &steps,
            &EndpointTable::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("routing step `profiling` appears twice"));
    }
}
