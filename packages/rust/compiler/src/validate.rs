//! Consistency checks over a routing spec.

use std::collections::{BTreeSet, HashSet};

use tiercast_shared::multiplier_factor;

use crate::spec::RoutingSpec;

/// Every consistency problem in `spec`, in a stable order. Empty means valid.
///
/// The content digest is not checked here; see [`crate::read_spec`].
pub fn problems(spec: &RoutingSpec) -> Vec<String> {
    let mut problems = Vec::new();

    let mut axis_names = BTreeSet::new();
    for axis in &spec.axes {
        if !axis_names.insert(axis.name()) {
            problems.push(format!("axis `{}` is declared twice", axis.name()));
        }
    }

    problems.extend(spec.degradation_levels.problems());
    for (level, axis, value) in spec.degradation_levels.referenced_axes() {
        match spec.axes.iter().find(|a| a.name() == axis) {
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

    check_modules(spec, &mut problems);

    if spec.routing_algorithm_steps.is_empty() {
        problems.push("routing_algorithm_steps must not be empty".into());
    }
    let mut step_names = HashSet::new();
    for step in &spec.routing_algorithm_steps {
        if !step_names.insert(step.name.as_str()) {
            problems.push(format!("routing step `{}` appears twice", step.name));
        }
    }

    problems.extend(spec.endpoints.problems());
    problems
}

fn check_modules(spec: &RoutingSpec, problems: &mut Vec<String>) {
    let factor = multiplier_factor(&spec.axes);
    let expected = spec.base_modules.saturating_mul(factor);
    if spec.total_modules != expected {
        problems.push(format!(
            "total_modules {} does not equal base_modules {} x axis product {factor}",
            spec.total_modules, spec.base_modules
        ));
    }
    if spec.modules.len() != spec.total_modules {
        problems.push(format!(
            "total_modules {} does not match the {} modules listed",
            spec.total_modules,
            spec.modules.len()
        ));
    }

    let sources: HashSet<&str> = spec
        .modules
        .iter()
        .map(|m| m.source_module_id.as_str())
        .collect();
    if sources.len() != spec.base_modules {
        problems.push(format!(
            "base_modules {} does not match the {} source modules listed",
            spec.base_modules,
            sources.len()
        ));
    }

    let mut ids = HashSet::with_capacity(spec.modules.len());
    let mut off_axis = Vec::new();
    for variant in &spec.modules {
        if !ids.insert(variant.id.as_str()) {
            problems.push(format!("duplicate variant id `{}`", variant.id));
        }
        let keys_match = variant.axis_values.len() == spec.axes.len()
            && spec.axes.iter().all(|a| {
                variant
                    .axis_values
                    .get(a.name())
                    .is_some_and(|v| a.contains(v))
            });
        if !keys_match {
            off_axis.push(variant.id.as_str());
        }
    }
    if let Some(first) = off_axis.first() {
        problems.push(format!(
            "{} variants carry axis values outside the declared axes (first: `{first}`)",
            off_axis.len()
        ));
    }
}
