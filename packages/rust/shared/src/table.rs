//! Degradation table, routing algorithm steps, and endpoint table.
//!
//! These are the data-driven tables compiled into the routing spec. They are
//! loaded from configuration and validated once at startup.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{DegradationLevel, TAG_OPTIONAL, TAG_PREPARATORY};

/// Logical operations every endpoint table must route.
pub const REQUIRED_ENDPOINTS: [&str; 6] = [
    "get_profile",
    "get_recommended_program",
    "get_module",
    "get_degraded_variant",
    "track_progress",
    "emergency_help",
];

static ENDPOINT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[A-Za-z0-9_{}\-/]*$").expect("static regex"));

// ---------------------------------------------------------------------------
// Degradation rules
// ---------------------------------------------------------------------------

/// Matches program steps by tag, category, or axis value.
///
/// Every field that is set must match; an empty selector matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl StepSelector {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }

    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    pub fn axis_value(axis: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            axis: Some(axis.into()),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tag.is_none() && self.category.is_none() && self.axis.is_none()
    }
}

/// One operation in a transition's rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DegradationRule {
    /// Remove every step the selector matches.
    Drop { selector: StepSelector },
    /// Merge runs of consecutive same-category steps, at most `max_group` per merged step.
    Merge { max_group: usize },
    /// Replace every step with a summary lasting `percent`% of it (rounded up, minimum 1).
    Summarize { percent: u8 },
    /// Keep only the first `count` steps.
    KeepFirst { count: usize },
    /// Drop trailing steps beyond `minutes`; truncate the first step if it alone exceeds it.
    CapDuration { minutes: u32 },
}

impl DegradationRule {
    /// Short operation name used in reports.
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Drop { .. } => "drop",
            Self::Merge { .. } => "merge",
            Self::Summarize { .. } => "summarize",
            Self::KeepFirst { .. } => "keep_first",
            Self::CapDuration { .. } => "cap_duration",
        }
    }

    /// The axis this rule references, if any.
    pub fn referenced_axis(&self) -> Option<(&str, Option<&str>)> {
        match self {
            Self::Drop { selector } => selector
                .axis
                .as_deref()
                .map(|axis| (axis, selector.value.as_deref())),
            _ => None,
        }
    }

    fn problems(&self, level: DegradationLevel) -> Vec<String> {
        let mut problems = Vec::new();
        match self {
            Self::Drop { selector } => {
                if selector.is_empty() {
                    problems.push(format!("{level}: drop rule has an empty selector"));
                }
                if selector.axis.is_some() != selector.value.is_some() {
                    problems.push(format!(
                        "{level}: drop selector must set `axis` and `value` together"
                    ));
                }
            }
            Self::Merge { max_group } if *max_group < 2 => {
                problems.push(format!("{level}: merge max_group must be at least 2"));
            }
            Self::Summarize { percent } if *percent == 0 || *percent > 100 => {
                problems.push(format!("{level}: summarize percent must be within 1..=100"));
            }
            Self::KeepFirst { count } if *count == 0 => {
                problems.push(format!("{level}: keep_first count must be at least 1"));
            }
            Self::CapDuration { minutes } if *minutes == 0 => {
                problems.push(format!("{level}: cap_duration minutes must be positive"));
            }
            _ => {}
        }
        problems
    }
}

// ---------------------------------------------------------------------------
// Degradation table
// ---------------------------------------------------------------------------

/// A level's duration ceiling and the rules applied when entering it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSpec {
    #[serde(rename = "name", alias = "level")]
    pub level: DegradationLevel,
    /// Maximum total duration at this level, in minutes.
    pub duration_ceiling: u32,
    /// Rules applied on the transition from the previous level into this one.
    #[serde(rename = "content_budget_rule", alias = "rules", default)]
    pub rules: Vec<DegradationRule>,
}

/// One entry per [`DegradationLevel`], in chain order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DegradationTable {
    pub levels: Vec<LevelSpec>,
}

impl Default for DegradationTable {
    fn default() -> Self {
        use DegradationRule::*;
        Self {
            levels: vec![
                LevelSpec {
                    level: DegradationLevel::Program,
                    duration_ceiling: 2400,
                    rules: vec![],
                },
                LevelSpec {
                    level: DegradationLevel::Phase,
                    duration_ceiling: 600,
                    rules: vec![Merge { max_group: 2 }],
                },
                LevelSpec {
                    level: DegradationLevel::Day,
                    duration_ceiling: 60,
                    rules: vec![
                        Drop {
                            selector: StepSelector::tag(TAG_OPTIONAL),
                        },
                        Merge { max_group: 3 },
                    ],
                },
                LevelSpec {
                    level: DegradationLevel::Session,
                    duration_ceiling: 20,
                    rules: vec![
                        Summarize { percent: 50 },
                        Drop {
                            selector: StepSelector::tag(TAG_PREPARATORY),
                        },
                        KeepFirst { count: 3 },
                    ],
                },
                LevelSpec {
                    level: DegradationLevel::Emergency,
                    duration_ceiling: 5,
                    rules: vec![
                        Drop {
                            selector: StepSelector::tag(TAG_PREPARATORY),
                        },
                        KeepFirst { count: 1 },
                        Summarize { percent: 50 },
                    ],
                },
            ],
        }
    }
}

impl DegradationTable {
    pub fn get(&self, level: DegradationLevel) -> Option<&LevelSpec> {
        self.levels.iter().find(|l| l.level == level)
    }

    pub fn ceiling(&self, level: DegradationLevel) -> Option<u32> {
        self.get(level).map(|l| l.duration_ceiling)
    }

    /// Every `(axis, value)` any rule references.
    pub fn referenced_axes(&self) -> Vec<(DegradationLevel, &str, Option<&str>)> {
        self.levels
            .iter()
            .flat_map(|spec| {
                spec.rules
                    .iter()
                    .filter_map(move |r| r.referenced_axis().map(|(a, v)| (spec.level, a, v)))
            })
            .collect()
    }

    /// Structural problems: chain order, strictly decreasing ceilings, rule sanity.
    ///
    /// Axis references are checked by callers that know the axis list.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let declared: Vec<DegradationLevel> = self.levels.iter().map(|l| l.level).collect();
        if declared != DegradationLevel::ALL {
            problems.push(format!(
                "degradation table must list program, phase, day, session, emergency in order (got [{}])",
                declared
                    .iter()
                    .map(|l| l.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        for spec in &self.levels {
            if spec.duration_ceiling == 0 {
                problems.push(format!("{}: duration ceiling must be positive", spec.level));
            }
            if spec.level == DegradationLevel::Program && !spec.rules.is_empty() {
                problems.push("program: the top level cannot carry degradation rules".into());
            }
            for rule in &spec.rules {
                problems.extend(rule.problems(spec.level));
            }
        }

        for pair in self.levels.windows(2) {
            if pair[1].duration_ceiling >= pair[0].duration_ceiling {
                problems.push(format!(
                    "{} ceiling ({}) must be strictly less than {} ceiling ({})",
                    pair[1].level,
                    pair[1].duration_ceiling,
                    pair[0].level,
                    pair[0].duration_ceiling
                ));
            }
        }

        problems
    }
}

// ---------------------------------------------------------------------------
// Routing algorithm steps
// ---------------------------------------------------------------------------

/// A named step of the routing algorithm described to the downstream runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingStep {
    pub name: String,
    pub description: String,
}

/// profiling → matching → selection → assembly → delivery.
pub fn default_routing_steps() -> Vec<RoutingStep> {
    [
        ("profiling", "classify questionnaire responses into axis values"),
        ("matching", "resolve each axis value against the library, falling back to axis defaults"),
        ("selection", "pick one variant per source module for the resolved profile"),
        ("assembly", "order selected variants into a program at the requested level"),
        ("delivery", "degrade the program to the consumer's time budget and serve it"),
    ]
    .into_iter()
    .map(|(name, description)| RoutingStep {
        name: name.into(),
        description: description.into(),
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Endpoint table
// ---------------------------------------------------------------------------

/// Logical operation name → path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointTable(pub BTreeMap<String, String>);

impl Default for EndpointTable {
    fn default() -> Self {
        Self(
            [
                ("get_profile", "/v1/profile"),
                ("get_recommended_program", "/v1/programs/recommended"),
                ("get_module", "/v1/modules/{module_id}"),
                ("get_degraded_variant", "/v1/programs/{program_id}/levels/{level}"),
                ("track_progress", "/v1/progress"),
                ("emergency_help", "/v1/emergency"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        )
    }
}

impl EndpointTable {
    pub fn path(&self, operation: &str) -> Option<&str> {
        self.0.get(operation).map(String::as_str)
    }

    /// Missing required operations, malformed paths, and duplicate paths.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for op in REQUIRED_ENDPOINTS {
            if !self.0.contains_key(op) {
                problems.push(format!("endpoint table is missing `{op}`"));
            }
        }

        let mut seen = BTreeSet::new();
        for (op, path) in &self.0 {
            if !ENDPOINT_PATH.is_match(path) {
                problems.push(format!("endpoint `{op}` has malformed path `{path}`"));
            }
            if !seen.insert(path.as_str()) {
                problems.push(format!("endpoint path `{path}` is routed more than once"));
            }
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_valid() {
        let table = DegradationTable::default();
        assert!(table.problems().is_empty(), "{:?}", table.problems());
        assert_eq!(table.ceiling(DegradationLevel::Emergency), Some(5));
    }

    #[test]
    fn ceilings_strictly_decrease() {
        let table = DegradationTable::default();
        for pair in table.levels.windows(2) {
            assert!(pair[0].duration_ceiling > pair[1].duration_ceiling);
        }
    }

    #[test]
    fn non_decreasing_ceiling_is_reported() {
        let mut table = DegradationTable::default();
        table.levels[2].duration_ceiling = 600;
        let problems = table.problems();
        assert!(problems.iter().any(|p| p.contains("day ceiling (600)")));
    }

    #[test]
    fn misordered_levels_are_reported() {
        let mut table = DegradationTable::default();
        table.levels.swap(1, 2);
        assert!(table.problems().iter().any(|p| p.contains("in order")));
    }

    #[test]
    fn rule_wire_format() {
        let rule: DegradationRule =
            serde_json::from_str(r#"{"op":"drop","selector":{"tag":"optional"}}"#).unwrap();
        assert_eq!(
            rule,
            DegradationRule::Drop {
                selector: StepSelector::tag("optional")
            }
        );

        let spec: LevelSpec = serde_json::from_str(
            r#"{"level":"brief","duration_ceiling":20,"rules":[{"op":"keep_first","count":2}]}"#,
        )
        .unwrap();
        assert_eq!(spec.level, DegradationLevel::Session);

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["name"], "session");
        assert_eq!(json["content_budget_rule"][0]["op"], "keep_first");
    }

    #[test]
    fn referenced_axes_are_collected() {
        let mut table = DegradationTable::default();
        table.levels[3].rules.push(DegradationRule::Drop {
            selector: StepSelector::axis_value("intensity", "high"),
        });
        let refs = table.referenced_axes();
        assert_eq!(
            refs,
            vec![(DegradationLevel::Session, "intensity", Some("high"))]
        );
    }

    #[test]
    fn endpoint_table_checks() {
        assert!(EndpointTable::default().problems().is_empty());

        let mut table = EndpointTable::default();
        table.0.remove("emergency_help");
        table.0.insert("track_progress".into(), "v1/progress".into());
        let problems = table.problems();
        assert!(problems.iter().any(|p| p.contains("emergency_help")));
        assert!(problems.iter().any(|p| p.contains("malformed")));
    }

    #[test]
    fn default_routing_steps_order() {
        let names: Vec<String> = default_routing_steps().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            ["profiling", "matching", "selection", "assembly", "delivery"]
        );
    }
}
