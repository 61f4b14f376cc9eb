//! Core domain types for Tiercast catalogs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TiercastError;

/// Tag marking a step that must happen before the experience can start.
pub const TAG_PREPARATORY: &str = "preparatory";

/// Tag marking a step that can be dropped first when time is short.
pub const TAG_OPTIONAL: &str = "optional";

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("static regex"));

/// Whether `s` is a valid axis name or axis value.
pub fn is_identifier(s: &str) -> bool {
    IDENTIFIER.is_match(s)
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

/// An atomic content unit emitted by a producer.
///
/// The core never interprets `payload`; it only reads ids, durations, and tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Unique module identifier.
    pub id: String,
    /// Name of the phase whose producer created this module.
    pub phase_origin: String,
    /// Content category (e.g. `technique`, `exercise`, `script`).
    pub category: String,
    /// Opaque producer payload.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Duration of the full-length module, in minutes.
    pub base_duration: u32,
    /// Free-form tags. See [`TAG_PREPARATORY`] and [`TAG_OPTIONAL`].
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Module {
    pub fn new(
        id: impl Into<String>,
        phase_origin: impl Into<String>,
        category: impl Into<String>,
        base_duration: u32,
    ) -> Self {
        Self {
            id: id.into(),
            phase_origin: phase_origin.into(),
            category: category.into(),
            payload: serde_json::Value::Null,
            base_duration,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_preparatory(&self) -> bool {
        self.tags.contains(TAG_PREPARATORY)
    }
}

// ---------------------------------------------------------------------------
// AdaptationAxis
// ---------------------------------------------------------------------------

/// A named adaptation dimension with a finite, ordered set of values.
///
/// Construction validates that the value set is non-empty, unique, and made of
/// identifiers, and that the default belongs to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AxisDef")]
pub struct AdaptationAxis {
    name: String,
    values: Vec<String>,
    default: String,
}

/// Unvalidated wire form of an axis.
#[derive(Deserialize)]
struct AxisDef {
    name: String,
    values: Vec<String>,
    #[serde(default)]
    default: Option<String>,
}

impl TryFrom<AxisDef> for AdaptationAxis {
    type Error = TiercastError;

    fn try_from(def: AxisDef) -> Result<Self, Self::Error> {
        Self::with_default(def.name, def.values, def.default)
    }
}

impl AdaptationAxis {
    /// Create an axis whose default is its first value.
    pub fn new<I, S>(name: impl Into<String>, values: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_default(name, values.into_iter().map(Into::into).collect(), None)
    }

    /// Create an axis with an explicit default value.
    pub fn with_default(
        name: impl Into<String>,
        values: Vec<String>,
        default: Option<String>,
    ) -> crate::Result<Self> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(TiercastError::validation(format!(
                "axis name `{name}` is not a lowercase identifier"
            )));
        }
        if values.is_empty() {
            return Err(TiercastError::validation(format!(
                "axis `{name}` must declare at least one value"
            )));
        }

        let mut seen = BTreeSet::new();
        for value in &values {
            if !is_identifier(value) {
                return Err(TiercastError::validation(format!(
                    "axis `{name}` value `{value}` is not a lowercase identifier"
                )));
            }
            if !seen.insert(value.as_str()) {
                return Err(TiercastError::validation(format!(
                    "axis `{name}` declares value `{value}` twice"
                )));
            }
        }

        let default = match default {
            Some(d) if values.contains(&d) => d,
            Some(d) => {
                return Err(TiercastError::validation(format!(
                    "axis `{name}` default `{d}` is not one of its values"
                )));
            }
            None => values[0].clone(),
        };

        Ok(Self {
            name,
            values,
            default,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Value used when a profile requests something the library cannot serve.
    pub fn default_value(&self) -> &str {
        &self.default
    }

    pub fn cardinality(&self) -> usize {
        self.values.len()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    /// Position of `value` in declaration order.
    pub fn position(&self, value: &str) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }
}

/// Product of all axis cardinalities (1 for an empty list).
pub fn multiplier_factor(axes: &[AdaptationAxis]) -> usize {
    axes.iter().map(AdaptationAxis::cardinality).product()
}

// ---------------------------------------------------------------------------
// ModuleVariant
// ---------------------------------------------------------------------------

/// One module specialized to one combination of axis values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleVariant {
    /// `<source_id>@<v1>.<v2>...` in axis order; the bare source id with no axes.
    pub id: String,
    pub source_module_id: String,
    pub category: String,
    pub base_duration: u32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub axis_values: BTreeMap<String, String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// SHA-256 over `(source_module_id, axis_values, payload)`.
    pub content_hash: String,
}

impl ModuleVariant {
    /// The unadapted variant of a base module.
    pub fn from_base(module: &Module) -> Self {
        let mut variant = Self {
            id: module.id.clone(),
            source_module_id: module.id.clone(),
            category: module.category.clone(),
            base_duration: module.base_duration,
            tags: module.tags.clone(),
            axis_values: BTreeMap::new(),
            payload: module.payload.clone(),
            content_hash: String::new(),
        };
        variant.content_hash = variant.compute_content_hash();
        variant
    }

    pub fn is_preparatory(&self) -> bool {
        self.tags.contains(TAG_PREPARATORY)
    }

    /// Hash of the fields that define this variant's content.
    pub fn compute_content_hash(&self) -> String {
        let canonical = serde_json::json!({
            "source": self.source_module_id,
            "axes": self.axis_values,
            "payload": self.payload,
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// DegradationLevel
// ---------------------------------------------------------------------------

/// The five duration tiers, ordered from longest to shortest.
///
/// `Ord` follows chain depth: `Program < Phase < ... < Emergency`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    #[serde(alias = "full")]
    Program,
    #[serde(alias = "major")]
    Phase,
    #[serde(alias = "daily")]
    Day,
    #[serde(alias = "brief")]
    Session,
    #[serde(alias = "instant")]
    Emergency,
}

impl DegradationLevel {
    /// The chain in order.
    pub const ALL: [DegradationLevel; 5] = [
        Self::Program,
        Self::Phase,
        Self::Day,
        Self::Session,
        Self::Emergency,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The next shorter level, if any.
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// The next longer level, if any.
    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Program => "program",
            Self::Phase => "phase",
            Self::Day => "day",
            Self::Session => "session",
            Self::Emergency => "emergency",
        }
    }

    /// The rename-neutral alias (`full`, `major`, `daily`, `brief`, `instant`).
    pub fn neutral_name(self) -> &'static str {
        match self {
            Self::Program => "full",
            Self::Phase => "major",
            Self::Day => "daily",
            Self::Session => "brief",
            Self::Emergency => "instant",
        }
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DegradationLevel {
    type Err = TiercastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == needle || l.neutral_name() == needle)
            .ok_or_else(|| TiercastError::validation(format!("unknown degradation level `{s}`")))
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Per-consumer adaptation choices produced by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsychographicProfile {
    pub axis_values: BTreeMap<String, String>,
}

impl PsychographicProfile {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            axis_values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, axis: &str) -> Option<&str> {
        self.axis_values.get(axis).map(String::as_str)
    }
}

/// Recorded when routing substituted an axis default for a requested value.
///
/// Surfaced as selection metadata; never an error.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileFallback {
    pub axis: String,
    /// The value the profile asked for (`None` if the profile omitted the axis).
    pub requested: Option<String>,
    pub used: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_validation() {
        let axis = AdaptationAxis::new("tone", ["gentle", "direct"]).unwrap();
        assert_eq!(axis.cardinality(), 2);
        assert_eq!(axis.default_value(), "gentle");

        assert!(AdaptationAxis::new("tone", Vec::<String>::new()).is_err());
        assert!(AdaptationAxis::new("tone", ["a", "a"]).is_err());
        assert!(AdaptationAxis::new("Tone", ["a"]).is_err());
        assert!(
            AdaptationAxis::with_default("tone", vec!["a".into()], Some("b".into())).is_err()
        );
    }

    #[test]
    fn axis_deserialization_validates() {
        let ok: AdaptationAxis =
            serde_json::from_str(r#"{"name":"age","values":["teen","adult"],"default":"adult"}"#)
                .expect("valid axis");
        assert_eq!(ok.default_value(), "adult");

        let bad = serde_json::from_str::<AdaptationAxis>(r#"{"name":"age","values":[]}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn level_chain_navigation() {
        assert_eq!(DegradationLevel::Program.next(), Some(DegradationLevel::Phase));
        assert_eq!(DegradationLevel::Emergency.next(), None);
        assert_eq!(DegradationLevel::Program.previous(), None);
        assert!(DegradationLevel::Program < DegradationLevel::Emergency);
        assert_eq!(
            "brief".parse::<DegradationLevel>().unwrap(),
            DegradationLevel::Session
        );
        let parsed: DegradationLevel = serde_json::from_str("\"instant\"").unwrap();
        assert_eq!(parsed, DegradationLevel::Emergency);
        assert_eq!(
            serde_json::to_string(&DegradationLevel::Day).unwrap(),
            "\"day\""
        );
    }

    #[test]
    fn base_variant_mirrors_module() {
        let module = Module::new("m1", "content_creation", "technique", 10)
            .with_tag(TAG_PREPARATORY)
            .with_payload(serde_json::json!({"title": "Box breathing"}));
        let variant = ModuleVariant::from_base(&module);
        assert_eq!(variant.id, "m1");
        assert!(variant.is_preparatory());
        assert!(variant.axis_values.is_empty());
        assert_eq!(variant.content_hash.len(), 64);
    }

    #[test]
    fn multiplier_factor_of_empty_list_is_one() {
        assert_eq!(multiplier_factor(&[]), 1);
    }
}
