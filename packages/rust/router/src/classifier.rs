//! Data-driven questionnaire classifier.

use std::collections::BTreeMap;

use tracing::debug;

use tiercast_shared::{
    AdaptationAxis, AppConfig, PsychographicProfile, Result, Signal, TiercastError,
};

/// Question id → free-text answer.
pub type Responses = BTreeMap<String, String>;

/// Turns questionnaire responses into one value per axis.
///
/// Per axis, in priority order:
/// 1. a response keyed by the axis name whose answer is a valid value (self-report);
/// 2. the value with the highest summed signal weight, ties broken by declaration order;
/// 3. the axis default.
#[derive(Debug, Clone)]
pub struct Classifier {
    axes: Vec<AdaptationAxis>,
    signals: Vec<Signal>,
}

impl Classifier {
    pub fn new(axes: Vec<AdaptationAxis>, signals: Vec<Signal>) -> Result<Self> {
        for signal in &signals {
            let known = axes
                .iter()
                .find(|a| a.name() == signal.axis)
                .is_some_and(|a| a.contains(&signal.value));
            if !known {
                return Err(TiercastError::validation(format!(
                    "signal `{}` targets unknown axis value `{}={}`",
                    signal.question, signal.axis, signal.value
                )));
            }
        }
        Ok(Self { axes, signals })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(config.axes.clone(), config.classifier.signals.clone())
    }

    pub fn classify(&self, responses: &Responses) -> PsychographicProfile {
        let normalized: BTreeMap<&str, String> = responses
            .iter()
            .map(|(q, a)| (q.as_str(), normalize(a)))
            .collect();

        let axis_values = self
            .axes
            .iter()
            .map(|axis| {
                let value = self.resolve(axis, &normalized);
                (axis.name().to_string(), value)
            })
            .collect();

        PsychographicProfile { axis_values }
    }

    fn resolve(&self, axis: &AdaptationAxis, responses: &BTreeMap<&str, String>) -> String {
        if let Some(answer) = responses.get(axis.name()) {
            if axis.contains(answer) {
                return answer.clone();
            }
        }

        let mut scores = vec![0u32; axis.cardinality()];
        for signal in self.signals.iter().filter(|s| s.axis == axis.name()) {
            let hit = responses
                .get(signal.question.as_str())
                .is_some_and(|answer| *answer == normalize(&signal.answer));
            if hit {
                if let Some(pos) = axis.position(&signal.value) {
                    scores[pos] = scores[pos].saturating_add(signal.weight);
                }
            }
        }

        // `max_by_key` keeps the last maximum; iterate in reverse so ties go
        // to the earliest declared value.
        let best = scores
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, score)| **score > 0)
            .max_by_key(|(_, score)| **score)
            .map(|(pos, _)| pos);

        match best {
            Some(pos) => axis.values()[pos].clone(),
            None => {
                debug!(axis = axis.name(), "no signal matched, using axis default");
                axis.default_value().to_string()
            }
        }
    }
}

fn normalize(answer: &str) -> String {
    answer.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(question: &str, answer: &str, axis: &str, value: &str, weight: u32) -> Signal {
        Signal {
            question: question.into(),
            answer: answer.into(),
            axis: axis.into(),
            value: value.into(),
            weight,
        }
    }

    fn classifier() -> Classifier {
        let axes = vec![
            AdaptationAxis::new("tone", ["gentle", "direct", "playful"]).unwrap(),
            AdaptationAxis::new("age", ["teen", "adult"]).unwrap(),
        ];
        let signals = vec![
            signal("stress", "High", "tone", "gentle", 2),
            signal("humor", "yes", "tone", "playful", 1),
            signal("feedback", "blunt", "tone", "direct", 1),
            signal("age_group", "under 18", "age", "teen", 1),
        ];
        Classifier::new(axes, signals).unwrap()
    }

    fn responses(pairs: &[(&str, &str)]) -> Responses {
        pairs
            .iter()
            .map(|(q, a)| (q.to_string(), a.to_string()))
            .collect()
    }

    #[test]
    fn weighted_signals_pick_value() {
        let profile = classifier().classify(&responses(&[
            ("stress", "  high "),
            ("humor", "yes"),
            ("age_group", "Under 18"),
        ]));
        assert_eq!(profile.get("tone"), Some("gentle"));
        assert_eq!(profile.get("age"), Some("teen"));
    }

    #[test]
    fn ties_go_to_declaration_order() {
        let profile = classifier().classify(&responses(&[("humor", "yes"), ("feedback", "blunt")]));
        assert_eq!(profile.get("tone"), Some("direct"));
    }

    #[test]
    fn self_report_wins_over_signals() {
        let profile = classifier().classify(&responses(&[("stress", "high"), ("tone", "Playful")]));
        assert_eq!(profile.get("tone"), Some("playful"));
    }

    #[test]
    fn no_signal_uses_default() {
        let profile = classifier().classify(&Responses::new());
        assert_eq!(profile.get("tone"), Some("gentle"));
        assert_eq!(profile.get("age"), Some("teen"));
        assert_eq!(profile.axis_values.len(), 2);
    }

    #[test]
    fn unknown_signal_target_rejected() {
        let axes = vec![AdaptationAxis::new("tone", ["gentle"]).unwrap()];
        let result = Classifier::new(axes, vec![signal("q", "a", "tone", "loud", 1)]);
        assert!(result.is_err());
    }

    #[test]
    fn deterministic() {
        let c = classifier();
        let r = responses(&[("stress", "high"), ("age_group", "over 40")]);
        assert_eq!(c.classify(&r), c.classify(&r));
    }
}
