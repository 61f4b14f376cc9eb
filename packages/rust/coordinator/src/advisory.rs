//! Collaborator advisory: which producers look related to a given one.
//!
//! Purely informational. Nothing here reads or changes pipeline state.

use std::collections::BTreeSet;

use serde::Serialize;

use tiercast_shared::{Result, TiercastError};

use crate::registry::ProducerRegistry;

/// One ranked suggestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollaboratorSuggestion {
    pub producer: String,
    /// Jaccard similarity of the two keyword sets, in `(0, 1]`.
    pub score: f64,
    pub shared_keywords: Vec<String>,
}

/// Rank every other producer by keyword overlap with `name`.
///
/// Producers with no overlap are omitted. Ties are broken by name.
pub fn advise_collaborators(
    registry: &ProducerRegistry,
    name: &str,
    limit: usize,
) -> Result<Vec<CollaboratorSuggestion>> {
    let target = registry
        .get(name)
        .ok_or_else(|| TiercastError::validation(format!("unknown producer `{name}`")))?;
    let wanted = keyword_set(target.keywords());

    let mut ranked: Vec<CollaboratorSuggestion> = registry
        .iter()
        .filter(|p| p.name() != name)
        .filter_map(|p| {
            let other = keyword_set(p.keywords());
            let shared: Vec<String> = wanted.intersection(&other).cloned().collect();
            if shared.is_empty() {
                return None;
            }
            let union = wanted.union(&other).count();
            Some(CollaboratorSuggestion {
                producer: p.name().to_string(),
                score: shared.len() as f64 / union as f64,
                shared_keywords: shared,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.producer.cmp(&b.producer))
    });
    ranked.truncate(limit);
    Ok(ranked)
}

fn keyword_set(keywords: &[String]) -> BTreeSet<String> {
    keywords.iter().map(|k| k.trim().to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tiercast_shared::AppConfig;

    fn registry() -> ProducerRegistry {
        ProducerRegistry::from_config(&AppConfig::default().producers, Path::new(".")).unwrap()
    }

    #[test]
    fn ranks_by_keyword_overlap() {
        let suggestions = advise_collaborators(&registry(), "protocols", 5).unwrap();
        let names: Vec<&str> = suggestions.iter().map(|s| s.producer.as_str()).collect();
        // protocols {protocol, technique, exercise}
        // exercises {exercise}: 1/3; techniques {technique, breathing}: 1/4
        assert_eq!(names, ["exercises", "techniques"]);
        assert!((suggestions[0].score - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(suggestions[1].shared_keywords, ["technique"]);
    }

    #[test]
    fn limit_and_unknown_producer() {
        assert_eq!(advise_collaborators(&registry(), "protocols", 1).unwrap().len(), 1);
        assert!(advise_collaborators(&registry(), "safety", 3).unwrap().is_empty());
        assert!(advise_collaborators(&registry(), "nope", 3).is_err());
    }
}
