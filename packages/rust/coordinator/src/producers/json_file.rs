use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use tiercast_shared::{Module, Result, TiercastError};

use crate::producer::{PhaseContext, Producer};

/// Reads a JSON array of modules from disk on every attempt.
#[derive(Debug, Clone)]
pub struct JsonFileProducer {
    name: String,
    keywords: Vec<String>,
    path: PathBuf,
}

/// On-disk module record; `phase_origin` defaults to the running phase.
#[derive(Debug, Deserialize)]
struct ModuleRecord {
    id: String,
    #[serde(default)]
    phase_origin: Option<String>,
    category: String,
    base_duration: u32,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    tags: BTreeSet<String>,
}

impl JsonFileProducer {
    pub fn new(name: impl Into<String>, keywords: Vec<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            keywords,
            path: path.into(),
        }
    }
}

#[async_trait]
impl Producer for JsonFileProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn keywords(&self) -> &[String] {
        &self.keywords
    }

    async fn produce(&self, ctx: PhaseContext) -> Result<Vec<Module>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| TiercastError::io(&self.path, e))?;
        let records: Vec<ModuleRecord> = serde_json::from_str(&raw).map_err(|e| {
            TiercastError::producer(&self.name, format!("{}: {e}", self.path.display()))
        })?;

        Ok(records
            .into_iter()
            .map(|r| Module {
                id: r.id,
                phase_origin: r.phase_origin.unwrap_or_else(|| ctx.phase.clone()),
                category: r.category,
                payload: r.payload,
                base_duration: r.base_duration,
                tags: r.tags,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn ctx() -> PhaseContext {
        PhaseContext::new(Uuid::now_v7(), "content_creation", BTreeMap::new(), CancellationToken::new())
    }

    #[tokio::test]
    async fn reads_modules_and_fills_phase_origin() {
        let dir = std::env::temp_dir().join(format!("tiercast-json-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("modules.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "box-breathing", "category": "technique", "base_duration": 5, "tags": ["preparatory"]},
                {"id": "body-scan", "phase_origin": "imported", "category": "exercise", "base_duration": 12, "payload": {"steps": 4}}
            ]"#,
        )
        .unwrap();

        let producer = JsonFileProducer::new("seed", vec![], &path);
        let modules = producer.produce(ctx()).await.unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].phase_origin, "content_creation");
        assert!(modules[0].is_preparatory());
        assert_eq!(modules[1].phase_origin, "imported");
        assert_eq!(modules[1].payload["steps"], 4);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let producer = JsonFileProducer::new("seed", vec![], "/nonexistent/tiercast/modules.json");
        let err = producer.produce(ctx()).await.unwrap_err();
        assert!(matches!(err, TiercastError::Io { .. }));
    }
}
