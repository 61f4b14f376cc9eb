//! Name → producer resolution.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use tiercast_shared::{ProducerConfig, ProducerSource, Result, TiercastError};

use crate::producer::Producer;
use crate::producers::{GuardProducer, JsonFileProducer, TemplateProducer};

/// Holds every producer a coordinator may schedule.
///
/// Passed into the coordinator at construction; there is no global registry.
#[derive(Default)]
pub struct ProducerRegistry {
    producers: BTreeMap<String, Arc<dyn Producer>>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the built-in producers described by `[[producers]]`.
    ///
    /// Relative `json_file` paths resolve against `base_dir`.
    pub fn from_config(configs: &[ProducerConfig], base_dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            let producer: Arc<dyn Producer> = match &config.source {
                ProducerSource::JsonFile { path } => {
                    let path = if path.is_relative() {
                        base_dir.join(path)
                    } else {
                        path.clone()
                    };
                    Arc::new(JsonFileProducer::new(&config.name, config.keywords.clone(), path))
                }
                ProducerSource::Template { .. } => Arc::new(TemplateProducer::from_config(config)?),
                ProducerSource::Guard { .. } => Arc::new(GuardProducer::from_config(config)?),
            };
            registry.register(producer)?;
        }
        debug!(producers = registry.len(), "producer registry built");
        Ok(registry)
    }

    /// Add a producer, rejecting duplicate names.
    pub fn register(&mut self, producer: Arc<dyn Producer>) -> Result<()> {
        let name = producer.name().to_string();
        if self.producers.contains_key(&name) {
            return Err(TiercastError::validation(format!(
                "producer `{name}` is already registered"
            )));
        }
        self.producers.insert(name, producer);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Producer>> {
        self.producers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.producers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.producers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Producer> {
        self.producers.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}

impl std::fmt::Debug for ProducerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerRegistry")
            .field("producers", &self.producers.keys().collect::<Vec<_>>())
            .finish()
    }
}
