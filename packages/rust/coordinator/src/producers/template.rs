use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::json;

use tiercast_shared::{
    Module, ProducerConfig, ProducerSource, Result, TAG_OPTIONAL, TAG_PREPARATORY, TiercastError,
};

use crate::producer::{PhaseContext, Producer};

/// Generates `count` modules named `<prefix>-<nnn>` from one template.
#[derive(Debug, Clone)]
pub struct TemplateProducer {
    name: String,
    keywords: Vec<String>,
    prefix: String,
    count: usize,
    category: String,
    base_duration: u32,
    tags: BTreeSet<String>,
    preparatory_every: Option<usize>,
    optional_every: Option<usize>,
}

impl TemplateProducer {
    pub fn new(
        name: impl Into<String>,
        prefix: impl Into<String>,
        count: usize,
        category: impl Into<String>,
        base_duration: u32,
    ) -> Self {
        Self {
            name: name.into(),
            keywords: Vec::new(),
            prefix: prefix.into(),
            count,
            category: category.into(),
            base_duration,
            tags: BTreeSet::new(),
            preparatory_every: None,
            optional_every: None,
        }
    }

    pub fn from_config(config: &ProducerConfig) -> Result<Self> {
        let ProducerSource::Template {
            prefix,
            count,
            category,
            base_duration,
            tags,
            preparatory_every,
            optional_every,
        } = &config.source
        else {
            return Err(TiercastError::config(format!(
                "producer `{}` is not a template producer",
                config.name
            )));
        };

        Ok(Self {
            name: config.name.clone(),
            keywords: config.keywords.clone(),
            prefix: prefix.clone(),
            count: *count,
            category: category.clone(),
            base_duration: *base_duration,
            tags: tags.iter().cloned().collect(),
            preparatory_every: preparatory_every.filter(|n| *n > 0),
            optional_every: optional_every.filter(|n| *n > 0),
        })
    }

    fn module(&self, index: usize, phase: &str) -> Module {
        let mut module = Module::new(
            format!("{}-{index:03}", self.prefix),
            phase,
            &self.category,
            self.base_duration,
        )
        .with_payload(json!({ "template": self.name, "index": index }));
        module.tags = self.tags.clone();
        if self.preparatory_every.is_some_and(|n| index % n == 0) {
            module.tags.insert(TAG_PREPARATORY.into());
        }
        if self.optional_every.is_some_and(|n| index % n == 0) {
            module.tags.insert(TAG_OPTIONAL.into());
        }
        module
    }
}

#[async_trait]
impl Producer for TemplateProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn keywords(&self) -> &[String] {
        &self.keywords
    }

    async fn produce(&self, ctx: PhaseContext) -> Result<Vec<Module>> {
        Ok((1..=self.count).map(|i| self.module(i, &ctx.phase)).collect())
    }
}
