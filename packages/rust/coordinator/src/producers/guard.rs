use async_trait::async_trait;
use tracing::debug;

use tiercast_shared::{Module, ProducerConfig, ProducerSource, Result, TiercastError};

use crate::producer::{PhaseContext, Producer};

/// Validation producer: checks predecessor manifests and emits nothing.
#[derive(Debug, Clone, Default)]
pub struct GuardProducer {
    name: String,
    keywords: Vec<String>,
    max_duration: Option<u32>,
    forbidden_tags: Vec<String>,
    min_modules: Option<usize>,
}

impl GuardProducer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_max_duration(mut self, minutes: u32) -> Self {
        self.max_duration = Some(minutes);
        self
    }

    pub fn with_forbidden_tag(mut self, tag: impl Into<String>) -> Self {
        self.forbidden_tags.push(tag.into());
        self
    }

    pub fn with_min_modules(mut self, count: usize) -> Self {
        self.min_modules = Some(count);
        self
    }

    pub fn from_config(config: &ProducerConfig) -> Result<Self> {
        let ProducerSource::Guard {
            max_duration,
            forbidden_tags,
            min_modules,
        } = &config.source
        else {
            return Err(TiercastError::config(format!(
                "producer `{}` is not a guard producer",
                config.name
            )));
        };

        Ok(Self {
            name: config.name.clone(),
            keywords: config.keywords.clone(),
            max_duration: *max_duration,
            forbidden_tags: forbidden_tags.clone(),
            min_modules: *min_modules,
        })
    }

    fn check(&self, module: &Module) -> Option<String> {
        if let Some(max) = self.max_duration.filter(|max| module.base_duration > *max) {
            return Some(format!(
                "module `{}` lasts {} minutes, over the {max} minute limit",
                module.id, module.base_duration
            ));
        }
        self.forbidden_tags
            .iter()
            .find(|tag| module.tags.contains(*tag))
            .map(|tag| format!("module `{}` carries forbidden tag `{tag}`", module.id))
    }
}

#[async_trait]
impl Producer for GuardProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn keywords(&self) -> &[String] {
        &self.keywords
    }

    async fn produce(&self, ctx: PhaseContext) -> Result<Vec<Module>> {
        let mut checked = 0usize;
        for module in ctx.input_modules() {
            if let Some(problem) = self.check(module) {
                return Err(TiercastError::producer(&self.name, problem));
            }
            checked += 1;
        }

        if let Some(min) = self.min_modules.filter(|min| checked < *min) {
            return Err(TiercastError::producer(
                &self.name,
                format!("expected at least {min} modules from predecessors, found {checked}"),
            ));
        }

        debug!(producer = %self.name, checked, "guard passed");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use crate::manifest::PhaseManifest;

    fn ctx(modules: Vec<Module>) -> PhaseContext {
        let manifest = PhaseManifest {
            phase: "content_creation".into(),
            producers: vec![("seed".into(), modules.len())],
            modules,
        };
        let inputs = BTreeMap::from([("content_creation".to_string(), Arc::new(manifest))]);
        PhaseContext::new(Uuid::now_v7(), "safety_validation", inputs, CancellationToken::new())
    }

    #[tokio::test]
    async fn passes_clean_input() {
        let guard = GuardProducer::new("safety").with_max_duration(30).with_min_modules(1);
        let out = guard
            .produce(ctx(vec![Module::new("a", "p", "technique", 10)]))
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn rejects_each_violation() {
        let guard = GuardProducer::new("safety")
            .with_max_duration(30)
            .with_forbidden_tag("unsafe")
            .with_min_modules(2);

        let long = guard.produce(ctx(vec![Module::new("a", "p", "t", 45)])).await;
        assert!(long.unwrap_err().to_string().contains("over the 30 minute limit"));

        let tagged = guard
            .produce(ctx(vec![Module::new("a", "p", "t", 5).with_tag("unsafe")]))
            .await;
        assert!(tagged.unwrap_err().to_string().contains("forbidden tag `unsafe`"));

        let few = guard.produce(ctx(vec![Module::new("a", "p", "t", 5)])).await;
        assert!(few.unwrap_err().to_string().contains("at least 2 modules"));
    }
}
