//! The final module library: every variant, indexed by source module.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::error::{Result, TiercastError};
use crate::types::{AdaptationAxis, ModuleVariant};

/// An immutable snapshot of the adapted catalog.
///
/// The version is derived from variant ids and content hashes, so two
/// libraries with identical content share a version.
#[derive(Debug, Clone)]
pub struct ModuleLibrary {
    version: String,
    axes: Vec<AdaptationAxis>,
    variants: Vec<ModuleVariant>,
    /// Source ids in first-appearance order.
    sources: Vec<String>,
    /// Source id → indices into `variants`.
    index: HashMap<String, Vec<usize>>,
}

impl ModuleLibrary {
    /// Build a library, rejecting duplicate variant ids.
    pub fn new(axes: Vec<AdaptationAxis>, variants: Vec<ModuleVariant>) -> Result<Self> {
        let mut sources = Vec::new();
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        let mut ids = std::collections::HashSet::with_capacity(variants.len());
        let mut hasher = Sha256::new();

        for (i, variant) in variants.iter().enumerate() {
            if !ids.insert(variant.id.as_str()) {
                return Err(TiercastError::validation(format!(
                    "duplicate variant id `{}` in module library",
                    variant.id
                )));
            }
            hasher.update(variant.id.as_bytes());
            hasher.update(b"\0");
            hasher.update(variant.content_hash.as_bytes());
            hasher.update(b"\n");

            let slots = index.entry(variant.source_module_id.clone()).or_default();
            if slots.is_empty() {
                sources.push(variant.source_module_id.clone());
            }
            slots.push(i);
        }

        let digest = format!("{:x}", hasher.finalize());
        let version = format!("lib-{}", &digest[..16]);

        Ok(Self {
            version,
            axes,
            variants,
            sources,
            index,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn axes(&self) -> &[AdaptationAxis] {
        &self.axes
    }

    pub fn axis(&self, name: &str) -> Option<&AdaptationAxis> {
        self.axes.iter().find(|a| a.name() == name)
    }

    pub fn variants(&self) -> &[ModuleVariant] {
        &self.variants
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Number of distinct source modules.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Source module ids in first-appearance order.
    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(String::as_str)
    }

    /// All variants adapted from `source_id`, in library order.
    pub fn variants_of<'a>(&'a self, source_id: &str) -> impl Iterator<Item = &'a ModuleVariant> {
        self.index
            .get(source_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.variants[i])
    }

    pub fn get(&self, variant_id: &str) -> Option<&ModuleVariant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }
}
