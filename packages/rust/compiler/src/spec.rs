//! The routing spec document and its persistence.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use tiercast_shared::{
    AdaptationAxis, DegradationTable, EndpointTable, ModuleLibrary, ModuleVariant, Result,
    RoutingStep, TiercastError,
};

use crate::validate::problems;

/// Current routing spec schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Build identity. The only part of a spec that is not content-derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecVersion {
    pub schema: u32,
    pub build_id: Uuid,
    pub compiled_at: DateTime<Utc>,
}

/// The compiled routing specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSpec {
    pub version: SpecVersion,
    pub library_version: String,
    pub total_modules: usize,
    pub base_modules: usize,
    /// SHA-256 over every field except `version` and the digest itself.
    pub content_digest: String,
    pub axes: Vec<AdaptationAxis>,
    pub degradation_levels: DegradationTable,
    pub routing_algorithm_steps: Vec<RoutingStep>,
    pub endpoints: EndpointTable,
    pub modules: Vec<ModuleVariant>,
}

/// Borrowed view of the digested fields, in document order.
#[derive(Serialize)]
struct DigestedContent<'a> {
    library_version: &'a str,
    total_modules: usize,
    base_modules: usize,
    axes: &'a [AdaptationAxis],
    degradation_levels: &'a DegradationTable,
    routing_algorithm_steps: &'a [RoutingStep],
    endpoints: &'a EndpointTable,
    modules: &'a [ModuleVariant],
}

impl RoutingSpec {
    /// Recompute the content digest from the current fields.
    pub fn compute_digest(&self) -> Result<String> {
        let content = DigestedContent {
            library_version: &self.library_version,
            total_modules: self.total_modules,
            base_modules: self.base_modules,
            axes: &self.axes,
            degradation_levels: &self.degradation_levels,
            routing_algorithm_steps: &self.routing_algorithm_steps,
            endpoints: &self.endpoints,
            modules: &self.modules,
        };
        let bytes = serde_json::to_vec(&content)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Rebuild the module library a spec was compiled from.
pub fn library_from_spec(spec: &RoutingSpec) -> Result<ModuleLibrary> {
    ModuleLibrary::new(spec.axes.clone(), spec.modules.clone())
}

/// Write `spec` to `path` atomically: a temp file in the same directory, then rename.
///
/// A reader of `path` sees either the previous spec or this one, never a partial file.
#[instrument(skip_all, fields(path = %path.display(), digest = %spec.content_digest))]
pub fn write_spec(spec: &RoutingSpec, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| TiercastError::io(dir, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TiercastError::validation(format!("invalid spec path: {}", path.display())))?;
    let temp = dir.join(format!(".{file_name}.tmp"));

    let json = serde_json::to_string_pretty(spec)?;
    std::fs::write(&temp, &json).map_err(|e| TiercastError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| TiercastError::io(path, e))?;

    info!(bytes = json.len(), "routing spec written");
    Ok(())
}

/// Load a spec and re-validate it, including the content digest.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_spec(path: &Path) -> Result<RoutingSpec> {
    let raw = std::fs::read_to_string(path).map_err(|e| TiercastError::io(path, e))?;
    let spec: RoutingSpec = serde_json::from_str(&raw)?;

    let mut found = problems(&spec);
    let digest = spec.compute_digest()?;
    if digest != spec.content_digest {
        found.push(format!(
            "content digest mismatch: recorded {}, computed {digest}",
            spec.content_digest
        ));
    }
    if !found.is_empty() {
        return Err(TiercastError::SpecValidation { problems: found });
    }

    debug!(digest = %spec.content_digest, modules = spec.total_modules, "routing spec loaded");
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use tiercast_multiplier::apply;
    use tiercast_shared::{Module, default_routing_steps};

    use crate::compile;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tiercast-spec-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn spec_with(module_ids: &[&str]) -> RoutingSpec {
        let axes = vec![AdaptationAxis::new("tone", ["gentle", "direct"]).unwrap()];
        let modules: Vec<Module> = module_ids
            .iter()
            .map(|id| Module::new(*id, "content_creation", "technique", 10))
            .collect();
        let library = ModuleLibrary::new(axes.clone(), apply(&modules, &axes)).unwrap();
        compile(
            &library,
            &axes,
            &DegradationTable::default(),
            &default_routing_steps(),
            &EndpointTable::default(),
        )
        .unwrap()
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = temp_dir();
        let path = dir.join("nested").join("routing-spec.json");
        let spec = spec_with(&["a", "b"]);

        write_spec(&spec, &path).unwrap();
        let loaded = read_spec(&path).unwrap();
        assert_eq!(loaded, spec);
        assert!(!path.with_file_name(".routing-spec.json.tmp").exists());

        let library = library_from_spec(&loaded).unwrap();
        assert_eq!(library.len(), 4);
        assert_eq!(library.version(), spec.library_version);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn replacement_is_whole_file() {
        let dir = temp_dir();
        let path = dir.join("routing-spec.json");

        write_spec(&spec_with(&["a"]), &path).unwrap();
        let second = spec_with(&["a", "b", "c"]);
        write_spec(&second, &path).unwrap();

        let loaded = read_spec(&path).unwrap();
        assert_eq!(loaded.base_modules, 3);
        assert_eq!(loaded.content_digest, second.content_digest);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn tampered_spec_fails_digest_check() {
        let dir = temp_dir();
        let path = dir.join("routing-spec.json");
        let mut spec = spec_with(&["a"]);
        write_spec(&spec, &path).unwrap();

        spec.modules[0].base_duration = 99;
        let json = serde_json::to_string_pretty(&spec).unwrap();
        std::fs::write(&path, json).unwrap();

        let err = read_spec(&path).unwrap_err();
        assert!(err.to_string().contains("content digest mismatch"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn digest_ignores_version() {
        let mut spec = spec_with(&["a"]);
        let before = spec.compute_digest().unwrap();
        spec.version.build_id = Uuid::now_v7();
        assert_eq!(spec.compute_digest().unwrap(), before);
    }
}
