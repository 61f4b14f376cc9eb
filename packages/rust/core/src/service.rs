//! Request-time facade over a built module library.
//!
//! Every operation is synchronous and read-only, so one [`CatalogService`]
//! can be shared behind an `Arc` by any number of concurrent requests.

use tracing::{debug, instrument};

use tiercast_compiler::{RoutingSpec, compile, library_from_spec};
use tiercast_degradation::{DegradationEngine, DegradedProgram};
use tiercast_router::{Classifier, Responses, SelectedProgram, select_modules};
use tiercast_shared::{
    AdaptationAxis, AppConfig, ClassifierConfig, DegradationLevel, DegradationTable,
    EndpointTable, ModuleLibrary, Program, PsychographicProfile, Result, RoutingStep,
};

/// Consumer-facing operations: classify, select, degrade, compile.
#[derive(Debug, Clone)]
pub struct CatalogService {
    library: ModuleLibrary,
    classifier: Classifier,
    engine: DegradationEngine,
    axes: Vec<AdaptationAxis>,
    routing_steps: Vec<RoutingStep>,
    endpoints: EndpointTable,
}

impl CatalogService {
    /// Serve `library` with the routing tables from `config`.
    pub fn new(config: &AppConfig, library: ModuleLibrary) -> Result<Self> {
        Self::assemble(
            library,
            config.axes.clone(),
            config.degradation.clone(),
            &config.classifier,
            config.routing_steps.clone(),
            config.endpoints.clone(),
        )
    }

    /// Serve a previously compiled spec. Routing tables come from the spec
    /// itself; only questionnaire signals come from configuration.
    pub fn from_spec(spec: &RoutingSpec, classifier: &ClassifierConfig) -> Result<Self> {
        Self::assemble(
            library_from_spec(spec)?,
            spec.axes.clone(),
            spec.degradation_levels.clone(),
            classifier,
            spec.routing_algorithm_steps.clone(),
            spec.endpoints.clone(),
        )
    }

    fn assemble(
        library: ModuleLibrary,
        axes: Vec<AdaptationAxis>,
        table: DegradationTable,
        classifier: &ClassifierConfig,
        routing_steps: Vec<RoutingStep>,
        endpoints: EndpointTable,
    ) -> Result<Self> {
        Ok(Self {
            classifier: Classifier::new(axes.clone(), classifier.signals.clone())?,
            engine: DegradationEngine::new(table)?,
            library,
            axes,
            routing_steps,
            endpoints,
        })
    }

    pub fn library(&self) -> &ModuleLibrary {
        &self.library
    }

    pub fn engine(&self) -> &DegradationEngine {
        &self.engine
    }

    /// Questionnaire responses → profile.
    pub fn classify_profile(&self, responses: &Responses) -> PsychographicProfile {
        self.classifier.classify(responses)
    }

    /// Full-length program for `profile`.
    pub fn select_program(&self, profile: &PsychographicProfile) -> SelectedProgram {
        select_modules(profile, &self.library)
    }

    /// Shrink `program` to `level`.
    #[instrument(skip_all, fields(level = %level))]
    pub fn degrade_program(
        &self,
        program: &Program,
        level: DegradationLevel,
    ) -> Result<DegradedProgram> {
        let degraded = self.engine.degrade(program, level)?;
        debug!(
            steps = degraded.program.steps.len(),
            minutes = degraded.program.total_duration(),
            "program degraded"
        );
        Ok(degraded)
    }

    /// Recompile the served library into a fresh spec.
    pub fn compile_spec(&self) -> Result<RoutingSpec> {
        compile(
            &self.library,
            &self.axes,
            self.engine.table(),
            &self.routing_steps,
            &self.endpoints,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiercast_multiplier::apply;
    use tiercast_shared::{Module, Signal};

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.axes = vec![
            AdaptationAxis::new("tone", ["gentle", "direct"]).unwrap(),
            AdaptationAxis::new("age_band", ["teen", "adult"]).unwrap(),
        ];
        config.classifier.signals = vec![Signal {
            question: "feedback_style".into(),
            answer: "blunt".into(),
            axis: "tone".into(),
            value: "direct".into(),
            weight: 1,
        }];
        config
    }

    fn service() -> CatalogService {
        let config = config();
        let modules = vec![
            Module::new("prep", "content_creation", "protocol", 20).with_tag("preparatory"),
            Module::new("breath", "content_creation", "technique", 8),
            Module::new("walk", "content_creation", "exercise", 30).with_tag("optional"),
            Module::new("script", "content_creation", "script", 4),
        ];
        let library = ModuleLibrary::new(config.axes.clone(), apply(&modules, &config.axes)).unwrap();
        CatalogService::new(&config, library).unwrap()
    }

    fn responses(pairs: &[(&str, &str)]) -> Responses {
        pairs
            .iter()
            .map(|(q, a)| (q.to_string(), a.to_string()))
            .collect()
    }

    #[test]
    fn questionnaire_to_emergency_program() {
        let service = service();
        let profile = service.classify_profile(&responses(&[("feedback_style", "Blunt")]));
        assert_eq!(profile.get("tone"), Some("direct"));
        assert_eq!(profile.get("age_band"), Some("teen"));

        let selected = service.select_program(&profile);
        assert_eq!(selected.program.steps.len(), 4);
        assert_eq!(selected.program.steps[1].id, "breath@direct.teen");
        assert!(!selected.used_fallback());

        let emergency = service
            .degrade_program(&selected.program, DegradationLevel::Emergency)
            .unwrap();
        let program = &emergency.program;
        assert_eq!(program.level, DegradationLevel::Emergency);
        assert!(!program.steps.is_empty());
        assert!(!program.has_preparatory_step());
        assert!(program.total_duration() <= 5);
        assert_eq!(emergency.applied.len(), 4);
    }

    #[test]
    fn compile_and_reload_round_trip() {
        let service = service();
        let spec = service.compile_spec().unwrap();
        assert_eq!(spec.total_modules, 16);

        let reloaded = CatalogService::from_spec(&spec, &config().classifier).unwrap();
        assert_eq!(reloaded.library().version(), service.library().version());
        assert_eq!(
            reloaded.compile_spec().unwrap().content_digest,
            spec.content_digest
        );
    }

    #[test]
    fn upward_degradation_is_rejected() {
        let service = service();
        let profile = PsychographicProfile::default();
        let selected = service.select_program(&profile);
        assert_eq!(selected.fallbacks.len(), 2);

        let day = service
            .degrade_program(&selected.program, DegradationLevel::Day)
            .unwrap();
        assert!(service.degrade_program(&day.program, DegradationLevel::Phase).is_err());
    }
}
