//! Degradation engine: compress a program down the five-level chain.
//!
//! The chain only runs downward, `program → phase → day → session →
//! emergency`. Degrading from level *L* to a deeper level applies, in order,
//! the rule set of every transition in between, then enforces each entered
//! level's duration ceiling. Going back up means selecting again from the
//! library; there is no "un-degrade".
//!
//! The engine holds only its validated table and never touches the library,
//! so one instance can serve any number of concurrent requests.

pub mod rules;

use serde::Serialize;
use tracing::{debug, instrument};

use tiercast_shared::{
    DegradationLevel, DegradationTable, Program, Result, TiercastError,
};

/// Report for one transition that was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedTransition {
    pub from: DegradationLevel,
    pub to: DegradationLevel,
    /// Rule operations applied, in order (the ceiling cap is always last).
    pub operations: Vec<&'static str>,
    pub steps_before: usize,
    pub steps_after: usize,
    pub duration_before: u32,
    pub duration_after: u32,
}

/// A program after degradation, with the transitions that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedProgram {
    pub program: Program,
    pub applied: Vec<AppliedTransition>,
}

/// Stateless degradation engine over a validated [`DegradationTable`].
#[derive(Debug, Clone)]
pub struct DegradationEngine {
    table: DegradationTable,
}

impl DegradationEngine {
    /// Create an engine, rejecting tables that break the chain invariants.
    pub fn new(table: DegradationTable) -> Result<Self> {
        let problems = table.problems();
        if !problems.is_empty() {
            return Err(TiercastError::validation(format!(
                "invalid degradation table: {}",
                problems.join("; ")
            )));
        }
        Ok(Self { table })
    }

    pub fn table(&self) -> &DegradationTable {
        &self.table
    }

    /// Duration ceiling of `level`, in minutes.
    pub fn ceiling(&self, level: DegradationLevel) -> u32 {
        // `new` guarantees every level is present.
        self.table.ceiling(level).unwrap_or(0)
    }

    /// Degrade `program` to `target`.
    ///
    /// Degrading to the program's current level returns it unchanged.
    #[instrument(skip_all, fields(from = %program.level, to = %target, steps = program.steps.len()))]
    pub fn degrade(&self, program: &Program, target: DegradationLevel) -> Result<DegradedProgram> {
        if target < program.level {
            return Err(TiercastError::InvalidDegradationDirection {
                from: program.level,
                to: target,
            });
        }

        let mut current = program.clone();
        let mut applied = Vec::new();

        while current.level < target {
            let Some(next) = current.level.next() else {
                break;
            };
            let (degraded, report) = self.transition(current, next);
            debug!(
                from = %report.from,
                to = %report.to,
                steps_before = report.steps_before,
                steps_after = report.steps_after,
                duration_after = report.duration_after,
                "transition applied"
            );
            applied.push(report);
            current = degraded;
        }

        if current.level == DegradationLevel::Emergency {
            self.check_cold_start(&current)?;
        }

        Ok(DegradedProgram {
            program: current,
            applied,
        })
    }

    /// Apply a single transition's rule set and the entered level's ceiling.
    fn transition(&self, program: Program, to: DegradationLevel) -> (Program, AppliedTransition) {
        let from = program.level;
        let steps_before = program.steps.len();
        let duration_before = program.total_duration();

        let rule_set = self
            .table
            .get(to)
            .map(|spec| spec.rules.as_slice())
            .unwrap_or_default();

        let mut operations = Vec::with_capacity(rule_set.len() + 1);
        let mut steps = program.steps;
        for rule in rule_set {
            steps = rules::apply_rule(steps, rule);
            operations.push(rule.op_name());
        }
        steps = rules::cap_duration(steps, self.ceiling(to));
        operations.push("cap_duration");

        let degraded = Program {
            library_version: program.library_version,
            level: to,
            profile: program.profile,
            steps,
        };

        let report = AppliedTransition {
            from,
            to,
            operations,
            steps_before,
            steps_after: degraded.steps.len(),
            duration_before,
            duration_after: degraded.total_duration(),
        };

        (degraded, report)
    }

    /// Post-condition for the emergency level: usable from a cold start.
    fn check_cold_start(&self, program: &Program) -> Result<()> {
        if program.steps.is_empty() {
            return Err(TiercastError::ColdStartViolation {
                reason: "no steps remain".into(),
            });
        }
        if let Some(step) = program.steps.iter().find(|s| s.is_preparatory()) {
            return Err(TiercastError::ColdStartViolation {
                reason: format!("step `{}` requires preparation", step.id),
            });
        }
        let ceiling = self.ceiling(DegradationLevel::Emergency);
        if program.total_duration() > ceiling {
            return Err(TiercastError::ColdStartViolation {
                reason: format!(
                    "total duration {} exceeds the {ceiling} minute ceiling",
                    program.total_duration()
                ),
            });
        }
        Ok(())
    }
}

impl Default for DegradationEngine {
    fn default() -> Self {
        Self {
            table: DegradationTable::default(),
        }
    }
}
