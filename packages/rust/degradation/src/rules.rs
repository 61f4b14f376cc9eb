//! Concrete semantics of each degradation rule.
//!
//! Every function is total: any step list (including an empty one) maps to a
//! valid step list, and no function ever introduces a source module that was
//! not already present.

use std::collections::BTreeMap;

use tiercast_shared::{DegradationRule, ProgramStep, StepForm, StepSelector};

/// Apply one rule to a step list.
pub fn apply_rule(steps: Vec<ProgramStep>, rule: &DegradationRule) -> Vec<ProgramStep> {
    match rule {
        DegradationRule::Drop { selector } => drop_matching(steps, selector),
        DegradationRule::Merge { max_group } => merge_runs(steps, *max_group),
        DegradationRule::Summarize { percent } => summarize(steps, *percent),
        DegradationRule::KeepFirst { count } => keep_first(steps, *count),
        DegradationRule::CapDuration { minutes } => cap_duration(steps, *minutes),
    }
}

/// Whether `step` matches every field set on `selector`.
pub fn matches(selector: &StepSelector, step: &ProgramStep) -> bool {
    if selector.is_empty() {
        return false;
    }
    if let Some(tag) = &selector.tag {
        if !step.tags.contains(tag) {
            return false;
        }
    }
    if let Some(category) = &selector.category {
        if &step.category != category {
            return false;
        }
    }
    if let Some(axis) = &selector.axis {
        let actual = step.axis_values.get(axis);
        if actual.is_none() || actual != selector.value.as_ref() {
            return false;
        }
    }
    true
}

/// Remove every step the selector matches.
pub fn drop_matching(steps: Vec<ProgramStep>, selector: &StepSelector) -> Vec<ProgramStep> {
    steps.into_iter().filter(|s| !matches(selector, s)).collect()
}

/// Merge runs of consecutive steps into groups of at most `max_group`.
///
/// A run shares category and the preparatory and optional flags, so a merged
/// step never gains a tag its required content did not carry. It lasts as
/// long as its longest member and keeps only the axis values all members
/// agree on.
pub fn merge_runs(steps: Vec<ProgramStep>, max_group: usize) -> Vec<ProgramStep> {
    if max_group < 2 {
        return steps;
    }

    let mut out: Vec<ProgramStep> = Vec::with_capacity(steps.len());
    let mut group: Vec<ProgramStep> = Vec::new();

    for step in steps {
        let continues = group.first().is_some_and(|head| same_run(head, &step));
        if !continues || group.len() == max_group {
            out.extend(flush(&mut group));
        }
        group.push(step);
    }
    out.extend(flush(&mut group));
    out
}

fn same_run(a: &ProgramStep, b: &ProgramStep) -> bool {
    a.category == b.category
        && a.is_preparatory() == b.is_preparatory()
        && a.is_optional() == b.is_optional()
}

fn flush(group: &mut Vec<ProgramStep>) -> Option<ProgramStep> {
    match group.len() {
        0 => None,
        1 => group.pop(),
        _ => Some(merge_group(std::mem::take(group))),
    }
}

fn merge_group(members: Vec<ProgramStep>) -> ProgramStep {
    let mut iter = members.into_iter();
    let Some(mut merged) = iter.next() else {
        unreachable!("merge_group is only called with two or more members");
    };

    let mut ids = vec![merged.id.clone()];
    for member in iter {
        ids.push(member.id);
        merged.duration = merged.duration.max(member.duration);
        merged.tags.extend(member.tags);
        merged.axis_values = intersect(&merged.axis_values, &member.axis_values);
        for id in member.variant_ids {
            if !merged.variant_ids.contains(&id) {
                merged.variant_ids.push(id);
            }
        }
        for id in member.source_module_ids {
            if !merged.source_module_ids.contains(&id) {
                merged.source_module_ids.push(id);
            }
        }
    }

    merged.id = ids.join("+");
    merged.form = StepForm::Merged;
    merged
}

fn intersect(a: &BTreeMap<String, String>, b: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    a.iter()
        .filter(|(k, v)| b.get(*k) == Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Replace every step with a summary lasting `percent`% of it, rounded up.
///
/// A zero-minute step stays at zero; any other step keeps at least a minute.
pub fn summarize(steps: Vec<ProgramStep>, percent: u8) -> Vec<ProgramStep> {
    let percent = u64::from(percent.clamp(1, 100));
    steps
        .into_iter()
        .map(|mut step| {
            let shortened = (u64::from(step.duration) * percent).div_ceil(100);
            step.duration = u32::try_from(shortened).unwrap_or(step.duration);
            if step.form != StepForm::Summary {
                step.id = format!("{}~summary", step.id);
                step.form = StepForm::Summary;
            }
            step
        })
        .collect()
}

/// Keep only the first `count` steps.
pub fn keep_first(mut steps: Vec<ProgramStep>, count: usize) -> Vec<ProgramStep> {
    steps.truncate(count);
    steps
}

/// Keep steps, in original order, while the total fits in `minutes`.
///
/// The budget is claimed by priority: required steps usable without
/// preparation first, then optional ones, then preparatory ones. A step that
/// does not fit is dropped, not truncated. If no required step fits, the
/// first one is truncated to `minutes` and nothing else is kept; if no step
/// fits at all, the first non-preparatory step (else the first step) is
/// truncated. A non-empty program therefore never caps down to nothing, and
/// never loses all of its required content.
pub fn cap_duration(steps: Vec<ProgramStep>, minutes: u32) -> Vec<ProgramStep> {
    if steps.is_empty() || minutes == 0 {
        return steps.into_iter().filter(|s| s.duration == 0).collect();
    }

    let has_required = steps.iter().any(|s| cap_priority(s) == 0);
    let mut keep = vec![false; steps.len()];
    let mut total: u32 = 0;

    for priority in 0..3 {
        for (i, step) in steps.iter().enumerate() {
            if cap_priority(step) != priority {
                continue;
            }
            if let Some(next) = total.checked_add(step.duration).filter(|t| *t <= minutes) {
                total = next;
                keep[i] = true;
            }
        }

        if priority == 0 && has_required && !keep.contains(&true) {
            return truncate_first(steps, minutes, |s| cap_priority(s) == 0);
        }
    }

    if !keep.contains(&true) {
        let has_unprepared = steps.iter().any(|s| !s.is_preparatory());
        return truncate_first(steps, minutes, |s| !has_unprepared || !s.is_preparatory());
    }

    steps
        .into_iter()
        .zip(keep)
        .filter_map(|(step, kept)| kept.then_some(step))
        .collect()
}

fn cap_priority(step: &ProgramStep) -> u8 {
    match (step.is_preparatory(), step.is_optional()) {
        (false, false) => 0,
        (false, true) => 1,
        (true, _) => 2,
    }
}

/// The first step matching `pick`, cut to `minutes`.
fn truncate_first(
    steps: Vec<ProgramStep>,
    minutes: u32,
    pick: impl Fn(&ProgramStep) -> bool,
) -> Vec<ProgramStep> {
    steps
        .into_iter()
        .find(|s| pick(s))
        .map(|mut step| {
            step.duration = minutes;
            vec![step]
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn step(id: &str, category: &str, duration: u32, tags: &[&str]) -> ProgramStep {
        ProgramStep {
            id: id.into(),
            variant_ids: vec![id.into()],
            source_module_ids: vec![id.into()],
            category: category.into(),
            duration,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            axis_values: BTreeMap::from([("tone".to_string(), "gentle".to_string())]),
            form: StepForm::Full,
        }
    }

    #[test]
    fn drop_by_tag_and_axis() {
        let steps = vec![
            step("a", "technique", 10, &["optional"]),
            step("b", "technique", 10, &[]),
        ];
        let kept = drop_matching(steps.clone(), &StepSelector::tag("optional"));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "b");

        let none = drop_matching(steps.clone(), &StepSelector::axis_value("tone", "gentle"));
        assert!(none.is_empty());

        let all = drop_matching(steps, &StepSelector::default());
        assert_eq!(all.len(), 2, "empty selector matches nothing");
    }

    #[test]
    fn merge_groups_consecutive_same_category() {
        let steps = vec![
            step("a", "technique", 10, &[]),
            step("b", "technique", 15, &[]),
            step("c", "technique", 5, &[]),
            step("d", "exercise", 20, &[]),
            step("e", "technique", 10, &[]),
        ];
        let merged = merge_runs(steps, 2);
        let ids: Vec<&str> = merged.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a+b", "c", "d", "e"]);
        assert_eq!(merged[0].duration, 15);
        assert_eq!(merged[0].form, StepForm::Merged);
        assert_eq!(merged[0].source_module_ids, ["a", "b"]);
    }

    #[test]
    fn merge_breaks_runs_at_preparatory_and_optional_flags() {
        let steps = vec![
            step("prep-1", "protocol", 5, &["preparatory"]),
            step("core-1", "protocol", 5, &[]),
            step("core-2", "protocol", 5, &[]),
            step("extra-1", "protocol", 5, &["optional"]),
            step("prep-2", "protocol", 5, &["preparatory"]),
            step("prep-3", "protocol", 5, &["preparatory"]),
        ];
        let merged = merge_runs(steps, 6);
        let ids: Vec<&str> = merged.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["prep-1", "core-1+core-2", "extra-1", "prep-2+prep-3"]);
        assert!(!merged[1].is_preparatory());
        assert!(!merged[1].is_optional());
        assert!(merged[3].is_preparatory());
    }

    #[test]
    fn summarize_rounds_up_and_keeps_zero() {
        let steps = vec![
            step("a", "t", 15, &[]),
            step("b", "t", 1, &[]),
            step("c", "t", 0, &[]),
        ];
        let summarized = summarize(steps, 50);
        assert_eq!(summarized[0].duration, 8);
        assert_eq!(summarized[1].duration, 1);
        assert_eq!(summarized[2].duration, 0);
        assert_eq!(summarized[0].id, "a~summary");

        let again = summarize(summarized, 50);
        assert_eq!(again[0].id, "a~summary");
        assert_eq!(again[0].duration, 4);
        assert_eq!(again[2].duration, 0);
    }

    #[test]
    fn cap_skips_what_does_not_fit_and_truncates_when_nothing_does() {
        let steps = vec![step("a", "t", 10, &[]), step("b", "t", 10, &[]), step("c", "t", 1, &[])];
        let capped = cap_duration(steps.clone(), 15);
        let ids: Vec<&str> = capped.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);

        assert!(cap_duration(steps, 0).is_empty());

        let oversized = vec![step("a", "t", 10, &[]), step("b", "t", 12, &[])];
        let truncated = cap_duration(oversized, 4);
        assert_eq!(truncated.len(), 1);
        assert_eq!(truncated[0].id, "a");
        assert_eq!(truncated[0].duration, 4);

        assert!(cap_duration(Vec::new(), 10).is_empty());
    }

    #[test]
    fn cap_reserves_budget_for_steps_without_preparation() {
        let steps = vec![
            step("setup", "protocol", 60, &["preparatory"]),
            step("breath", "technique", 10, &[]),
        ];
        let capped = cap_duration(steps.clone(), 60);
        let ids: Vec<&str> = capped.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["breath"]);

        let capped = cap_duration(steps.clone(), 70);
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].id, "setup", "original order is kept");

        let truncated = cap_duration(steps, 5);
        assert_eq!(truncated.len(), 1);
        assert_eq!(truncated[0].id, "breath");
        assert_eq!(truncated[0].duration, 5);
    }

    #[test]
    fn rules_never_introduce_modules() {
        let steps = vec![
            step("a", "t", 10, &["optional"]),
            step("b", "t", 10, &[]),
            step("c", "x", 30, &[]),
        ];
        let before: BTreeSet<String> =
            steps.iter().flat_map(|s| s.source_module_ids.clone()).collect();

        let rules = [
            DegradationRule::Merge { max_group: 3 },
            DegradationRule::Summarize { percent: 30 },
            DegradationRule::KeepFirst { count: 1 },
            DegradationRule::CapDuration { minutes: 2 },
        ];
        for rule in &rules {
            let after: BTreeSet<String> = apply_rule(steps.clone(), rule)
                .iter()
                .flat_map(|s| s.source_module_ids.clone())
                .collect();
            assert!(after.is_subset(&before), "{} introduced modules", rule.op_name());
        }
    }
}
