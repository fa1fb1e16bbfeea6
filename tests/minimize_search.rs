//! Search behavior against scripted probe outcomes.
//!
//! The probe runner is the expensive seam (a full isolated rebuild per
//! call); scripting it lets these tests pin down the search schedule,
//! the pruning rules, and the final verdicts without a build environment.

use anyhow::Result;
use rpmsift::minimize::{Minimizer, ProbeOutcome, ProbeRunner, Subset};
use std::collections::BTreeSet;

/// Decides each probe from a fixed table and records the order.
struct Scripted {
    outcomes: Vec<(Subset, ProbeOutcome)>,
    probed: Vec<Subset>,
}

impl Scripted {
    fn new(outcomes: &[(&[&str], ProbeOutcome)]) -> Self {
        Self {
            outcomes: outcomes
                .iter()
                .map(|(names, outcome)| (set(names), *outcome))
                .collect(),
            probed: Vec::new(),
        }
    }
}

impl ProbeRunner for Scripted {
    fn probe(&mut self, withheld: &Subset) -> Result<ProbeOutcome> {
        self.probed.push(withheld.clone());
        for (subset, outcome) in &self.outcomes {
            if subset == withheld {
                return Ok(*outcome);
            }
        }
        panic!("unexpected probe: {withheld:?}");
    }
}

fn set(names: &[&str]) -> Subset {
    names.iter().map(|s| s.to_string()).collect()
}

fn reqs(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn nothing_removable() {
    let mut runner = Scripted::new(&[
        (&["a"], ProbeOutcome::BuildFailed),
        (&["b"], ProbeOutcome::BuildFailed),
    ]);
    let mut minimizer = Minimizer::new(&mut runner, false);
    let unneeded = minimizer.run(&reqs(&["a", "b"])).unwrap();
    assert!(unneeded.is_empty());
    assert_eq!(minimizer.probes(), 2);
}

#[test]
fn single_removable_requirement() {
    let mut runner = Scripted::new(&[
        (&["a"], ProbeOutcome::Matches),
        (&["b"], ProbeOutcome::BuildFailed),
    ]);
    let mut minimizer = Minimizer::new(&mut runner, false);
    let unneeded = minimizer.run(&reqs(&["a", "b"])).unwrap();
    assert_eq!(unneeded, set(&["a"]));
    assert_eq!(minimizer.probes(), 2);
}

#[test]
fn output_change_counts_as_needed() {
    let mut runner = Scripted::new(&[(&["a"], ProbeOutcome::Differs)]);
    let mut minimizer = Minimizer::new(&mut runner, false);
    let unneeded = minimizer.run(&reqs(&["a"])).unwrap();
    assert!(unneeded.is_empty());
    assert_eq!(minimizer.verdicts().breaking, vec![set(&["a"])]);
}

#[test]
fn transitive_pull_in_resolved_by_joint_removal() {
    // a alone cannot be withheld (c pulls it in); once c is known
    // removable, withholding both together succeeds.
    let mut runner = Scripted::new(&[
        (&["a"], ProbeOutcome::Unresolvable),
        (&["b"], ProbeOutcome::BuildFailed),
        (&["c"], ProbeOutcome::Matches),
        (&["a", "c"], ProbeOutcome::Matches),
    ]);
    let mut minimizer = Minimizer::new(&mut runner, false);
    let unneeded = minimizer.run(&reqs(&["a", "b", "c"])).unwrap();
    assert_eq!(unneeded, set(&["a", "c"]));
    // Deterministic schedule: singletons in order, then the extension.
    assert_eq!(
        runner.probed,
        vec![set(&["a"]), set(&["b"]), set(&["c"]), set(&["a", "c"])]
    );
}

#[test]
fn empty_requirements_probe_nothing() {
    let mut runner = Scripted::new(&[]);
    let mut minimizer = Minimizer::new(&mut runner, false);
    let unneeded = minimizer.run(&[]).unwrap();
    assert!(unneeded.is_empty());
    assert_eq!(minimizer.probes(), 0);
}

#[test]
fn all_removable_needs_one_extra_probe() {
    let mut runner = Scripted::new(&[
        (&["a"], ProbeOutcome::Matches),
        (&["b"], ProbeOutcome::Matches),
        (&["c"], ProbeOutcome::Matches),
        (&["a", "b", "c"], ProbeOutcome::Matches),
    ]);
    let mut minimizer = Minimizer::new(&mut runner, false);
    let unneeded = minimizer.run(&reqs(&["a", "b", "c"])).unwrap();
    assert_eq!(unneeded, set(&["a", "b", "c"]));
    // Three singletons plus the top of the power-set descent; every
    // smaller subset is covered and never built.
    assert_eq!(minimizer.probes(), 4);
}

#[test]
fn joint_removal_can_break_despite_singletons() {
    // The additive-composition assumption is exactly what this case
    // falsifies; without the opt-in flag, the joint set is probed and
    // recorded as breaking while each singleton stays removable.
    let mut runner = Scripted::new(&[
        (&["a"], ProbeOutcome::Matches),
        (&["b"], ProbeOutcome::Matches),
        (&["a", "b"], ProbeOutcome::BuildFailed),
    ]);
    let mut minimizer = Minimizer::new(&mut runner, false);
    let unneeded = minimizer.run(&reqs(&["a", "b"])).unwrap();
    assert_eq!(unneeded, set(&["a", "b"]));
    assert_eq!(minimizer.probes(), 3);
    assert_eq!(minimizer.verdicts().breaking, vec![set(&["a", "b"])]);
    assert_eq!(
        minimizer.verdicts().unneeded,
        vec![set(&["a"]), set(&["b"])]
    );
}

#[test]
fn assume_compose_skips_the_joint_build() {
    let mut runner = Scripted::new(&[
        (&["a"], ProbeOutcome::Matches),
        (&["b"], ProbeOutcome::Matches),
    ]);
    let mut minimizer = Minimizer::new(&mut runner, true);
    let unneeded = minimizer.run(&reqs(&["a", "b"])).unwrap();
    assert_eq!(unneeded, set(&["a", "b"]));
    // Only the singletons were ever built.
    assert_eq!(minimizer.probes(), 2);
}

#[test]
fn breaking_subset_prunes_supersets() {
    // {a} breaks, so no candidate containing a is ever probed again.
    let mut runner = Scripted::new(&[
        (&["a"], ProbeOutcome::BuildFailed),
        (&["b"], ProbeOutcome::Matches),
        (&["c"], ProbeOutcome::Matches),
        (&["b", "c"], ProbeOutcome::Matches),
    ]);
    let mut minimizer = Minimizer::new(&mut runner, false);
    let unneeded = minimizer.run(&reqs(&["a", "b", "c"])).unwrap();
    assert_eq!(unneeded, set(&["b", "c"]));
    assert!(runner.probed.iter().all(|s| !s.contains("a") || s.len() == 1));
}

#[test]
fn undecided_extension_failures_are_informational() {
    // The deferred requirement never confirms; it must not appear in
    // breaking either.
    let mut runner = Scripted::new(&[
        (&["a"], ProbeOutcome::Unresolvable),
        (&["b"], ProbeOutcome::Matches),
        (&["a", "b"], ProbeOutcome::BuildFailed),
    ]);
    let mut minimizer = Minimizer::new(&mut runner, false);
    let unneeded = minimizer.run(&reqs(&["a", "b"])).unwrap();
    assert_eq!(unneeded, set(&["b"]));
    let breaking = &minimizer.verdicts().breaking;
    assert!(breaking.iter().all(|s| !s.contains("a")));
}

#[test]
fn verdict_sets_stay_antichains() {
    let mut runner = Scripted::new(&[
        (&["a"], ProbeOutcome::Matches),
        (&["b"], ProbeOutcome::Matches),
        (&["c"], ProbeOutcome::BuildFailed),
        (&["d"], ProbeOutcome::BuildFailed),
        (&["a", "b"], ProbeOutcome::Matches),
    ]);
    let mut minimizer = Minimizer::new(&mut runner, false);
    minimizer.run(&reqs(&["a", "b", "c", "d"])).unwrap();

    let verdicts = minimizer.verdicts();
    for (i, u) in verdicts.unneeded.iter().enumerate() {
        for (j, v) in verdicts.unneeded.iter().enumerate() {
            assert!(i == j || !u.is_subset(v), "{u:?} ⊆ {v:?}");
        }
    }
    for (i, u) in verdicts.breaking.iter().enumerate() {
        for (j, v) in verdicts.breaking.iter().enumerate() {
            assert!(i == j || !u.is_subset(v), "{u:?} ⊆ {v:?}");
        }
    }
    // Singleton verdicts never overlap.
    let unneeded_union: BTreeSet<&String> = verdicts.unneeded.iter().flatten().collect();
    for subset in &verdicts.breaking {
        if subset.len() == 1 {
            assert!(!unneeded_union.contains(subset.iter().next().unwrap()));
        }
    }
}
