//! Minimization search over declared build requirements.
//!
//! Finds a maximal set of requirements whose joint removal leaves the
//! build output unchanged. Probes are expensive (a full rebuild each), so
//! the search leans on two monotonicity assumptions: a failing removal
//! cannot be fixed by removing more, and a removal covered by an already
//! confirmed removal needs no build of its own.

use anyhow::Result;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::subsets::DescendingSubsets;

/// A set of requirements hypothesized to be jointly removable.
pub type Subset = BTreeSet<String>;

/// Result of building with a candidate subset withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The remaining requirements cannot be installed; the withheld set
    /// is pulled in transitively and the probe proves nothing.
    Unresolvable,
    /// The rebuild itself failed.
    BuildFailed,
    /// The rebuild succeeded but the output changed.
    Differs,
    /// The rebuild succeeded and the output matches the reference.
    Matches,
}

/// The expensive part: build with `withheld` forcibly absent and compare
/// the result against the reference. Implemented over mock for real runs
/// and scripted in tests.
pub trait ProbeRunner {
    fn probe(&mut self, withheld: &Subset) -> Result<ProbeOutcome>;
}

/// Confirmed verdicts, kept as antichains under inclusion: `unneeded`
/// keeps maximal sets, `breaking` minimal ones.
#[derive(Debug, Default)]
pub struct Verdicts {
    pub unneeded: Vec<Subset>,
    pub breaking: Vec<Subset>,
}

impl Verdicts {
    pub fn note_unneeded(&mut self, subset: Subset) {
        if self.unneeded.iter().any(|u| subset.is_subset(u)) {
            return;
        }
        self.unneeded.retain(|u| !u.is_subset(&subset));
        self.unneeded.push(subset);
    }

    pub fn note_breaking(&mut self, subset: Subset) {
        if self.breaking.iter().any(|b| b.is_subset(&subset)) {
            return;
        }
        self.breaking.retain(|b| !subset.is_subset(b));
        self.breaking.push(subset);
    }

    /// Some confirmed removal already covers this candidate.
    pub fn covers(&self, subset: &Subset) -> bool {
        self.unneeded.iter().any(|u| subset.is_subset(u))
    }

    /// Some confirmed failure is contained in this candidate; removing
    /// even more cannot fix it.
    pub fn dooms(&self, subset: &Subset) -> bool {
        self.breaking.iter().any(|b| b.is_subset(subset))
    }

    /// Union of every requirement confirmed removable in some subset.
    pub fn union_unneeded(&self) -> Subset {
        self.unneeded.iter().flatten().cloned().collect()
    }
}

fn singleton(requirement: &str) -> Subset {
    let mut set = BTreeSet::new();
    set.insert(requirement.to_string());
    set
}

enum Consideration {
    Skipped,
    Assumed,
    Probed(ProbeOutcome),
}

pub struct Minimizer<'a, R: ProbeRunner> {
    runner: &'a mut R,
    verdicts: Verdicts,
    /// Trust that unneeded sets compose without a confirming build.
    /// Unsound in principle; off unless explicitly requested.
    assume_compose: bool,
    probes: usize,
}

impl<'a, R: ProbeRunner> Minimizer<'a, R> {
    pub fn new(runner: &'a mut R, assume_compose: bool) -> Self {
        Self {
            runner,
            verdicts: Verdicts::default(),
            assume_compose,
            probes: 0,
        }
    }

    /// Number of actual builds performed.
    pub fn probes(&self) -> usize {
        self.probes
    }

    pub fn verdicts(&self) -> &Verdicts {
        &self.verdicts
    }

    /// Apply the pruning rules; probe only when they do not decide.
    fn consider(&mut self, candidate: &Subset) -> Result<Consideration> {
        if self.verdicts.covers(candidate) {
            debug!("{candidate:?}: covered by a confirmed removal");
            return Ok(Consideration::Skipped);
        }
        if self.verdicts.dooms(candidate) {
            debug!("{candidate:?}: contains a known-breaking removal");
            return Ok(Consideration::Skipped);
        }
        if self.assume_compose && candidate.is_subset(&self.verdicts.union_unneeded()) {
            debug!("{candidate:?}: assumed removable by composition");
            self.verdicts.note_unneeded(candidate.clone());
            return Ok(Consideration::Assumed);
        }
        self.probes += 1;
        Ok(Consideration::Probed(self.runner.probe(candidate)?))
    }

    /// Run the search and return every requirement confirmed removable.
    pub fn run(&mut self, requires: &[String]) -> Result<Subset> {
        if requires.is_empty() {
            return Ok(Subset::new());
        }

        let mut requires: Vec<String> = requires.to_vec();
        requires.sort();
        requires.dedup();

        // Phase 1: singletons.
        let mut undecided = Vec::new();
        for requirement in &requires {
            let candidate = singleton(requirement);
            match self.consider(&candidate)? {
                Consideration::Probed(ProbeOutcome::Matches) => {
                    info!("removable alone: {requirement}");
                    self.verdicts.note_unneeded(candidate);
                }
                Consideration::Probed(ProbeOutcome::BuildFailed | ProbeOutcome::Differs) => {
                    info!("needed: {requirement}");
                    self.verdicts.note_breaking(candidate);
                }
                Consideration::Probed(ProbeOutcome::Unresolvable) => {
                    info!("pulled in transitively, deferred: {requirement}");
                    undecided.push(requirement.clone());
                }
                Consideration::Skipped | Consideration::Assumed => {}
            }
        }

        // Phase 2: confirm that the singleton removals hold jointly.
        let alone: Vec<String> = self.verdicts.union_unneeded().into_iter().collect();
        if alone.len() >= 2 {
            for candidate in DescendingSubsets::new(&alone, 2) {
                match self.consider(&candidate)? {
                    Consideration::Probed(ProbeOutcome::Matches) => {
                        info!("removable together: {candidate:?}");
                        self.verdicts.note_unneeded(candidate);
                    }
                    Consideration::Probed(
                        ProbeOutcome::BuildFailed | ProbeOutcome::Differs,
                    ) => {
                        info!("not removable together: {candidate:?}");
                        self.verdicts.note_breaking(candidate);
                    }
                    Consideration::Probed(ProbeOutcome::Unresolvable) => {
                        debug!("pulled in transitively, skipped: {candidate:?}");
                    }
                    Consideration::Skipped | Consideration::Assumed => {}
                }
            }
        }

        // Phase 3: try to extend confirmed removals with the deferred
        // requirements. Failures here are informational only; a deferred
        // requirement was never shown removable or breaking on its own.
        if !undecided.is_empty() {
            undecided.sort();
            let bases: Vec<Subset> = if self.verdicts.unneeded.is_empty() {
                vec![Subset::new()]
            } else {
                self.verdicts.unneeded.clone()
            };
            for extension in DescendingSubsets::new(&undecided, 1) {
                for base in &bases {
                    let candidate: Subset = base.union(&extension).cloned().collect();
                    match self.consider(&candidate)? {
                        Consideration::Probed(ProbeOutcome::Matches) => {
                            info!("removable together: {candidate:?}");
                            self.verdicts.note_unneeded(candidate);
                        }
                        Consideration::Probed(outcome) => {
                            debug!("extension {candidate:?} did not confirm: {outcome:?}");
                        }
                        Consideration::Skipped | Consideration::Assumed => {}
                    }
                }
            }
        }

        Ok(self.verdicts.union_unneeded())
    }
}
