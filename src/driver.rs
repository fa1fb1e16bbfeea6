//! End-to-end sequencing.
//!
//! Builds the reference twice, gates on reproducibility, then hands the
//! declared requirements to the minimization search. The only stdout
//! output is the final result line.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::buildroot::{BuildRoot, Marker};
use crate::compare::PackageComparator;
use crate::magic::Classifier;
use crate::minimize::{Minimizer, ProbeOutcome, ProbeRunner, Subset};
use crate::rpm::SourcePackage;
use crate::workdir::Workdir;

/// Host tools required before anything is attempted. The content
/// inspectors (objdump, g-ir-generate) are only needed if a comparison
/// reaches them, so they are not checked here.
const REQUIRED_TOOLS: &[&str] = &["mock", "rpm", "rpmbuild", "rpm2cpio", "cpio", "file"];

pub struct Options {
    pub srpm: PathBuf,
    pub profile: String,
    pub no_clean: bool,
    pub reproduce_only: bool,
    pub assume_compose: bool,
}

/// Run the whole analysis. Returns the process exit code.
pub fn run(opts: &Options) -> Result<i32> {
    preflight()?;

    let source = SourcePackage::read(&opts.srpm)?;
    info!(
        "{} declares {} build requirements",
        source.file_name(),
        source.requires.len()
    );

    let workdir = Workdir::create(opts.no_clean)?;
    let classifier = Classifier::new()?;
    let comparator = PackageComparator::new(&classifier, workdir.path())?;
    let root = BuildRoot::new(&opts.profile);

    // Reference build, twice. The first run may download packages; every
    // build after it runs offline against the populated cache.
    let reference = workdir.path().join("reference-1");
    let second = workdir.path().join("reference-2");
    info!("reference build");
    root.init()?;
    if !root.rebuild(&source.path, &reference, false)? {
        bail!(
            "{} does not build with all requirements present; nothing to minimize",
            source.file_name()
        );
    }
    info!("second reference build (reproducibility check)");
    root.init()?;
    if !root.rebuild(&source.path, &second, true)? {
        bail!("second reference build of {} failed", source.file_name());
    }
    if !comparator.result_dirs_equal(&reference, &second)? {
        error!(
            "{} does not build reproducibly; removal verdicts would be noise",
            source.file_name()
        );
        return Ok(1);
    }
    info!("reference build is reproducible");

    if opts.reproduce_only {
        return Ok(0);
    }

    let mut probe = BuildProbe {
        root: &root,
        comparator: &comparator,
        source: &source,
        workdir: workdir.path(),
        reference: &reference,
        counter: 0,
    };
    let unneeded = Minimizer::new(&mut probe, opts.assume_compose).run(&source.requires)?;

    if unneeded.is_empty() {
        info!("every declared build requirement is needed");
    } else {
        println!("{}", result_line(&source.file_name(), &unneeded));
    }
    Ok(0)
}

/// The single stdout line: `<srpm-filename>:<req>, <req>, ...`.
/// No space after the colon.
fn result_line(name: &str, unneeded: &Subset) -> String {
    let list: Vec<String> = unneeded.iter().cloned().collect();
    format!("{}:{}", name, list.join(", "))
}

fn preflight() -> Result<()> {
    let missing: Vec<&str> = REQUIRED_TOOLS
        .iter()
        .copied()
        .filter(|tool| which::which(tool).is_err())
        .collect();
    if !missing.is_empty() {
        bail!("required host tools missing: {}", missing.join(", "));
    }
    Ok(())
}

/// The real prober: one isolated rebuild per candidate subset.
struct BuildProbe<'a> {
    root: &'a BuildRoot,
    comparator: &'a PackageComparator<'a>,
    source: &'a SourcePackage,
    workdir: &'a Path,
    reference: &'a Path,
    counter: usize,
}

impl ProbeRunner for BuildProbe<'_> {
    fn probe(&mut self, withheld: &Subset) -> Result<ProbeOutcome> {
        self.counter += 1;
        info!("probe {}: withholding {:?}", self.counter, withheld);

        self.root.init()?;
        if !withheld.is_empty() {
            // Conflict marker first: nothing may drag the withheld
            // requirements in while the rest is installed.
            let conflict = Marker::conflicting("rpmsift-withheld", withheld.iter().cloned());
            self.root.add_marker(&conflict, self.workdir)?;

            let keep: Vec<String> = self
                .source
                .requires
                .iter()
                .filter(|requirement| !withheld.contains(*requirement))
                .cloned()
                .collect();
            if !self.root.install(&keep)? {
                return Ok(ProbeOutcome::Unresolvable);
            }

            // Swap the conflict marker for one that provides the withheld
            // requirements, so the rebuilder's dependency check passes
            // without the real packages.
            let satisfied =
                Marker::providing("rpmsift-satisfied", withheld.iter().cloned(), "rpmsift-withheld");
            self.root.add_marker(&satisfied, self.workdir)?;
        }

        let resultdir = self.workdir.join(format!("probe-{}", self.counter));
        if !self.root.rebuild(&self.source.path, &resultdir, true)? {
            return Ok(ProbeOutcome::BuildFailed);
        }

        if self.comparator.result_dirs_equal(self.reference, &resultdir)? {
            Ok(ProbeOutcome::Matches)
        } else {
            Ok(ProbeOutcome::Differs)
        }
    }
}
