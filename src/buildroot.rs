//! Isolated build roots driven by mock.
//!
//! One [`BuildRoot`] owns the chroot for the whole run; each probe
//! re-initializes it, pins the withheld requirements with marker packages,
//! and rebuilds. Cleanup and orphan-kill run on every exit path via Drop.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::process::Cmd;

pub struct BuildRoot {
    profile: String,
    uniqueext: String,
}

impl BuildRoot {
    pub fn new(profile: &str) -> Self {
        Self {
            profile: profile.to_string(),
            // Isolates concurrent runs against the same profile.
            uniqueext: format!("sift{}", std::process::id()),
        }
    }

    fn mock(&self) -> Cmd {
        Cmd::new("mock")
            .arg("-r")
            .arg(&self.profile)
            .arg("--uniqueext")
            .arg(&self.uniqueext)
    }

    /// Create (or recreate) a fresh chroot.
    pub fn init(&self) -> Result<()> {
        info!("initializing build root {}", self.profile);
        self.mock()
            .arg("--init")
            .error_msg(format!("mock --init failed for profile {}", self.profile))
            .run()?;
        Ok(())
    }

    /// Install packages into the chroot.
    ///
    /// Returns false when the transaction cannot be resolved, which the
    /// search interprets as "the withheld set is pulled in transitively".
    pub fn install(&self, packages: &[String]) -> Result<bool> {
        if packages.is_empty() {
            return Ok(true);
        }
        let out = self
            .mock()
            .arg("--install")
            .args(packages)
            .allow_fail()
            .run()?;
        if !out.success() {
            debug!("install failed: {}", out.stderr_trimmed());
        }
        Ok(out.success())
    }

    /// Build a marker package and install it into the chroot.
    pub fn add_marker(&self, marker: &Marker, workdir: &Path) -> Result<()> {
        let package = marker.build(workdir)?;
        self.mock()
            .arg("--install")
            .arg_path(&package)
            .error_msg(format!("installing marker package {} failed", marker.name))
            .run()?;
        Ok(())
    }

    /// Rebuild a source package into `resultdir` without cleaning the
    /// prepared chroot. Returns false on build failure.
    pub fn rebuild(&self, srpm: &Path, resultdir: &Path, cache_only: bool) -> Result<bool> {
        fs::create_dir_all(resultdir)
            .with_context(|| format!("failed to create {}", resultdir.display()))?;
        let mut cmd = self
            .mock()
            .arg("--no-clean")
            .arg("--resultdir")
            .arg_path(resultdir);
        if cache_only {
            cmd = cmd.arg("--offline");
        }
        let out = cmd.arg("--rebuild").arg_path(srpm).allow_fail().run()?;
        if !out.success() {
            debug!("rebuild failed: {}", out.stderr_trimmed());
        }
        Ok(out.success())
    }

    /// Remove the chroot and kill processes left inside it.
    pub fn teardown(&self) {
        debug!("tearing down build root {}", self.profile);
        let _ = self.mock().arg("--orphanskill").allow_fail().run();
        let _ = self.mock().arg("--clean").allow_fail().run();
    }
}

impl Drop for BuildRoot {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// A minimal synthesized package carrying only relational metadata.
///
/// Withholding a requirement takes two of these: one that conflicts with
/// the withheld requirements so nothing can drag them in, and one that
/// provides them so the rebuilder's own dependency check is satisfied
/// without the real packages.
#[derive(Debug, Clone, Default)]
pub struct Marker {
    pub name: String,
    pub provides: Vec<String>,
    pub conflicts: Vec<String>,
    pub obsoletes: Vec<String>,
}

impl Marker {
    pub fn conflicting(name: &str, requirements: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.to_string(),
            conflicts: requirements.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn providing(
        name: &str,
        requirements: impl IntoIterator<Item = String>,
        obsoletes: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            provides: requirements.into_iter().collect(),
            obsoletes: vec![obsoletes.to_string()],
            ..Self::default()
        }
    }

    /// The generated spec file contents.
    pub fn spec_text(&self) -> String {
        let mut spec = String::new();
        spec.push_str(&format!("Name: {}\n", self.name));
        spec.push_str("Version: 1\n");
        spec.push_str("Release: 1\n");
        spec.push_str("Summary: Dependency marker generated by rpmsift\n");
        spec.push_str("License: Public Domain\n");
        spec.push_str("BuildArch: noarch\n");
        for capability in &self.provides {
            spec.push_str(&format!("Provides: {capability}\n"));
        }
        for capability in &self.conflicts {
            spec.push_str(&format!("Conflicts: {capability}\n"));
        }
        for capability in &self.obsoletes {
            spec.push_str(&format!("Obsoletes: {capability}\n"));
        }
        spec.push_str("\n%description\nCarries dependency metadata only; no payload.\n\n%files\n");
        spec
    }

    /// Run rpmbuild over the generated spec and return the built package.
    pub fn build(&self, workdir: &Path) -> Result<PathBuf> {
        let topdir = workdir.join(format!("marker-{}", self.name));
        fs::create_dir_all(&topdir)
            .with_context(|| format!("failed to create {}", topdir.display()))?;
        let spec_path = topdir.join(format!("{}.spec", self.name));
        fs::write(&spec_path, self.spec_text())
            .with_context(|| format!("failed to write {}", spec_path.display()))?;

        Cmd::new("rpmbuild")
            .arg("-bb")
            .arg("--define")
            .arg(format!("_topdir {}", topdir.display()))
            .arg_path(&spec_path)
            .error_msg(format!("rpmbuild failed for marker {}", self.name))
            .run()?;

        let package = topdir
            .join("RPMS/noarch")
            .join(format!("{}-1-1.noarch.rpm", self.name));
        if !package.exists() {
            bail!(
                "rpmbuild produced no package for marker {} at {}",
                self.name,
                package.display()
            );
        }
        Ok(package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_marker_spec_lists_every_requirement() {
        let marker = Marker::conflicting(
            "rpmsift-withheld",
            ["gcc".to_string(), "make >= 4".to_string()],
        );
        let spec = marker.spec_text();
        assert!(spec.contains("Name: rpmsift-withheld"));
        assert!(spec.contains("Conflicts: gcc\n"));
        assert!(spec.contains("Conflicts: make >= 4\n"));
        assert!(!spec.contains("Provides:"));
        assert!(spec.contains("BuildArch: noarch"));
    }

    #[test]
    fn provide_marker_obsoletes_the_conflict_marker() {
        let marker = Marker::providing(
            "rpmsift-satisfied",
            ["gcc".to_string()],
            "rpmsift-withheld",
        );
        let spec = marker.spec_text();
        assert!(spec.contains("Provides: gcc\n"));
        assert!(spec.contains("Obsoletes: rpmsift-withheld\n"));
        assert!(!spec.contains("Conflicts:"));
    }

    #[test]
    fn marker_spec_has_empty_payload() {
        let spec = Marker::conflicting("m", ["x".to_string()]).spec_text();
        assert!(spec.trim_end().ends_with("%files"));
    }
}
