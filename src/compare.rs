//! Equivalence of built binary packages.
//!
//! Two packages are equal when their headers match on every tag outside a
//! fixed skip set and their file sets match, with per-file metadata
//! mismatches settled by content comparison. Differing tags and files are
//! logged so a run explains its verdicts.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::content::ContentComparator;
use crate::magic::Classifier;
use crate::rpm::{self, BuiltPackage, Header};

/// Tags that differ between builds without the packages differing:
/// sizes and digests that exist only because timestamps moved, file
/// locations that are re-derived, and the header blobs themselves.
pub const SKIPPED_TAGS: &[&str] = &[
    "ARCHIVESIZE",
    "BASENAMES",
    "BUILDTIME",
    "DIRINDEXES",
    "DIRNAMES",
    "FILECLASS",
    "FILEINODES",
    "FILEMTIMES",
    "HDRID",
    "HEADERIMMUTABLE",
    "LONGARCHIVESIZE",
    "LONGSIZE",
    "PKGID",
    "SIGMD5",
    "SIGSIZE",
    "SIZE",
];

/// Paths excluded from file comparison: the build-id symlink forest and
/// compiler self-check artifacts, both derived from file digests that the
/// content comparison already accounts for.
pub const IGNORED_FILE_PATTERNS: &[&str] = &[r"^/usr/lib/\.build-id/", r"/\.checksum$"];

pub struct PackageComparator<'a> {
    content: ContentComparator<'a>,
    /// Tag universe minus the skip set, detected once per run.
    tags: Vec<String>,
    ignored: Vec<Regex>,
    workdir: PathBuf,
}

impl<'a> PackageComparator<'a> {
    pub fn new(classifier: &'a Classifier, workdir: &Path) -> Result<Self> {
        let tags = rpm::known_tags()?
            .into_iter()
            .filter(|tag| !SKIPPED_TAGS.contains(&tag.as_str()))
            .collect();
        let mut ignored = Vec::new();
        for pattern in IGNORED_FILE_PATTERNS {
            ignored.push(Regex::new(pattern)?);
        }
        Ok(Self {
            content: ContentComparator::new(classifier),
            tags,
            ignored,
            workdir: workdir.to_path_buf(),
        })
    }

    /// Compare two built packages. Both phases always run so the log
    /// names every difference, not just the first.
    pub fn equal(&self, a: &BuiltPackage, b: &BuiltPackage) -> Result<bool> {
        let headers_equal = self.headers_equal(a, b)?;
        let files_equal = self.files_equal(a, b)?;
        Ok(headers_equal && files_equal)
    }

    fn headers_equal(&self, a: &BuiltPackage, b: &BuiltPackage) -> Result<bool> {
        let header_a = a.header(&self.tags)?;
        let header_b = b.header(&self.tags)?;
        let differing = differing_tags(&header_a, &header_b);
        for tag in &differing {
            info!(
                "tag {} differs between {} and {}",
                tag,
                a.path.display(),
                b.path.display()
            );
        }
        Ok(differing.is_empty())
    }

    fn files_equal(&self, a: &BuiltPackage, b: &BuiltPackage) -> Result<bool> {
        let entries_a = self.filtered_entries(a)?;
        let entries_b = self.filtered_entries(b)?;
        let mut equal = true;

        let names_a: BTreeSet<&String> = entries_a.keys().collect();
        let names_b: BTreeSet<&String> = entries_b.keys().collect();
        for name in names_a.difference(&names_b) {
            info!("file {} only in {}", name, a.path.display());
            equal = false;
        }
        for name in names_b.difference(&names_a) {
            info!("file {} only in {}", name, b.path.display());
            equal = false;
        }

        // Files whose metadata tuples disagree; content decides.
        let suspects: Vec<String> = names_a
            .intersection(&names_b)
            .filter(|name| entries_a[**name] != entries_b[**name])
            .map(|name| (*name).clone())
            .collect();

        if !suspects.is_empty() {
            let extract_a = tempfile::Builder::new()
                .prefix("unpack-")
                .tempdir_in(&self.workdir)
                .context("failed to create extraction directory")?;
            let extract_b = tempfile::Builder::new()
                .prefix("unpack-")
                .tempdir_in(&self.workdir)
                .context("failed to create extraction directory")?;
            a.extract(&suspects, extract_a.path())?;
            b.extract(&suspects, extract_b.path())?;

            for name in &suspects {
                let relative = name.trim_start_matches('/');
                let file_a = extract_a.path().join(relative);
                let file_b = extract_b.path().join(relative);
                if self.content.equal(&file_a, &file_b)? {
                    debug!("file {} differs in metadata only", name);
                } else {
                    info!(
                        "file {} differs between {} and {}",
                        name,
                        a.path.display(),
                        b.path.display()
                    );
                    equal = false;
                }
            }
        }

        Ok(equal)
    }

    fn filtered_entries(&self, package: &BuiltPackage) -> Result<BTreeMap<String, Vec<String>>> {
        let mut entries = package.file_entries()?;
        entries.retain(|name, _| !self.ignored.iter().any(|regex| regex.is_match(name)));
        Ok(entries)
    }

    /// Compare two rebuild result directories package by package.
    ///
    /// Packages pair up by filename; name-version-release.arch is stable
    /// across rebuilds. Source packages and build logs are ignored.
    pub fn result_dirs_equal(&self, a: &Path, b: &Path) -> Result<bool> {
        let packages_a = binary_packages(a)?;
        let packages_b = binary_packages(b)?;
        let mut equal = true;

        let names_a: BTreeSet<&String> = packages_a.keys().collect();
        let names_b: BTreeSet<&String> = packages_b.keys().collect();
        for name in names_a.difference(&names_b) {
            info!("package {} only built in {}", name, a.display());
            equal = false;
        }
        for name in names_b.difference(&names_a) {
            info!("package {} only built in {}", name, b.display());
            equal = false;
        }

        for name in names_a.intersection(&names_b) {
            debug!("comparing {}", name);
            if !self.equal(&packages_a[*name], &packages_b[*name])? {
                equal = false;
            }
        }
        Ok(equal)
    }
}

/// Every tag whose values differ, in tag order. Symmetric by construction.
pub fn differing_tags(a: &Header, b: &Header) -> Vec<String> {
    let tags: BTreeSet<&String> = a.values.keys().chain(b.values.keys()).collect();
    tags.into_iter()
        .filter(|tag| a.values_of(tag) != b.values_of(tag))
        .cloned()
        .collect()
}

/// Binary packages in a result directory, keyed by filename.
fn binary_packages(dir: &Path) -> Result<BTreeMap<String, BuiltPackage>> {
    let mut packages = BTreeMap::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".rpm") && !name.ends_with(".src.rpm") {
            packages.insert(name, BuiltPackage::new(entry.path()));
        }
    }
    Ok(packages)
}
