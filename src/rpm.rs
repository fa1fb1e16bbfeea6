//! Reading package metadata through the rpm command line tool.
//!
//! Header tags and per-file arrays are pulled with one `--qf` query per
//! package, using ASCII control characters as separators so that values
//! containing newlines (descriptions, scriptlets) survive parsing.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::process::{shell_in, Cmd};

/// Prefix of the package system's own ABI capabilities; never analyzed.
pub const INTERNAL_CAPABILITY_PREFIX: &str = "rpmlib(";

/// Per-file tag arrays zipped over FILENAMES to form a file's metadata tuple.
pub const FILE_INFO_TAGS: &[&str] = &[
    "FILECAPS",
    "FILECOLORS",
    "FILECONTEXTS",
    "FILEDEPENDSX",
    "FILEDEVICES",
    "FILEDIGESTS",
    "FILEFLAGS",
    "FILEGROUPNAME",
    "FILELANGS",
    "FILELINKTOS",
    "FILEMODES",
    "FILENLINKS",
    "FILEPROVIDE",
    "FILERDEVS",
    "FILEREQUIRE",
    "FILESIZES",
    "FILESTATES",
    "FILEUSERNAME",
    "FILEVERIFYFLAGS",
];

// Query separators: record, field, value.
const RS: char = '\u{1d}';
const FS: char = '\u{1e}';
const VS: char = '\u{1f}';

/// All tag names the installed rpm knows about.
pub fn known_tags() -> Result<Vec<String>> {
    let out = Cmd::new("rpm")
        .arg("--querytags")
        .error_msg("rpm --querytags failed")
        .run()?;
    Ok(out
        .stdout
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

/// Header of a package: tag name to value list.
///
/// Scalar tags carry one value, array tags one per element, absent tags
/// none. Absence on both sides of a comparison is therefore never a
/// difference.
#[derive(Debug, Clone, Default)]
pub struct Header {
    pub values: BTreeMap<String, Vec<String>>,
}

impl Header {
    /// Query the given tags from a package in a single rpm invocation.
    pub fn read(path: &Path, tags: &[String]) -> Result<Self> {
        let format: String = tags
            .iter()
            .map(|tag| format!("{tag}{FS}[%{{{tag}}}{VS}]{RS}"))
            .collect();
        let out = Cmd::new("rpm")
            .args(["-qp", "--qf"])
            .arg(&format)
            .arg_path(path)
            .error_msg(format!("rpm header query failed for {}", path.display()))
            .run()?;
        Ok(Self {
            values: parse_records(&out.stdout)?,
        })
    }

    pub fn values_of(&self, tag: &str) -> &[String] {
        self.values.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Parse `name FS v1 VS v2 VS ... RS` records into a map.
fn parse_records(text: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let mut map = BTreeMap::new();
    for record in text.split(RS) {
        if record.is_empty() {
            continue;
        }
        let (name, rest) = record
            .split_once(FS)
            .with_context(|| format!("malformed query record: {record:?}"))?;
        map.insert(name.to_string(), split_values(rest));
    }
    Ok(map)
}

fn split_values(rest: &str) -> Vec<String> {
    match rest.strip_suffix(VS) {
        Some(values) => values.split(VS).map(String::from).collect(),
        // No trailing value separator means the tag expanded to nothing.
        None if rest.is_empty() => Vec::new(),
        None => vec![rest.to_string()],
    }
}

/// A built binary package on disk.
#[derive(Debug, Clone)]
pub struct BuiltPackage {
    pub path: PathBuf,
}

impl BuiltPackage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn header(&self, tags: &[String]) -> Result<Header> {
        Header::read(&self.path, tags)
    }

    /// Map from file path to its per-file metadata tuple.
    pub fn file_entries(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let fields: Vec<String> = FILE_INFO_TAGS.iter().map(|tag| format!("%{{{tag}}}")).collect();
        let format = format!("[%{{FILENAMES}}{FS}{}{RS}]", fields.join(&VS.to_string()));
        let out = Cmd::new("rpm")
            .args(["-qp", "--qf"])
            .arg(&format)
            .arg_path(&self.path)
            .error_msg(format!("rpm file query failed for {}", self.path.display()))
            .run()?;
        parse_file_records(&out.stdout)
    }

    /// Extract the named files into `dest`, preserving their paths.
    pub fn extract(&self, files: &[String], dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;
        let patterns: Vec<String> = files.iter().map(|f| format!("'.{f}'")).collect();
        let command = format!(
            "rpm2cpio '{}' | cpio -idmu --quiet {}",
            self.path.display(),
            patterns.join(" ")
        );
        shell_in(&command, dest)
            .with_context(|| format!("failed to unpack {}", self.path.display()))?;
        for file in files {
            let extracted = dest.join(file.trim_start_matches('/'));
            if !extracted.exists() && !extracted.is_symlink() {
                bail!(
                    "unpacking {} did not produce {}",
                    self.path.display(),
                    file
                );
            }
        }
        Ok(())
    }
}

fn parse_file_records(text: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let mut map = BTreeMap::new();
    for record in text.split(RS) {
        if record.is_empty() {
            continue;
        }
        let (name, rest) = record
            .split_once(FS)
            .with_context(|| format!("malformed file record: {record:?}"))?;
        let fields: Vec<String> = rest.split(VS).map(String::from).collect();
        map.insert(name.to_string(), fields);
    }
    Ok(map)
}

/// A source package and its declared build requirements.
#[derive(Debug, Clone)]
pub struct SourcePackage {
    pub path: PathBuf,
    /// Declared build requirements, internal capabilities filtered out,
    /// sorted and deduplicated.
    pub requires: Vec<String>,
}

impl SourcePackage {
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("source package {} does not exist", path.display());
        }
        let kind = Cmd::new("rpm")
            .args(["-qp", "--qf", "%{SOURCEPACKAGE}"])
            .arg_path(path)
            .error_msg(format!("rpm failed to read {}", path.display()))
            .run()?;
        if kind.stdout_trimmed() != "1" {
            bail!("{} is not a source package", path.display());
        }

        let out = Cmd::new("rpm")
            .args(["-qp", "--requires"])
            .arg_path(path)
            .error_msg(format!("rpm failed to list requirements of {}", path.display()))
            .run()?;
        Ok(Self {
            path: path.to_path_buf(),
            requires: parse_requirements(&out.stdout),
        })
    }

    /// Filename used in the result line.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Parse `rpm -qp --requires` output, dropping internal capabilities.
fn parse_requirements(text: &str) -> Vec<String> {
    let mut requires: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with(INTERNAL_CAPABILITY_PREFIX))
        .map(String::from)
        .collect();
    requires.sort();
    requires.dedup();
    requires
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_and_array_records() {
        let text = format!(
            "NAME{FS}hello{VS}{RS}REQUIRENAME{FS}libc.so.6{VS}gcc{VS}{RS}MISSING{FS}{RS}"
        );
        let map = parse_records(&text).unwrap();
        assert_eq!(map["NAME"], vec!["hello"]);
        assert_eq!(map["REQUIRENAME"], vec!["libc.so.6", "gcc"]);
        assert!(map["MISSING"].is_empty());
    }

    #[test]
    fn parses_values_containing_newlines() {
        let text = format!("DESCRIPTION{FS}line one\nline two{VS}{RS}");
        let map = parse_records(&text).unwrap();
        assert_eq!(map["DESCRIPTION"], vec!["line one\nline two"]);
    }

    #[test]
    fn rejects_malformed_record() {
        assert!(parse_records("no separators here").is_err());
    }

    #[test]
    fn parses_file_records() {
        let tuple = vec!["", "1", "", "x", "2049", "abc123", "0", "root"];
        let text = format!("/usr/bin/hello{FS}{}{RS}", tuple.join(&VS.to_string()));
        let map = parse_file_records(&text).unwrap();
        assert_eq!(map["/usr/bin/hello"], tuple);
    }

    #[test]
    fn header_values_of_missing_tag_is_empty() {
        let header = Header::default();
        assert!(header.values_of("NAME").is_empty());
    }

    #[test]
    fn requirement_filter_drops_internal_capabilities() {
        let text = "gcc\nrpmlib(CompressedFileNames) <= 3.0.4-1\nmake >= 4\ngcc\n";
        let requires = parse_requirements(text);
        assert_eq!(requires, vec!["gcc", "make >= 4"]);
    }

    #[test]
    fn requirements_are_sorted() {
        let requires = parse_requirements("zlib-devel\nautoconf\nmake\n");
        assert_eq!(requires, vec!["autoconf", "make", "zlib-devel"]);
    }
}
