//! File format detection.
//!
//! Formats are decided from the human-readable description `file --brief`
//! prints, matched against a fixed regex table. The classifier is built once
//! by the driver and handed to the content comparator.

use anyhow::Result;
use regex::Regex;
use std::path::Path;

use crate::process::Cmd;

/// Content formats the comparator knows how to compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Elf,
    Typelib,
    Html,
    ByteCompiled,
    Zip,
    Gzip,
    Unknown,
}

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Format::Elf => "elf",
            Format::Typelib => "typelib",
            Format::Html => "html",
            Format::ByteCompiled => "byte-compiled",
            Format::Zip => "zip",
            Format::Gzip => "gzip",
            Format::Unknown => "unknown",
        }
    }
}

/// Magic descriptions that map to each format.
const MAGIC_PATTERNS: &[(Format, &str)] = &[
    (Format::Elf, r"^ELF "),
    (Format::Typelib, r"G-IR binary database|GObject introspection"),
    (Format::Html, r"HTML document"),
    (Format::ByteCompiled, r"(?i)byte-compiled"),
    (Format::Zip, r"^(Zip archive data|Java archive data|Java Jar file)"),
    (Format::Gzip, r"^gzip compressed data"),
];

pub struct Classifier {
    rules: Vec<(Format, Regex)>,
}

impl Classifier {
    pub fn new() -> Result<Self> {
        let mut rules = Vec::with_capacity(MAGIC_PATTERNS.len());
        for (format, pattern) in MAGIC_PATTERNS {
            rules.push((*format, Regex::new(pattern)?));
        }
        Ok(Self { rules })
    }

    /// Detect the format of a file on disk.
    pub fn classify(&self, path: &Path) -> Result<Format> {
        let out = Cmd::new("file")
            .arg("--brief")
            .arg_path(path)
            .error_msg(format!("file(1) failed on {}", path.display()))
            .run()?;
        Ok(self.format_of(out.stdout_trimmed()))
    }

    /// Map a magic description string to a format.
    pub fn format_of(&self, magic: &str) -> Format {
        for (format, regex) in &self.rules {
            if regex.is_match(magic) {
                return *format;
            }
        }
        Format::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new().unwrap()
    }

    #[test]
    fn recognizes_elf() {
        let c = classifier();
        assert_eq!(
            c.format_of("ELF 64-bit LSB shared object, x86-64, version 1 (SYSV), dynamically linked"),
            Format::Elf
        );
        assert_eq!(
            c.format_of("ELF 64-bit LSB pie executable, x86-64"),
            Format::Elf
        );
    }

    #[test]
    fn recognizes_typelib() {
        let c = classifier();
        assert_eq!(c.format_of("G-IR binary database, version 4.0"), Format::Typelib);
        assert_eq!(c.format_of("GObject introspection binary data"), Format::Typelib);
    }

    #[test]
    fn recognizes_html() {
        assert_eq!(
            classifier().format_of("HTML document, ASCII text"),
            Format::Html
        );
    }

    #[test]
    fn recognizes_byte_compiled() {
        let c = classifier();
        assert_eq!(c.format_of("python 3.12 byte-compiled"), Format::ByteCompiled);
        assert_eq!(
            c.format_of("Byte-compiled Python module for CPython 3.12"),
            Format::ByteCompiled
        );
    }

    #[test]
    fn recognizes_archives() {
        let c = classifier();
        assert_eq!(c.format_of("Zip archive data, at least v2.0 to extract"), Format::Zip);
        assert_eq!(c.format_of("Java archive data (JAR)"), Format::Zip);
        assert_eq!(
            c.format_of("gzip compressed data, from Unix, original size modulo 2^32 1040"),
            Format::Gzip
        );
    }

    #[test]
    fn unmatched_is_unknown() {
        assert_eq!(classifier().format_of("ASCII text"), Format::Unknown);
        assert_eq!(classifier().format_of("PDF document, version 1.4"), Format::Unknown);
    }
}
