//! Content-aware file comparison.
//!
//! Decides whether two files are semantically equal given their detected
//! format, ignoring the non-semantic noise each format is known to carry:
//! build ids in ELF notes, timestamps in generated HTML comments and
//! byte-compiled headers, member ordering and archive timestamps in zips,
//! original-name/mtime fields in gzip headers.

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::warn;
use zip::ZipArchive;

use crate::magic::{Classifier, Format};
use crate::process::Cmd;

/// Leading bytes of a byte-compiled module: magic number plus source mtime.
const BYTECODE_HEADER_LEN: usize = 8;

pub struct ContentComparator<'a> {
    classifier: &'a Classifier,
}

impl<'a> ContentComparator<'a> {
    pub fn new(classifier: &'a Classifier) -> Self {
        Self { classifier }
    }

    /// Compare two files by detected format.
    ///
    /// Returns an error when an external inspector fails; unknown and
    /// mismatched formats compare as different with a warning.
    pub fn equal(&self, a: &Path, b: &Path) -> Result<bool> {
        let format_a = self.classifier.classify(a)?;
        let format_b = self.classifier.classify(b)?;

        if format_a != format_b {
            warn!(
                "{}: format changed ({} vs {}), treating as different",
                a.display(),
                format_a.name(),
                format_b.name()
            );
            return Ok(false);
        }

        match format_a {
            Format::Elf => Ok(disassembly(a)? == disassembly(b)?),
            Format::Typelib => Ok(typelib_dump(a)? == typelib_dump(b)?),
            Format::Html => Ok(markup_events(a)? == markup_events(b)?),
            Format::ByteCompiled => bytecode_equal(a, b),
            Format::Zip => zip_equal(a, b),
            Format::Gzip => gzip_equal(a, b),
            Format::Unknown => {
                warn!("{}: unknown format, treating as different", a.display());
                Ok(false)
            }
        }
    }
}

/// Textual disassembly with the input filename scrubbed out.
///
/// objdump prints the file path in its banner; with that removed, two
/// builds of the same code disassemble identically even when build ids
/// and debug-info offsets moved.
fn disassembly(path: &Path) -> Result<String> {
    let out = Cmd::new("objdump")
        .arg("--disassemble-all")
        .arg_path(path)
        .error_msg(format!("objdump failed on {}", path.display()))
        .run()?;
    Ok(strip_tool_path(&out.stdout, path))
}

fn typelib_dump(path: &Path) -> Result<String> {
    let out = Cmd::new("g-ir-generate")
        .arg_path(path)
        .error_msg(format!("g-ir-generate failed on {}", path.display()))
        .run()?;
    Ok(out.stdout)
}

/// Remove every occurrence of the file's own path from tool output.
fn strip_tool_path(output: &str, path: &Path) -> String {
    output.replace(&path.display().to_string(), "")
}

/// Structural event sequence of a markup document, comments excluded.
///
/// Generators put timestamps in comments; everything else is structure.
fn markup_events(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let text = String::from_utf8_lossy(&raw).into_owned();

    let mut reader = Reader::from_str(&text);
    reader.config_mut().check_end_names = false;

    let mut events = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Comment(_)) => {}
            Ok(Event::Start(e)) => events.push(event_label("start", &e)),
            Ok(Event::End(e)) => events.push(event_label("end", &e)),
            Ok(Event::Empty(e)) => events.push(event_label("empty", &e)),
            Ok(Event::Text(e)) => events.push(event_label("text", &e)),
            Ok(Event::GeneralRef(e)) => events.push(event_label("ref", &e)),
            Ok(Event::CData(e)) => events.push(event_label("cdata", &e)),
            Ok(Event::Decl(e)) => events.push(event_label("decl", &e)),
            Ok(Event::PI(e)) => events.push(event_label("pi", &e)),
            Ok(Event::DocType(e)) => events.push(event_label("doctype", &e)),
            Err(e) => bail!("failed to parse {} as markup: {}", path.display(), e),
        }
    }
    Ok(events)
}

fn event_label(kind: &str, bytes: &[u8]) -> String {
    format!("{kind} {}", String::from_utf8_lossy(bytes))
}

/// Compare byte-compiled modules, skipping the magic + timestamp header.
fn bytecode_equal(a: &Path, b: &Path) -> Result<bool> {
    let bytes_a = fs::read(a).with_context(|| format!("failed to read {}", a.display()))?;
    let bytes_b = fs::read(b).with_context(|| format!("failed to read {}", b.display()))?;
    Ok(bytes_a.get(BYTECODE_HEADER_LEN..) == bytes_b.get(BYTECODE_HEADER_LEN..))
}

/// Compare zip archives by member name set and member contents.
///
/// Member order and archive-level timestamps do not matter.
fn zip_equal(a: &Path, b: &Path) -> Result<bool> {
    let mut archive_a = open_zip(a)?;
    let mut archive_b = open_zip(b)?;

    let names_a: BTreeSet<String> = archive_a.file_names().map(String::from).collect();
    let names_b: BTreeSet<String> = archive_b.file_names().map(String::from).collect();
    if names_a != names_b {
        return Ok(false);
    }

    for name in &names_a {
        let bytes_a = read_zip_member(&mut archive_a, name, a)?;
        let bytes_b = read_zip_member(&mut archive_b, name, b)?;
        if bytes_a != bytes_b {
            return Ok(false);
        }
    }
    Ok(true)
}

fn open_zip(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    ZipArchive::new(file).with_context(|| format!("failed to read {} as zip", path.display()))
}

fn read_zip_member(archive: &mut ZipArchive<File>, name: &str, path: &Path) -> Result<Vec<u8>> {
    let mut member = archive
        .by_name(name)
        .with_context(|| format!("missing member {} in {}", name, path.display()))?;
    let mut bytes = Vec::new();
    member
        .read_to_end(&mut bytes)
        .with_context(|| format!("failed to read member {} of {}", name, path.display()))?;
    Ok(bytes)
}

/// Compare gzip files by decompressed contents.
///
/// The decoder consumes the header, so embedded original names and
/// mtimes never take part in the comparison.
fn gzip_equal(a: &Path, b: &Path) -> Result<bool> {
    Ok(gzip_contents(a)? == gzip_contents(b)?)
}

fn gzip_contents(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut bytes = Vec::new();
    GzDecoder::new(file)
        .read_to_end(&mut bytes)
        .with_context(|| format!("failed to decompress {}", path.display()))?;
    Ok(bytes)
}
