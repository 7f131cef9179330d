//! Chat log input discovery and loading.
//!
//! The input is either a single CSV export or a directory of them. Columns
//! are addressed by position and kept as text so date and time tokens reach
//! the tables exactly as the logger wrote them.

use crate::config::InputLayout;
use crate::constants;
use crate::error::{Result, TelemetryError};
use crate::models::RawMessage;
use crate::parser::normalize_body;

use csv::{ByteRecord, Position, ReaderBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Messages loaded from all input files, in file then row order
#[derive(Debug, Default)]
pub struct InputBatch {
    pub files: Vec<PathBuf>,
    pub messages: Vec<RawMessage>,
    /// Rows without a source, message, date or time, or with the wrong
    /// number of fields
    pub skipped_rows: usize,
}

/// Find the CSV files making up the input, sorted by path
pub fn discover_input_files(input_path: &Path) -> Result<Vec<PathBuf>> {
    if !input_path.exists() {
        return Err(TelemetryError::InputNotFound {
            path: input_path.to_path_buf(),
        });
    }

    if input_path.is_file() {
        return Ok(vec![input_path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input_path) {
        let entry = entry.map_err(|e| TelemetryError::InvalidInput {
            path: input_path.to_path_buf(),
            reason: format!("directory traversal failed: {}", e),
        })?;

        let is_csv = entry.path().extension().is_some_and(|ext| {
            ext.eq_ignore_ascii_case(constants::INPUT_FILE_EXTENSION)
        });
        if entry.file_type().is_file() && is_csv {
            files.push(entry.into_path());
        }
    }

    files.sort();
    debug!(
        "Found {} input files under {}",
        files.len(),
        input_path.display()
    );
    Ok(files)
}

/// Load every input file
pub fn load_input(input_path: &Path, layout: &InputLayout) -> Result<InputBatch> {
    let files = discover_input_files(input_path)?;
    let mut batch = InputBatch::default();

    for file in &files {
        let (messages, skipped) = read_messages(file, layout)?;
        debug!(
            "Read {} messages from {} ({} rows skipped)",
            messages.len(),
            file.display(),
            skipped
        );
        batch.messages.extend(messages);
        batch.skipped_rows += skipped;
    }

    batch.files = files;
    Ok(batch)
}

/// Read one chat log export.
///
/// The logger writes group and sender names unescaped and never quotes the
/// message, so a stray comma or quote can break a row. Rows whose field count
/// differs from the header are dropped; when a stray quote swallows following
/// lines, those lines are re-read one by one without quoting so intact rows
/// survive.
pub fn read_messages(path: &Path, layout: &InputLayout) -> Result<(Vec<RawMessage>, usize)> {
    let contents = std::fs::read(path)?;
    if contents.is_empty() {
        warn!("Input file {} is empty", path.display());
        return Ok((Vec::new(), 0));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(contents.as_slice());

    let mut record = ByteRecord::new();
    let mut width = None;
    if layout.has_header {
        if !reader.read_byte_record(&mut record)? {
            return Ok((Vec::new(), 0));
        }
        width = Some(check_width(path, record.len(), layout)?);
    }

    let mut messages = Vec::new();
    let mut skipped = 0;

    loop {
        let start = byte_offset(reader.position());
        if !reader.read_byte_record(&mut record)? {
            break;
        }
        let end = byte_offset(reader.position());

        let expected = match width {
            Some(expected) => expected,
            None => {
                let expected = check_width(path, record.len(), layout)?;
                width = Some(expected);
                expected
            }
        };

        if record.len() == expected {
            match message_from_record(&record, layout) {
                Some(message) => messages.push(message),
                None => skipped += 1,
            }
            continue;
        }

        let raw = &contents[start..end.min(contents.len())];
        debug!(
            "Malformed row at line {} of {}: {} fields, expected {}",
            record.position().map(|p| p.line()).unwrap_or(0),
            path.display(),
            record.len(),
            expected
        );
        let (recovered, dropped) = recover_lines(raw, expected, layout)?;
        messages.extend(recovered);
        skipped += dropped;
    }

    Ok((messages, skipped))
}

/// Re-read a malformed span line by line with quoting disabled
fn recover_lines(
    raw: &[u8],
    width: usize,
    layout: &InputLayout,
) -> Result<(Vec<RawMessage>, usize)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(raw);

    let mut messages = Vec::new();
    let mut dropped = 0;
    for result in reader.byte_records() {
        let record = result?;
        match message_from_record(&record, layout) {
            Some(message) if record.len() == width => messages.push(message),
            _ => dropped += 1,
        }
    }
    Ok((messages, dropped))
}

fn check_width(path: &Path, width: usize, layout: &InputLayout) -> Result<usize> {
    if width < layout.min_columns() {
        return Err(TelemetryError::InvalidInput {
            path: path.to_path_buf(),
            reason: format!(
                "expected at least {} columns, found {}",
                layout.min_columns(),
                width
            ),
        });
    }
    Ok(width)
}

fn byte_offset(position: &Position) -> usize {
    usize::try_from(position.byte()).unwrap_or(usize::MAX)
}

fn message_from_record(record: &ByteRecord, layout: &InputLayout) -> Option<RawMessage> {
    let field = |index: usize| record.get(index).map(String::from_utf8_lossy);

    let source = field(layout.source)?;
    let body = field(layout.message)?;
    let date = field(layout.date)?;
    let time = field(layout.time)?;

    non_blank(&body)?;
    Some(RawMessage::new(
        non_blank(&source)?,
        normalize_body(&body),
        non_blank(&date)?,
        non_blank(&time)?,
    ))
}

fn non_blank(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}
