//! The `log.csv` ledger of processed files.
//!
//! UTF-8 with a byte-order mark, comma separated, CRLF rows, minimal quoting.
//! The header `Original Filename,New Title` is written once, when the file
//! is created (or found empty). Every later run only appends.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::SetupError;

pub const LEDGER_FILE_NAME: &str = "log.csv";
pub const HEADER: [&str; 2] = ["Original Filename", "New Title"];

const BOM: &str = "\u{feff}";

/// One processed file: its name before the run and the stem it was renamed to.
///
/// `title` is the final stem on disk, including any `_N` collision suffix,
/// not the sanitized title the service returned. A row therefore records
/// the rename exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub original: String,
    pub title: String,
}

pub fn ledger_path(folder: &Path) -> PathBuf {
    folder.join(LEDGER_FILE_NAME)
}

/// Read every data row of a ledger file. A missing file has no rows.
pub fn read_entries(path: &Path) -> std::io::Result<Vec<LedgerEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let text = text.strip_prefix(BOM).unwrap_or(&text[..]);

    let mut records = parse_records(text).into_iter().peekable();
    if records.peek().is_some_and(|r| is_header(r)) {
        records.next();
    }

    Ok(records
        .filter_map(|mut r| {
            if r.len() < 2 {
                log::warn!("Ignoring short ledger row in {}: {r:?}", path.display());
                return None;
            }
            let title = r.swap_remove(1).trim().to_string();
            let original = r.swap_remove(0).trim().to_string();
            Some(LedgerEntry { original, title })
        })
        .collect())
}

/// Stems that must not be processed again in `folder`.
///
/// Both the original name's stem and the assigned stem count: the first
/// catches files that were logged but never renamed, the second catches
/// the renamed files themselves.
pub fn load_processed(folder: &Path) -> Result<HashSet<String>, SetupError> {
    let path = ledger_path(folder);
    let entries = read_entries(&path).map_err(|source| SetupError::LedgerUnreadable {
        path: path.clone(),
        source,
    })?;

    let mut stems = HashSet::with_capacity(entries.len() * 2);
    for entry in entries {
        if let Some(stem) = Path::new(&entry.original).file_stem() {
            stems.insert(stem.to_string_lossy().into_owned());
        }
        if !entry.title.is_empty() {
            stems.insert(entry.title);
        }
    }
    Ok(stems)
}

/// Append-only handle on a folder's ledger.
pub struct LedgerWriter {
    file: File,
    path: PathBuf,
}

impl LedgerWriter {
    /// Open `folder/log.csv` for appending, creating it with BOM and header
    /// if it does not exist yet or is empty.
    pub fn open(folder: &Path) -> Result<Self, SetupError> {
        let path = ledger_path(folder);
        let unwritable = |source| SetupError::LedgerUnwritable {
            path: path.clone(),
            source,
        };

        let len = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(unwritable)?;

        if len > 0 && !ends_with_newline(&mut file).map_err(unwritable)? {
            // Last row was cut short by an editor or a crash; finish it.
            file.write_all(b"\r\n").map_err(unwritable)?;
            file.flush().map_err(unwritable)?;
            log::debug!("Terminated the last row of {}", path.display());
        }

        if len == 0 {
            let header = format!("{BOM}{}", encode_row(HEADER[0], HEADER[1]));
            file.write_all(header.as_bytes()).map_err(unwritable)?;
            file.flush().map_err(unwritable)?;
            log::debug!("Created ledger {}", path.display());
        }

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row and flush it. The row is written with a single
    /// `write_all`, so a stop between files never leaves half a row.
    pub fn append(&mut self, entry: &LedgerEntry) -> std::io::Result<()> {
        let row = encode_row(&entry.original, &entry.title);
        self.file.write_all(row.as_bytes())?;
        self.file.flush()
    }
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn encode_row(a: &str, b: &str) -> String {
    format!("{},{}\r\n", encode_field(a), encode_field(b))
}

/// Quote a field only if it contains a comma, quote, CR or LF.
fn encode_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn is_header(record: &[String]) -> bool {
    record.len() >= 2
        && record[0].trim().eq_ignore_ascii_case(HEADER[0])
        && record[1].trim().eq_ignore_ascii_case(HEADER[1])
}

/// Split CSV text into records. Handles quoted fields with embedded
/// commas, doubled quotes and line breaks; blank lines are dropped.
fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                if record.iter().any(|f| !f.is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(c),
        }
    }

    record.push(field);
    if record.iter().any(|f| !f.is_empty()) {
        records.push(record);
    }
    records
}
