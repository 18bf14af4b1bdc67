//! Output Parsers
//!
//! Pure functions turning the text printed by `virsh list`, `docker images`,
//! `docker ps` and `ps` into typed records. Header rows are recognised by
//! their content, a malformed row is skipped and reported in
//! [`Listing::skipped`], and only output with no header and no usable row
//! fails as a whole.

use crate::resource::{ContainerRecord, ImageRecord, VmRecord, VmState};
use crate::{OperationError, Result, log_warn};
use serde::Serialize;
use std::path::Path;

/// A data row the parser could not turn into a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    /// 1-based line number in the raw output.
    pub line_no: usize,
    pub raw: String,
    pub reason: &'static str,
}

impl From<SkippedRow> for OperationError {
    fn from(row: SkippedRow) -> Self {
        OperationError::ParseFailure { line: row.raw }
    }
}

/// Freshly parsed snapshot of one listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing<T> {
    pub records: Vec<T>,
    pub skipped: Vec<SkippedRow>,
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Listing<T> {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<T> {
        self.records
    }

    fn skip(&mut self, line_no: usize, raw: &str, reason: &'static str) {
        log_warn!(line_no, raw = %raw, reason, "skipping unparsable row");
        self.skipped.push(SkippedRow {
            line_no,
            raw: raw.to_string(),
            reason,
        });
    }

    /// Applies the whole-stream rule: content with neither a header nor a
    /// single usable row is garbage, not an empty listing.
    fn finish(self, saw_header: bool) -> Result<Self> {
        if !saw_header && self.records.is_empty() {
            if let Some(first) = self.skipped.first() {
                return Err(first.clone().into());
            }
        }
        Ok(self)
    }
}

impl<'a, T> IntoIterator for &'a Listing<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Column names of a tabular header, upper-cased.
#[derive(Debug, Clone)]
struct Header {
    columns: Vec<String>,
}

impl Header {
    fn parse(line: &str) -> Self {
        Self {
            columns: split_columns(line)
                .into_iter()
                .map(|c| c.to_ascii_uppercase())
                .collect(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// The named cell of `cells`, only when the row lines up with the header.
    fn cell<'a>(&self, cells: &[&'a str], name: &str) -> Option<&'a str> {
        if cells.len() != self.columns.len() {
            return None;
        }
        self.position(name).map(|i| cells[i])
    }
}

/// Split a fixed-width table row on runs of two or more spaces (or a tab),
/// keeping single-spaced phrases such as "2 hours ago" together.
pub fn split_columns(line: &str) -> Vec<&str> {
    let bytes = line.as_bytes();
    let mut columns = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            let gap_start = i;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            let separator = i - gap_start >= 2 || bytes[gap_start] == b'\t' || i == bytes.len();
            if separator {
                if let Some(s) = start.take() {
                    columns.push(&line[s..end]);
                }
            }
            continue;
        }
        if start.is_none() {
            start = Some(i);
        }
        i += 1;
        end = i;
    }

    if let Some(s) = start {
        columns.push(&line[s..end]);
    }
    columns
}

fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c == '-' || c == '=')
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse `virsh list --all`.
///
/// ```text
///  Id   Name      State
/// --------------------------
///  1    web       running
///  -    database  shut off
/// ```
///
/// A header without an `Id` column ("NAME  STATE") is accepted too.
pub fn parse_vm_list(raw: &str) -> Result<Listing<VmRecord>> {
    let mut listing = Listing::default();
    let mut saw_header = false;
    let mut has_id = true;

    for (idx, line) in raw.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() || is_separator(line) {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let upper: Vec<String> = tokens.iter().map(|t| t.to_ascii_uppercase()).collect();
        if upper.iter().any(|t| t == "NAME") && upper.iter().any(|t| t == "STATE") {
            saw_header = true;
            has_id = upper.first().is_some_and(|t| t == "ID");
            continue;
        }

        let (id, rest) = if has_id {
            match tokens.split_first() {
                Some((&"-", rest)) => (None, rest),
                Some((id, rest)) if id.chars().all(|c| c.is_ascii_digit()) => {
                    (Some(id.to_string()), rest)
                }
                _ => {
                    listing.skip(line_no, line, "id column is neither a number nor '-'");
                    continue;
                }
            }
        } else {
            (None, tokens.as_slice())
        };

        let Some((name, state)) = rest.split_first() else {
            listing.skip(line_no, line, "missing name column");
            continue;
        };
        if state.is_empty() {
            listing.skip(line_no, line, "missing state column");
            continue;
        }

        listing.records.push(VmRecord {
            id,
            name: name.to_string(),
            state: VmState::from_virsh(&state.join(" ")),
        });
    }

    listing.finish(saw_header)
}

/// Parse `docker images`, optionally with a `DIGEST` column.
pub fn parse_image_list(raw: &str) -> Result<Listing<ImageRecord>> {
    let mut listing = Listing::default();
    let mut header: Option<Header> = None;

    for (idx, line) in raw.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let candidate = Header::parse(line);
        if candidate.position("REPOSITORY").is_some() {
            header = Some(candidate);
            continue;
        }

        let cells = split_columns(line);
        let words: Vec<&str> = line.split_whitespace().collect();

        let aligned = header.as_ref().and_then(|h| {
            Some((
                h.cell(&cells, "REPOSITORY")?,
                h.cell(&cells, "TAG")?,
                h.cell(&cells, "IMAGE ID")?,
            ))
        });
        let fields = aligned.or_else(|| match words.as_slice() {
            [repository, tag, id, ..] => Some((*repository, *tag, *id)),
            _ => None,
        });

        let Some((repository, tag, id)) = fields else {
            listing.skip(line_no, line, "fewer than three columns");
            continue;
        };

        let bare_id = id.strip_prefix("sha256:").unwrap_or(id);
        if !is_hex(bare_id) {
            listing.skip(line_no, line, "image id is not hexadecimal");
            continue;
        }

        listing.records.push(ImageRecord {
            repository: repository.to_string(),
            tag: tag.to_string(),
            id: id.to_string(),
        });
    }

    listing.finish(header.is_some())
}

/// Parse `docker ps -a`.
///
/// Columns are located through the header when the row lines up with it;
/// otherwise the id is the first word and the name the last, which survives
/// an empty `PORTS` cell and reordered middle columns.
pub fn parse_container_list(raw: &str) -> Result<Listing<ContainerRecord>> {
    let mut listing = Listing::default();
    let mut header: Option<Header> = None;

    for (idx, line) in raw.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let candidate = Header::parse(line);
        if candidate.position("CONTAINER ID").is_some() {
            header = Some(candidate);
            continue;
        }

        let cells = split_columns(line);
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.len() < 2 {
            listing.skip(line_no, line, "fewer than two columns");
            continue;
        }

        let id = header
            .as_ref()
            .and_then(|h| h.cell(&cells, "CONTAINER ID"))
            .unwrap_or(words[0]);
        if !is_hex(id) {
            listing.skip(line_no, line, "container id is not hexadecimal");
            continue;
        }

        let name = header
            .as_ref()
            .and_then(|h| h.cell(&cells, "NAMES"))
            .unwrap_or(words[words.len() - 1]);

        let image = match &header {
            Some(h) => h.cell(&cells, "IMAGE").or_else(|| {
                (h.position("IMAGE") == Some(1) && words.len() > 2).then(|| words[1])
            }),
            None => (words.len() > 2).then(|| words[1]),
        }
        .unwrap_or_default();

        let status = match &header {
            Some(h) => h.cell(&cells, "STATUS").or_else(|| status_without_ports(h, &cells)),
            None => None,
        }
        .unwrap_or_default();

        listing.records.push(ContainerRecord {
            id: id.to_string(),
            image: image.to_string(),
            status: status.to_string(),
            name: name.to_string(),
        });
    }

    listing.finish(header.is_some())
}

/// An empty PORTS cell collapses into the surrounding padding, leaving one
/// cell fewer than the header; columns before PORTS keep their positions.
fn status_without_ports<'a>(header: &Header, cells: &[&'a str]) -> Option<&'a str> {
    let status = header.position("STATUS")?;
    let ports = header.position("PORTS")?;
    (cells.len() + 1 == header.columns.len() && status < ports).then(|| cells[status])
}

/// Parse `ps -eo pid=,args=` and keep the processes of `launcher`.
///
/// Each match becomes a running [`VmRecord`] whose id is the pid and whose
/// name is the `-name` value, else the first `file=` disk path, else the
/// launcher name.
pub fn parse_qemu_processes(raw: &str, launcher: &str) -> Result<Listing<VmRecord>> {
    let mut listing = Listing::default();
    let launcher_name = program_name(launcher);

    for (idx, line) in raw.lines().enumerate() {
        let line_no = idx + 1;
        let mut words = line.split_whitespace();
        let (Some(pid), Some(program)) = (words.next(), words.next()) else {
            continue;
        };
        if program_name(program) != launcher_name {
            continue;
        }
        if !pid.chars().all(|c| c.is_ascii_digit()) {
            listing.skip(line_no, line, "pid column is not a number");
            continue;
        }

        let args: Vec<&str> = words.collect();
        let name = guest_name(&args)
            .or_else(|| args.iter().find_map(|arg| option_value(arg, "file")))
            .unwrap_or_else(|| launcher_name.to_string());

        listing.records.push(VmRecord {
            id: Some(pid.to_string()),
            name,
            state: VmState::Running,
        });
    }

    Ok(listing)
}

fn program_name(program: &str) -> &str {
    Path::new(program)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program)
}

/// Value of `-name`, which may be `foo` or `guest=foo,debug-threads=on`.
fn guest_name(args: &[&str]) -> Option<String> {
    let pos = args.iter().position(|arg| *arg == "-name")?;
    let value = args.get(pos + 1)?;
    option_value(value, "guest").or_else(|| {
        split_options(value)
            .into_iter()
            .next()
            .filter(|first| !first.contains('='))
    })
}

/// Value of `key` in a QEMU option string such as
/// `file=/vm/disk.qcow2,format=qcow2,if=virtio`.
pub fn option_value(options: &str, key: &str) -> Option<String> {
    split_options(options).into_iter().find_map(|part| {
        let (k, v) = part.split_once('=')?;
        (k == key && !v.is_empty()).then(|| v.to_string())
    })
}

/// Split a QEMU option string on commas; `,,` is an escaped literal comma.
fn split_options(options: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = options.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ',' {
            if chars.peek() == Some(&',') {
                chars.next();
                current.push(',');
            } else {
                parts.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}
