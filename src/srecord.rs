//! S-record source contract (external collaborator per §1/§4.1) and a
//! minimal Motorola S-record reader, just enough to drive the CLI's
//! `--upload` path end to end. Parsing the full HCS08/S32K dialects (with
//! MCU-specific record framing) is explicitly out of scope for this crate;
//! a richer implementation can replace [`FileSrecords`] without touching
//! anything in `module.rs`.

use std::fs;
use std::path::Path;

/// An external source of S-records ready for upload.
///
/// `upload_records` yields every "memory" record (S1/S3, variable length)
/// followed by exactly one "terminal" record (S9/S7, always small) last.
/// Every memory record is at least 2 bytes.
pub trait SrecordSource {
    /// Binary records in upload order, memory records first, terminal last.
    fn upload_records(&self) -> Box<dyn Iterator<Item = Vec<u8>> + '_>;

    /// The same records rendered as printable text lines, for `--print`
    /// style tooling.
    fn text_records(&self) -> Box<dyn Iterator<Item = String> + '_>;
}

/// A record as read from an S-record text file: its type character (`'1'`,
/// `'3'`, `'9'`, `'7'`, ...) and the binary payload that follows the type
/// in the file (count, address, data, checksum).
#[derive(Debug, Clone, PartialEq, Eq)]
struct Record {
    kind: u8,
    text: String,
    binary: Vec<u8>,
}

impl Record {
    fn is_terminal(&self) -> bool {
        matches!(self.kind, b'7' | b'8' | b'9')
    }

    /// The opaque byte form the protocol engine fragments: `b'S'`, the type
    /// digit, then the binary payload.
    fn upload_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.binary.len());
        out.push(b'S');
        out.push(self.kind);
        out.extend_from_slice(&self.binary);
        out
    }
}

fn parse_line(line: &str) -> Option<Record> {
    let line = line.trim();
    if line.is_empty() || !line.starts_with('S') {
        return None;
    }
    let bytes = line.as_bytes();
    let kind = bytes[1];
    let hex = &line[2..];
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut binary = Vec::with_capacity(hex.len() / 2);
    for pair in hex.as_bytes().chunks(2) {
        let byte = u8::from_str_radix(std::str::from_utf8(pair).ok()?, 16).ok()?;
        binary.push(byte);
    }
    Some(Record {
        kind,
        text: line.to_string(),
        binary,
    })
}

/// Reads S-records from a plain text file, one record per line.
pub struct FileSrecords {
    records: Vec<Record>,
}

impl FileSrecords {
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut records: Vec<Record> = contents.lines().filter_map(parse_line).collect();
        // `SrecordSource` promises memory records first, terminal last;
        // a stable sort on `is_terminal` enforces that regardless of the
        // order the file happened to list them in.
        records.sort_by_key(Record::is_terminal);
        Ok(FileSrecords { records })
    }
}

impl SrecordSource for FileSrecords {
    fn upload_records(&self) -> Box<dyn Iterator<Item = Vec<u8>> + '_> {
        Box::new(self.records.iter().map(Record::upload_bytes))
    }

    fn text_records(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(self.records.iter().map(|r| r.text.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_record_is_tagged_with_its_type() {
        let rec = parse_line("S1130000281000000028470000000128470000").unwrap();
        assert_eq!(rec.kind, b'1');
        assert!(!rec.is_terminal());
        assert_eq!(rec.upload_bytes()[0], b'S');
        assert_eq!(rec.upload_bytes()[1], b'1');
    }

    #[test]
    fn terminal_record_is_recognized() {
        let rec = parse_line("S9030000FC").unwrap();
        assert!(rec.is_terminal());
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
    }
}
