//! Line parsers for `git log` / `git show --numstat` output
//!
//! Both parsers are pure: they take one decoded line and return a typed
//! match, or `None` when the line has a different shape.

use crate::models::FileChange;

/// Length of a full SHA-1 commit hash in hex.
pub const COMMIT_ID_LEN: usize = 40;

/// A `<40-hex-id> <date-text>` header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitHeader<'a> {
    pub id: &'a str,
    /// Everything after the id, surrounding whitespace trimmed
    pub date_text: &'a str,
}

/// Parse a commit header line.
///
/// The line must start with exactly 40 lowercase hex characters followed by
/// whitespace.
pub fn parse_commit_header(line: &str) -> Option<CommitHeader<'_>> {
    let id = line.get(..COMMIT_ID_LEN)?;
    if !id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }

    let rest = &line[COMMIT_ID_LEN..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    Some(CommitHeader {
        id,
        date_text: rest.trim(),
    })
}

/// One count column of a numstat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCount<'a> {
    Lines(u64),
    /// `-`: git could not count lines (binary file)
    Binary,
    /// Token in a count position that is not a valid count
    Malformed(&'a str),
}

impl<'a> LineCount<'a> {
    fn parse(token: &'a str) -> Self {
        if token == "-" {
            return LineCount::Binary;
        }
        match token.parse::<u64>() {
            Ok(n) if token.bytes().all(|b| b.is_ascii_digit()) => LineCount::Lines(n),
            _ => LineCount::Malformed(token),
        }
    }

    /// Count used for aggregation; unknown and malformed counts are zero.
    pub fn value(&self) -> u64 {
        match self {
            LineCount::Lines(n) => *n,
            LineCount::Binary | LineCount::Malformed(_) => 0,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, LineCount::Malformed(_))
    }

    /// The token as git printed it.
    pub fn raw(&self) -> String {
        match self {
            LineCount::Lines(n) => n.to_string(),
            LineCount::Binary => "-".to_string(),
            LineCount::Malformed(token) => (*token).to_string(),
        }
    }
}

/// A `<added> <removed> <filename>` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumstatLine<'a> {
    pub added: LineCount<'a>,
    pub removed: LineCount<'a>,
    pub filename: &'a str,
}

impl NumstatLine<'_> {
    pub fn is_malformed(&self) -> bool {
        self.added.is_malformed() || self.removed.is_malformed()
    }

    pub fn to_file_change(&self) -> FileChange {
        FileChange::new(self.filename, self.added.value(), self.removed.value())
    }
}

/// Parse a numstat line.
///
/// Returns `None` for anything that is not three whitespace-separated
/// fields with count-like first and second fields: blank lines, commit
/// headers, separators. The filename is the rest of the line and may
/// contain spaces.
pub fn parse_numstat(line: &str) -> Option<NumstatLine<'_>> {
    if parse_commit_header(line).is_some() {
        return None;
    }

    let (added, rest) = split_field(line)?;
    let (removed, filename) = split_field(rest)?;
    if !looks_like_count(added) || !looks_like_count(removed) || filename.is_empty() {
        return None;
    }

    Some(NumstatLine {
        added: LineCount::parse(added),
        removed: LineCount::parse(removed),
        filename,
    })
}

/// Split off the first whitespace-delimited field.
fn split_field(s: &str) -> Option<(&str, &str)> {
    let end = s.find(char::is_whitespace)?;
    if end == 0 {
        return None;
    }
    let (field, rest) = s.split_at(end);
    Some((field, rest.trim_start()))
}

fn looks_like_count(token: &str) -> bool {
    token == "-" || token.starts_with(|c: char| c.is_ascii_digit())
}
