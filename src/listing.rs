//! Parsing of directory listings as sent by FTP servers in response to LIST.
//!
//! Two line formats are understood: the Unix `ls -l` format most servers use and the MS-DOS
//! format of IIS. Lines in any other format are kept, with the whole line as the name, so that
//! a listing never loses entries.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::fmt::{self, Display, Formatter};

/// The type of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular file
    File,
    /// A directory
    Directory,
    /// A symbolic link
    Symlink,
    /// A device, socket, pipe or something else the server knows about
    Other,
    /// The line could not be parsed
    Unknown,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// The name of the file or directory, without its parent path
    pub name: String,
    /// What kind of entry this is
    pub kind: EntryKind,
    /// The size in bytes. Absent for directories.
    pub size: Option<u64>,
    /// The last modification time as reported by the server, in the server's time zone
    pub modified: Option<NaiveDateTime>,
    /// The permission string, e.g. `rwxr-xr-x`
    pub permissions: Option<String>,
    /// The number of hard links
    pub links: Option<u64>,
    /// The owning user
    pub owner: Option<String>,
    /// The owning group
    pub group: Option<String>,
    /// Where a symbolic link points to
    pub link_target: Option<String>,
}

impl ListEntry {
    /// Parses a single listing line. Never fails: a line that can't be understood yields an
    /// entry of kind [`EntryKind::Unknown`] named after the trimmed line.
    pub fn parse(line: &str) -> ListEntry {
        let line = line.trim_end_matches(['\r', '\n']);
        parse_unix(line).or_else(|| parse_dos(line)).unwrap_or_else(|| ListEntry::unknown(line.trim()))
    }

    fn unknown(name: &str) -> ListEntry {
        ListEntry {
            name: name.to_string(),
            kind: EntryKind::Unknown,
            size: None,
            modified: None,
            permissions: None,
            links: None,
            owner: None,
            group: None,
            link_target: None,
        }
    }

    /// Returns true if the entry is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

impl Display for ListEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let modified = self
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let size = self.size.map(|s| s.to_string()).unwrap_or_default();
        write!(f, "{}   {}  {}  {}", self.name, if self.is_directory() { "D" } else { "-" }, size, modified)
    }
}

/// Parses a complete listing into entries, in the order the server sent them. Empty lines and
/// the `total` summary line of `ls -l` are skipped.
pub fn parse_listing(text: &str) -> Vec<ListEntry> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !is_total_line(line))
        .map(ListEntry::parse)
        .collect()
}

fn is_total_line(line: &str) -> bool {
    let mut parts = line.split_whitespace();
    matches!((parts.next(), parts.next(), parts.next()), (Some("total"), Some(n), None) if n.parse::<u64>().is_ok())
}

// Splits off `n` whitespace separated tokens and returns them together with the untouched rest
// of the line. The rest keeps inner whitespace so that names with spaces survive.
fn split_tokens(line: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut tokens = Vec::with_capacity(n);
    let mut rest = line.trim_start();
    while tokens.len() < n {
        let end = rest.find(char::is_whitespace)?;
        tokens.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    if rest.is_empty() { None } else { Some((tokens, rest)) }
}

fn parse_unix(line: &str) -> Option<ListEntry> {
    let (tokens, rest) = split_tokens(line, 8)?;
    let mode = tokens[0];
    if mode.len() < 10 || !mode.is_ascii() {
        return None;
    }
    let kind = match mode.as_bytes()[0] {
        b'-' => EntryKind::File,
        b'd' => EntryKind::Directory,
        b'l' => EntryKind::Symlink,
        b'b' | b'c' | b'p' | b's' => EntryKind::Other,
        _ => return None,
    };
    let links = tokens[1].parse::<u64>().ok()?;
    let size = tokens[4].parse::<u64>().ok()?;
    let modified = parse_unix_date(tokens[5], tokens[6], tokens[7]);
    let (name, link_target) = match (kind, rest.split_once(" -> ")) {
        (EntryKind::Symlink, Some((name, target))) => (name.to_string(), Some(target.to_string())),
        _ => (rest.to_string(), None),
    };
    Some(ListEntry {
        name,
        kind,
        size: if kind == EntryKind::Directory { None } else { Some(size) },
        modified,
        permissions: Some(mode[1..10].to_string()),
        links: Some(links),
        owner: Some(tokens[2].to_string()),
        group: Some(tokens[3].to_string()),
        link_target,
    })
}

// `ls` shows either "Mon DD HH:MM" for recent files or "Mon DD YYYY" for older ones. Recent means
// within the last six months, so a date that would lie in the future belongs to last year.
fn parse_unix_date(month: &str, day: &str, time_or_year: &str) -> Option<NaiveDateTime> {
    match time_or_year.split_once(':') {
        Some(_) => {
            let time = NaiveTime::parse_from_str(time_or_year, "%H:%M").ok()?;
            let now = Utc::now().naive_utc();
            let this_year = NaiveDate::parse_from_str(&format!("{} {} {}", month, day, now.year()), "%b %d %Y").ok()?;
            let date = if this_year > now.date().succ_opt()? {
                NaiveDate::parse_from_str(&format!("{} {} {}", month, day, now.year() - 1), "%b %d %Y").ok()?
            } else {
                this_year
            };
            Some(date.and_time(time))
        }
        None => {
            let date = NaiveDate::parse_from_str(&format!("{} {} {}", month, day, time_or_year), "%b %d %Y").ok()?;
            Some(date.and_time(NaiveTime::MIN))
        }
    }
}

// 01-15-24  10:30AM       <DIR>          name
fn parse_dos(line: &str) -> Option<ListEntry> {
    let (tokens, rest) = split_tokens(line, 3)?;
    let date = NaiveDate::parse_from_str(tokens[0], "%m-%d-%y")
        .or_else(|_| NaiveDate::parse_from_str(tokens[0], "%m-%d-%Y"))
        .ok()?;
    let time = NaiveTime::parse_from_str(tokens[1], "%I:%M%p").ok()?;
    let (kind, size) = match tokens[2] {
        "<DIR>" => (EntryKind::Directory, None),
        size => (EntryKind::File, Some(size.parse::<u64>().ok()?)),
    };
    Some(ListEntry {
        name: rest.to_string(),
        kind,
        size,
        modified: Some(date.and_time(time)),
        permissions: None,
        links: None,
        owner: None,
        group: None,
        link_target: None,
    })
}
