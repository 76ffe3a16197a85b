//! Line patterns for apk and sudo output.
//!
//! Every entry is anchored to the start of a line and, apart from the sudo
//! password prompt, includes the `\r\n` terminator written by the pty.
//! Entries are grouped into families; a [`PatternSet`] concatenates families
//! for one command without reordering anything.
//!
//! Line bodies match bytes with `(?-u:.)`, so output that is not valid UTF-8
//! is still classified when ANSI stripping is off.

use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::bytes::Regex;

use crate::error::PatternError;

/// Version part of a `name-version` token, e.g. `1.36.1-r2`, `1.1.1w-r1`
/// or `2.0_rc1-r0`.
pub const VERSION_FRAGMENT: &str = r"(\d+(?:\.\d+)*[a-z]?(?:_[a-z]+\d*)*(?:-r\d+)?)";

/// Full `name-version` token. Captures the name, then the version.
///
/// Names may be hyphenated (`py3-pip`) and may contain `+` or `.`
/// (`libstdc++`, `gtk+3.0`).
pub static PACKAGE_FRAGMENT: LazyLock<String> =
    LazyLock::new(|| format!(r"(\w[\w+.]*(?:-\w[\w+.]*)*)-{VERSION_FRAGMENT}"));

/// Semantic tag attached to each pattern entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    /// `ERROR: <message>`
    Error,
    /// `OK: <message>`
    Ok,
    /// `[sudo] password for <user>: `
    SudoPrompt,
    /// `Sorry, try again.`
    SudoRetry,
    /// `sudo: 3 incorrect password attempts`
    SudoFailed,
    /// Bare line break sent by sudo once the password was read.
    Newline,
    /// `(3/10) Installing foo (1.0-r0)`
    Progress,
    /// `Executing busybox-1.36.1-r2.trigger`
    Exec,
    /// `fetch <url>`
    Fetch,
    /// `Configuring a getty on port ttyS0 with baud rate 115200`
    Getty,
    /// Any other non-empty line.
    Anything,
    /// `2024-01-01 12:00:00 [<url>]`
    UpdateTime,
    /// `v3.19.1-100-g0123456789a [<url>]`
    UpdateVersion,
    /// `name-version - description`
    PackageVerbose,
    /// `name-version`
    Package,
    /// `name-version <field>:` followed by its value line.
    Detail,
    /// Blank separator line between detail sections.
    Blank,
}

impl PatternKind {
    /// Whether this kind belongs to the sudo dialogue.
    pub fn is_auth(self) -> bool {
        matches!(
            self,
            Self::SudoPrompt | Self::SudoRetry | Self::SudoFailed | Self::Newline
        )
    }

    /// Upper-case tag name, e.g. `SUDO_PROMPT`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Ok => "OK",
            Self::SudoPrompt => "SUDO_PROMPT",
            Self::SudoRetry => "SUDO_RETRY",
            Self::SudoFailed => "SUDO_FAILED",
            Self::Newline => "NEWLINE",
            Self::Progress => "PROGRESS",
            Self::Exec => "EXEC",
            Self::Fetch => "FETCH",
            Self::Getty => "GETTY",
            Self::Anything => "ANYTHING",
            Self::UpdateTime => "UPDATE_TIME",
            Self::UpdateVersion => "UPDATE_VERSION",
            Self::PackageVerbose => "PACKAGE_VERBOSE",
            Self::Package => "PACKAGE",
            Self::Detail => "DETAIL",
            Self::Blank => "BLANK",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled line pattern with its semantic tag.
#[derive(Debug, Clone)]
pub struct PatternEntry {
    kind: PatternKind,
    regex: Regex,
}

impl PatternEntry {
    /// Compile a new entry.
    pub fn new(kind: PatternKind, pattern: &str) -> Result<Self, PatternError> {
        Ok(Self {
            kind,
            regex: Regex::new(pattern)?,
        })
    }

    /// Entries of the built-in table are constants; failing to compile one
    /// is a bug in this module.
    fn builtin(kind: PatternKind, pattern: &str) -> Self {
        Self::new(kind, pattern).unwrap()
    }

    /// The semantic tag.
    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// The underlying regex.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Whether this entry matches any line at all.
    pub fn is_catch_all(&self) -> bool {
        self.kind == PatternKind::Anything
    }
}

/// Named group of entries reused across commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternFamily {
    /// ERROR and OK, present for every command.
    Generic,
    /// The sudo dialogue, present only for privileged commands.
    Auth,
    /// `add`, `del` and `upgrade` progress output.
    Transaction,
    /// `update` repository output.
    Update,
    /// `search` and `info --verbose` listings.
    Search,
    /// `info <pkg>` detail sections.
    Info,
}

impl PatternFamily {
    /// The built-in entries of this family, in match priority order.
    pub fn entries(self) -> &'static [PatternEntry] {
        match self {
            Self::Generic => &GENERIC,
            Self::Auth => &AUTH,
            Self::Transaction => &TRANSACTION,
            Self::Update => &UPDATE,
            Self::Search => &SEARCH,
            Self::Info => &INFO,
        }
    }
}

static GENERIC: LazyLock<Vec<PatternEntry>> = LazyLock::new(|| {
    vec![
        PatternEntry::builtin(PatternKind::Error, r"(?m)^ERROR: ((?-u:.)+)\r\n"),
        PatternEntry::builtin(PatternKind::Ok, r"(?m)^OK: ((?-u:.)+)\r\n"),
    ]
});

static AUTH: LazyLock<Vec<PatternEntry>> = LazyLock::new(|| {
    vec![
        PatternEntry::builtin(
            PatternKind::SudoPrompt,
            r"(?m)^\[sudo\] password for ([^:\r\n]+): ",
        ),
        PatternEntry::builtin(PatternKind::SudoRetry, r"(?m)^Sorry, try again\.\r\n"),
        PatternEntry::builtin(
            PatternKind::SudoFailed,
            r"(?m)^sudo: (\d+ incorrect password attempts?)\r\n",
        ),
        PatternEntry::builtin(PatternKind::Newline, r"(?m)^\r\n"),
    ]
});

static TRANSACTION: LazyLock<Vec<PatternEntry>> = LazyLock::new(|| {
    vec![
        PatternEntry::builtin(PatternKind::Progress, r"(?m)^\((\d+)/(\d+)\) ((?-u:.)+)\r\n"),
        PatternEntry::builtin(
            PatternKind::Exec,
            &format!(r"(?m)^Executing {}\.((?-u:.)+)\r\n", *PACKAGE_FRAGMENT),
        ),
        PatternEntry::builtin(PatternKind::Fetch, r"(?m)^fetch ((?-u:.)+)\r\n"),
        PatternEntry::builtin(
            PatternKind::Getty,
            r"(?m)^Configuring a getty on port (\w+) with baud rate (\d+)\r\n",
        ),
        PatternEntry::builtin(PatternKind::Anything, r"(?m)^((?-u:.)+)\r\n"),
    ]
});

static UPDATE: LazyLock<Vec<PatternEntry>> = LazyLock::new(|| {
    vec![
        PatternEntry::builtin(PatternKind::Fetch, r"(?m)^fetch ((?-u:.)+)\r\n"),
        PatternEntry::builtin(
            PatternKind::UpdateTime,
            r"(?m)^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?) \[((?-u:.)+)\]\r\n",
        ),
        PatternEntry::builtin(PatternKind::UpdateVersion, r"(?m)^(v[\w.\-]+) \[((?-u:.)+)\]\r\n"),
    ]
});

static SEARCH: LazyLock<Vec<PatternEntry>> = LazyLock::new(|| {
    vec![
        PatternEntry::builtin(
            PatternKind::PackageVerbose,
            &format!(r"(?m)^{} - ((?-u:.)+)\r\n", *PACKAGE_FRAGMENT),
        ),
        PatternEntry::builtin(
            PatternKind::Package,
            &format!(r"(?m)^{}\r\n", *PACKAGE_FRAGMENT),
        ),
    ]
});

static INFO: LazyLock<Vec<PatternEntry>> = LazyLock::new(|| {
    vec![
        PatternEntry::builtin(
            PatternKind::Detail,
            &format!(
                r"(?m)^{} (description|webpage|installed size):\r\n((?-u:.)*)\r\n",
                *PACKAGE_FRAGMENT
            ),
        ),
        PatternEntry::builtin(PatternKind::Blank, r"(?m)^\r\n"),
    ]
});

/// Ordered concatenation of pattern families used for one command.
///
/// When several entries match the buffered text, the match starting
/// earliest wins; a tie goes to the entry listed first.
#[derive(Debug, Clone)]
pub struct PatternSet {
    entries: Vec<PatternEntry>,
    spans: IndexMap<PatternFamily, Range<usize>>,
}

impl PatternSet {
    /// Concatenate built-in families in the given order.
    ///
    /// Fails if a catch-all entry would end up anywhere but last.
    pub fn compose(families: &[PatternFamily]) -> Result<Self, PatternError> {
        let mut entries = Vec::new();
        let mut spans = IndexMap::new();

        for &family in families {
            if spans.contains_key(&family) {
                continue;
            }
            let start = entries.len();
            entries.extend(family.entries().iter().cloned());
            spans.insert(family, start..entries.len());
        }

        let len = entries.len();
        if let Some(index) = entries.iter().position(PatternEntry::is_catch_all) {
            if index + 1 != len {
                return Err(PatternError::CatchAllNotLast { index, len });
            }
        }

        Ok(Self { entries, spans })
    }

    /// All entries in priority order.
    pub fn entries(&self) -> &[PatternEntry] {
        &self.entries
    }

    /// Entry at a position.
    pub fn get(&self, index: usize) -> Option<&PatternEntry> {
        self.entries.get(index)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the first entry of a family, if the family was composed.
    pub fn offset_of(&self, family: PatternFamily) -> Option<usize> {
        self.spans.get(&family).map(|span| span.start)
    }

    /// The family an index falls into.
    pub fn family_of(&self, index: usize) -> Option<PatternFamily> {
        self.spans
            .iter()
            .find(|(_, span)| span.contains(&index))
            .map(|(family, _)| *family)
    }

    /// Whether a family is part of this set.
    pub fn contains(&self, family: PatternFamily) -> bool {
        self.spans.contains_key(&family)
    }

    /// Families in composition order.
    pub fn families(&self) -> impl Iterator<Item = PatternFamily> + '_ {
        self.spans.keys().copied()
    }

    /// Find the winning entry for `data`.
    ///
    /// Returns the entry index and the byte range of its match.
    pub fn earliest_match(&self, data: &[u8]) -> Option<(usize, Range<usize>)> {
        let mut best: Option<(usize, Range<usize>)> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            let Some(m) = entry.regex.find(data) else {
                continue;
            };
            // Strictly earlier only: ties keep the entry listed first.
            if best.as_ref().is_none_or(|(_, range)| m.start() < range.start) {
                best = Some((index, m.range()));
            }
        }
        best
    }
}

/// A classified piece of output: which entry matched and what it captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Position of the entry in the pattern set.
    pub index: usize,

    /// Tag of the matching entry.
    pub kind: PatternKind,

    /// Capture groups 1..n; `None` for a group that did not participate.
    pub groups: Vec<Option<String>>,

    /// The matched text itself.
    pub text: String,
}

impl PatternMatch {
    /// Capture group by regex number (1-based).
    pub fn group(&self, n: usize) -> Option<&str> {
        n.checked_sub(1)
            .and_then(|i| self.groups.get(i))
            .and_then(|g| g.as_deref())
    }

    /// The matched text without its line terminator.
    pub fn line(&self) -> &str {
        self.text.trim_end_matches(['\r', '\n'])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_match(set: &PatternSet, data: &[u8]) -> Option<PatternKind> {
        set.earliest_match(data)
            .map(|(index, _)| set.get(index).unwrap().kind())
    }

    #[test]
    fn test_builtin_families_compile() {
        for family in [
            PatternFamily::Generic,
            PatternFamily::Auth,
            PatternFamily::Transaction,
            PatternFamily::Update,
            PatternFamily::Search,
            PatternFamily::Info,
        ] {
            assert!(!family.entries().is_empty());
        }
        assert_eq!(PatternFamily::Generic.entries().len(), 2);
        assert_eq!(PatternFamily::Auth.entries().len(), 4);
    }

    #[test]
    fn test_compose_preserves_order_and_offsets() {
        let set = PatternSet::compose(&[
            PatternFamily::Generic,
            PatternFamily::Auth,
            PatternFamily::Transaction,
        ])
        .unwrap();

        assert_eq!(set.len(), 11);
        assert_eq!(set.offset_of(PatternFamily::Generic), Some(0));
        assert_eq!(set.offset_of(PatternFamily::Auth), Some(2));
        assert_eq!(set.offset_of(PatternFamily::Transaction), Some(6));
        assert_eq!(set.get(2).unwrap().kind(), PatternKind::SudoPrompt);
        assert_eq!(set.get(10).unwrap().kind(), PatternKind::Anything);
        assert_eq!(set.family_of(7), Some(PatternFamily::Transaction));
    }

    #[test]
    fn test_compose_without_auth() {
        let set =
            PatternSet::compose(&[PatternFamily::Generic, PatternFamily::Search]).unwrap();
        assert!(!set.contains(PatternFamily::Auth));
        assert_eq!(set.offset_of(PatternFamily::Search), Some(2));
    }

    #[test]
    fn test_catch_all_must_be_last() {
        let err = PatternSet::compose(&[PatternFamily::Transaction, PatternFamily::Update])
            .unwrap_err();
        assert!(matches!(
            err,
            PatternError::CatchAllNotLast { index: 4, len: 8 }
        ));
    }

    #[test]
    fn test_earliest_start_wins() {
        let set = PatternSet::compose(&[PatternFamily::Generic, PatternFamily::Transaction])
            .unwrap();
        // The OK line starts after the unstructured one.
        let data = b"some chatter\r\nOK: done\r\n";
        assert_eq!(first_match(&set, data), Some(PatternKind::Anything));
    }

    #[test]
    fn test_tie_goes_to_earlier_entry() {
        let set = PatternSet::compose(&[PatternFamily::Generic, PatternFamily::Transaction])
            .unwrap();
        assert_eq!(
            first_match(&set, b"(3/10) Installing foo\r\n"),
            Some(PatternKind::Progress)
        );
        assert_eq!(
            first_match(&set, b"ERROR: unable to select packages\r\n"),
            Some(PatternKind::Error)
        );
    }

    #[test]
    fn test_partial_line_does_not_match() {
        let set = PatternSet::compose(&[PatternFamily::Generic, PatternFamily::Transaction])
            .unwrap();
        assert_eq!(first_match(&set, b"(3/10) Install"), None);
    }

    #[test]
    fn test_catch_all_matches_invalid_utf8() {
        let set = PatternSet::compose(&[PatternFamily::Generic, PatternFamily::Transaction])
            .unwrap();
        let data = b"caf\xe9 latin1\r\nOK: done\r\n";
        let (index, range) = set.earliest_match(data).unwrap();
        assert_eq!(set.get(index).unwrap().kind(), PatternKind::Anything);
        assert_eq!(range, 0..13);
        assert_eq!(
            first_match(&set, b"ERROR: bad \xff byte\r\n"),
            Some(PatternKind::Error)
        );
    }

    #[test]
    fn test_sudo_prompt_needs_no_terminator() {
        let set = PatternSet::compose(&[PatternFamily::Generic, PatternFamily::Auth]).unwrap();
        assert_eq!(
            first_match(&set, b"[sudo] password for alice: "),
            Some(PatternKind::SudoPrompt)
        );
    }

    #[test]
    fn test_package_fragment_names_and_versions() {
        let re = Regex::new(&format!("^{}$", *PACKAGE_FRAGMENT)).unwrap();
        let cases: &[(&str, &str, &str)] = &[
            ("busybox-1.36.1-r2", "busybox", "1.36.1-r2"),
            ("py3-pip-23.1.2-r0", "py3-pip", "23.1.2-r0"),
            ("openssl-1.1.1w-r1", "openssl", "1.1.1w-r1"),
            ("libstdc++-13.2.1_git20231014-r0", "libstdc++", "13.2.1_git20231014-r0"),
            ("font-noto-cjk-extra-20220127-r1", "font-noto-cjk-extra", "20220127-r1"),
            ("musl-1.2.4", "musl", "1.2.4"),
        ];
        for (token, name, version) in cases {
            let caps = re.captures(token.as_bytes()).unwrap();
            assert_eq!(&caps[1], name.as_bytes(), "name of {token}");
            assert_eq!(&caps[2], version.as_bytes(), "version of {token}");
        }
    }

    #[test]
    fn test_pattern_match_group_access() {
        let m = PatternMatch {
            index: 0,
            kind: PatternKind::Error,
            groups: vec![Some("boom".to_string()), None],
            text: "ERROR: boom\r\n".to_string(),
        };
        assert_eq!(m.group(1), Some("boom"));
        assert_eq!(m.group(2), None);
        assert_eq!(m.group(0), None);
        assert_eq!(m.line(), "ERROR: boom");
    }
}
