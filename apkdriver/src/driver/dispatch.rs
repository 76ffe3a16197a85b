//! Turns pattern matches into events.

use log::trace;

use super::command::CommandFamily;
use super::event::{DetailField, Event};
use crate::channel::{PatternKind, PatternMatch};

/// Converts matches of one command family into [`Event`]s.
///
/// Dispatch looks at the tag of the matching entry only, so it does not
/// depend on where a family sits in the composed pattern set.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    family: CommandFamily,
}

impl Dispatcher {
    pub fn new(family: CommandFamily) -> Self {
        Self { family }
    }

    pub fn family(&self) -> CommandFamily {
        self.family
    }

    /// Build the event for a match.
    ///
    /// Lines this family does not know, and captures that fail to parse,
    /// become OTHER carrying the matched line.
    pub fn dispatch(&self, m: &PatternMatch) -> Event {
        let event = match m.kind {
            PatternKind::Error => Some(Event::error(capture(m, 1))),
            PatternKind::Ok => Some(Event::ok(capture(m, 1))),
            _ => match self.family {
                CommandFamily::Transaction => transaction(m),
                CommandFamily::Update => update(m),
                CommandFamily::Search => search(m),
                CommandFamily::Info => info(m),
            },
        };
        let event = event.unwrap_or_else(|| Event::other(m.line()));
        trace!("{} -> {}", m.kind, event.kind());
        event
    }
}

fn capture(m: &PatternMatch, n: usize) -> String {
    m.group(n).unwrap_or_default().to_string()
}

fn transaction(m: &PatternMatch) -> Option<Event> {
    match m.kind {
        PatternKind::Progress => {
            let step = m.group(1)?.parse().ok()?;
            let total = m.group(2)?.parse().ok()?;
            Some(Event::progress(step, total, capture(m, 3)))
        }
        PatternKind::Exec => {
            let package = capture(m, 1);
            let version = capture(m, 2);
            let script = capture(m, 3);
            let description = format!("Executing {package}-{version}.{script}");
            Some(Event::Exec {
                package,
                version,
                script,
                description,
            })
        }
        PatternKind::Fetch => {
            let repo = capture(m, 1);
            let description = format!("Fetching repository {repo}");
            Some(Event::FetchRepository { repo, description })
        }
        PatternKind::Getty => {
            let port = capture(m, 1);
            let baud_rate: u32 = m.group(2)?.parse().ok()?;
            let description = format!("Configuring getty on port {port} with baud rate {baud_rate}");
            Some(Event::Getty {
                port,
                baud_rate,
                description,
            })
        }
        PatternKind::Anything => Some(Event::other(capture(m, 1))),
        _ => None,
    }
}

fn update(m: &PatternMatch) -> Option<Event> {
    match m.kind {
        PatternKind::Fetch => {
            let url = capture(m, 1);
            let description = format!("Fetched URL {url}");
            Some(Event::Fetch { url, description })
        }
        PatternKind::UpdateTime => Some(Event::UpdateTime {
            time: capture(m, 1),
            url: capture(m, 2),
        }),
        PatternKind::UpdateVersion => {
            let version = capture(m, 1);
            let url = capture(m, 2);
            let description = format!("Got updated repo version {version} from {url}");
            Some(Event::UpdateVersion {
                version,
                url,
                description,
            })
        }
        _ => None,
    }
}

fn search(m: &PatternMatch) -> Option<Event> {
    match m.kind {
        PatternKind::PackageVerbose | PatternKind::Package => Some(Event::Result {
            package: capture(m, 1),
            version: capture(m, 2),
            description: m.group(3).map(str::to_string),
        }),
        _ => None,
    }
}

fn info(m: &PatternMatch) -> Option<Event> {
    match m.kind {
        PatternKind::Detail => Some(Event::Detail {
            package: capture(m, 1),
            version: capture(m, 2),
            field: DetailField::from_header(m.group(3)?)?,
            value: capture(m, 4),
        }),
        PatternKind::Blank => Some(Event::newline()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{MatchBuffer, PatternSet};

    /// Run text through the real pattern set of `family` and dispatch every
    /// match.
    fn events(family: CommandFamily, text: &str) -> Vec<Event> {
        let set = PatternSet::compose(&family.pattern_families(false)).unwrap();
        let dispatcher = Dispatcher::new(family);
        let mut buffer = MatchBuffer::new(true);
        buffer.extend(text.as_bytes());
        std::iter::from_fn(|| buffer.consume_match(&set))
            .map(|m| dispatcher.dispatch(&m))
            .collect()
    }

    #[test]
    fn test_progress_line() {
        let got = events(CommandFamily::Transaction, "(3/10) installing foo\r\n");
        assert_eq!(got, vec![Event::progress(3, 10, "installing foo")]);
        match &got[0] {
            Event::Progress { percent, .. } => assert_eq!(*percent, 30.0),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_transaction_lines() {
        let got = events(
            CommandFamily::Transaction,
            "fetch https://dl-cdn.alpinelinux.org/alpine/v3.19/main/x86_64/APKINDEX.tar.gz\r\n\
             Executing busybox-1.36.1-r15.trigger\r\n\
             Configuring a getty on port ttyS0 with baud rate 115200\r\n\
             Purging foo\r\n\
             OK: 9 MiB in 25 packages\r\n",
        );
        assert_eq!(got.len(), 5);
        assert_eq!(
            got[0],
            Event::FetchRepository {
                repo: "https://dl-cdn.alpinelinux.org/alpine/v3.19/main/x86_64/APKINDEX.tar.gz"
                    .into(),
                description: "Fetching repository https://dl-cdn.alpinelinux.org/alpine/v3.19/main/x86_64/APKINDEX.tar.gz".into(),
            }
        );
        assert_eq!(
            got[1],
            Event::Exec {
                package: "busybox".into(),
                version: "1.36.1-r15".into(),
                script: "trigger".into(),
                description: "Executing busybox-1.36.1-r15.trigger".into(),
            }
        );
        match &got[2] {
            Event::Getty {
                port, baud_rate, ..
            } => {
                assert_eq!(port, "ttyS0");
                assert_eq!(*baud_rate, 115200);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(got[3], Event::other("Purging foo"));
        assert_eq!(got[4], Event::ok("9 MiB in 25 packages"));
    }

    #[test]
    fn test_error_line() {
        let got = events(
            CommandFamily::Transaction,
            "ERROR: unable to select packages:\r\n",
        );
        assert_eq!(got, vec![Event::error("unable to select packages:")]);
    }

    #[test]
    fn test_unparsable_progress_becomes_other() {
        let got = events(
            CommandFamily::Transaction,
            "(99999999999/1) overflowing\r\n",
        );
        assert_eq!(got, vec![Event::other("(99999999999/1) overflowing")]);
    }

    #[test]
    fn test_update_lines() {
        let got = events(
            CommandFamily::Update,
            "fetch https://example.org/main/x86_64/APKINDEX.tar.gz\r\n\
             v3.19.1-100-g0123456789a [https://example.org/main]\r\n\
             2024-02-01 10:20:30 [https://example.org/edge]\r\n\
             OK: 23000 distinct packages available\r\n",
        );
        assert_eq!(
            got,
            vec![
                Event::Fetch {
                    url: "https://example.org/main/x86_64/APKINDEX.tar.gz".into(),
                    description: "Fetched URL https://example.org/main/x86_64/APKINDEX.tar.gz"
                        .into(),
                },
                Event::UpdateVersion {
                    version: "v3.19.1-100-g0123456789a".into(),
                    url: "https://example.org/main".into(),
                    description:
                        "Got updated repo version v3.19.1-100-g0123456789a from https://example.org/main"
                            .into(),
                },
                Event::UpdateTime {
                    time: "2024-02-01 10:20:30".into(),
                    url: "https://example.org/edge".into(),
                },
                Event::ok("23000 distinct packages available"),
            ]
        );
    }

    #[test]
    fn test_search_results() {
        let got = events(
            CommandFamily::Search,
            "py3-requests-2.31.0-r1 - HTTP library for Python\r\nmusl-1.2.4_git20230717-r4\r\n",
        );
        assert_eq!(
            got,
            vec![
                Event::Result {
                    package: "py3-requests".into(),
                    version: "2.31.0-r1".into(),
                    description: Some("HTTP library for Python".into()),
                },
                Event::Result {
                    package: "musl".into(),
                    version: "1.2.4_git20230717-r4".into(),
                    description: None,
                },
            ]
        );
    }

    #[test]
    fn test_info_details() {
        let got = events(
            CommandFamily::Info,
            "curl-8.5.0-r0 description:\r\nURL retrieval utility and library\r\n\r\n\
             curl-8.5.0-r0 installed size:\r\n252 KiB\r\n\r\n",
        );
        assert_eq!(
            got,
            vec![
                Event::Detail {
                    package: "curl".into(),
                    version: "8.5.0-r0".into(),
                    field: DetailField::Description,
                    value: "URL retrieval utility and library".into(),
                },
                Event::newline(),
                Event::Detail {
                    package: "curl".into(),
                    version: "8.5.0-r0".into(),
                    field: DetailField::InstalledSize,
                    value: "252 KiB".into(),
                },
                Event::newline(),
            ]
        );
    }

    #[test]
    fn test_auth_kind_outside_auth_family_is_other() {
        let dispatcher = Dispatcher::new(CommandFamily::Search);
        let m = PatternMatch {
            index: 3,
            kind: PatternKind::SudoRetry,
            groups: vec![],
            text: "Sorry, try again.\r\n".into(),
        };
        assert_eq!(dispatcher.dispatch(&m), Event::other("Sorry, try again."));
    }
}
