//! apk subcommands and their argument lists.

use std::fmt;
use std::str::FromStr;

use crate::channel::PatternFamily;
use crate::error::{DriverError, Result};

/// Output shape shared by several subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFamily {
    /// `add`, `del`, `upgrade`: progress steps, scripts, catch-all.
    Transaction,
    /// `update`: fetched indexes with timestamps and versions.
    Update,
    /// `search`, `info --verbose`: one package per line.
    Search,
    /// `info <pkg>`: detail sections.
    Info,
}

impl CommandFamily {
    /// Families to compose, in priority order.
    pub fn pattern_families(self, with_auth: bool) -> Vec<PatternFamily> {
        let mut families = vec![PatternFamily::Generic];
        if with_auth {
            families.push(PatternFamily::Auth);
        }
        families.push(match self {
            Self::Transaction => PatternFamily::Transaction,
            Self::Update => PatternFamily::Update,
            Self::Search => PatternFamily::Search,
            Self::Info => PatternFamily::Info,
        });
        families
    }
}

/// Supported apk subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Add,
    Del,
    Upgrade,
    Update,
    Search,
    Installed,
    Info,
}

impl CommandKind {
    /// The apk subcommand word.
    pub fn subcommand(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Del => "del",
            Self::Upgrade => "upgrade",
            Self::Update => "update",
            Self::Search => "search",
            Self::Installed | Self::Info => "info",
        }
    }

    /// Output family of this subcommand.
    pub fn family(self) -> CommandFamily {
        match self {
            Self::Add | Self::Del | Self::Upgrade => CommandFamily::Transaction,
            Self::Update => CommandFamily::Update,
            Self::Search | Self::Installed => CommandFamily::Search,
            Self::Info => CommandFamily::Info,
        }
    }

    /// Whether apk needs root for this subcommand.
    pub fn requires_privilege(self) -> bool {
        matches!(self, Self::Add | Self::Del | Self::Upgrade | Self::Update)
    }
}

impl FromStr for CommandKind {
    type Err = DriverError;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "add" | "install" => Ok(Self::Add),
            "del" | "remove" => Ok(Self::Del),
            "upgrade" => Ok(Self::Upgrade),
            "update" | "refresh" => Ok(Self::Update),
            "search" => Ok(Self::Search),
            "installed" | "query" => Ok(Self::Installed),
            "info" => Ok(Self::Info),
            _ => Err(DriverError::UnknownCommand {
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subcommand())
    }
}

/// A fully assembled apk invocation.
///
/// # Example
///
/// ```rust
/// use apkdriver::ApkCommand;
///
/// let cmd = ApkCommand::remove(["nginx"], true).unwrap();
/// assert_eq!(cmd.args(), vec!["del", "-r", "nginx"]);
/// assert!(cmd.is_privileged());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApkCommand {
    kind: CommandKind,
    flags: Vec<String>,
    operands: Vec<String>,
    privileged: bool,
}

impl ApkCommand {
    /// Build a command from a kind name and pre-assembled arguments.
    ///
    /// Fails with [`DriverError::UnknownCommand`] for an unrecognized kind.
    pub fn new<I, S>(kind: &str, args: I, privileged: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kind: CommandKind = kind.parse()?;
        Ok(Self {
            kind,
            flags: Vec::new(),
            operands: args.into_iter().map(Into::into).collect(),
            privileged,
        })
    }

    fn of(kind: CommandKind) -> Self {
        Self {
            kind,
            flags: Vec::new(),
            operands: Vec::new(),
            privileged: kind.requires_privilege(),
        }
    }

    fn with_packages<I, S>(kind: CommandKind, packages: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = Self::of(kind);
        cmd.operands = packages.into_iter().map(Into::into).collect();
        if cmd.operands.is_empty() {
            return Err(DriverError::MissingPackages {
                command: kind.subcommand().to_string(),
            }
            .into());
        }
        Ok(cmd)
    }

    /// `apk add <packages...>`
    pub fn add<I, S>(packages: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_packages(CommandKind::Add, packages)
    }

    /// `apk del [-r] <packages...>`; `cascade` also removes dependents.
    pub fn remove<I, S>(packages: I, cascade: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cmd = Self::with_packages(CommandKind::Del, packages)?;
        Ok(if cascade { cmd.with_flag("-r") } else { cmd })
    }

    /// `apk upgrade --no-progress`
    pub fn upgrade() -> Self {
        Self::of(CommandKind::Upgrade).with_flag("--no-progress")
    }

    /// `apk update`
    pub fn update() -> Self {
        Self::of(CommandKind::Update)
    }

    /// `apk search [--verbose] [terms...]`; the query is split on whitespace.
    pub fn search(query: Option<&str>, verbose: bool) -> Self {
        let mut cmd = Self::of(CommandKind::Search);
        if verbose {
            cmd = cmd.with_flag("--verbose");
        }
        if let Some(query) = query {
            cmd.operands = query.split_whitespace().map(str::to_string).collect();
        }
        cmd
    }

    /// `apk info --verbose`: every installed package with its version.
    pub fn installed() -> Self {
        Self::of(CommandKind::Installed).with_flag("--verbose")
    }

    /// `apk info <package>`: description, webpage and installed size.
    pub fn info(package: impl Into<String>) -> Self {
        let mut cmd = Self::of(CommandKind::Info);
        cmd.operands.push(package.into());
        cmd
    }

    /// Add a flag right after the subcommand.
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    /// Override whether the command runs through the escalation program.
    pub fn with_privilege(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// The subcommand kind.
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Output family of the subcommand.
    pub fn family(&self) -> CommandFamily {
        self.kind.family()
    }

    /// Whether this command needs elevated privilege.
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Arguments passed to apk, starting with the subcommand.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(1 + self.flags.len() + self.operands.len());
        args.push(self.kind.subcommand().to_string());
        args.extend(self.flags.iter().cloned());
        args.extend(self.operands.iter().cloned());
        args
    }
}

impl fmt::Display for ApkCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "apk {}", self.args().join(" "))
    }
}
