//! Machine-credential file (`~/.netrc`) support.
//!
//! The file is treated as process-wide state with an explicit lifecycle: [`Netrc::load`]
//! reads it once, edits happen in memory, and [`Netrc::commit`] rewrites it atomically
//! with owner-only permissions.

use crate::config::hosts;
use crate::error::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Credentials stored for one machine
#[derive(Clone, PartialEq, Eq)]
pub struct NetrcEntry {
    /// Login name
    pub login: String,
    /// Optional account name
    pub account: Option<String>,
    /// Password
    pub password: String,
}

impl NetrcEntry {
    /// Create an entry without an account
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            account: None,
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for NetrcEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetrcEntry")
            .field("login", &self.login)
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// In-memory view of a credential file
#[derive(Clone, Debug, Default)]
pub struct Netrc {
    path: PathBuf,
    machines: Vec<(String, NetrcEntry)>,
    default: Option<NetrcEntry>,
}

enum Target {
    Machine(String),
    Default,
}

#[derive(Default)]
struct PendingEntry {
    login: Option<String>,
    account: Option<String>,
    password: Option<String>,
}

impl PendingEntry {
    fn finish(self) -> NetrcEntry {
        NetrcEntry {
            login: self.login.unwrap_or_default(),
            account: self.account,
            password: self.password.unwrap_or_default(),
        }
    }
}

impl Netrc {
    /// Conventional location: `~/.netrc`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".netrc"))
    }

    /// Load the credential file at its conventional location
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path().ok_or_else(|| Error::Config {
            message: "cannot determine home directory for credential file".to_string(),
            key: Some("auth.netrc_path".to_string()),
        })?;
        Self::load(path)
    }

    /// Load a credential file; a missing file is an empty store
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::parse(path, &contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "credential file not found, starting empty");
                Ok(Self {
                    path,
                    ..Self::default()
                })
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Parse credential file contents
    ///
    /// Understands `machine`, `default`, `login`, `password`, `account` and skips
    /// `macdef` bodies (up to the next blank line) and `#` comment lines.
    pub fn parse(path: impl Into<PathBuf>, contents: &str) -> Result<Self> {
        let path = path.into();
        let mut netrc = Self {
            path,
            ..Self::default()
        };
        let file = netrc.path.clone();
        let mut current: Option<(Target, PendingEntry)> = None;
        let mut in_macdef = false;

        for (line_no, line) in contents.lines().enumerate() {
            if in_macdef {
                if line.trim().is_empty() {
                    in_macdef = false;
                }
                continue;
            }
            if line.trim_start().starts_with('#') {
                continue;
            }

            let mut tokens = line.split_whitespace();
            while let Some(token) = tokens.next() {
                let mut value = |name: &str| {
                    tokens.next().map(str::to_string).ok_or_else(|| Error::Credentials {
                        path: file.clone(),
                        message: format!("line {}: missing value after '{}'", line_no + 1, name),
                    })
                };
                match token {
                    "machine" => {
                        let host = value(token)?;
                        netrc.flush(current.take());
                        current = Some((Target::Machine(host), PendingEntry::default()));
                    }
                    "default" => {
                        netrc.flush(current.take());
                        current = Some((Target::Default, PendingEntry::default()));
                    }
                    "login" | "user" => {
                        let login = value(token)?;
                        netrc.pending(&mut current, line_no, token)?.login = Some(login);
                    }
                    "password" => {
                        let password = value(token)?;
                        netrc.pending(&mut current, line_no, token)?.password = Some(password);
                    }
                    "account" => {
                        let account = value(token)?;
                        netrc.pending(&mut current, line_no, token)?.account = Some(account);
                    }
                    "macdef" => {
                        netrc.flush(current.take());
                        in_macdef = true;
                        break;
                    }
                    other => {
                        return Err(Error::Credentials {
                            path: file.clone(),
                            message: format!("line {}: unexpected token '{}'", line_no + 1, other),
                        });
                    }
                }
            }
        }
        netrc.flush(current);
        Ok(netrc)
    }

    fn pending<'a>(
        &self,
        current: &'a mut Option<(Target, PendingEntry)>,
        line_no: usize,
        token: &str,
    ) -> Result<&'a mut PendingEntry> {
        current
            .as_mut()
            .map(|(_, entry)| entry)
            .ok_or_else(|| Error::Credentials {
                path: self.path.clone(),
                message: format!(
                    "line {}: '{}' outside of a machine or default block",
                    line_no + 1,
                    token
                ),
            })
    }

    fn flush(&mut self, current: Option<(Target, PendingEntry)>) {
        match current {
            Some((Target::Machine(host), entry)) => self.insert(host, entry.finish()),
            Some((Target::Default, entry)) => self.default = Some(entry.finish()),
            None => {}
        }
    }

    /// Path this store is read from and committed to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Credentials for `host`, falling back to the `default` entry
    pub fn authenticators(&self, host: &str) -> Option<&NetrcEntry> {
        self.machine(host).or(self.default.as_ref())
    }

    /// Credentials stored explicitly for `host`
    pub fn machine(&self, host: &str) -> Option<&NetrcEntry> {
        self.machines
            .iter()
            .find(|(h, _)| h == host)
            .map(|(_, entry)| entry)
    }

    /// Hosts with explicit entries, in file order
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.machines.iter().map(|(h, _)| h.as_str())
    }

    /// Add or replace the entry for `host`
    pub fn insert(&mut self, host: impl Into<String>, entry: NetrcEntry) {
        let host = host.into();
        match self.machines.iter_mut().find(|(h, _)| *h == host) {
            Some((_, existing)) => *existing = entry,
            None => self.machines.push((host, entry)),
        }
    }

    /// Remove the entry for `host`
    pub fn remove(&mut self, host: &str) -> Option<NetrcEntry> {
        let index = self.machines.iter().position(|(h, _)| h == host)?;
        Some(self.machines.remove(index).1)
    }

    /// Whether the store holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.machines.is_empty() && self.default.is_none()
    }

    /// Render the store in credential file syntax
    pub fn render(&self) -> String {
        let mut out = String::new();
        let blocks = self
            .machines
            .iter()
            .map(|(host, entry)| (format!("machine {host}"), entry))
            .chain(self.default.iter().map(|e| ("default".to_string(), e)));
        for (header, entry) in blocks {
            out.push_str(&header);
            out.push('\n');
            out.push_str(&format!("login {}\n", entry.login));
            if let Some(account) = &entry.account {
                out.push_str(&format!("account {account}\n"));
            }
            out.push_str(&format!("password {}\n", entry.password));
        }
        out
    }

    /// Write the store back to disk
    ///
    /// The file is replaced atomically through a temporary sibling and is readable and
    /// writable by the owner only. An empty store removes the file.
    pub fn commit(&self) -> Result<()> {
        if self.is_empty() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => info!(path = %self.path.display(), "removed empty credential file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Io(e)),
            }
            return Ok(());
        }

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Config {
                message: format!("invalid credential file path {}", self.path.display()),
                key: Some("auth.netrc_path".to_string()),
            })?;
        let tmp_path = self.path.with_file_name(format!("{file_name}.tmp"));

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp_path)?;
        file.write_all(self.render().as_bytes())?;
        file.sync_all()?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), entries = self.machines.len(), "credential file written");
        Ok(())
    }
}

/// Store Earthdata credentials in the credential file
///
/// With `update` false an existing Earthdata entry is left untouched. Returns whether
/// the file was written.
pub fn add_earthdata_netrc(
    path: Option<&Path>,
    username: &str,
    password: &str,
    update: bool,
) -> Result<bool> {
    let mut netrc = match path {
        Some(p) => Netrc::load(p)?,
        None => Netrc::load_default()?,
    };
    if netrc.machine(hosts::URS).is_some() && !update {
        return Ok(false);
    }
    netrc.insert(hosts::URS, NetrcEntry::new(username, password));
    netrc.commit()?;
    Ok(true)
}

/// Remove Earthdata credentials from the credential file
///
/// The file is deleted when no entries remain. Returns whether an entry was removed.
pub fn remove_earthdata_netrc(path: Option<&Path>) -> Result<bool> {
    let mut netrc = match path {
        Some(p) => Netrc::load(p)?,
        None => Netrc::load_default()?,
    };
    if !netrc.path().exists() {
        return Ok(false);
    }
    let removed = netrc.remove(hosts::URS).is_some();
    netrc.commit()?;
    Ok(removed)
}
