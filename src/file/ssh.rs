use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::file::base::{is_ssh_scheme, FileConfig, FileReader};
use crate::settings::Settings;
use crate::ssh_config::SshClientConfig;
use crate::ssh_service::{SshTransport, SystemSsh};
use crate::uri::split_scheme;

pub const DEFAULT_SSH_PORT: u16 = 22;

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Connection parameters for one SSH host, optionally reached through a
/// chain of jump hosts.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    pub hostname: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Private keys offered to the server. Accepts a single path or a list.
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub identity_files: Option<Vec<PathBuf>>,

    /// Host this one is reached through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_jump: Option<Box<SshConfig>>,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<PathBuf>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(PathBuf),
        Many(Vec<PathBuf>),
    }

    Ok(
        Option::<OneOrMany>::deserialize(deserializer)?.map(|value| match value {
            OneOrMany::One(path) => vec![path],
            OneOrMany::Many(paths) => paths,
        }),
    )
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("identity_files", &self.identity_files)
            .field("proxy_jump", &self.proxy_jump)
            .finish()
    }
}

impl SshConfig {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: DEFAULT_SSH_PORT,
            username: None,
            password: None,
            identity_files: None,
            proxy_jump: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_files
            .get_or_insert_with(Vec::new)
            .push(path.into());
        self
    }

    pub fn with_identity_files(mut self, paths: Vec<PathBuf>) -> Self {
        self.identity_files = Some(paths);
        self
    }

    pub fn with_proxy_jump(mut self, proxy: SshConfig) -> Self {
        self.proxy_jump = Some(Box::new(proxy));
        self
    }

    /// Parses `ssh://[user[:password]@]host[:port]/path` (or `scp://`) into
    /// connection parameters and the remote path.
    pub fn from_uri(uri: &str) -> Result<(Self, PathBuf)> {
        let scheme_error = || Error::invalid_uri(uri, "URI scheme must be 'ssh' or 'scp'");
        let (scheme, rest) = split_scheme(uri).ok_or_else(scheme_error)?;
        if !is_ssh_scheme(scheme) {
            return Err(scheme_error());
        }

        let (authority, path) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, ""),
        };

        let (userinfo, host_port) = match authority.rfind('@') {
            Some(index) => (Some(&authority[..index]), &authority[index + 1..]),
            None => (None, authority),
        };

        let (hostname, port) = split_host_port(host_port).ok_or_else(|| {
            Error::invalid_uri(uri, "URI port must be a number between 0 and 65535")
        })?;
        if hostname.is_empty() {
            return Err(Error::invalid_uri(uri, "URI must contain a hostname"));
        }
        if path.is_empty() {
            return Err(Error::invalid_uri(uri, "URI must contain a path"));
        }

        let mut config = SshConfig::new(hostname).with_port(port.unwrap_or(DEFAULT_SSH_PORT));
        if let Some(info) = userinfo {
            let (user, password) = match info.split_once(':') {
                Some((user, password)) => (user, Some(password)),
                None => (info, None),
            };
            if !user.is_empty() {
                config.username = Some(user.to_string());
            }
            config.password = password.map(str::to_string);
        }

        Ok((config, PathBuf::from(path)))
    }

    /// Looks `host` up in an OpenSSH client config file, `~/.ssh/config`
    /// (or the configured path) when `config_path` is `None`.
    pub fn from_ssh_config(host: &str, config_path: Option<&Path>) -> Result<Self> {
        let path = match config_path {
            Some(path) => path.to_path_buf(),
            None => Settings::global().ssh_config.clone(),
        };
        SshClientConfig::load(&path)?.resolve(host)
    }
}

/// Splits `host[:port]`, with IPv6 literals in brackets. `None` on a bad port.
pub(crate) fn split_host_port(host_port: &str) -> Option<(&str, Option<u16>)> {
    let (host, port) = if let Some(bracketed) = host_port.strip_prefix('[') {
        let (host, after) = bracketed.split_once(']')?;
        match after {
            "" => (host, None),
            _ => (host, Some(after.strip_prefix(':')?)),
        }
    } else {
        match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        }
    };

    match port {
        None | Some("") => Some((host, None)),
        Some(port) => port.parse::<u16>().ok().map(|port| (host, Some(port))),
    }
}

/// A file on a remote host, read over SSH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSshFileConfig {
    pub ssh: SshConfig,
    pub remote_path: PathBuf,
}

impl RemoteSshFileConfig {
    pub fn new(ssh: SshConfig, remote_path: impl Into<PathBuf>) -> Self {
        Self {
            ssh,
            remote_path: remote_path.into(),
        }
    }

    pub fn from_uri(uri: &str) -> Result<Self> {
        let (ssh, remote_path) = SshConfig::from_uri(uri)?;
        Ok(Self::new(ssh, remote_path))
    }

    pub fn from_ssh_config(
        host: &str,
        remote_path: impl Into<PathBuf>,
        config_path: Option<&Path>,
    ) -> Result<Self> {
        let ssh = SshConfig::from_ssh_config(host, config_path)?;
        Ok(Self::new(ssh, remote_path))
    }

    /// Direct connection to `hostname`; `configure` adjusts the remaining
    /// parameters through the [`SshConfig`] builder methods.
    pub fn from_direct_connection(
        hostname: &str,
        remote_path: impl Into<PathBuf>,
        configure: impl FnOnce(SshConfig) -> SshConfig,
    ) -> Self {
        Self::new(configure(SshConfig::new(hostname)), remote_path)
    }

    /// Copies the remote file into a kept temporary file and returns its
    /// path. The file keeps the remote extension.
    pub fn resolve_with(&self, transport: &dyn SshTransport) -> Result<PathBuf> {
        let mut reader = transport.open(&self.ssh, &self.remote_path)?;

        let suffix = self
            .remote_path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let mut local = tempfile::Builder::new()
            .prefix("filecfg-ssh-")
            .suffix(&suffix)
            .tempfile()?;

        let size = io::copy(&mut reader, &mut local)?;
        local.flush()?;
        let (_, path) = local.keep()?;

        tracing::info!(
            "Fetched {}:{} ({} bytes) into {:?}",
            self.ssh.hostname,
            self.remote_path.display(),
            size,
            path
        );
        Ok(path)
    }

    pub fn open_with(&self, transport: &dyn SshTransport) -> Result<FileReader> {
        transport.open(&self.ssh, &self.remote_path)
    }
}

impl FileConfig for RemoteSshFileConfig {
    fn resolve(&self) -> Result<PathBuf> {
        self.resolve_with(&SystemSsh::default())
    }

    fn open(&self) -> Result<FileReader> {
        self.open_with(&SystemSsh::default())
    }
}
