//! Reader for OpenSSH client config files (`~/.ssh/config`).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::file::ssh::{split_host_port, SshConfig, DEFAULT_SSH_PORT};

/// Longest ProxyJump chain followed before giving up.
const MAX_PROXY_DEPTH: usize = 8;

#[derive(Debug, Clone)]
struct HostBlock {
    patterns: Vec<String>,
    /// Lines before the first `Host` keyword apply to every host but do not
    /// make a host "known".
    implicit: bool,
    options: Vec<(String, String)>,
}

impl HostBlock {
    fn matches(&self, alias: &str) -> bool {
        let alias = alias.to_lowercase();
        let mut matched = false;
        for pattern in &self.patterns {
            let pattern = pattern.to_lowercase();
            if let Some(negated) = pattern.strip_prefix('!') {
                if wildcard_match(negated, &alias) {
                    return false;
                }
            } else if wildcard_match(&pattern, &alias) {
                matched = true;
            }
        }
        matched
    }
}

/// Options collected for one host, first value winning as in OpenSSH.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostParams {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub identity_files: Vec<PathBuf>,
    pub proxy_jump: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SshClientConfig {
    blocks: Vec<HostBlock>,
}

impl SshClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::SshConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content);
        tracing::debug!(
            "Loaded {} host blocks from SSH config {:?}",
            config.blocks.len(),
            path
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Self {
        let mut blocks = Vec::new();
        let mut current = HostBlock {
            patterns: vec!["*".to_string()],
            implicit: true,
            options: Vec::new(),
        };

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((keyword, value)) = split_keyword(line) else {
                continue;
            };

            match keyword.to_lowercase().as_str() {
                "host" => {
                    blocks.push(std::mem::replace(
                        &mut current,
                        HostBlock {
                            patterns: value.split_whitespace().map(unquote).collect(),
                            implicit: false,
                            options: Vec::new(),
                        },
                    ));
                }
                "match" => {
                    tracing::debug!("Skipping unsupported Match block: {}", value);
                    blocks.push(std::mem::replace(
                        &mut current,
                        HostBlock {
                            patterns: Vec::new(),
                            implicit: false,
                            options: Vec::new(),
                        },
                    ));
                }
                other => current
                    .options
                    .push((other.to_string(), unquote(value))),
            }
        }
        blocks.push(current);

        Self { blocks }
    }

    /// Collects options for `alias`. `None` when no `Host` block names it.
    pub fn lookup(&self, alias: &str) -> Option<HostParams> {
        let mut params = HostParams::default();
        let mut found = false;

        for block in self.blocks.iter().filter(|b| b.matches(alias)) {
            found |= !block.implicit;
            for (key, value) in &block.options {
                match key.as_str() {
                    "hostname" => {
                        if params.hostname.is_none() {
                            params.hostname = Some(expand_tokens(value, alias));
                        }
                    }
                    "port" => {
                        if params.port.is_none() {
                            match value.parse::<u16>() {
                                Ok(port) => params.port = Some(port),
                                Err(_) => tracing::warn!(
                                    "Ignoring invalid Port '{}' for host '{}'",
                                    value,
                                    alias
                                ),
                            }
                        }
                    }
                    "user" => {
                        if params.user.is_none() {
                            params.user = Some(value.clone());
                        }
                    }
                    "identityfile" => {
                        params
                            .identity_files
                            .push(expand_home(&expand_tokens(value, alias)));
                    }
                    "proxyjump" => {
                        if params.proxy_jump.is_none() {
                            params.proxy_jump = Some(value.clone());
                        }
                    }
                    _ => {}
                }
            }
        }

        found.then_some(params)
    }

    /// Builds connection parameters for `alias`, following ProxyJump.
    pub fn resolve(&self, alias: &str) -> Result<SshConfig> {
        self.resolve_host(alias, &mut Vec::new())
    }

    fn resolve_host(&self, alias: &str, visiting: &mut Vec<String>) -> Result<SshConfig> {
        if visiting.iter().any(|seen| seen == alias) || visiting.len() >= MAX_PROXY_DEPTH {
            return Err(Error::ProxyLoop(alias.to_string()));
        }
        let params = self
            .lookup(alias)
            .ok_or_else(|| Error::HostNotFound(alias.to_string()))?;

        visiting.push(alias.to_string());
        let mut config = SshConfig::new(params.hostname.unwrap_or_else(|| alias.to_string()))
            .with_port(params.port.unwrap_or(DEFAULT_SSH_PORT));
        config.username = params.user;
        if !params.identity_files.is_empty() {
            config.identity_files = Some(params.identity_files);
        }
        if let Some(chain) = params.proxy_jump {
            if !chain.eq_ignore_ascii_case("none") {
                config.proxy_jump = Some(Box::new(self.resolve_chain(&chain, visiting)?));
            }
        }
        visiting.pop();

        Ok(config)
    }

    /// `a,b` reaches `b` through `a`, so the last hop is returned with the
    /// earlier ones nested as its proxies.
    fn resolve_chain(&self, chain: &str, visiting: &mut Vec<String>) -> Result<SshConfig> {
        let mut previous: Option<SshConfig> = None;
        for hop in chain.split(',').map(str::trim).filter(|hop| !hop.is_empty()) {
            let mut current = self.resolve_hop(hop, visiting)?;
            if let Some(prev) = previous.take() {
                current.proxy_jump = Some(Box::new(prev));
            }
            previous = Some(current);
        }
        previous.ok_or_else(|| Error::ProxyLoop(chain.to_string()))
    }

    /// One hop: `[user@]host[:port]`, where `host` may be an alias defined in
    /// this file.
    fn resolve_hop(&self, hop: &str, visiting: &mut Vec<String>) -> Result<SshConfig> {
        let hop = hop.strip_prefix("ssh://").unwrap_or(hop);
        let (user, host_port) = match hop.rsplit_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, hop),
        };
        let (host, port) = split_host_port(host_port).ok_or_else(|| Error::InvalidUri {
            uri: hop.to_string(),
            reason: "ProxyJump port must be a number".to_string(),
        })?;

        let mut config = if self.lookup(host).is_some() {
            self.resolve_host(host, visiting)?
        } else {
            SshConfig::new(host)
        };
        if let Some(user) = user {
            config.username = Some(user.to_string());
        }
        if let Some(port) = port {
            config.port = port;
        }
        Ok(config)
    }
}

/// Splits `Keyword value` and `Keyword=value` lines.
fn split_keyword(line: &str) -> Option<(&str, &str)> {
    let end = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let keyword = &line[..end];
    let rest = line[end..].trim_start();
    let value = rest.strip_prefix('=').unwrap_or(rest).trim();
    if keyword.is_empty() || value.is_empty() {
        return None;
    }
    Some((keyword, value))
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

/// Expands `%h` (the requested host) and `%%`.
fn expand_tokens(value: &str, alias: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('h') => out.push_str(alias),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

fn expand_home(value: &str) -> PathBuf {
    match (value.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if value == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(value)),
        _ => PathBuf::from(value),
    }
}

/// Glob match supporting `*` and `?`.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}
