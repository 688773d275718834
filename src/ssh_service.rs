use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use crate::error::{Error, Result};
use crate::file::base::FileReader;
use crate::file::ssh::SshConfig;
use crate::settings::Settings;

/// Opens files on remote hosts.
pub trait SshTransport {
    fn open(&self, ssh: &SshConfig, remote_path: &Path) -> Result<FileReader>;
}

/// Transport backed by the OpenSSH `ssh` executable.
#[derive(Debug, Clone)]
pub struct SystemSsh {
    program: String,
    sshpass_program: String,
    connect_timeout_secs: u64,
}

impl Default for SystemSsh {
    fn default() -> Self {
        Self::from_settings(Settings::global())
    }
}

impl SystemSsh {
    pub fn new(program: impl Into<String>) -> Self {
        let settings = Settings::global();
        Self {
            program: program.into(),
            sshpass_program: settings.sshpass_program.clone(),
            connect_timeout_secs: settings.connect_timeout_secs,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            program: settings.ssh_program.clone(),
            sshpass_program: settings.sshpass_program.clone(),
            connect_timeout_secs: settings.connect_timeout_secs,
        }
    }

    pub fn with_sshpass_program(mut self, program: impl Into<String>) -> Self {
        self.sshpass_program = program.into();
        self
    }

    /// Command running `remote_command` on the host described by `ssh`.
    pub fn command(&self, ssh: &SshConfig, remote_command: &str) -> Result<Command> {
        let args = self.ssh_args(ssh)?;

        let mut cmd = match &ssh.password {
            Some(password) => {
                let mut cmd = Command::new(&self.sshpass_program);
                cmd.arg("-e").arg(&self.program).env("SSHPASS", password);
                cmd
            }
            None => Command::new(&self.program),
        };
        cmd.args(args).arg(remote_command);
        Ok(cmd)
    }

    /// Options and destination for `ssh`, without the remote command.
    fn ssh_args(&self, ssh: &SshConfig) -> Result<Vec<String>> {
        let mut args = Vec::new();

        // Without a password there is nobody to answer prompts
        if ssh.password.is_none() {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }
        args.push("-o".to_string());
        args.push(format!("ConnectTimeout={}", self.connect_timeout_secs));
        args.push("-o".to_string());
        args.push("LogLevel=ERROR".to_string());

        args.push("-p".to_string());
        args.push(ssh.port.to_string());

        for identity in ssh.identity_files.iter().flatten() {
            args.push("-i".to_string());
            args.push(identity.to_string_lossy().into_owned());
        }

        if let Some(user) = &ssh.username {
            args.push("-l".to_string());
            args.push(user.clone());
        }

        if let Some(proxy) = &ssh.proxy_jump {
            args.push("-o".to_string());
            args.push(format!("ProxyCommand={}", self.proxy_command(proxy)?));
        }

        args.push("--".to_string());
        args.push(ssh.hostname.clone());
        Ok(args)
    }

    /// `ssh ... -W %h:%p` through `proxy`. Tokens of nested proxy commands
    /// are escaped so only the outermost `%h:%p` is expanded by this hop.
    fn proxy_command(&self, proxy: &SshConfig) -> Result<String> {
        if proxy.password.is_some() {
            return Err(Error::ProxyPassword(proxy.hostname.clone()));
        }

        let mut words = vec![shell_quote(&self.program)];
        words.extend(
            self.ssh_args(proxy)?
                .iter()
                .map(|arg| shell_quote(&arg.replace('%', "%%"))),
        );
        words.push("-W".to_string());
        words.push("%h:%p".to_string());
        Ok(words.join(" "))
    }

    fn spawn_error(&self, e: io::Error, program: &str) -> Error {
        if e.kind() == io::ErrorKind::NotFound {
            let hint = if program == self.sshpass_program {
                "password authentication needs sshpass installed"
            } else {
                "install an OpenSSH client or set ssh_program in the settings file"
            };
            Error::MissingExecutable {
                program: program.to_string(),
                hint,
            }
        } else {
            Error::Io(e)
        }
    }
}

impl SshTransport for SystemSsh {
    fn open(&self, ssh: &SshConfig, remote_path: &Path) -> Result<FileReader> {
        let remote_command = format!("cat -- {}", shell_quote(&remote_path.to_string_lossy()));
        let mut cmd = self.command(ssh, &remote_command)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::info!(
            "Opening {}:{} over ssh (port {})",
            ssh.hostname,
            remote_path.display(),
            ssh.port
        );

        let program = if ssh.password.is_some() {
            &self.sshpass_program
        } else {
            &self.program
        };
        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e, program))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("ssh stdout was not captured"))?;
        let stderr = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
        });

        Ok(Box::new(RemoteReader {
            child,
            stdout,
            stderr,
            host: ssh.hostname.clone(),
            finished: false,
        }))
    }
}

/// Streams a remote command's stdout and turns a failed exit into an error
/// at end of stream.
struct RemoteReader {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    host: String,
    finished: bool,
}

impl RemoteReader {
    fn finish(&mut self) -> io::Result<()> {
        self.finished = true;
        let status = self.child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            return Ok(());
        }

        tracing::error!(
            "Remote command on {} finished with {}: {}",
            self.host,
            status,
            stderr.trim()
        );
        let kind = if stderr.contains("No such file or directory") {
            io::ErrorKind::NotFound
        } else {
            io::ErrorKind::Other
        };
        Err(io::Error::new(
            kind,
            format!(
                "remote command on {} failed ({}): {}",
                self.host,
                status,
                stderr.trim()
            ),
        ))
    }
}

impl Read for RemoteReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.stdout.read(buf)?;
        if n == 0 && !buf.is_empty() && !self.finished {
            self.finish()?;
        }
        Ok(n)
    }
}

impl Drop for RemoteReader {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Single-quotes `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}
