//! Pushing a finished archive to a remote host with rsync.
//!
//! The transfer runs as a child process built from an argument vector, never
//! through a shell. When a password is configured the command is wrapped in
//! `sshpass -e` and the password travels in the child's `SSHPASS` variable.
//!
//! On unix the child leads its own process group, so a timeout kills rsync
//! together with the `sshpass` wrapper that started it.

use crate::config::RemoteConfig;
use crate::{Error, Result};
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, span, warn, Instrument, Level};

const RSYNC: &str = "rsync";
const SSHPASS: &str = "sshpass";
const PASSWORD_ENV: &str = "SSHPASS";

/// Resolved `[user@]host:path` destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    destination: String,
}

impl RemoteTarget {
    /// Build the destination string.
    ///
    /// A server that already names a user (`bob@host`) is used as is and the
    /// separate user field is ignored.
    pub fn new(server: &str, user: &str, path: &str) -> Self {
        let destination = if server.contains('@') {
            format!("{}:{}", server, path)
        } else {
            format!("{}@{}:{}", user, server, path)
        };
        Self { destination }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(&config.server, &config.user, &config.path)
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.destination)
    }
}

/// Result of a push. Failures are reported, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RemoteOutcome {
    Synced { destination: String },
    Failed { destination: String, reason: String },
}

impl RemoteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RemoteOutcome::Synced { .. })
    }
}

/// A fully built child-process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    /// Environment for the child only; values are never logged
    pub env: Vec<(OsString, OsString)>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs rsync against a [`RemoteTarget`]
#[derive(Debug, Clone)]
pub struct RemoteSync {
    options: Vec<String>,
    password: Option<String>,
    timeout: Option<Duration>,
    rsync: OsString,
    sshpass: OsString,
}

impl RemoteSync {
    pub fn new(options: Vec<String>, password: Option<String>) -> Self {
        Self {
            options,
            password: password.filter(|p| !p.is_empty()),
            timeout: None,
            rsync: RSYNC.into(),
            sshpass: SSHPASS.into(),
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(config.rsync_options.clone(), Some(config.password.clone()))
            .with_timeout(config.timeout)
    }

    /// Kill the transfer after `timeout`; `None` waits indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a different transfer program in place of `rsync`
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.rsync = program.into();
        self
    }

    /// Build the command line for pushing `archive` to `target`
    pub fn invocation(&self, archive: &Path, target: &RemoteTarget) -> Invocation {
        let mut args: Vec<OsString> = Vec::new();
        let mut env = Vec::new();

        let program = match &self.password {
            Some(password) => {
                args.push("-e".into());
                args.push(self.rsync.clone());
                env.push((PASSWORD_ENV.into(), password.into()));
                self.sshpass.clone()
            }
            None => self.rsync.clone(),
        };

        args.extend(self.options.iter().map(OsString::from));
        args.push(archive.as_os_str().to_os_string());
        args.push(target.destination().into());

        Invocation { program, args, env }
    }

    /// Copy `archive` to `target`.
    ///
    /// Runs once, with no retry. Any launch error, nonzero exit or timeout is
    /// logged and returned as [`RemoteOutcome::Failed`].
    pub async fn push(&self, archive: &Path, target: &RemoteTarget) -> RemoteOutcome {
        let span = span!(Level::INFO, "remote_sync", destination = %target);

        let destination = target.destination().to_string();
        match self.run(archive, target).instrument(span).await {
            Ok(()) => {
                info!("Successfully copied backup to remote server: {}", destination);
                RemoteOutcome::Synced { destination }
            }
            Err(e) => {
                warn!("An error occurred while copying to remote server: {}", e);
                RemoteOutcome::Failed {
                    destination,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn run(&self, archive: &Path, target: &RemoteTarget) -> Result<()> {
        let invocation = self.invocation(archive, target);
        info!("Running rsync command: {}", invocation);

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| Error::RemoteSync {
            reason: format!(
                "failed to launch {}: {}",
                invocation.program.to_string_lossy(),
                e
            ),
        })?;
        let pid = child.id();

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    kill_process_group(pid);
                    return Err(Error::RemoteSync {
                        reason: format!("transfer timed out after {}s", limit.as_secs_f64()),
                    });
                }
            },
            None => child.wait_with_output().await,
        }?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("{}", line);
        }

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::RemoteSync {
                reason: format!("{} ({})", output.status, stderr.trim()),
            })
        }
    }
}

/// Kill everything the transfer started, not just the direct child
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!("Could not kill process group {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn os(values: &[&str]) -> Vec<OsString> {
        values.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_destination_with_separate_user() {
        let target = RemoteTarget::new("10.0.0.5", "alice", "/backups");
        assert_eq!(target.destination(), "alice@10.0.0.5:/backups");
    }

    #[test]
    fn test_destination_with_embedded_user() {
        let target = RemoteTarget::new("bob@10.0.0.5", "alice", "/backups");
        assert_eq!(target.destination(), "bob@10.0.0.5:/backups");
    }

    #[test]
    fn test_invocation_without_password() {
        let sync = RemoteSync::new(vec!["-avz".into(), "--partial".into()], Some(String::new()));
        let target = RemoteTarget::new("host", "alice", "dir/");
        let invocation = sync.invocation(Path::new("/tmp/site.zip"), &target);

        assert_eq!(invocation.program, OsString::from("rsync"));
        assert_eq!(
            invocation.args,
            os(&["-avz", "--partial", "/tmp/site.zip", "alice@host:dir/"])
        );
        assert!(invocation.env.is_empty());
    }

    #[test]
    fn test_password_goes_to_environment_only() {
        let sync = RemoteSync::new(vec!["-a".into()], Some("p'a s;s".into()));
        let target = RemoteTarget::new("host", "alice", "/srv");
        let invocation = sync.invocation(Path::new("/tmp/it's here.tar"), &target);

        assert_eq!(invocation.program, OsString::from("sshpass"));
        assert_eq!(
            invocation.args,
            os(&["-e", "rsync", "-a", "/tmp/it's here.tar", "alice@host:/srv"])
        );
        assert_eq!(
            invocation.env,
            vec![(OsString::from("SSHPASS"), OsString::from("p'a s;s"))]
        );
        assert!(!invocation.to_string().contains("p'a s;s"));
        assert_eq!(
            invocation.to_string(),
            "sshpass -e rsync -a /tmp/it's here.tar alice@host:/srv"
        );
    }

    #[test]
    fn test_options_from_config() {
        let config = RemoteConfig {
            enabled: true,
            server: "host".into(),
            user: "alice".into(),
            path: "/srv".into(),
            rsync_options: vec!["-avz".into(), "-e".into(), "ssh -p 2222".into()],
            password: String::new(),
            timeout: Some(Duration::from_secs(30)),
        };

        let sync = RemoteSync::from_config(&config);
        assert_eq!(sync.options, vec!["-avz", "-e", "ssh -p 2222"]);
        assert_eq!(sync.password, None);
        assert_eq!(sync.timeout, Some(Duration::from_secs(30)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_push_reports_success() {
        let sync = RemoteSync::new(Vec::new(), None).with_program("true");
        let target = RemoteTarget::new("host", "alice", "/srv");

        let outcome = sync.push(&PathBuf::from("/tmp/a.zip"), &target).await;
        assert_eq!(
            outcome,
            RemoteOutcome::Synced {
                destination: "alice@host:/srv".into()
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_push_reports_nonzero_exit() {
        let sync = RemoteSync::new(Vec::new(), None).with_program("false");
        let target = RemoteTarget::new("host", "alice", "/srv");

        let outcome = sync.push(Path::new("/tmp/a.zip"), &target).await;
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_push_reports_launch_failure() {
        let sync = RemoteSync::new(Vec::new(), None).with_program("/nonexistent/arcsync-rsync");
        let target = RemoteTarget::new("host", "alice", "/srv");

        match sync.push(Path::new("/tmp/a.zip"), &target).await {
            RemoteOutcome::Failed { reason, .. } => assert!(reason.contains("failed to launch")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_push_times_out() {
        let sync = RemoteSync::new(vec!["-c".into(), "sleep 5".into()], None)
            .with_program("sh")
            .with_timeout(Some(Duration::from_millis(100)));
        let target = RemoteTarget::new("host", "alice", "/srv");

        match sync.push(Path::new("/tmp/a.zip"), &target).await {
            RemoteOutcome::Failed { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_grandchildren() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let pid_file = temp_dir.path().join("grandchild.pid");
        let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());

        let sync = RemoteSync::new(vec!["-c".into(), script], None)
            .with_program("sh")
            .with_timeout(Some(Duration::from_millis(500)));
        let target = RemoteTarget::new("host", "alice", "/srv");

        let outcome = sync.push(Path::new("/tmp/a.zip"), &target).await;
        assert!(!outcome.is_success());

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let stat = PathBuf::from("/proc").join(pid.trim()).join("stat");
        let mut gone = false;
        for _ in 0..50 {
            // A killed but unreaped process shows up as a zombie
            match std::fs::read_to_string(&stat) {
                Err(_) => gone = true,
                Ok(line) => {
                    gone = line
                        .rsplit(')')
                        .next()
                        .is_some_and(|rest| rest.trim_start().starts_with('Z'))
                }
            }
            if gone {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "sleep {} survived the timeout", pid.trim());
    }
}
