use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use bb8_common::{Auth, Host};
use tracing::{debug, info};
use wait_timeout::ChildExt;

const SSHPASS_ENV: &str = "SSHPASS";
const KEY_PASSPHRASE_PROMPT: &str = "passphrase";

/// Runs a resolved command on a host and returns its combined output.
pub trait RemoteExecutor {
    fn execute(&self, host: &Host, command: &str, timeout: Duration) -> Result<String>;
}

/// A fully prepared process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Launch {
    /// Shell-quoted command line for logs. Secrets only ever travel in `env`.
    pub fn display(&self) -> String {
        let parts = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(parts).unwrap_or_else(|_| self.program.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub combined: String,
}

/// Executes commands through the system `ssh` client. Password logins and
/// passphrase-protected keys are fed through `sshpass -e`.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    ssh_program: String,
    sshpass_program: String,
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            sshpass_program: "sshpass".to_string(),
        }
    }
}

impl SshExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_programs(ssh_program: impl Into<String>, sshpass_program: impl Into<String>) -> Self {
        Self {
            ssh_program: ssh_program.into(),
            sshpass_program: sshpass_program.into(),
        }
    }

    pub fn build_launch(&self, host: &Host, command: &str, timeout: Duration) -> Result<Launch> {
        let mut ssh_args = vec![
            "-p".to_string(),
            host.port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", timeout.as_secs().max(1)),
        ];

        let secret = match &host.auth {
            Auth::Password { password, .. } => {
                ssh_args.extend([
                    "-o".to_string(),
                    "PubkeyAuthentication=no".to_string(),
                    "-o".to_string(),
                    "PreferredAuthentications=password,keyboard-interactive".to_string(),
                ]);
                Some((password.clone(), None))
            }
            Auth::PublicKey {
                private_key_path,
                passphrase,
                ..
            } => {
                let key = expand_tilde(private_key_path);
                if !key.is_file() {
                    bail!("error loading private key {:?}: file not found", private_key_path);
                }
                ssh_args.extend([
                    "-i".to_string(),
                    key.display().to_string(),
                    "-o".to_string(),
                    "IdentitiesOnly=yes".to_string(),
                ]);
                if passphrase.is_empty() {
                    ssh_args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
                    None
                } else {
                    Some((passphrase.clone(), Some(KEY_PASSPHRASE_PROMPT)))
                }
            }
        };

        ssh_args.push(format!("{}@{}", host.auth.username(), host.address));
        ssh_args.push("--".to_string());
        ssh_args.push(command.to_string());

        let launch = match secret {
            None => Launch {
                program: self.ssh_program.clone(),
                args: ssh_args,
                env: Vec::new(),
            },
            Some((secret, prompt)) => {
                let mut args = Vec::with_capacity(ssh_args.len() + 4);
                if let Some(prompt) = prompt {
                    args.push("-P".to_string());
                    args.push(prompt.to_string());
                }
                args.push("-e".to_string());
                args.push(self.ssh_program.clone());
                args.extend(ssh_args);
                Launch {
                    program: self.sshpass_program.clone(),
                    args,
                    env: vec![(SSHPASS_ENV.to_string(), secret)],
                }
            }
        };
        Ok(launch)
    }
}

impl RemoteExecutor for SshExecutor {
    fn execute(&self, host: &Host, command: &str, timeout: Duration) -> Result<String> {
        info!(command, host = %host.socket_addr(), "executing remote command");
        let launch = self.build_launch(host, command, timeout)?;
        debug!(launch = %launch.display(), "spawning ssh");
        let output = run_with_timeout(&launch, timeout)
            .with_context(|| format!("error opening ssh connection to {}", host.socket_addr()))?;
        if !output.status.success() {
            bail!(
                "error calling ssh command: {}, out: {}",
                output.status,
                output.combined
            );
        }
        Ok(output.combined)
    }
}

/// Spawns `launch`, drains both pipes concurrently and kills the process if
/// it outlives `timeout`. A zero timeout waits indefinitely.
pub fn run_with_timeout(launch: &Launch, timeout: Duration) -> Result<ProcessOutput> {
    let mut child = Command::new(&launch.program)
        .args(&launch.args)
        .envs(launch.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn '{}'", launch.program))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("child stdout was not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("child stderr was not captured"))?;
    let stdout_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf);
        buf
    });
    let stderr_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf);
        buf
    });

    let status = if timeout.is_zero() {
        child.wait()?
    } else {
        match child.wait_timeout(timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                bail!("command timed out after {}ms", timeout.as_millis());
            }
        }
    };

    let out = stdout_reader
        .join()
        .map_err(|_| anyhow!("stdout reader panicked"))?;
    let err = stderr_reader
        .join()
        .map_err(|_| anyhow!("stderr reader panicked"))?;

    Ok(ProcessOutput {
        status,
        combined: merge_output(&out, &err),
    })
}

fn merge_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut merged = Vec::with_capacity(stdout.len() + stderr.len() + 16);
    merged.extend_from_slice(stdout);
    if !stderr.is_empty() {
        if !stdout.is_empty() {
            merged.extend_from_slice(b"\n--- stderr ---\n");
        }
        merged.extend_from_slice(stderr);
    }
    String::from_utf8_lossy(&merged).to_string()
}

fn expand_tilde(path: &str) -> PathBuf {
    if !path.starts_with('~') {
        return PathBuf::from(path);
    }
    let Some(home) = dirs::home_dir() else {
        return PathBuf::from(path);
    };
    match path.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None if path == "~" => home,
        None => Path::new(path).to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn password_host() -> Host {
        Host {
            id: "web1".to_string(),
            address: "10.0.0.5".to_string(),
            port: 2222,
            auth: Auth::Password {
                username: "ops".to_string(),
                password: "hunter2".to_string(),
            },
        }
    }

    fn key_host(path: &str, passphrase: &str) -> Host {
        Host {
            id: "db1".to_string(),
            address: "db.internal".to_string(),
            port: 22,
            auth: Auth::PublicKey {
                username: "root".to_string(),
                private_key_path: path.to_string(),
                passphrase: passphrase.to_string(),
            },
        }
    }

    #[test]
    fn password_auth_goes_through_sshpass_env() {
        let launch = SshExecutor::new()
            .build_launch(&password_host(), "uptime", Duration::from_secs(30))
            .expect("launch");
        assert_eq!(launch.program, "sshpass");
        assert_eq!(launch.args[0], "-e");
        assert_eq!(launch.args[1], "ssh");
        assert!(launch.args.contains(&"2222".to_string()));
        assert!(launch.args.contains(&"ConnectTimeout=30".to_string()));
        assert_eq!(
            &launch.args[launch.args.len() - 3..],
            &["ops@10.0.0.5", "--", "uptime"]
        );
        assert_eq!(
            launch.env,
            vec![("SSHPASS".to_string(), "hunter2".to_string())]
        );
        assert!(!launch.display().contains("hunter2"));
    }

    #[test]
    fn key_auth_without_passphrase_runs_ssh_directly() {
        let tmp = tempdir().expect("tempdir");
        let key = tmp.path().join("id_ed25519");
        std::fs::write(&key, "key").expect("write key");
        let host = key_host(&key.display().to_string(), "");
        let launch = SshExecutor::new()
            .build_launch(&host, "df -h", Duration::from_secs(5))
            .expect("launch");
        assert_eq!(launch.program, "ssh");
        assert!(launch.env.is_empty());
        assert!(launch.args.contains(&key.display().to_string()));
        assert!(launch.args.contains(&"BatchMode=yes".to_string()));
    }

    #[test]
    fn key_passphrase_uses_prompt_matching() {
        let tmp = tempdir().expect("tempdir");
        let key = tmp.path().join("id_rsa");
        std::fs::write(&key, "key").expect("write key");
        let host = key_host(&key.display().to_string(), "open sesame");
        let launch = SshExecutor::with_programs("/usr/bin/ssh", "/usr/bin/sshpass")
            .build_launch(&host, "df -h", Duration::from_secs(5))
            .expect("launch");
        assert_eq!(launch.program, "/usr/bin/sshpass");
        assert_eq!(&launch.args[..4], &["-P", "passphrase", "-e", "/usr/bin/ssh"]);
        assert_eq!(
            launch.env,
            vec![("SSHPASS".to_string(), "open sesame".to_string())]
        );
    }

    #[test]
    fn missing_private_key_is_reported() {
        let host = key_host("/nonexistent/bb8/key", "");
        let err = SshExecutor::new()
            .build_launch(&host, "uptime", Duration::from_secs(5))
            .expect_err("must fail");
        assert!(err.to_string().contains("error loading private key"));
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout_and_stderr() {
        let launch = Launch {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo out; echo err >&2".to_string()],
            env: Vec::new(),
        };
        let output = run_with_timeout(&launch, Duration::from_secs(10)).expect("run");
        assert!(output.status.success());
        assert_eq!(output.combined, "out\n\n--- stderr ---\nerr\n");
    }

    #[cfg(unix)]
    #[test]
    fn kills_commands_that_exceed_timeout() {
        let launch = Launch {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 5".to_string()],
            env: Vec::new(),
        };
        let err = run_with_timeout(&launch, Duration::from_millis(100)).expect_err("timeout");
        assert!(err.to_string().contains("timed out"));
    }
}
