//! Relay transports: a local helper process carries the byte stream.
//!
//! The helper's stdin and stdout are both bound to one end of a local socket
//! pair; we keep the other end. Used for `ssh` (ssh + netcat on the far side)
//! and `ext` (arbitrary user command).

use std::os::fd::OwnedFd;
use std::process::Stdio;

use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tracing::debug;

use super::ConnectParams;
use crate::constants::{DEFAULT_NETCAT, DEFAULT_SSH_COMMAND, DEFAULT_UNIX_SOCKET};
use crate::error::{Error, Result};

/// Program and arguments of a relay helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl RelayCommand {
    /// Run `command` with no arguments.
    pub fn external(command: &str) -> Self {
        Self {
            program: command.to_string(),
            args: Vec::new(),
        }
    }

    /// `ssh -p PORT [-l USER] HOST NETCAT -U SOCKET`
    pub fn ssh(params: &ConnectParams) -> Self {
        let mut args = vec!["-p".to_string(), params.port.to_string()];
        if let Some(user) = &params.username {
            args.push("-l".to_string());
            args.push(user.clone());
        }
        args.push(params.host.clone());
        args.push(
            params
                .netcat
                .clone()
                .unwrap_or_else(|| DEFAULT_NETCAT.to_string()),
        );
        args.push("-U".to_string());
        args.push(
            params
                .socket
                .clone()
                .unwrap_or_else(|| DEFAULT_UNIX_SOCKET.to_string()),
        );

        Self {
            program: params
                .command
                .clone()
                .unwrap_or_else(|| DEFAULT_SSH_COMMAND.to_string()),
            args,
        }
    }
}

/// Spawn `command` with its stdin and stdout joined to a fresh socket pair.
///
/// Returns our end of the pair and the child handle. The parent's copies of
/// the child's end are closed before this returns, so the child seeing EOF
/// on stdin means we closed our end. Dropping the child handle kills the
/// helper.
pub fn spawn_duplex(command: &RelayCommand) -> Result<(UnixStream, Child)> {
    let (near, far) = std::os::unix::net::UnixStream::pair().map_err(|e| Error::Transport {
        message: format!("unable to create socket pair: {}", e),
    })?;
    let far_out = far.try_clone().map_err(|e| Error::Transport {
        message: format!("unable to duplicate socket: {}", e),
    })?;

    near.set_nonblocking(true)?;
    let near = UnixStream::from_std(near)?;

    let child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::from(OwnedFd::from(far)))
        .stdout(Stdio::from(OwnedFd::from(far_out)))
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Transport {
            message: format!("unable to run '{}': {}", command.program, e),
        })?;

    debug!(
        program = %command.program,
        args = ?command.args,
        pid = ?child.id(),
        "Spawned relay helper"
    );

    Ok((near, child))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn ssh_params() -> ConnectParams {
        ConnectParams {
            transport: Transport::Ssh,
            host: "virt.example.com".into(),
            port: 22,
            ..ConnectParams::default()
        }
    }

    #[test]
    fn ssh_argv_defaults() {
        let cmd = RelayCommand::ssh(&ssh_params());
        assert_eq!(cmd.program, "ssh");
        assert_eq!(
            cmd.args,
            vec!["-p", "22", "virt.example.com", "nc", "-U", DEFAULT_UNIX_SOCKET]
        );
    }

    #[test]
    fn ssh_argv_with_overrides() {
        let params = ConnectParams {
            port: 2222,
            username: Some("admin".into()),
            command: Some("/usr/local/bin/ssh".into()),
            netcat: Some("socat-nc".into()),
            socket: Some("/tmp/sock".into()),
            ..ssh_params()
        };
        let cmd = RelayCommand::ssh(&params);
        assert_eq!(cmd.program, "/usr/local/bin/ssh");
        assert_eq!(
            cmd.args,
            vec![
                "-p",
                "2222",
                "-l",
                "admin",
                "virt.example.com",
                "socat-nc",
                "-U",
                "/tmp/sock"
            ]
        );
    }

    #[test]
    fn external_has_no_args() {
        let cmd = RelayCommand::external("/opt/relay");
        assert_eq!(cmd.program, "/opt/relay");
        assert!(cmd.args.is_empty());
    }

    #[tokio::test]
    async fn cat_echoes_through_pair() {
        let (mut stream, mut child) = spawn_duplex(&RelayCommand::external("cat")).unwrap();

        stream.write_all(b"ping").await.unwrap();
        let mut got = [0u8; 4];
        stream.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"ping");

        drop(stream);
        let status = child.wait().await.unwrap();
        assert!(status.success());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropped_helper_is_killed() {
        let command = RelayCommand {
            program: "sleep".into(),
            args: vec!["30".into()],
        };
        let (stream, child) = spawn_duplex(&command).unwrap();
        let pid = child.id().unwrap();
        drop(stream);
        drop(child);

        let stat = format!("/proc/{}/stat", pid);
        let mut gone = false;
        for _ in 0..50 {
            // A killed but not yet reaped process shows state 'Z'.
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
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(gone, "helper {} still running", pid);
    }

    #[tokio::test]
    async fn missing_program_is_transport_error() {
        let err = spawn_duplex(&RelayCommand::external("/nonexistent/vremote-relay")).unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }
}
