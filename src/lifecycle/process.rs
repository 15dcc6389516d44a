use crate::errors::{BrowserError, Result};
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Wait after spawning when there is no address to poll.
pub const SETTLE_MS: u64 = 350;

pub const PING_INTERVAL_MS: u64 = 100;

pub const PING_TIMEOUT_MS: u64 = 15_000;

/// Grace period between SIGTERM and a hard kill.
pub const STOP_GRACE_MS: u64 = 2_000;

const STOP_POLL_MS: u64 = 100;

/// A server under test, started for the length of a session.
pub struct ServerProcess {
    command: String,
    child: Option<Child>,
    output: Arc<Mutex<String>>,
    readers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for ServerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerProcess")
            .field("command", &self.command)
            .field("pid", &self.child.as_ref().and_then(Child::id))
            .finish()
    }
}

fn drain<R>(stream: Option<R>, output: &Arc<Mutex<String>>) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let stream = stream?;
    let output = Arc::clone(output);
    Some(tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut output = output.lock();
            output.push_str(&line);
            output.push('\n');
        }
    }))
}

async fn accepting(address: &str) -> bool {
    TcpStream::connect(address).await.is_ok()
}

/// Splits a command line into words, honoring single quotes, double
/// quotes and backslash escapes.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    let unbalanced = || BrowserError::invalid_value("cmd", format!("unbalanced quotes in {:?}", command));
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = command.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err(unbalanced()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => word.push(c),
                            Some(c) => {
                                word.push('\\');
                                word.push(c);
                            }
                            None => return Err(unbalanced()),
                        },
                        Some(c) => word.push(c),
                        None => return Err(unbalanced()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(c) = chars.next() {
                    word.push(c);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    if words.is_empty() {
        return Err(BrowserError::invalid_value("cmd", "empty command"));
    }
    Ok(words)
}

impl ServerProcess {
    /// Spawns the shell-split `command` and blocks until it is ready:
    /// `ping_address` accepts connections, or the process survives a short
    /// settle period when there is nothing to poll.
    pub async fn start(command: &str, ping_address: Option<&str>) -> Result<Self> {
        Self::start_with_timeout(command, ping_address, PING_TIMEOUT_MS).await
    }

    /// Like [`ServerProcess::start`], polling `ping_address` for at most
    /// `ping_timeout_ms`.
    pub async fn start_with_timeout(
        command: &str,
        ping_address: Option<&str>,
        ping_timeout_ms: u64,
    ) -> Result<Self> {
        if let Some(address) = ping_address {
            if accepting(address).await {
                return Err(BrowserError::ProcessFailed {
                    message: format!(
                        "{:?} not started: {} is already accepting connections",
                        command, address
                    ),
                    output: String::new(),
                });
            }
        }

        let words = split_command(command)?;
        info!("Starting server: {}", command);
        let mut child = Command::new(&words[0])
            .args(&words[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::ProcessFailed {
                message: format!("{:?} could not be spawned: {}", command, e),
                output: String::new(),
            })?;

        let output = Arc::new(Mutex::new(String::new()));
        let readers = [
            drain(child.stdout.take(), &output),
            drain(child.stderr.take(), &output),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mut process = Self {
            command: command.to_string(),
            child: Some(child),
            output,
            readers,
        };
        process.wait_ready(ping_address, ping_timeout_ms).await?;
        Ok(process)
    }

    async fn wait_ready(&mut self, ping_address: Option<&str>, ping_timeout_ms: u64) -> Result<()> {
        let address = match ping_address {
            None => {
                tokio::time::sleep(Duration::from_millis(SETTLE_MS)).await;
                return match self.exit_status() {
                    Some(status) => Err(self.failure(format!("exited with {}", status)).await),
                    None => Ok(()),
                };
            }
            Some(address) => address,
        };

        let started = Instant::now();
        loop {
            if let Some(status) = self.exit_status() {
                return Err(self.failure(format!("exited with {}", status)).await);
            }
            if accepting(address).await {
                info!(
                    "Server answering on {} after {:.3}sec",
                    address,
                    started.elapsed().as_secs_f64()
                );
                return Ok(());
            }
            if started.elapsed() >= Duration::from_millis(ping_timeout_ms) {
                if let Err(e) = self.stop().await {
                    warn!("Failed to stop unresponsive server {:?}: {}", self.command, e);
                }
                return Err(self
                    .failure(format!(
                        "did not answer on {} within {}ms",
                        address, ping_timeout_ms
                    ))
                    .await);
            }
            tokio::time::sleep(Duration::from_millis(PING_INTERVAL_MS)).await;
        }
    }

    fn exit_status(&mut self) -> Option<std::process::ExitStatus> {
        self.child.as_mut().and_then(|child| child.try_wait().ok().flatten())
    }

    /// Builds a `ProcessFailed` error once the output readers have caught
    /// up with what a finished or stopped process wrote.
    async fn failure(&mut self, message: String) -> BrowserError {
        if self.child.is_none() || self.exit_status().is_some() {
            for reader in self.readers.drain(..) {
                let _ = tokio::time::timeout(Duration::from_millis(500), reader).await;
            }
        }
        BrowserError::ProcessFailed {
            message: format!("{:?} {}", self.command, message),
            output: self.output(),
        }
    }

    /// Everything the process wrote to stdout and stderr so far.
    pub fn output(&self) -> String {
        self.output.lock().clone()
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    pub fn is_running(&mut self) -> bool {
        self.child.is_some() && self.exit_status().is_none()
    }

    /// Terminates the process, politely first. Stopping a process that
    /// already exited, or was stopped before, is not an error.
    pub async fn stop(&mut self) -> Result<()> {
        let mut child = match self.child.take() {
            Some(child) => child,
            None => return Ok(()),
        };
        if child.try_wait()?.is_some() {
            debug!("Server {:?} had already exited", self.command);
            return Ok(());
        }

        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;

                if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    warn!("Failed to send SIGTERM to {}: {}", pid, e);
                }
                for _ in 0..(STOP_GRACE_MS / STOP_POLL_MS) {
                    if child.try_wait()?.is_some() {
                        info!("Server {:?} stopped", self.command);
                        return Ok(());
                    }
                    tokio::time::sleep(Duration::from_millis(STOP_POLL_MS)).await;
                }
                warn!("Server {:?} ignored SIGTERM, killing it", self.command);
            }
        }

        child.kill().await?;
        info!("Server {:?} killed", self.command);
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command(r#"python -m http.server  8000 --bind 'local host' "a \"b\"" c\ d"#).unwrap(),
            vec!["python", "-m", "http.server", "8000", "--bind", "local host", "a \"b\"", "c d"]
        );
        assert!(split_command("echo 'open").is_err());
        assert!(split_command("   ").is_err());
    }

    #[tokio::test]
    async fn test_start_and_stop_twice() {
        let mut server = ServerProcess::start("sleep 30", None).await.unwrap();
        assert!(server.is_running());
        assert!(server.id().is_some());
        server.stop().await.unwrap();
        assert!(!server.is_running());
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_early_exit_reports_output() {
        let err = ServerProcess::start("sh -c 'echo booting; echo broken >&2; exit 3'", None)
            .await
            .unwrap_err();
        match err {
            BrowserError::ProcessFailed { message, output } => {
                assert!(message.contains("exited"));
                assert!(output.contains("booting"));
                assert!(output.contains("broken"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_refuses_busy_address() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let err = ServerProcess::start("sleep 30", Some(&address))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BrowserError::ProcessFailed { ref message, .. } if message.contains("already accepting")
        ));
    }

    #[tokio::test]
    async fn test_unanswered_ping_stops_and_reports_output() {
        let address = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let err = ServerProcess::start_with_timeout(
            "sh -c 'echo waiting; exec sleep 30'",
            Some(&address),
            300,
        )
        .await
        .unwrap_err();
        match err {
            BrowserError::ProcessFailed { message, output } => {
                assert!(message.contains("did not answer"));
                assert!(output.contains("waiting"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_after_exit() {
        let mut server = ServerProcess::start("sleep 0.5", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;
        server.stop().await.unwrap();
    }
}
