//! Chromium child process: spawn, DevTools endpoint discovery, shutdown.
//!
//! The process is killed when [`BrowserProcess`] is dropped, so a panic or a
//! cancelled capture never leaves Chromium running.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use layoutshot_core::{Error, Result};

use crate::config::ChromeConfig;

static DEVTOOLS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"DevTools listening on (ws://\S+)").expect("valid regex"));

/// Stderr lines kept for the error message when Chromium dies during launch.
const STDERR_TAIL: usize = 5;

/// Extract the browser WebSocket URL from a Chromium stderr line.
pub fn parse_devtools_url(line: &str) -> Option<String> {
    DEVTOOLS_LINE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// A running Chromium and its throwaway profile directory.
pub struct BrowserProcess {
    child: Child,
    pid: Option<u32>,
    stderr_drain: Option<JoinHandle<()>>,
    /// Removed from disk when the process handle is dropped.
    _profile: TempDir,
}

impl BrowserProcess {
    /// Spawn Chromium and wait for it to report its DevTools endpoint.
    pub async fn spawn(config: &ChromeConfig) -> Result<(Self, String)> {
        let profile = tempfile::Builder::new()
            .prefix("layoutshot-profile-")
            .tempdir()
            .map_err(|e| Error::Launch(format!("cannot create profile directory: {}", e)))?;

        let mut child = Command::new(&config.executable)
            .args(config.args(profile.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Launch(format!(
                    "cannot start {}: {}",
                    config.executable.display(),
                    e
                ))
            })?;

        let pid = child.id();
        let stderr = child.stderr.take();
        let mut process = Self {
            child,
            pid,
            stderr_drain: None,
            _profile: profile,
        };
        let Some(stderr) = stderr else {
            process.kill().await;
            return Err(Error::Launch("Chromium stderr was not captured".into()));
        };

        let mut lines = BufReader::new(stderr).lines();
        let ws_url =
            match tokio::time::timeout(config.launch_timeout, read_devtools_url(&mut lines)).await {
                Ok(Ok(url)) => url,
                Ok(Err(reason)) => {
                    process.kill().await;
                    return Err(Error::Launch(reason));
                }
                Err(_) => {
                    process.kill().await;
                    return Err(Error::Launch(format!(
                        "Chromium did not report a DevTools endpoint within {:?}",
                        config.launch_timeout
                    )));
                }
            };

        // Keep the pipe drained so Chromium never blocks on a full stderr.
        process.stderr_drain = Some(tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                trace!(target: "chromium", "{}", line);
            }
        }));

        info!("Chromium started (pid {:?})", pid);
        Ok((process, ws_url))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// True once the child has exited and been reaped.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Wait up to `grace` for Chromium to exit on its own, then kill it.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<()> {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Chromium (pid {:?}) exited: {}", self.pid, status),
            Ok(Err(e)) => {
                warn!("Waiting for Chromium failed: {}; killing", e);
                self.child.kill().await?;
            }
            Err(_) => {
                info!(
                    "Chromium (pid {:?}) still running after {:?}; killing",
                    self.pid, grace
                );
                self.child.kill().await?;
            }
        }
        if let Some(drain) = self.stderr_drain.take() {
            drain.abort();
        }
        Ok(())
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("Killing Chromium (pid {:?}): {}", self.pid, e);
        }
    }
}

impl Drop for BrowserProcess {
    fn drop(&mut self) {
        if let Some(drain) = self.stderr_drain.take() {
            drain.abort();
        }
        // Already reaped after a clean shutdown; the error is expected then.
        let _ = self.child.start_kill();
    }
}

async fn read_devtools_url(
    lines: &mut Lines<BufReader<ChildStderr>>,
) -> std::result::Result<String, String> {
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(url) = parse_devtools_url(&line) {
                    return Ok(url);
                }
                trace!(target: "chromium", "{}", line);
                push_tail(&mut tail, line);
            }
            Ok(None) => {
                let detail = if tail.is_empty() {
                    String::new()
                } else {
                    format!(": {}", Vec::from(tail).join(" | "))
                };
                return Err(format!(
                    "Chromium exited before reporting a DevTools endpoint{}",
                    detail
                ));
            }
            Err(e) => return Err(format!("reading Chromium stderr: {}", e)),
        }
    }
}

/// Keep only the last [`STDERR_TAIL`] lines.
fn push_tail(tail: &mut VecDeque<String>, line: String) {
    if tail.len() == STDERR_TAIL {
        tail.pop_front();
    }
    tail.push_back(line);
}
