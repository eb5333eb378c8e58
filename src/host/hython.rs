/// Houdini scene host
///
/// Spawns `hython <bridge_script> serve` and exchanges one JSON object per line
/// over the child's stdin/stdout. Request/response pairs are serialized with an
/// async mutex so parallel workers can share one bridge. A request that outlives
/// the configured timeout leaves the stream out of step, so the bridge is then
/// treated as broken and every later request fails straight away.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{NodeParameters, SceneHost};
use crate::error::HostError;
use crate::job::CacheUnitRef;

/// How to start the bridge process
#[derive(Debug, Clone)]
pub struct HythonHostConfig {
    /// Interpreter binary (name on PATH or absolute path)
    pub interpreter: String,
    /// Bridge script passed as the interpreter's first argument
    pub bridge_script: PathBuf,
    /// Longest wait for one reply; `None` waits forever
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum BridgeRequest<'a> {
    Load { scene: &'a str },
    Probe { unit: &'a str },
    Trigger { unit: &'a str },
    Quit,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum BridgeResponse {
    Ok {
        #[serde(default)]
        parameters: Option<NodeParameters>,
    },
    NotFound {
        #[serde(default)]
        message: String,
    },
    Error {
        message: String,
    },
}

struct BridgeIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Scene host backed by a long-lived hython bridge process
pub struct HythonHost {
    io: Mutex<BridgeIo>,
    child: Mutex<Child>,
    request_timeout: Option<Duration>,
    broken: AtomicBool,
}

/// Grace period for the bridge to exit once it has acknowledged `quit`
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Resolve the interpreter from PATH, falling back to the name as given
pub fn resolve_interpreter(interpreter: &str) -> PathBuf {
    which::which(interpreter).unwrap_or_else(|e| {
        debug!(
            "Could not find '{}' in PATH: {}. Trying as-is.",
            interpreter, e
        );
        PathBuf::from(interpreter)
    })
}

impl HythonHost {
    /// Start the bridge process
    pub async fn spawn(config: &HythonHostConfig) -> Result<Self, HostError> {
        let interpreter = resolve_interpreter(&config.interpreter);
        info!(
            interpreter = %interpreter.display(),
            bridge = %config.bridge_script.display(),
            "Starting scene host bridge"
        );

        let mut child = bridge_command(&interpreter, &config.bridge_script)
            .arg("serve")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HostError::Io(format!(
                    "failed to spawn {}: {}",
                    interpreter.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HostError::Io("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HostError::Io("bridge stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "batchcache::bridge", "{}", line);
                }
            });
        }

        Ok(Self {
            io: Mutex::new(BridgeIo {
                stdin,
                stdout: BufReader::new(stdout).lines(),
            }),
            child: Mutex::new(child),
            request_timeout: config.request_timeout,
            broken: AtomicBool::new(false),
        })
    }

    async fn request(&self, request: &BridgeRequest<'_>) -> Result<BridgeResponse, HostError> {
        self.exchange(request, self.request_timeout).await
    }

    async fn exchange(
        &self,
        request: &BridgeRequest<'_>,
        limit: Option<Duration>,
    ) -> Result<BridgeResponse, HostError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| HostError::Protocol(format!("failed to encode request: {}", e)))?;
        line.push('\n');

        let mut io = self.io.lock().await;
        if self.is_broken() {
            return Err(HostError::Io(
                "bridge stopped responding earlier in this run".to_string(),
            ));
        }

        let reply = match limit {
            Some(limit) => match tokio::time::timeout(limit, io.round_trip(&line)).await {
                Ok(reply) => reply?,
                Err(_) => {
                    self.broken.store(true, Ordering::SeqCst);
                    warn!("Bridge did not reply within {:?}", limit);
                    return Err(HostError::Io(format!(
                        "bridge did not reply within {:?}",
                        limit
                    )));
                }
            },
            None => io.round_trip(&line).await?,
        };

        decode_response(&reply)
    }

    /// Whether a request timed out and the bridge can no longer be trusted
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }

    /// Ask the bridge to exit and reap it
    ///
    /// The bridge lets every cache it started finish writing before it
    /// acknowledges `quit`, so that reply is awaited without a timeout. Only an
    /// unresponsive bridge is killed.
    pub async fn shutdown(&self) {
        if self.is_broken() {
            warn!("Bridge is unresponsive, killing it");
            let _ = self.child.lock().await.kill().await;
            return;
        }

        info!("Waiting for running caches to finish writing");
        if let Err(e) = self.exchange(&BridgeRequest::Quit, None).await {
            debug!("Bridge did not acknowledge quit: {}", e);
        }

        let mut child = self.child.lock().await;
        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!("Bridge exited with {}", status),
            Ok(Err(e)) => warn!("Failed to wait for bridge: {}", e),
            Err(_) => {
                warn!("Bridge did not exit in time, killing it");
                let _ = child.kill().await;
            }
        }
    }
}

impl BridgeIo {
    async fn round_trip(&mut self, line: &str) -> Result<String, HostError> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        self.stdout
            .next_line()
            .await?
            .ok_or_else(|| HostError::Io("bridge exited unexpectedly".to_string()))
    }
}

fn bridge_command(interpreter: &Path, bridge_script: &Path) -> Command {
    let mut cmd = Command::new(interpreter);
    cmd.arg(bridge_script);
    cmd
}

pub(crate) fn decode_response(line: &str) -> Result<BridgeResponse, HostError> {
    serde_json::from_str(line.trim())
        .map_err(|e| HostError::Protocol(format!("unexpected reply '{}': {}", line.trim(), e)))
}

#[async_trait]
impl SceneHost for HythonHost {
    async fn load(&self, scene_path: &str) -> Result<(), HostError> {
        match self.request(&BridgeRequest::Load { scene: scene_path }).await? {
            BridgeResponse::Ok { .. } => Ok(()),
            BridgeResponse::NotFound { message } | BridgeResponse::Error { message } => {
                Err(HostError::LoadFailed(message))
            }
        }
    }

    async fn probe(&self, unit: &CacheUnitRef) -> Result<Option<NodeParameters>, HostError> {
        let request = BridgeRequest::Probe {
            unit: unit.as_str(),
        };
        match self.request(&request).await? {
            BridgeResponse::Ok {
                parameters: Some(parameters),
            } => Ok(Some(parameters)),
            BridgeResponse::Ok { parameters: None } => Err(HostError::Protocol(
                "probe reply carried no parameters".to_string(),
            )),
            BridgeResponse::NotFound { .. } => Ok(None),
            BridgeResponse::Error { message } => Err(HostError::Remote(message)),
        }
    }

    async fn trigger(&self, unit: &CacheUnitRef) -> Result<(), HostError> {
        let request = BridgeRequest::Trigger {
            unit: unit.as_str(),
        };
        match self.request(&request).await? {
            BridgeResponse::Ok { .. } => Ok(()),
            BridgeResponse::NotFound { message } | BridgeResponse::Error { message } => {
                Err(HostError::TriggerFailed(message))
            }
        }
    }
}
