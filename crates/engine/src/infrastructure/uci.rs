//! UCI engine subprocess.
//!
//! One process per engine-backed participant. A query writes `ucinewgame`,
//! the `position` command and `go depth <n>`, then reads stdout until a line
//! starting with `bestmove`; everything before it is ignored.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use chessroom_domain::UciMove;

use crate::config::EngineConfig;
use crate::infrastructure::ports::{EngineError, EngineLauncher, EnginePosition, MoveEngine};

/// Search settings applied to every query.
#[derive(Debug, Clone, Copy)]
pub struct SearchSettings {
    pub depth: u32,
    pub timeout: Duration,
}

struct UciProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    /// Set once a query failed midway; the stream position is unknown after that.
    broken: bool,
}

impl UciProcess {
    async fn send(&mut self, line: &str) -> Result<(), EngineError> {
        self.stdin
            .write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| EngineError::Io(e.to_string()))
    }

    async fn search(
        &mut self,
        position: &EnginePosition,
        depth: u32,
    ) -> Result<UciMove, EngineError> {
        self.send("ucinewgame").await?;
        self.send(&position.to_command()).await?;
        self.send(&format!("go depth {depth}")).await?;
        self.stdin
            .flush()
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;

        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| EngineError::Io(e.to_string()))?
                .ok_or(EngineError::Exited)?;

            if let Some(rest) = line.strip_prefix("bestmove") {
                return parse_bestmove(rest);
            }
            tracing::trace!(line = %line, "engine output");
        }
    }
}

fn parse_bestmove(rest: &str) -> Result<UciMove, EngineError> {
    match rest.split_whitespace().next() {
        None => Err(EngineError::Protocol("bestmove without a move".to_string())),
        Some("(none)") => Err(EngineError::NoMove),
        Some(raw) => UciMove::parse(raw).map_err(|e| EngineError::Protocol(e.to_string())),
    }
}

/// A UCI engine process with exclusive, serialized access per query.
pub struct UciEngine {
    process: Mutex<Option<UciProcess>>,
    settings: SearchSettings,
}

impl UciEngine {
    /// Start `command` with piped stdio. The process is killed when the
    /// engine is dropped.
    pub fn start(mut command: Command, settings: SearchSettings) -> Result<Self, EngineError> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn("stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn("stdout was not captured".to_string()))?;

        Ok(Self {
            process: Mutex::new(Some(UciProcess {
                child,
                stdin,
                stdout: BufReader::new(stdout).lines(),
                broken: false,
            })),
            settings,
        })
    }
}

#[async_trait]
impl MoveEngine for UciEngine {
    async fn best_move(&self, position: &EnginePosition) -> Result<UciMove, EngineError> {
        let mut guard = self.process.lock().await;
        let process = guard.as_mut().ok_or(EngineError::Exited)?;
        if process.broken {
            return Err(EngineError::Exited);
        }

        let result = match tokio::time::timeout(
            self.settings.timeout,
            process.search(position, self.settings.depth),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.settings.timeout)),
        };

        if matches!(
            result,
            Err(EngineError::Timeout(_) | EngineError::Io(_) | EngineError::Exited)
        ) {
            process.broken = true;
        }
        result
    }

    async fn shutdown(&self) {
        let Some(mut process) = self.process.lock().await.take() else {
            return;
        };
        // Best effort: the process may already be gone.
        let _ = process.send("quit").await;
        let _ = process.stdin.flush().await;
        if let Err(e) = process.child.kill().await {
            tracing::debug!(error = %e, "engine process already stopped");
        }
    }
}

/// Starts one [`UciEngine`] per engine-backed participant.
pub struct UciEngineLauncher {
    path: String,
    settings: SearchSettings,
}

impl UciEngineLauncher {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            path: config.path.clone(),
            settings: SearchSettings {
                depth: config.depth,
                timeout: config.search_timeout,
            },
        }
    }
}

#[async_trait]
impl EngineLauncher for UciEngineLauncher {
    async fn launch(&self) -> Result<Arc<dyn MoveEngine>, EngineError> {
        let engine = UciEngine::start(Command::new(&self.path), self.settings)?;
        tracing::info!(path = %self.path, depth = self.settings.depth, "engine process started");
        Ok(Arc::new(engine))
    }
}
