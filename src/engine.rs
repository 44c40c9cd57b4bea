//! Chess engine collaborator.
//!
//! [`UciEngine`] talks the UCI protocol to an engine process over its stdin and
//! stdout. The process belongs to the engine value and is killed when it drops.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shakmaty::uci::UciMove;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::game::Position;

#[async_trait]
pub trait ChessEngine: Send + Sync {
    async fn submit_position(&mut self, position: &Position) -> Result<()>;

    /// Best move for the last submitted position, searched for at most `budget`.
    async fn best_move(&mut self, budget: Duration) -> Result<UciMove>;

    async fn quit(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Engine executable, looked up on `PATH` when not absolute.
    pub program: PathBuf,
    pub move_time_ms: u64,
    /// How long to wait for any single engine reply.
    pub reply_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("stockfish"),
            move_time_ms: 10,
            reply_timeout_ms: 5_000,
        }
    }
}

impl EngineSettings {
    pub fn move_time(&self) -> Duration {
        Duration::from_millis(self.move_time_ms)
    }
}

pub struct UciEngine {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    reply_timeout: Duration,
}

impl UciEngine {
    /// Starts the engine and runs the `uci` / `isready` / `ucinewgame` handshake.
    #[tracing::instrument(skip_all, fields(program = %settings.program.display()))]
    pub async fn spawn(settings: &EngineSettings) -> Result<Self> {
        let mut child = Command::new(&settings.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Engine(format!("can't start {}: {e}", settings.program.display()))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(Error::Engine("engine pipes unavailable".to_string()));
        };

        let mut engine = Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            reply_timeout: Duration::from_millis(settings.reply_timeout_ms),
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;
        engine.send("ucinewgame").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;
        info!("engine ready");
        Ok(engine)
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        debug!(line, "engine <");
        self.stdin
            .write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| Error::Engine(format!("write failed: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| Error::Engine(format!("write failed: {e}")))
    }

    /// Reads until a line starting with `prefix`, budgeted by the reply timeout.
    async fn wait_for(&mut self, prefix: &str) -> Result<String> {
        let timeout = self.reply_timeout;
        let lines = &mut self.lines;
        let read = async move {
            loop {
                let line = lines
                    .next_line()
                    .await
                    .map_err(|e| Error::Engine(format!("read failed: {e}")))?
                    .ok_or_else(|| Error::Engine("engine closed its output".to_string()))?;
                debug!(line = %line, "engine >");
                if line.starts_with(prefix) {
                    return Ok::<String, Error>(line);
                }
            }
        };
        tokio::time::timeout(timeout, read)
            .await
            .map_err(|_| Error::Engine(format!("no {prefix} within {timeout:?}")))?
    }
}

#[async_trait]
impl ChessEngine for UciEngine {
    async fn submit_position(&mut self, position: &Position) -> Result<()> {
        self.send(&format!("position fen {}", position.fen())).await
    }

    async fn best_move(&mut self, budget: Duration) -> Result<UciMove> {
        self.send(&format!("go movetime {}", budget.as_millis().max(1))).await?;
        let line = self.wait_for("bestmove").await?;
        parse_best_move(&line)
    }

    async fn quit(&mut self) -> Result<()> {
        self.send("quit").await?;
        match tokio::time::timeout(self.reply_timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(%status, "engine exited");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Engine(format!("wait failed: {e}"))),
            Err(_) => self
                .child
                .kill()
                .await
                .map_err(|e| Error::Engine(format!("kill failed: {e}"))),
        }
    }
}

/// Extracts the move from `bestmove <uci> [ponder <uci>]`.
pub fn parse_best_move(line: &str) -> Result<UciMove> {
    let mut words = line.split_whitespace();
    let (Some("bestmove"), Some(mv)) = (words.next(), words.next()) else {
        return Err(Error::Engine(format!("unexpected reply {line:?}")));
    };
    mv.parse::<UciMove>()
        .map_err(|e| Error::Engine(format!("bad move {mv:?} in {line:?}: {e}")))
}
