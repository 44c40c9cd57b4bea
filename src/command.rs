//! JSON command surface and its local-socket transport.
//!
//! Each request is one JSON object on one line; each reply is one JSON line.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;

use interprocess::local_socket::{LocalSocketListener, LocalSocketStream};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::service::ChessService;

/// Default name of the command socket.
///
/// On Unix this is a filesystem-backed socket in `/tmp`.
#[cfg(unix)]
pub const CHESS_IPC_NAME: &str = "/tmp/chess_arm_cmd";

#[cfg(not(unix))]
pub const CHESS_IPC_NAME: &str = "chess_arm_cmd";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Toggle a piece between two squares.
    Move(MoveRequest),
    /// Play this many engine moves.
    Play(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub from: String,
    pub to: String,
    #[serde(default = "one", alias = "n")]
    pub repeat_count: u32,
}

fn one() -> u32 {
    1
}

impl Command {
    pub fn parse(value: &Value) -> Result<Self> {
        Command::deserialize(value).map_err(|e| {
            debug!("rejected command: {e}");
            Error::Command(value.to_string())
        })
    }
}

/// Successful outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Moved,
    Played(String),
}

impl Reply {
    pub fn to_json(&self) -> Value {
        match self {
            Reply::Moved => json!({}),
            Reply::Played(mv) => json!({ "move": mv }),
        }
    }
}

/// Binds the command socket, removing a stale socket file left by an earlier run.
pub fn bind_command_socket(name: &str) -> io::Result<LocalSocketListener> {
    #[cfg(unix)]
    {
        let _ = std::fs::remove_file(name);
    }
    let listener = LocalSocketListener::bind(name)?;
    info!(name, "command socket bound");
    Ok(listener)
}

/// Accept loop; serves connections one at a time and never returns on its own.
///
/// Blocks the calling thread, so run it on a dedicated thread and hand it a
/// handle to the runtime the service lives on.
pub fn serve_commands(
    listener: LocalSocketListener,
    service: Arc<ChessService>,
    runtime: Handle,
) -> io::Result<()> {
    for conn in listener.incoming() {
        match conn {
            Ok(stream) => {
                if let Err(err) = serve_connection(stream, &service, &runtime) {
                    warn!("command connection dropped: {err}");
                }
            }
            Err(err) => warn!("accept failed: {err}"),
        }
    }
    Ok(())
}

fn serve_connection(
    stream: LocalSocketStream,
    service: &ChessService,
    runtime: &Handle,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }
        let reply = runtime.block_on(respond(service, &line));
        let stream = reader.get_mut();
        stream.write_all(format!("{reply}\n").as_bytes())?;
        stream.flush()?;
    }
}

/// Runs one request line and renders the outcome, errors included, as JSON.
pub async fn respond(service: &ChessService, line: &str) -> Value {
    let request = match serde_json::from_str::<Value>(line) {
        Ok(request) => request,
        Err(e) => return json!({ "error": format!("invalid json: {e}") }),
    };
    match service.do_command(&request).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!("command failed: {err}");
            json!({ "error": err.to_string() })
        }
    }
}
