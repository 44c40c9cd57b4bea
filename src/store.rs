//! Durable storage for the current position.
//!
//! Exactly one FEN string is kept. An absent record means no game has been
//! played yet and is not an error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, Result};

/// Default file name of the position inside the data directory.
pub const POSITION_FILE: &str = "fen.txt";

const POSITION_TREE: &str = "position";
const POSITION_KEY: &str = "fen";

pub trait PositionStore: Send + Sync {
    /// Stored FEN, or `None` when nothing was stored yet.
    fn read(&self) -> Result<Option<String>>;

    fn write(&self, fen: &str) -> Result<()>;

    /// Human-readable location, used in errors and logs.
    fn location(&self) -> String;
}

impl<T: PositionStore + ?Sized> PositionStore for Arc<T> {
    fn read(&self) -> Result<Option<String>> {
        (**self).read()
    }

    fn write(&self, fen: &str) -> Result<()> {
        (**self).write(fen)
    }

    fn location(&self) -> String {
        (**self).location()
    }
}

/// A single text file.
#[derive(Debug, Clone)]
pub struct FilePositionStore {
    path: PathBuf,
}

impl FilePositionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `fen.txt` inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(POSITION_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persistence_error(&self, err: io::Error) -> Error {
        Error::Persistence {
            location: self.location(),
            reason: err.to_string(),
        }
    }
}

impl PositionStore for FilePositionStore {
    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self.persistence_error(err)),
        }
    }

    fn write(&self, fen: &str) -> Result<()> {
        fs::write(&self.path, fen).map_err(|err| self.persistence_error(err))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// The position kept under one key of an embedded sled database.
pub struct SledPositionStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledPositionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| Error::Persistence {
            location: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_db(db)
    }

    /// Uses an already-open database, e.g. one shared with the host process.
    pub fn from_db(db: sled::Db) -> Result<Self> {
        let tree = db.open_tree(POSITION_TREE).map_err(sled_error)?;
        Ok(Self { db, tree })
    }
}

fn sled_error(e: sled::Error) -> Error {
    Error::Persistence {
        location: format!("sled tree {POSITION_TREE}"),
        reason: e.to_string(),
    }
}

impl PositionStore for SledPositionStore {
    fn read(&self) -> Result<Option<String>> {
        let Some(value) = self.tree.get(POSITION_KEY).map_err(sled_error)? else {
            return Ok(None);
        };
        // Undecodable bytes are handed on so the caller reports them as a corrupt position.
        Ok(Some(String::from_utf8_lossy(&value).into_owned()))
    }

    fn write(&self, fen: &str) -> Result<()> {
        self.tree
            .insert(POSITION_KEY, fen.as_bytes())
            .map_err(sled_error)?;
        self.tree.flush().map_err(sled_error)?;
        Ok(())
    }

    fn location(&self) -> String {
        format!("sled tree {POSITION_TREE}/{POSITION_KEY}")
    }
}

impl Drop for SledPositionStore {
    fn drop(&mut self) {
        if let Err(err) = self.db.flush() {
            warn!("failed to flush position store on drop: {err}");
        }
    }
}

impl std::fmt::Debug for SledPositionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledPositionStore")
            .field("location", &self.location())
            .field("was_recovered", &self.db.was_recovered())
            .finish()
    }
}
