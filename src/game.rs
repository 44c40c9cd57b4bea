//! Logical game state and move selection.

use std::fmt;
use std::time::Duration;

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, CastlingSide, Chess, EnPassantMode, Position as _, Role, Square};
use tracing::{info, warn};

use crate::engine::ChessEngine;
use crate::error::{Error, Result};
use crate::store::PositionStore;

/// A full game position, exchanged as FEN.
#[derive(Debug, Clone, Default)]
pub struct Position(Chess);

impl Position {
    /// The standard starting position.
    pub fn starting() -> Self {
        Self::default()
    }

    pub fn from_fen(text: &str) -> Result<Self, String> {
        let fen: Fen = text.trim().parse().map_err(|e| format!("{e}"))?;
        let pos: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| format!("{e}"))?;
        Ok(Self(pos))
    }

    pub fn fen(&self) -> String {
        Fen::from_position(self.0.clone(), EnPassantMode::Legal).to_string()
    }

    /// Legal moves in generation order.
    pub fn legal_moves(&self) -> Vec<ChessMove> {
        self.0
            .legal_moves()
            .into_iter()
            .filter_map(ChessMove::from_raw)
            .collect()
    }

    pub fn chess(&self) -> &Chess {
        &self.0
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.fen() == other.fen()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen())
    }
}

/// Special move kinds; plain moves and captures carry no tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTag {
    KingSideCastle,
    QueenSideCastle,
    EnPassant,
    Promotion(Role),
}

impl MoveTag {
    /// Why the arm can't carry out a move with this tag.
    fn unsupported_reason(self) -> &'static str {
        match self {
            MoveTag::KingSideCastle | MoveTag::QueenSideCastle => "castling moves two pieces",
            MoveTag::EnPassant => "en passant captures a pawn off the destination square",
            MoveTag::Promotion(_) => "promotion needs a replacement piece",
        }
    }
}

/// A legal move; castling is expressed by the king's squares (`e1g1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChessMove {
    pub from: Square,
    pub to: Square,
    pub tag: Option<MoveTag>,
    raw: shakmaty::Move,
}

impl ChessMove {
    fn from_raw(raw: shakmaty::Move) -> Option<Self> {
        let UciMove::Normal { from, to, .. } = raw.to_uci(CastlingMode::Standard) else {
            return None;
        };
        let tag = match &raw {
            shakmaty::Move::Castle { .. } => match raw.castling_side() {
                Some(CastlingSide::KingSide) => Some(MoveTag::KingSideCastle),
                _ => Some(MoveTag::QueenSideCastle),
            },
            shakmaty::Move::EnPassant { .. } => Some(MoveTag::EnPassant),
            shakmaty::Move::Normal {
                promotion: Some(role),
                ..
            } => Some(MoveTag::Promotion(*role)),
            _ => None,
        };
        Some(Self { from, to, tag, raw })
    }

    /// UCI text, e.g. `e2e4`.
    pub fn uci(&self) -> String {
        self.raw.to_uci(CastlingMode::Standard).to_string()
    }
}

impl fmt::Display for ChessMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uci())
    }
}

/// Loads and saves the position and chooses the next move.
pub struct GameStateManager {
    store: Box<dyn PositionStore>,
    engine: Option<Box<dyn ChessEngine>>,
    move_time: Duration,
}

impl GameStateManager {
    pub fn new(
        store: Box<dyn PositionStore>,
        engine: Option<Box<dyn ChessEngine>>,
        move_time: Duration,
    ) -> Self {
        Self {
            store,
            engine,
            move_time,
        }
    }

    /// Stored position, or the starting position when nothing is stored yet.
    pub fn load(&self) -> Result<Position> {
        let Some(text) = self.store.read()? else {
            info!(store = %self.store.location(), "no stored position, starting a new game");
            return Ok(Position::starting());
        };
        Position::from_fen(&text).map_err(|reason| Error::CorruptPosition {
            location: self.store.location(),
            contents: text.trim().to_string(),
            reason,
        })
    }

    pub fn save(&self, position: &Position) -> Result<()> {
        self.store.write(&position.fen())
    }

    /// Chooses the next move and refuses kinds of moves the arm can't carry out.
    ///
    /// Without an engine this is the first legal move, which keeps offline runs
    /// reproducible.
    #[tracing::instrument(skip_all, fields(fen = %position))]
    pub async fn pick_move(&mut self, position: &Position) -> Result<ChessMove> {
        let mv = match self.engine.as_mut() {
            None => position
                .legal_moves()
                .into_iter()
                .next()
                .ok_or_else(|| Error::GameOver(position.fen()))?,
            Some(engine) => {
                if position.legal_moves().is_empty() {
                    return Err(Error::GameOver(position.fen()));
                }
                engine.submit_position(position).await?;
                let uci = engine.best_move(self.move_time).await?;
                let raw = uci.to_move(position.chess()).map_err(|e| Error::IllegalMove {
                    mv: uci.to_string(),
                    reason: e.to_string(),
                })?;
                ChessMove::from_raw(raw).ok_or_else(|| Error::IllegalMove {
                    mv: uci.to_string(),
                    reason: "not a board move".to_string(),
                })?
            }
        };

        if let Some(tag) = mv.tag {
            warn!(%mv, ?tag, "rejecting move");
            return Err(Error::UnsupportedMove {
                mv: mv.uci(),
                reason: tag.unsupported_reason(),
            });
        }
        info!(%mv, "picked move");
        Ok(mv)
    }

    /// Position after `mv`; call only once the piece has physically moved.
    pub fn apply_move(&self, position: &Position, mv: &ChessMove) -> Result<Position> {
        position
            .0
            .clone()
            .play(&mv.raw)
            .map(Position)
            .map_err(|e| Error::IllegalMove {
                mv: mv.uci(),
                reason: e.to_string(),
            })
    }

    /// Stops the engine process, if there is one.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.engine.take() {
            Some(mut engine) => engine.quit().await,
            None => Ok(()),
        }
    }
}
