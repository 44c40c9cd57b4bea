//! The chess station: high-level operations over the whole pipeline.
//!
//! Operations are serialized behind one lock, and every operation ends with the
//! arm homed, whatever its outcome.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::command::{Command, MoveRequest, Reply};
use crate::config::{ChessConfig, HomingSettings};
use crate::drivers::{GripperDriver, HomingSwitch, ManipulatorDriver, MotionService, SensorCapture};
use crate::engine::{ChessEngine, UciEngine};
use crate::error::{Error, Result};
use crate::executor::MoveExecutor;
use crate::game::{ChessMove, GameStateManager};
use crate::resolver::{CoordinateResolver, Target};
use crate::scanner::BoardScanner;
use crate::snapshot::BoardSnapshot;
use crate::store::{FilePositionStore, PositionStore};

/// Everything one operation needs exclusive access to.
struct Station {
    sensor: Arc<dyn SensorCapture>,
    gripper: Arc<dyn GripperDriver>,
    motion: Arc<dyn MotionService>,
    homing: Arc<dyn HomingSwitch>,
    homing_settings: HomingSettings,
    scanner: BoardScanner,
    executor: MoveExecutor,
    game: GameStateManager,
    /// Set by `close`; every later operation is refused.
    closed: bool,
}

impl Station {
    /// Parks the arm, opens the gripper and re-reads the tool orientation.
    async fn go_home(&mut self) -> Result<()> {
        self.homing
            .set_staging_position(self.homing_settings.staging_slot)
            .await
            .map_err(Error::motion("go to staging position"))?;
        self.gripper.open().await.map_err(Error::motion("open gripper"))?;

        tokio::time::sleep(self.homing_settings.settle()).await;

        let frame = self.executor.settings().reference_frame.clone();
        let pose = self
            .motion
            .current_pose(&frame)
            .await
            .map_err(Error::motion("read gripper pose"))?;
        self.executor.set_reference_theta(pose.orientation.theta);
        Ok(())
    }

    async fn snapshot(&self) -> Result<BoardSnapshot> {
        let capture = self.sensor.capture().await.map_err(Error::Capture)?;
        self.scanner.scan(&capture)
    }

    async fn manual_move(&mut self, request: &MoveRequest) -> Result<()> {
        let from: Target = request.from.parse()?;
        let to: Target = request.to.parse()?;
        info!("move {from} to {to}, {} times", request.repeat_count);

        for i in 0..request.repeat_count {
            self.go_home().await?;
            let (from, to) = if i % 2 == 1 { (to, from) } else { (from, to) };
            let snapshot = self.snapshot().await?;
            self.executor.move_piece(&snapshot, from, to).await?;
        }
        Ok(())
    }

    async fn auto_play(&mut self, count: u32) -> Result<String> {
        if count == 0 {
            return Err(Error::Command("play count must be at least 1".to_string()));
        }
        let mut last = None;
        for _ in 0..count {
            last = Some(self.play_one().await?);
        }
        Ok(last.map(|mv| mv.uci()).unwrap_or_default())
    }

    /// Picks, physically plays and records one move.
    async fn play_one(&mut self) -> Result<ChessMove> {
        let position = self.game.load()?;
        let mv = self.game.pick_move(&position).await?;

        self.go_home().await?;
        let snapshot = self.snapshot().await?;
        self.executor
            .move_piece(&snapshot, mv.from.into(), mv.to.into())
            .await?;

        let next = self.game.apply_move(&position, &mv)?;
        self.game.save(&next)?;
        info!(%mv, fen = %next, "move played");
        Ok(mv)
    }
}

/// Serialized front door to the chess station.
pub struct ChessService {
    station: Mutex<Station>,
}

impl ChessService {
    pub fn builder(config: ChessConfig) -> ChessServiceBuilder {
        ChessServiceBuilder::new(config)
    }

    /// Toggles a piece between two squares `repeat_count` times.
    pub async fn manual_move(&self, from: &str, to: &str, repeat_count: u32) -> Result<()> {
        let request = MoveRequest {
            from: from.to_string(),
            to: to.to_string(),
            repeat_count,
        };
        self.execute(Ok(Command::Move(request))).await.map(|_| ())
    }

    /// Plays `count` moves; returns the last one in UCI notation.
    pub async fn auto_play(&self, count: u32) -> Result<String> {
        match self.execute(Ok(Command::Play(count))).await? {
            Reply::Played(mv) => Ok(mv),
            Reply::Moved => Ok(String::new()),
        }
    }

    /// Runs a JSON command (`{"move": {...}}` or `{"play": n}`) and returns the JSON reply.
    pub async fn do_command(&self, request: &Value) -> Result<Value> {
        self.execute(Command::parse(request))
            .await
            .map(|reply| reply.to_json())
    }

    async fn execute(&self, command: Result<Command>) -> Result<Reply> {
        let mut station = self.station.lock().await;
        if station.closed {
            return Err(Error::Closed);
        }

        let result = match command {
            Ok(Command::Move(request)) => {
                station.manual_move(&request).await.map(|()| Reply::Moved)
            }
            Ok(Command::Play(count)) => station.auto_play(count).await.map(Reply::Played),
            Err(err) => Err(err),
        };

        if let Err(err) = station.go_home().await {
            warn!("can't go home: {err}");
        }
        result
    }

    /// Stops the engine. Every later operation fails with [`Error::Closed`];
    /// closing again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut station = self.station.lock().await;
        if station.closed {
            return Ok(());
        }
        station.closed = true;
        info!("closing chess service");
        station.game.shutdown().await
    }
}

pub struct ChessServiceBuilder {
    config: ChessConfig,
    sensor: Option<Arc<dyn SensorCapture>>,
    manipulator: Option<Arc<dyn ManipulatorDriver>>,
    gripper: Option<Arc<dyn GripperDriver>>,
    motion: Option<Arc<dyn MotionService>>,
    homing: Option<Arc<dyn HomingSwitch>>,
    store: Option<Box<dyn PositionStore>>,
    engine: Option<Box<dyn ChessEngine>>,
}

impl ChessServiceBuilder {
    pub fn new(config: ChessConfig) -> Self {
        Self {
            config,
            sensor: None,
            manipulator: None,
            gripper: None,
            motion: None,
            homing: None,
            store: None,
            engine: None,
        }
    }

    pub fn sensor(mut self, sensor: Arc<dyn SensorCapture>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn manipulator(mut self, manipulator: Arc<dyn ManipulatorDriver>) -> Self {
        self.manipulator = Some(manipulator);
        self
    }

    pub fn gripper(mut self, gripper: Arc<dyn GripperDriver>) -> Self {
        self.gripper = Some(gripper);
        self
    }

    pub fn motion(mut self, motion: Arc<dyn MotionService>) -> Self {
        self.motion = Some(motion);
        self
    }

    pub fn homing(mut self, homing: Arc<dyn HomingSwitch>) -> Self {
        self.homing = Some(homing);
        self
    }

    /// Replaces the default `fen.txt` store in the data directory.
    pub fn store(mut self, store: impl PositionStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Uses this engine instead of spawning the configured one.
    pub fn engine(mut self, engine: impl ChessEngine + 'static) -> Self {
        self.engine = Some(Box::new(engine));
        self
    }

    /// Checks the config and collaborators, starts the engine and homes the arm once.
    pub async fn build(self) -> Result<ChessService> {
        let config = self.config;
        config.validate()?;

        let need = |what: &str| Error::Config(format!("need a {what}"));
        let sensor = self.sensor.ok_or_else(|| need("sensor"))?;
        let manipulator = self.manipulator.ok_or_else(|| need("manipulator"))?;
        let gripper = self.gripper.ok_or_else(|| need("gripper"))?;
        let motion = self.motion.ok_or_else(|| need("motion service"))?;
        let homing = self.homing.ok_or_else(|| need("homing switch"))?;

        let store = match self.store {
            Some(store) => store,
            None => {
                let store = FilePositionStore::in_dir(&config.data_dir);
                info!(path = %store.path().display(), "position file");
                Box::new(store)
            }
        };

        let move_time = config.engine.clone().unwrap_or_default().move_time();
        let engine = match (self.engine, &config.engine) {
            (Some(engine), _) => Some(engine),
            (None, Some(settings)) => {
                Some(Box::new(UciEngine::spawn(settings).await?) as Box<dyn ChessEngine>)
            }
            (None, None) => None,
        };

        let executor = MoveExecutor::new(
            motion.clone(),
            manipulator,
            gripper.clone(),
            CoordinateResolver::new(config.discard_point),
            config.motion.clone(),
        );

        let mut station = Station {
            sensor,
            gripper,
            motion,
            homing,
            homing_settings: config.homing.clone(),
            scanner: BoardScanner::new(config.scanner),
            executor,
            game: GameStateManager::new(store, engine, move_time),
            closed: false,
        };
        station.go_home().await?;

        Ok(ChessService {
            station: Mutex::new(station),
        })
    }
}
