//! Asynchronous engine APIs.
//!
//! This module provides async/await compatible APIs for the engine:
//! non-blocking project loading and a run loop paced by the player's frame
//! rate, so a host can drive the engine from a tokio task.
//!
//! # Features
//!
//! - Async project loading with [`AsyncEngine::load`]
//! - Concurrent loading of several projects
//! - A frame-paced run loop
//! - Parallel compilation of targets with [`ParallelCompiler`]
//!
//! # Example
//!
//! ```ignore
//! use pounce_engine::{AsyncEngine, HeadlessHost, PlayerOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = AsyncEngine::load("project.json", PlayerOptions::default(), Box::new(HeadlessHost::new()))
//!         .await
//!         .unwrap();
//!     engine.green_flag().await;
//!     engine.run(Some(300)).await.unwrap();
//! }
//! ```

use tokio::fs;
use tokio::sync::RwLock;
use tokio::time::{Duration, MissedTickBehavior};

use std::path::Path;
use std::sync::Arc;

use crate::project::Project;
use crate::runtime::host::Host;
use crate::runtime::thread::GroupId;
use crate::vm::Clock;
use crate::{Engine, Error, PlayerOptions, Result};

/// An engine shared between tasks.
///
/// Every method takes the lock for as long as it needs it, so events can be
/// fired from one task while another runs the frame loop.
#[derive(Debug, Clone)]
pub struct AsyncEngine {
    engine: Arc<RwLock<Engine>>,
}

impl AsyncEngine {
    /// Wraps a loaded engine. The engine keeps its clock.
    pub fn new(engine: Engine) -> Self {
        Self { engine: Arc::new(RwLock::new(engine)) }
    }

    /// Reads, compiles and loads a project file. The loaded engine runs on
    /// wall-clock time.
    pub async fn load(
        path: impl AsRef<Path>,
        options: PlayerOptions,
        host: Box<dyn Host>,
    ) -> Result<Self> {
        let project = Self::read_project(path.as_ref()).await?;
        let mut engine = Engine::new(&project, options, host)?;
        engine.runtime_mut().set_clock(Clock::real_time());
        Ok(Self::new(engine))
    }

    /// Reads and parses a project file without compiling it.
    pub async fn read_project(path: &Path) -> Result<Project> {
        let text = fs::read_to_string(path).await.map_err(|e| {
            Error::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
        })?;
        Project::from_json(&text)
    }

    /// Reads several project files concurrently, in argument order.
    pub async fn read_projects(paths: &[impl AsRef<Path>]) -> Vec<Result<Project>> {
        let futures: Vec<_> = paths.iter().map(|p| Self::read_project(p.as_ref())).collect();

        futures::future::join_all(futures).await
    }

    /// Handle to the shared engine.
    pub fn engine(&self) -> Arc<RwLock<Engine>> {
        Arc::clone(&self.engine)
    }

    /// Fires the green flag.
    pub async fn green_flag(&self) -> GroupId {
        self.engine.write().await.green_flag()
    }

    /// Broadcasts a message.
    pub async fn broadcast(&self, message: &str) -> GroupId {
        self.engine.write().await.broadcast(message)
    }

    /// Runs one frame per tick of the player's frame rate until no thread
    /// is queued or `max_frames` ran. Returns the number of frames run.
    ///
    /// The first error halts every thread and ends the loop.
    pub async fn run(&self, max_frames: Option<u64>) -> Result<u64> {
        let period = self.engine.read().await.runtime().options.frame_budget();
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut frames = 0;
        loop {
            interval.tick().await;
            let mut engine = self.engine.write().await;
            if engine.runtime().is_idle() || max_frames.is_some_and(|max| frames >= max) {
                break;
            }
            engine.run_frames(1)?;
            frames += 1;
        }
        tracing::debug!(frames, "run loop finished");
        Ok(frames)
    }
}

/// Compiles the targets of a project on a thread pool.
#[cfg(feature = "parallel")]
pub struct ParallelCompiler {
    /// Thread pool for CPU-bound work
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl ParallelCompiler {
    /// Creates a compiler with the default number of threads.
    pub fn new() -> Result<Self> {
        Self::build(rayon::ThreadPoolBuilder::new())
    }

    /// Creates a compiler with a specific number of threads.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        Self::build(rayon::ThreadPoolBuilder::new().num_threads(num_threads))
    }

    fn build(builder: rayon::ThreadPoolBuilder) -> Result<Self> {
        let pool = builder
            .build()
            .map_err(|e| Error::Internal(format!("failed to create thread pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Compiles every target, returning tables in project order.
    pub fn compile(&self, project: &Project) -> Result<Vec<crate::ScriptTable>> {
        use rayon::prelude::*;

        let stage = project.stage();
        self.pool.install(|| {
            project
                .targets
                .par_iter()
                .map(|target| {
                    let globals = if target.is_stage { None } else { stage };
                    crate::compiler::compile_target(target, globals)
                })
                .collect()
        })
    }
}
