// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # pounce-engine
//!
//! A compiler and cooperative scheduler for Scratch-style block scripts.
//!
//! ## Overview
//!
//! This crate provides:
//! - A project model deserialized from `project.json` block graphs
//! - A compiler from block graphs to structured IR, split into continuations
//!   at every point where a script may yield
//! - A single-threaded, frame-stepped scheduler with warp mode, procedure
//!   calls, broadcasts and clones
//! - A [`Host`] trait for rendering, audio and input, with a headless
//!   implementation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pounce_engine::{Engine, HeadlessHost, PlayerOptions};
//!
//! let text = std::fs::read_to_string("project.json")?;
//! let mut engine = Engine::from_json(&text, PlayerOptions::default(), Box::new(HeadlessHost::new()))?;
//! engine.green_flag();
//! engine.run_frames(30)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compiler;
pub mod config;
pub mod project;
pub mod runtime;
pub mod vm;

#[cfg(feature = "async")]
pub mod async_engine;

use std::fmt::Write as _;

pub use compiler::{EventKey, ScriptTable};
pub use config::PlayerOptions;
pub use project::Project;
pub use runtime::host::{HeadlessHost, Host};
pub use runtime::target::{Target, TargetId};
pub use runtime::thread::GroupId;
pub use runtime::value::Value;
pub use vm::{Clock, Runtime};

#[cfg(feature = "async")]
pub use async_engine::AsyncEngine;
#[cfg(all(feature = "async", feature = "parallel"))]
pub use async_engine::ParallelCompiler;

use compiler::ir::Listing;

/// Errors raised while loading, compiling or running a project.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The block graph is malformed.
    #[error("invalid project: {0}")]
    Project(String),
    /// The project text is not valid JSON.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// Reading a file failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Player options are invalid.
    #[error("config: {0}")]
    Config(String),
    /// The compiler produced something it should not have.
    #[error("internal compiler error: {0}")]
    Internal(String),
    /// A thread hit an impossible state.
    #[error("runtime: {0}")]
    Runtime(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Compiles every target of a project, in project order.
pub fn compile_project(project: &Project) -> Result<Vec<ScriptTable>> {
    let stage = project.stage();
    project
        .targets
        .iter()
        .map(|target| {
            let globals = if target.is_stage { None } else { stage };
            compiler::compile_target(target, globals)
        })
        .collect()
}

/// A loaded project and its runtime.
///
/// Wraps the [`Runtime`] with project loading, event shortcuts and a run
/// loop that halts on the first error.
#[derive(Debug)]
pub struct Engine {
    runtime: Runtime,
}

impl Engine {
    /// Compiles and loads a project.
    pub fn new(project: &Project, options: PlayerOptions, host: Box<dyn Host>) -> Result<Self> {
        let tables = compile_project(project)?;
        Self::with_tables(project, tables, options, host)
    }

    /// Parses, compiles and loads `project.json` text.
    pub fn from_json(text: &str, options: PlayerOptions, host: Box<dyn Host>) -> Result<Self> {
        let project = Project::from_json(text)?;
        Self::new(&project, options, host)
    }

    /// Loads a project compiled elsewhere, one table per target.
    pub fn with_tables(
        project: &Project,
        tables: Vec<ScriptTable>,
        options: PlayerOptions,
        host: Box<dyn Host>,
    ) -> Result<Self> {
        let options = options.validate()?;
        let runtime = Runtime::new(project, tables, options, host)?;
        tracing::debug!(targets = project.targets.len(), "loaded project");
        Ok(Self { runtime })
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Stops everything and fires the green flag.
    pub fn green_flag(&mut self) -> GroupId {
        self.runtime.green_flag()
    }

    /// Fires any event.
    pub fn trigger(&mut self, event: &EventKey) -> GroupId {
        self.runtime.trigger(event)
    }

    /// Broadcasts a message.
    pub fn broadcast(&mut self, message: &str) -> GroupId {
        self.runtime.trigger(&EventKey::message(message))
    }

    /// Fires the key-pressed hats for `key`.
    pub fn press_key(&mut self, key: &str) -> GroupId {
        self.runtime.trigger(&EventKey::key(key))
    }

    /// Clicks a sprite or the stage by name.
    pub fn click(&mut self, name: &str) -> Option<GroupId> {
        let id = self.runtime.find(name)?.id;
        Some(self.runtime.trigger_for(id, &EventKey::Clicked))
    }

    // ========================================================================
    // Running
    // ========================================================================

    /// Runs one frame.
    pub fn step(&mut self) -> Result<()> {
        self.runtime.step()
    }

    /// Runs `frames` frames, halting every thread on the first error.
    pub fn run_frames(&mut self, frames: u64) -> Result<()> {
        for _ in 0..frames {
            self.step_or_halt()?;
        }
        Ok(())
    }

    /// Steps until no thread is queued or `max_frames` ran. Returns the
    /// number of frames run.
    pub fn run_until_idle(&mut self, max_frames: u64) -> Result<u64> {
        let mut frames = 0;
        while frames < max_frames && !self.runtime.is_idle() {
            self.step_or_halt()?;
            frames += 1;
        }
        Ok(frames)
    }

    fn step_or_halt(&mut self) -> Result<()> {
        if let Err(err) = self.runtime.step() {
            tracing::error!(%err, frame = self.runtime.frame(), "halting run");
            self.runtime.halt();
            return Err(err);
        }
        Ok(())
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// The runtime.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The runtime, mutably.
    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    /// A variable of the named sprite (falling back to the stage's globals),
    /// or of the stage when `target` is `None`.
    pub fn variable(&self, target: Option<&str>, name: &str) -> Option<Value> {
        let stage = self.runtime.stage();
        let owner = match target {
            Some(target) => self.runtime.find(target),
            None => stage,
        };
        owner
            .and_then(|t| t.variables.get(name))
            .or_else(|| stage.and_then(|s| s.variables.get(name)))
            .cloned()
    }

    /// A list of the named sprite or, with `None`, of the stage.
    pub fn list(&self, target: Option<&str>, name: &str) -> Option<&[Value]> {
        let owner = match target {
            Some(target) => self.runtime.find(target),
            None => self.runtime.stage(),
        };
        owner.and_then(|t| t.list(name)).map(Vec::as_slice)
    }

    /// Renders every compiled continuation and procedure.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for target in self.runtime.targets().filter(|t| !t.is_clone()) {
            let _ = writeln!(out, "== {} ==", target.name);
            for procedure in &target.scripts.procedures {
                let warp = if procedure.warp { " (warp)" } else { "" };
                let _ = writeln!(out, "procedure {:?} -> {}{}", procedure.proccode, procedure.entry, warp);
            }
            for continuation in &target.scripts.continuations {
                let _ = writeln!(out, "{}:", continuation.label);
                let _ = write!(out, "{}", Listing(&continuation.body));
            }
        }
        out
    }
}
