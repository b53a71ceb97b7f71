//! ic10lab Reference Engine
//!
//! A small deterministic engine for programmable-chip environments. It
//! implements the [`Engine`](ic10lab_env::Engine) contract so the session
//! controller can drive it, and backs the `ic10lab` CLI.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimSession                          │
//! │  ┌──────────┐   ┌──────────┐                                │
//! │  │ Runner 1 │   │ Runner 2 │   ...   (ascending chip id)    │
//! │  │ sandbox  │   │ sandbox  │                                │
//! │  │ live     │   │ live     │                                │
//! │  └────┬─────┘   └────┬─────┘                                │
//! │       │  s / l       │                                      │
//! │  ┌────▼──────────────▼─────────────────────┐                │
//! │  │ SimWorld (device props, network channels)│               │
//! │  └─────────────────────────────────────────┘                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ic10lab_core::{LabConfig, SessionController};
//! use ic10lab_sim::{SampleId, SimEngine};
//!
//! let controller = SessionController::open(SimEngine::new(), LabConfig::default())?;
//! controller.edit(SampleId::Counter.yaml());
//! controller.load().await;
//! controller.run(Some(10)).await;
//! ```

mod engine;
mod program;
mod runner;
mod session;
mod world;
pub mod commands;
pub mod scenarios;

pub use engine::{SimEngine, DEFAULT_SEED};
pub use program::{Instruction, Line, Program, Target};
pub use runner::SimRunner;
pub use scenarios::SampleId;
pub use session::SimSession;
pub use world::SimWorld;
