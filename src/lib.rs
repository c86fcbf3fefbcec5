//! # Corpsewarden - corpse and last-words proxies for arena games
//!
//! Corpsewarden keeps track of the short-lived stand-ins left behind when a
//! player is eliminated from an arena: a sleeping, skinned corpse figure and an
//! optional floating death message. Each proxy is keyed by the eliminated
//! participant and is removed exactly once, whichever comes first:
//!
//! - its time-to-live runs out,
//! - its arena leaves the running state,
//! - an administrator cleans the arena up,
//! - the service shuts down.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use corpsewarden::backend::memory::MemoryBackend;
//! use corpsewarden::config::Config;
//! use corpsewarden::coordinator::memory::MemoryCoordinator;
//! use corpsewarden::service::ProxyService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("corpsewarden.toml").await?;
//!     let service = ProxyService::new(
//!         config,
//!         Arc::new(MemoryBackend::new()),
//!         Arc::new(MemoryCoordinator::new()),
//!     );
//!     let scheduler = Arc::new(service).start();
//!     scheduler.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`proxy`] - generic keyed registry plus the corpse and death message specializations
//! - [`backend`] - presentation backend port (spawn, decorate, release)
//! - [`coordinator`] - arena coordinator port (context state, participants)
//! - [`bridge`] - reconciles registries against arena state
//! - [`intake`] - elimination eligibility checks
//! - [`scheduler`] - single task driving sweeps and delayed jobs
//! - [`service`] - wiring and the administrative surface
//! - [`host`] - JSON-lines protocol used by the binary
//! - [`config`] - configuration management and validation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Host / Intake   │ ← eliminations, departures, admin commands
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Scheduler     │ ← settle delays, sweeps, reconciliation
//! └─────────────────┘
//!          │
//! ┌─────────────────┐      ┌─────────────────┐
//! │   Registries    │ ───→ │    Backend      │
//! └─────────────────┘      └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  Coordinator    │ ← arena state lookups
//! └─────────────────┘
//! ```

pub mod backend;
pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod host;
pub mod intake;
pub mod logutil;
pub mod metrics;
pub mod proxy;
pub mod scheduler;
pub mod service;
