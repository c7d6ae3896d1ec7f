//! # Polis World Server
//!
//! Headless host for a persistent world.
//!
//! Loads the game data and world seed, then drives the queue and movement
//! ticks of [`polis_core`] on fixed intervals. Completed work is
//! republished as [`scheduler::SimEvent`]s and keeps the city view cache
//! of [`observer::CityObserver`] fresh.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod observer;
pub mod scheduler;
pub mod world;

pub use config::{load_game_data, ConfigError, ServerConfig};
