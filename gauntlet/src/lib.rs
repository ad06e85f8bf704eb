//! `Gauntlet` - timed, multi-stage terminal challenge
//!
//! A candidate identifies by email, then works through a fixed sequence of
//! puzzles against a global time budget. Each concluded run is recorded
//! once; a win also sends a signed completion link.

pub mod background;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod observability;
pub mod presentation;
pub mod server;
pub mod session;
pub mod step;
pub mod storage;
pub mod transport;
