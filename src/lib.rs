#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Moonhowl Server
//!
//! Server-side orchestration core for a multiplayer werewolf
//! social-deduction game: the phase state machine, the action pipeline,
//! death resolution, win checking, voting, per-viewer information
//! filtering and room lifecycle management.
//!
//! Transport, authentication and voice infrastructure live outside this
//! crate; the engine consumes authenticated `(user_id, room_id)` pairs and
//! publishes typed events.

/// Event fan-out to connected clients
pub mod broadcast;

/// Server configuration and environment variables
pub mod config;

/// Engine entry point: start, actions, state, phases
pub mod engine;

/// Typed errors crossing the engine boundary
pub mod error;

/// Pure game rules: deaths, wins, votes, views
pub mod game;

/// Background room lifecycle cleaner
pub mod lifecycle;

/// Structured logging configuration
pub mod logging;

/// Core data model and event payloads
pub mod protocol;

/// Per-session phase timers
pub mod scheduler;

/// Storage abstraction (in-memory implementation)
pub mod store;
