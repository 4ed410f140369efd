//! Core domain types
//!
//! This module contains the domain structures used across Gantry crates.
//! The engine owns and mutates run state; every other consumer only sees
//! snapshots, events, and history entries.

pub mod commit;
pub mod event;
pub mod history;
pub mod log;
pub mod run;
pub mod stage;
