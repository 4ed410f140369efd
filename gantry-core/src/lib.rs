//! Gantry Core
//!
//! Core types for the Gantry pipeline orchestration system.
//!
//! This crate contains the domain entities shared between the engine
//! (which drives runs) and its consumers (CLI, dashboards, history sinks):
//! - Pipeline templates and their stage definitions
//! - Run state and per-stage results
//! - Lifecycle events and the terminal log feed
//! - Persisted run history entries

pub mod domain;
