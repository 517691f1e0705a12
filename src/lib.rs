//! bgproc - background process supervisor
//!
//! Spawns shell commands as supervised background processes, captures their
//! output to per-process log files, and exposes them to an agent tool surface
//! and a terminal dashboard.

// Core modules (config, events, logs)
pub mod core;
// Process supervision
pub mod process;
// Agent-facing tool handlers
pub mod tools;
// Dashboard application state
pub mod app;
// Terminal UI rendering
pub mod ui;
