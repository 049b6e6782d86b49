//! # Engine Module
//!
//! Runs a single plugin invocation from parameters to [`Results`](crate::core::results::Results).
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Plugin settings, environment snapshot and command templates
//! - **Workspace** ([`workspace`]) - Uniquely named scratch directories with guaranteed cleanup
//! - **Process Runner** ([`process`]) - Executable resolution and child process supervision
//! - **State Tracking** ([`state`]) - The invocation state machine
//! - **Progress Monitoring** ([`progress`]) - Progress events for front ends
//! - **Collection** ([`collector`], [`postprocess`]) - Output enumeration and parsing
//! - **Plugins** ([`plugin`]) - The shared lifecycle that ties the above together
//! - **Error Handling** ([`error`]) - The invocation error taxonomy

pub mod collector;
pub mod config;
pub mod error;
pub mod plugin;
pub mod postprocess;
pub mod process;
pub mod progress;
pub mod state;
pub mod workspace;
