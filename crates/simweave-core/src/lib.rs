//! # SimWeave Core Library
//!
//! A plugin execution and templating engine for coupling pre-existing simulation
//! codes into reproducible workflows. A plugin renders a parameterized template
//! into a concrete input file, runs the external executable against it in an
//! isolated workspace, and collects its outputs into a structured [`Results`](core::results::Results).
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data and pure transforms: the
//!   parameter store, the template renderer with its natural-element expansion
//!   filter, nuclide tables, and the persisted result model.
//!
//! - **[`engine`]: The Execution Core.** The stateful layer that runs one plugin
//!   invocation: configuration, scoped workspaces, the process runner, the
//!   invocation state machine and the result collector.
//!
//! - **[`workflows`]: The Public API.** Higher-level procedures built from
//!   plugins, such as coupling a plugin to an outer optimization tool through a
//!   file handshake.

pub mod core;
pub mod engine;
pub mod workflows;
