//! # Workflows Module
//!
//! High-level procedures that drive plugins repeatedly.
//!
//! - **Coupled Workflow** ([`coupled`]) - Runs a nested plugin once per parameter set
//!   supplied by an outer optimization or UQ tool, answering with requested responses.
//! - **Handshake** ([`handshake`]) - The parameter and response file formats and the
//!   marker-framed file channel used to exchange them.

pub mod coupled;
pub mod handshake;
