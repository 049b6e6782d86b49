//! # Core Module
//!
//! Stateless building blocks shared by every plugin.
//!
//! - **Parameters** ([`params`]) - Named values substituted into templates
//! - **Templating** ([`template`]) - Template rendering and the `expand_element` filter
//! - **Nuclide Data** ([`nuclide`]) - Natural isotopic compositions and the xsdir index
//! - **Results** ([`results`]) - The structured outcome of an invocation and its persistence
//! - **Utilities** ([`utils`]) - Number formatting used by generated inputs

pub mod nuclide;
pub mod params;
pub mod results;
pub mod template;
pub mod utils;
