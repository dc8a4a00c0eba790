//! Shared types for the spectral-GCM postprocessor.
//!
//! This crate holds everything the decoder, transform and derivation
//! crates have in common:
//!
//! - the error taxonomy ([`PostError`])
//! - the assembled dataset contract ([`Dataset`])
//! - the variable-code registry ([`codes::registry`])
//! - planetary constants and run configuration

pub mod codes;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;

pub use codes::{registry, VarDescriptor, VarRegistry};
pub use config::{Interpolation, OutputMode, PostConfig};
pub use constants::PlanetConstants;
pub use dataset::{Dataset, VarMeta, Variable, COORD_NAMES};
pub use error::{PostError, Result};
