//! Field processing: derived variables, coordinate remapping, time
//! resampling and dataset assembly.
//!
//! [`service::Postprocessor`] is the top-level entry point: it decodes
//! a raw model file, derives the requested quantities through
//! [`derive::DeriveContext`], brings every field to the configured
//! horizontal representation and returns the assembled dataset.
//! [`resample::TimeResampler`] then reshapes the time axis on demand.

pub mod derive;
pub mod physics;
pub mod remap;
pub mod resample;
pub mod service;

pub use derive::{DeriveContext, DerivedQuantity};
pub use remap::{CoordinateRemapper, SubstellarRemapper};
pub use resample::{ResampleSpec, TimeResampler};
pub use service::Postprocessor;
