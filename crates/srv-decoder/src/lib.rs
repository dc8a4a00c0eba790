//! Decoder for the model's Fortran-sequential binary output.
//!
//! The model writes its state as a stream of self-describing records
//! with no declared byte order or word width. This crate sniffs the
//! encoding, reads the length-framed records, and reshapes each
//! variable's concatenated samples into its true multi-dimensional form.

pub mod decode;
pub mod reader;

pub use decode::{decode, refactor_variable, Grid, RawFile, RawVariable, TIME_MARKER_CODE};
pub use reader::{ByteOrder, Encoding, Record, RecordReader, WordWidth, HEADER_WORDS};
