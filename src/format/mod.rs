//! Binary formats inside a MOG file.
//!
//! - [`tiff`]: streaming reader for the TIFF header and IFD chain
//! - [`jpeg`]: reassembly of standalone JPEG tiles from abbreviated payloads

pub mod jpeg;
pub mod tiff;

pub use jpeg::frame_tile;
