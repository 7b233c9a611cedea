//! # lrvsp-core
//!
//! Core types, traits, and encodings for the LRVSP extraction daemon.
//!
//! This crate provides the data model shared by the queue store, the
//! extractors, and the cycle scheduler, plus the error taxonomy every other
//! crate reports through.

pub mod defaults;
pub mod encoding;
pub mod error;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use encoding::{
    decode_metadata, decode_title, encode_links, encode_metadata, encode_title, encoded_len,
    link_fits,
};
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
