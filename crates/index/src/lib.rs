// Path: crates/index/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! Secondary indexes over an embedded ordered byte-map.
//!
//! Four redb databases map alert metadata to candidate ids and candidate ids
//! to blob URLs: `candidates` (8-byte big-endian candid → URL), `objects`
//! (object id → packed candid list), `timestamps` (8-byte big-endian unix-ns
//! → packed candid list) and `healpixels` (8-byte big-endian nested pixel id
//! → packed candid list). Big-endian keys make numeric order and
//! lexicographic order coincide, so time-range and cone queries are plain
//! forward range scans.

pub mod bytes;
pub mod engine;
pub mod error;
pub mod healpix;

pub use engine::IndexEngine;
pub use error::IndexError;
pub use healpix::{PixelMapper, PixelRange, DEFAULT_ORDER};
