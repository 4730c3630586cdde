// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Error types.
//!
//! Conversion routing never produces errors; it reports absent values instead.  The types
//! here cover the places where a caller needs to know *why* something is missing: data
//! access from a mutation hook, hook failures, and the built-in file loader.

use crate::conversion::DataType;
use crate::tiles::CacheKey;

/// Failure to read or write tile data from inside a mutation hook.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DataError {
    #[error("There is no cache available for key {0}")]
    MissingCache(CacheKey),
    #[error("Can't convert {from} to {to}")]
    ConversionImpossible { from: DataType, to: DataType },
    #[error("Can't copy data of type {0}")]
    CopyFailed(DataType),
    #[error("Cache record was already destroyed")]
    Destroyed,
}

/// Failure reported by a [crate::invalidation::MutationHook].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HookError {
    #[error("Data access failed: {0}")]
    Data(#[from] DataError),
    #[error("Hook failed: {0}")]
    Failed(String),
}

/// Failure of the built-in `imageUrl -> image` loader.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LoadError {
    #[error("Can't read {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("PNG of {width}x{height} is too large to decode")]
    TooLarge { width: u32, height: u32 },
    #[error("Can't decode PNG {0}")]
    Decode(#[from] png::DecodingError),
    #[error("Unsupported PNG format {color:?} at depth {depth:?}; only 8-bit RGBA is supported")]
    UnsupportedFormat {
        color: png::ColorType,
        depth: png::BitDepth,
    },
}
