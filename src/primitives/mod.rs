//! Low-level primitives for building the storage engine.
//!
//! Field encoding helpers and the positioned-I/O abstraction every on-disk
//! structure is read and written through.

/// Byte-level utilities and encoding/decoding.
///
/// Native-endian integer fields, bounded string fields, and hex dumps.
pub mod bytes;

/// I/O abstractions and utilities.
///
/// Interfaces for reading/writing data and file operations.
pub mod io;
