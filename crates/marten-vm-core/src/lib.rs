//! # Marten VM Core
//!
//! Array value core for the Marten VM: a variable-length, type-specialized
//! container backing arrays and tuples of the language at execution time.
//!
//! ## Design Principles
//!
//! - **Specialized storage**: one contiguous buffer per element kind
//!   (int/boolean/byte/float/string), boxed references only for everything
//!   else, so scalar arrays never box their elements
//! - **Thread-safe**: values are `Send + Sync`; the freeze check and the
//!   mutation it guards form a single critical section
//! - **Fail-fast**: bounds and freeze violations are reported before any
//!   backend mutation, so operations either fully succeed or have no effect

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod array;
pub mod error;
pub mod freeze;
pub mod value;

pub use array::{ArrayRef, ArrayValue, StorageKind, DEFAULT_ARRAY_SIZE, MAX_ARRAY_SIZE};
pub use error::{ValueError, ValueResult};
pub use freeze::{FreezeState, FreezeStatus};
pub use value::Value;
