//!
//! hostlite-core - Host Runtime Value Model
//!
//! The types the host runtime sees when it calls into hostlite:
//!
//! - `HeapHeader` and `HeapTag` for reference-counted heap objects
//! - `HostString` and `HostBytes` for owned text and binary payloads
//! - `Term` for one dynamically-typed value (nil, int, float, string, bytes)
//! - `HostList` for fixed-length sequences of terms (rows, column names)
//! - The thread-local last-error slot read after a failing call
//!
//! All heap objects use atomic reference counting, so a value produced on
//! one thread may be released on another.
//!

pub mod value;
pub mod term;
pub mod list;
pub mod exception;

pub use value::*;
pub use term::*;
pub use list::*;
pub use exception::*;
