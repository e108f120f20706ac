//! Host checks performed before the sandbox helper is invoked.
//!
//! This module answers one question: can the configured helper binary be
//! executed? See [`ensure_executable`].

mod binary;

pub use binary::{
    BinaryValidator, ensure_executable, ensure_executable_in, find_in_path, is_executable,
};
