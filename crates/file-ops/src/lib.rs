//! Filesystem helpers for the server root.
//!
//! Only listing lives here; reading and writing transferred files is the
//! job of `fileferry-transfer`.

mod browse;

pub use browse::{ListError, list_directory};
