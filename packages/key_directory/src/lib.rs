//! Identity directory: unique usernames mapped to opaque public keys.
//!
//! Keys are stored verbatim. The directory never inspects them, and a
//! registered key cannot be replaced or removed for the lifetime of the
//! directory.

pub mod directory;
pub mod error;

pub use directory::{Directory, Identity};
pub use error::{DirectoryError, ErrorResponse, Field};
