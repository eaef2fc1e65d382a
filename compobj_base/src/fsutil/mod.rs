//! Filesystem primitives used by the file-editing rule types
//!
//! - [`replace_file`] - temp file in the same directory, metadata copy, rename
//! - [`backup_file`] - timestamped copy of a file before it is rewritten
//! - [`parse_mode`] - permission bits given as octal digits or an octal string

pub mod atomic;
pub mod backup;
pub mod mode;

pub use atomic::{ensure_parent, replace_file};
pub use backup::{backup_file, backup_name};
pub use mode::{deserialize_mode, format_mode, parse_mode};
