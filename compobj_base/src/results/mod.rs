//! Result algebra for compliance evaluation

pub mod types;

pub use types::{Algebra, ComplianceStatus};
