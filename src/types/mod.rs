//! Shared types

pub mod error;
pub mod value;

pub use error::{Result, StatsError};
pub use value::{ReportValue, ResultKind, Row};
