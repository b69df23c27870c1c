//! Domain types shared by every hyperflow crate.

pub mod domain;
mod error;

pub use domain::*;
pub use error::CoreError;
