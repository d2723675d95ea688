//! Common types, traits, and error definitions for path_optimizer
//!
//! This module provides the foundational building blocks shared by the
//! reference path, the optimizer and the concrete collaborators.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
