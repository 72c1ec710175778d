//! Utilities module
//!
//! Contains error handling and logging support

pub mod error;
pub mod logging;
