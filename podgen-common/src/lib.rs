//! # PodGen Common Library
//!
//! Shared code for PodGen services including:
//! - Progress event types (ProgressEvent, ProgressStep)
//! - The in-process progress bus
//! - Server-Sent Events framing and subscription lifecycle
//! - Common error and time utilities

pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use events::{ProgressBus, ProgressEvent, ProgressStep};
