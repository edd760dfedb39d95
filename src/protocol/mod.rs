//! Protocol module for RESP wire handling
//!
//! This module contains all the components needed to parse and serialize
//! the RESP protocol: the frame model, the byte-exact serializer, and the
//! incremental request parser.

pub mod frame;
pub mod parser;

// Re-export for convenience
pub use frame::Frame;
pub use parser::{Parsed, parse_request};
