//! API request handlers.
//!
//! This module contains all HTTP request handlers organized by functionality.

/// Agent card and health handlers.
pub mod card;
/// JSON-RPC task protocol handlers, including the SSE subscription stream.
pub mod rpc;
