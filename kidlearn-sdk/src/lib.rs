//! Kid Learn SDK
//!
//! Wire objects shared between the services that publish learning events
//! and the worker that consumes them.

#![forbid(unsafe_code)]

pub mod objects;
