//! Hand-maintained prost message types for the redb core wire surface.
//!
//! The core owns these schemas, so the message structs are written and
//! reviewed directly rather than generated from `.proto` sources. Field tags
//! are stable and append-only; never reuse a tag of a removed field.

pub mod anchor;
pub mod common;
pub mod control;
pub mod mesh;
pub mod stream;
pub mod transformation;
pub mod unifiedmodel;

pub use common::Status;
