//! Core type definitions used across the Stowage workspace.

pub mod id;

pub use id::*;
