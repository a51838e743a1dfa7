//! Common type aliases used across FlipperKit crates.

pub mod aliases;

pub use aliases::*;
