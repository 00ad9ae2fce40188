//! Unit Tests Module
//!
//! Property-style checks over many inputs, complementing the
//! `#[cfg(test)]` modules beside the code.

pub mod framing;
