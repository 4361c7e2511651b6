//! Shared types for acoustic model inspection tools.
//!
//! - [`symbols`] -- Phone symbol table (name to id bijection, epsilon at id 0)
//! - [`config`] -- Silence phone sets and per-phone pdf-class counts

pub mod config;
pub mod symbols;

/// Integer id of a phone. Id 0 is reserved for epsilon.
pub type PhoneId = i32;

/// Id reserved for the epsilon symbol in every phone symbol table.
pub const EPSILON: PhoneId = 0;
