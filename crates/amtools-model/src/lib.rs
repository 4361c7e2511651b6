//! Kaldi acoustic model objects needed for model inspection.
//!
//! This crate reads the Kaldi serializations (text and binary) of the two
//! objects inspected by the command-line tools and exposes their indexing
//! schemes as pure queries.
//!
//! # Architecture
//!
//! - [`format`] -- Binary header detection and the Kaldi token stream reader
//! - [`event_map`] -- Decision-tree event maps (constant, table, split)
//! - [`context_dep`] -- Context dependency: phone context + pdf-class to pdf id
//! - [`topology`] -- HMM topology entries shared by groups of phones
//! - [`transition`] -- Transition model: transition-id encoding and probabilities

pub mod context_dep;
pub mod event_map;
pub mod format;
pub mod topology;
pub mod transition;

use amtools_core::PhoneId;

/// Error type for reading and validating model objects.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unexpected end of data at byte {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },
    #[error("expected token {expected:?}, got {found:?}")]
    UnexpectedToken { expected: String, found: String },
    #[error("bad size marker at byte {offset}: expected {expected}, got {found}")]
    BadSizeMarker { offset: usize, expected: i8, found: i8 },
    #[error("malformed number {0:?}")]
    InvalidNumber(String),
    #[error("token at byte {0} is not valid UTF-8")]
    InvalidToken(usize),
    #[error("invalid model structure: {0}")]
    InvalidStructure(String),
}

/// Outcome of resolving one phonetic context and pdf-class to a pdf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// The decision structure produced this pdf id.
    Pdf(i32),
    /// The decision structure has no answer for this context.
    NotFound,
}

/// Maps a fixed-width phonetic context window plus a pdf-class to a pdf id.
///
/// `context` holds `context_width()` phone ids, the phone being modeled at
/// index `central_position()`. Implementations must be deterministic.
pub trait ContextResolver {
    fn context_width(&self) -> i32;

    fn central_position(&self) -> i32;

    fn compute(&self, context: &[PhoneId], pdf_class: i32) -> Resolution;
}
