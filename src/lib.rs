//! Correspondent - weekly research-paper discovery
//!
//! Fetches recently published preprints, narrows them to a handful of candidates
//! close to a reader's stated interests (semantic nearest-neighbour search or
//! keyword scoring over a locally cached catalog), and lets a language model
//! conservatively pick the one to three papers worth reading.

pub mod cache;
pub mod cli;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod paper;
pub mod retry;
pub mod scoring;
pub mod selection;
pub mod sources;

pub use error::{CorrespondentError, Result};
