//! semindex — local-first semantic code indexing and retrieval.
//!
//! Source repositories are parsed into structural units, embedded into
//! dense vectors, and persisted in per-project SQLite stores. Retrieval is
//! exact top-k cosine over the project's chunks, served both through an
//! internal query API ([`service::ProjectService`]) and an HTTP tool
//! protocol for external agents ([`server`]).
//!
//! Layering, leaves first: [`paths`] and [`constants`] underpin everything;
//! [`store`] and [`catalog`] own persistence; [`parser`], [`chunker`],
//! [`outline`], and [`embed`] form the analysis pipeline; [`indexer`]
//! drives it incrementally; [`service`] orchestrates; [`server`] exposes it.

pub mod catalog;
pub mod chunker;
pub mod constants;
pub mod embed;
pub mod error;
pub mod events;
pub mod indexer;
pub mod outline;
pub mod parser;
pub mod paths;
pub mod server;
pub mod service;
pub mod store;
pub mod walker;

pub use error::{Result, SemIndexError};
