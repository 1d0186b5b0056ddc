//! Session coordination memory for AI agents, served over MCP.
//!
//! vigil keeps short-lived semantic memory for one active work session:
//! notes (decisions, hypotheses, blockers, learnings, patterns), behavioral
//! constraints checked against proposed actions, and heuristics that notice
//! when the session is stuck and suggest ways out from its own history.
//!
//! | Note type | Purpose |
//! |-----------|---------|
//! | **decision** | A choice that was made and why |
//! | **hypothesis** | Something believed but not yet verified |
//! | **blocker** | Something currently preventing progress |
//! | **learning** | Something discovered that is worth keeping |
//! | **pattern** | A recurring approach that worked |
//! | **constraint** | A standing rule, tracked separately and liftable |
//!
//! Session memory is ephemeral: finalizing a session deletes its collection.
//!
//! # Architecture
//!
//! - **Embeddings**: local ONNX Runtime all-MiniLM-L6-v2 (384 dimensions), an
//!   OpenAI-compatible API, or a deterministic hashing embedder
//! - **Vector index**: embedded SQLite +
//!   [sqlite-vec](https://github.com/asg017/sqlite-vec), or a Qdrant server
//! - **Stuck detection**: repeated blockers, idle project tree, error loops
//! - **Transport**: MCP over stdio (primary) or streamable HTTP
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite connection setup and schema for the embedded index
//! - [`embedding`]: Text-to-vector providers
//! - [`index`]: Vector index trait and its SQLite and Qdrant backends
//! - [`memory`]: Session memory store, statistics and constraint tracking
//! - [`stuck`]: Stuck-pattern heuristics and their combination
//! - [`recovery`]: Ranked recovery suggestions
//! - [`session`]: Coordinator and session handle
//! - [`tools`]: MCP tool handler

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod memory;
pub mod recovery;
pub mod server;
pub mod session;
pub mod stuck;
pub mod tools;

pub use error::{Result, VigilError};
pub use session::{Coordinator, Session};
