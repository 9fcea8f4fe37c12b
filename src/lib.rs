//! lexflow - legal AI agent and workflow engine
//!
//! Runs named agents through a bounded tool-calling loop against an LLM
//! provider, chains agents into sequential workflows, retrieves knowledge
//! by vector similarity with source citations, and records conversations
//! and every execution with token accounting.
//!
//! # Architecture
//!
//! - **knowledge / rag**: knowledge store, similarity ranking, retrieval
//! - **tools**: registry, schema-checked invoker, legal tool set
//! - **agent**: turn executor, budgets, events, cancellation
//! - **workflow**: sequential multi-agent runs with partial-failure results
//! - **store**: conversation store and execution ledger (memory, SQLite)
//! - **service**: caller-facing operations and wiring from configuration

pub mod errors;
pub mod types;

pub use errors::{AgentError, ErrorKind, ExecutionFailure, Result};

// Engine core
pub mod agent;
pub mod budget;
pub mod knowledge;
pub mod llm;
pub mod rag;
pub mod store;
pub mod tools;
pub mod workflow;

// Configuration and caller surface
pub mod catalog;
pub mod cli;
pub mod config;
pub mod service;
pub mod telemetry;
