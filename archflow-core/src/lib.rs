//! Archflow Core
//!
//! Core types and abstractions shared by the archflow scheduler, its client
//! and the command-line tool.
//!
//! This crate contains:
//! - Workflow: the validated, read-only graph of chains, links and watched directories
//! - Domain types: packages, jobs, tasks, unit variables and files
//! - Context: placeholder substitution threaded through a job chain
//! - DTOs: wire types for the worker protocol and the scheduler API

pub mod choices;
pub mod context;
pub mod domain;
pub mod dto;
pub mod processing;
pub mod workflow;

pub use context::{Context, ContextError};
pub use workflow::{Workflow, WorkflowError};
