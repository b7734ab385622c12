//! Data Transfer Objects
//!
//! Wire types shared by the scheduler, its HTTP client and remote workers.
//! The task module carries the worker batch protocol; the others describe
//! the scheduler's control API.

pub mod decision;
pub mod package;
pub mod task;
pub mod workflow;
