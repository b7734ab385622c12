//! Core domain types
//!
//! This module contains the domain structures shared between the scheduler
//! (which persists and mutates them) and its clients (which display them).

pub mod file;
pub mod job;
pub mod package;
pub mod task;
pub mod unit_variable;
