//! # packrun
//!
//! An interpreter for declarative package scripts: INI files whose sections
//! are lists of commands that copy, patch, download and configure files on a
//! device root, with placeholder interpolation, platform gates and `try:`
//! fallbacks.
//!
//! [`core::task_executor::execute_commands`] runs a command list on the
//! calling thread; [`core::job_queue::Interpreter`] runs jobs on a background
//! worker.

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod models;
pub mod state;
pub mod system;
