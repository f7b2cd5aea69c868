// src/core/mod.rs

pub mod dispatcher;
pub mod handlers;
pub mod interpolator;
pub mod job_queue;
pub mod package_parser;
pub mod paths;
pub mod safety;
pub mod source_expander;
pub mod task_executor;
