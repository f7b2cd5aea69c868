// src/core/handlers/mod.rs

// One module per command family; `dispatcher` routes into them.

pub mod commons;
pub mod exec;
pub mod files;
pub mod hex;
pub mod ini;
pub mod system;
pub mod transfer;
