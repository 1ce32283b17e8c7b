//! I/O helpers for diagnostic sessions.

pub mod config;
pub mod file_index;
pub mod openai;
pub mod prompt;
pub mod repo;
