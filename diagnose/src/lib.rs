//! Tool-mediated deployability diagnosis for source repositories.
//!
//! A [`session::DiagnosticSession`] lets an external reasoning engine inspect a
//! repository through a small, schema-validated tool vocabulary and streams every
//! intermediate [`core::state::DiagnosticState`] to a single subscriber until a
//! terminal verdict is produced. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (state monotonicity, phase
//!   transitions, the step guard). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (directory walk, config files, prompt
//!   templates, repository lookup, the HTTP engine adapter).
//!
//! Orchestration modules ([`tools`], [`session`], [`stream`]) coordinate core
//! logic with I/O to run one diagnosis per request.

pub mod core;
pub mod engine;
pub mod io;
pub mod logging;
pub mod session;
pub mod stream;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
pub mod tree;
