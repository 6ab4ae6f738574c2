//! Generic utility primitives with zero domain knowledge.
//!
//! - `duration` - Human duration parsing (`1h30m`, `250ms`)
//! - `mask` - Secret masking for plans, logs and errors
//! - `process` - Context-bound external process execution
//! - `shell` - Shell argument quoting
//! - `template` - String template rendering
//! - `validation` - Input validation helpers

pub mod duration;
pub mod mask;
pub mod process;
pub mod shell;
pub mod template;
pub mod validation;
