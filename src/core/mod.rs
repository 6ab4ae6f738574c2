pub mod config;
pub mod console;
pub mod context;
pub mod error;
pub mod mode;
pub mod pipeline;
pub mod platform;
pub mod registry;
pub mod response;
pub mod settings;
pub mod sync;
pub mod workflow;

// Re-export common types for convenience
pub use config::{AppConfig, RunConfig};
pub use context::ExecContext;
pub use error::{Error, ErrorCode, Result};
pub use mode::{ExecutionMode, ModeFlags, Plan};
pub use registry::{DeprecationBridge, Handler, Registry};
