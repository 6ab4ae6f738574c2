/// Macro for prefixed status logging to stderr (only when stderr is a terminal).
///
/// Usage:
/// ```ignore
/// log_status!("sync", "Cloning {} into {}", url, dest);
/// log_status!("pipeline", "{} skipped", stage);
/// ```
#[macro_export]
macro_rules! log_status {
    ($prefix:expr, $($arg:tt)*) => {
        if ::std::io::IsTerminal::is_terminal(&::std::io::stderr()) {
            eprintln!(concat!("[", $prefix, "] {}"), format_args!($($arg)*));
        }
    };
}

pub mod commands;
pub mod core;
pub mod utils;

// Re-export everything from core for ergonomic library use
// Users can write `stagehand::config` instead of `stagehand::core::config`
pub use core::*;
pub use utils::*;
