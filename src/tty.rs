//! Terminal helpers for the binary.

use std::io::{self, IsTerminal};

/// Print a status line to stderr when it is a terminal.
pub fn status(message: &str) {
    if io::stderr().is_terminal() {
        eprintln!("{}", message);
    }
}
