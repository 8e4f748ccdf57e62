//! User input seam.
//!
//! The resolver and the purge confirmation both block on free-form terminal
//! input. Routing it through a trait keeps the interactive flows testable
//! with scripted answers.

use std::io::{self, BufRead, Write};

pub trait Prompt {
    /// Show `message` (no trailing newline) and return one trimmed line of
    /// input.
    fn ask(&mut self, message: &str) -> io::Result<String>;
}

/// Reads from the process's stdin.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, message: &str) -> io::Result<String> {
        print!("{message}");
        // Flush so the prompt is visible before we block on input.
        io::stdout().flush()?;

        let stdin = io::stdin();
        let mut line = String::new();
        stdin.lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}
