//! Leveled terminal output.
//!
//! The rest of the crate logs through these helpers so the color scheme and
//! the verbosity gate live in one place. `debug` lines only appear with
//! `-v`; everything else always prints.

use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

pub fn debug(msg: &str) {
    if is_verbose() {
        println!("{}", msg.bright_black());
    }
}

pub fn info(msg: &str) {
    println!("{msg}");
}

pub fn ok(msg: &str) {
    println!("{}", msg.green());
}

pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}
