//! Yes/no confirmation as an injected capability
//!
//! Orchestration code asks questions through [`Confirm`] so it can run
//! headless in tests and scripts.

use std::io::{self, BufRead, Write};

pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Fixed answer, for non-interactive runs.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirm for AutoConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// Asks on stderr and reads the answer from stdin until it parses.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        loop {
            eprint!("{prompt} ");
            let _ = io::stderr().flush();

            let mut line = String::new();
            match input.read_line(&mut line) {
                // EOF counts as "no"
                Ok(0) | Err(_) => return false,
                Ok(_) => {}
            }
            if let Some(answer) = parse_answer(&line) {
                return answer;
            }
        }
    }
}

fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}
