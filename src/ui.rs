use std::io::{self, Write};

const RULE_WIDTH: usize = 50;
const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

/// What one line of user input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Empty,
    Quit,
    Run(String),
    /// Stdin reached end of file.
    Closed,
    /// The line could not be read; the session keeps going.
    Unreadable(String),
}

impl Instruction {
    /// Interprets the outcome of reading one line from stdin.
    pub fn from_read(read: io::Result<Option<String>>) -> Self {
        match read {
            Ok(Some(line)) => Self::parse(&line),
            Ok(None) => Instruction::Closed,
            Err(e) => Instruction::Unreadable(e.to_string()),
        }
    }

    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            Instruction::Empty
        } else if should_quit(trimmed) {
            Instruction::Quit
        } else {
            Instruction::Run(trimmed.to_string())
        }
    }
}

pub fn should_quit(instruction: &str) -> bool {
    QUIT_WORDS
        .iter()
        .any(|word| instruction.trim().eq_ignore_ascii_case(word))
}

pub fn display_loop_header() {
    let rule = "=".repeat(RULE_WIDTH);
    println!("\n{rule}");
    println!("SELF FLOW - Desktop Automation (Loop Mode)");
    println!("{rule}");
    println!("Enter instructions one by one. Type 'quit' to exit.");
    println!("Examples: 'click on chrome', 'type hello', 'press enter'");
    println!("{rule}");
}

pub fn prompt() {
    print!("\nInstruction: ");
    let _ = io::stdout().flush();
}
