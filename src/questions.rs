use anyhow::{ensure, Context, Result};
use std::fs;
use std::path::Path;

/// Questions asked when no questions file is given
pub const DEFAULT_QUESTIONS: [&str; 19] = [
    "Who is Avery?",
    "Where does Verona live?",
    "What is Toadswallow?",
    "How many Carmine conspirators are there?",
    "What does Alpeona do?",
    "Why is Gilkey ostracized?",
    "What is Snowdrop?",
    "Why is Maricaca scared of?",
    "What are the opinions of Charles?",
    "How many others live in Kennet?",
    "Why was Seth Forsaken?",
    "Is Alexander dead?",
    "Where is Bristow?",
    "What is the Wolf?",
    "What is the Red Heron?",
    "Can we talk about the girls?",
    "Who has a crush on Avery?",
    "What are the most powerful Others?",
    "What are the boons for Sootsleeves path?",
];

pub fn default_questions() -> Vec<String> {
    DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect()
}

/// Read one question per line, skipping blank lines and `#` comments
pub fn load_questions<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read questions file: {}", path.display()))?;

    let questions = parse_questions(&raw);
    ensure!(!questions.is_empty(), "No questions found in {}", path.display());

    Ok(questions)
}

fn parse_questions(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
