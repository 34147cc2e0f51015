//! Line-oriented operator consoles read from stdin

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

/// A line typed at the server console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Status,
    Stop,
    Unknown(String),
}

impl ServerCommand {
    /// `None` for blank lines
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        match line {
            "" => None,
            "status" => Some(Self::Status),
            "stop" => Some(Self::Stop),
            other => Some(Self::Unknown(other.to_string())),
        }
    }
}

/// A line typed at the worker console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    Quit,
    Message(String),
}

impl WorkerCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }
        if line.trim() == "quit" {
            return Some(Self::Quit);
        }
        Some(Self::Message(line.to_string()))
    }
}

pub type Console<R> = Lines<BufReader<R>>;

pub fn stdin() -> Console<tokio::io::Stdin> {
    lines(tokio::io::stdin())
}

pub fn lines<R: AsyncRead + Unpin>(input: R) -> Console<R> {
    BufReader::new(input).lines()
}
