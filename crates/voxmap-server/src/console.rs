use crate::server::ServerState;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use voxmap_common::types::Result;
use voxmap_logger::log::log;
use voxmap_logger::severity::LogSeverity::Info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Say(String),
    Empty,
    Unknown(String),
}

/// Splits off the first word of an operator line.
pub fn parse_command(line: &str) -> ConsoleCommand {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleCommand::Empty;
    }

    let (command, args) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "say" => ConsoleCommand::Say(args.trim().to_owned()),
        other => ConsoleCommand::Unknown(other.to_owned()),
    }
}

pub async fn handle_command(state: &ServerState, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Say(text) => {
            state.say(&text).await;
        }
        ConsoleCommand::Empty => {}
        ConsoleCommand::Unknown(_) => log("Unknown command".to_owned(), Info),
    }
}

/// Runs commands from `input` until it reaches end of file.
pub async fn run_console<R>(state: Arc<ServerState>, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        handle_command(&state, parse_command(&line)).await;
    }
    Ok(())
}

pub async fn run(state: Arc<ServerState>) -> Result<()> {
    run_console(state, BufReader::new(tokio::io::stdin())).await
}
