//! Line-oriented chat loop on stdin/stdout.

use console::style;
use talentdesk_chat::{ChatSession, ChatSnapshot, ChatUpdate, ConnectionStatus};
use talentdesk_protocol::{ChatMessage, ReplyStatus, Role};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Status,
    Reconnect,
    History,
    Quit,
    Empty,
}

pub fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    match trimmed {
        "" => Command::Empty,
        "/quit" | "/exit" => Command::Quit,
        "/status" => Command::Status,
        "/reconnect" => Command::Reconnect,
        "/history" => Command::History,
        _ => Command::Send(trimmed.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Assistant,
    Info,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub tone: Tone,
    pub text: String,
}

impl Line {
    fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
        }
    }
}

/// What to print for an update, if anything. The user's own lines are
/// already on screen, so they are not echoed back.
pub fn render_update(update: &ChatUpdate) -> Vec<Line> {
    match update {
        ChatUpdate::MessageAppended(message) => match message.role {
            Role::Assistant => vec![Line::new(Tone::Assistant, message.content.clone())],
            Role::User => Vec::new(),
        },
        ChatUpdate::HistoryLoaded { messages } => {
            let mut lines = vec![Line::new(
                Tone::Info,
                format!("-- {} earlier messages --", messages.len()),
            )];
            lines.extend(messages.iter().map(render_message));
            lines
        }
        ChatUpdate::StatusChanged(ReplyStatus::Waiting) => {
            vec![Line::new(Tone::Info, "assistant is typing...")]
        }
        ChatUpdate::StatusChanged(ReplyStatus::Done) => Vec::new(),
        ChatUpdate::ConnectionChanged(status) => {
            vec![Line::new(Tone::Info, describe_connection(status))]
        }
        ChatUpdate::MessageDropped { content } => vec![Line::new(
            Tone::Warn,
            format!("message not delivered: {content}"),
        )],
        ChatUpdate::ReconnectExhausted { attempts } => vec![Line::new(
            Tone::Warn,
            format!("gave up after {attempts} reconnect attempts; type /reconnect to retry"),
        )],
    }
}

fn render_message(message: &ChatMessage) -> Line {
    match message.role {
        Role::User => Line::new(Tone::Info, format!("you: {}", message.content)),
        Role::Assistant => Line::new(Tone::Assistant, message.content.clone()),
    }
}

fn describe_connection(status: &ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Disconnected => "disconnected".to_string(),
        ConnectionStatus::Connecting => "connecting...".to_string(),
        ConnectionStatus::Connected => "connected".to_string(),
        ConnectionStatus::Reconnecting { attempt, delay_ms } => {
            format!("connection lost; retry {attempt} in {delay_ms}ms")
        }
        ConnectionStatus::Exhausted => "offline".to_string(),
        ConnectionStatus::ShutDown => "session closed".to_string(),
    }
}

pub fn render_status(snapshot: &ChatSnapshot) -> Vec<Line> {
    let reply = match snapshot.status {
        ReplyStatus::Done => "idle",
        ReplyStatus::Waiting => "waiting for reply",
    };
    vec![
        Line::new(
            Tone::Info,
            format!("connection: {}", describe_connection(&snapshot.connection)),
        ),
        Line::new(Tone::Info, format!("assistant: {reply}")),
        Line::new(Tone::Info, format!("queued: {}", snapshot.queued)),
        Line::new(Tone::Info, format!("messages: {}", snapshot.messages.len())),
    ]
}

fn print(lines: &[Line]) {
    for line in lines {
        match line.tone {
            Tone::Assistant => println!("{} {}", style("assistant:").cyan().bold(), line.text),
            Tone::Info => println!("{}", style(&line.text).dim()),
            Tone::Warn => println!("{}", style(&line.text).yellow()),
        }
    }
}

/// Run until `/quit`, end of input, or Ctrl-C. Always tears the session down.
pub async fn run(session: ChatSession) -> anyhow::Result<()> {
    let mut updates = session.subscribe();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "{}",
        style("TalentDesk chat. /status /reconnect /history /quit").bold()
    );

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line? else {
                    info!(component = "repl", event = "repl.eof", "stdin closed");
                    break;
                };
                match parse_command(&line) {
                    Command::Quit => break,
                    Command::Empty => {}
                    Command::Status => print(&render_status(&session.snapshot())),
                    Command::Reconnect => session.reconnect(),
                    Command::History => {
                        let snapshot = session.snapshot();
                        let lines: Vec<Line> =
                            snapshot.messages.iter().map(render_message).collect();
                        print(&lines);
                    }
                    Command::Send(text) => session.send(text),
                }
            }
            update = updates.recv() => match update {
                Ok(update) => print(&render_update(&update)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        component = "repl",
                        event = "repl.updates_lagged",
                        skipped,
                        "update stream lagged"
                    );
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!(component = "repl", event = "repl.interrupted", "ctrl-c");
                break;
            }
        }
    }

    session.shutdown();
    Ok(())
}
