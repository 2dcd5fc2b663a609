//! TalentDesk CLI
//!
//! Terminal front-end for the recruitment assistant chat.

mod config;
mod logging;
mod repl;

use std::sync::Arc;

use clap::Parser;
use talentdesk_chat::{ChatSession, HttpDirectory, WsConnector};
use tracing::info;

use crate::config::{Cli, Settings};
use crate::logging::init_logging;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::resolve(Cli::parse())?;
    let logging = init_logging(&settings.log_dir(), settings.log_format)?;

    info!(
        component = "cli",
        event = "cli.started",
        version = VERSION,
        run_id = %logging.run_id,
        username = %settings.chat.username,
        ws_url = %settings.chat.ws_url,
        "Starting TalentDesk chat"
    );

    let directory = HttpDirectory::new(&settings.auth_url, &settings.chat_url)
        .with_token(settings.chat.token.clone());
    let session = ChatSession::spawn(
        settings.chat,
        Arc::new(directory),
        Arc::new(WsConnector),
    );

    let result = repl::run(session).await;

    info!(component = "cli", event = "cli.stopped", "TalentDesk chat exited");
    drop(logging);
    result
}
