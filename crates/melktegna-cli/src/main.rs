//! melktegna: command-line chat client.
//!
//! Listens for deliveries on a Melktegna relay, sends messages, and reads
//! or prunes stored conversation history.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use melktegna_client::WireFormat;
use tracing::error;

use commands::Target;

/// melktegna: chat client
#[derive(Parser, Debug)]
#[command(name = "melktegna", version, about = "Command-line client for the Melktegna chat relay")]
struct Cli {
    /// Relay WebSocket URL (default ws://127.0.0.1:5000)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Use the JSON wire format instead of CBOR
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print incoming messages until Ctrl+C
    Listen {
        /// User to announce as
        #[arg(short, long)]
        user: Option<String>,

        /// Contact whose chat is open; their messages are not counted as unread
        #[arg(long)]
        chat: Option<String>,
    },

    /// Send one message
    Send {
        /// Sender
        #[arg(short, long)]
        from: Option<String>,

        /// Recipient
        #[arg(short, long)]
        to: String,

        /// Quote this earlier message above the reply
        #[arg(long)]
        quote: Option<String>,

        /// Message text
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
    },

    /// Print the stored conversation between two users
    History {
        #[arg(short, long)]
        user: Option<String>,

        #[arg(short, long)]
        peer: String,

        /// Only the most recent N messages
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Delete a stored message you sent (ids are shown by `history`)
    Delete {
        #[arg(short, long)]
        user: Option<String>,

        /// Message id
        id: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("melktegna: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::Config::default_path);
    let cfg = config::Config::load(&config_path)?;

    let target = Target {
        server: cli.server.clone().unwrap_or_else(|| cfg.default.server.clone()),
        format: if cli.json {
            WireFormat::Json
        } else {
            cfg.wire_format()?
        },
    };

    match cli.command {
        Command::Listen { user, chat } => {
            let user = cfg.user_or_default(user)?;
            commands::listen::run(&target, &user, chat.as_deref()).await
        }
        Command::Send {
            from,
            to,
            quote,
            message,
        } => {
            let from = cfg.user_or_default(from)?;
            commands::send::run(&target, &from, &to, &message.join(" "), quote.as_deref()).await
        }
        Command::History { user, peer, limit } => {
            let user = cfg.user_or_default(user)?;
            commands::history::run(&target, &user, &peer, limit).await
        }
        Command::Delete { user, id } => {
            let user = cfg.user_or_default(user)?;
            commands::delete::run(&target, &user, id).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_with_multiword_message() {
        let cli = Cli::try_parse_from([
            "melktegna", "--json", "send", "--from", "alice", "--to", "bob", "are", "you", "there?",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Command::Send { from, to, message, quote } => {
                assert_eq!(from.as_deref(), Some("alice"));
                assert_eq!(to, "bob");
                assert_eq!(message.join(" "), "are you there?");
                assert!(quote.is_none());
            }
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn parses_history_and_global_server() {
        let cli = Cli::try_parse_from([
            "melktegna", "history", "-u", "alice", "-p", "bob", "--limit", "10", "--server",
            "ws://10.0.0.2:5000",
        ])
        .unwrap();
        assert_eq!(cli.server.as_deref(), Some("ws://10.0.0.2:5000"));
        assert!(matches!(
            cli.command,
            Command::History { limit: Some(10), .. }
        ));
    }

    #[test]
    fn send_requires_message_text() {
        assert!(Cli::try_parse_from(["melktegna", "send", "--to", "bob"]).is_err());
    }

    #[test]
    fn parses_delete_id() {
        let cli = Cli::try_parse_from(["melktegna", "delete", "--user", "alice", "7"]).unwrap();
        assert!(matches!(cli.command, Command::Delete { id: 7, .. }));
        assert!(Cli::try_parse_from(["melktegna", "delete", "not-a-number"]).is_err());
    }

    #[test]
    fn listen_user_is_optional() {
        let cli = Cli::try_parse_from(["melktegna", "listen"]).unwrap();
        assert!(matches!(cli.command, Command::Listen { user: None, chat: None }));
    }
}
