use anyhow::Result;
use clap::Parser;
use log::{error, info, LevelFilter};
use std::env;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

mod credentials;
mod utils;

use crate::credentials::{load_credentials, save_credentials, Credentials};
use amity::{ClientConfig, ConversationKey, RealtimeClient};

/// Command line arguments for the Amity realtime CLI
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Amity: realtime messaging client for the Amity social network.",
    long_about = "A terminal client for the Amity realtime layer.\n\n\
    Connects the persistent socket, prints incoming notifications, and accepts\n\
    slash commands on stdin (/msg, /group, /typing, /read, /history, /who,\n\
    /status, /quit).\n\
    Credentials resolve from flags, then the saved credentials file, then the\n\
    AMITY_API_BASE / AMITY_TOKEN environment variables."
)]
struct Args {
    /// HTTP base URL of the backend API, e.g. http://localhost:8000
    #[arg(long, value_name = "URL")]
    api_base: Option<String>,

    /// Bearer token of the authenticated session
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    /// Append log output to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

/// Resolve credentials from flags, the saved file, or environment/prompt
fn resolve_credentials(args: &Args) -> Result<(String, String)> {
    if let (Some(api_base), Some(token)) = (&args.api_base, &args.token) {
        save_credentials(&Credentials::new(api_base, "", token))?;
        return Ok((api_base.clone(), token.clone()));
    }

    if let Some(saved) = load_credentials()? {
        if let Some(token) = saved.token() {
            return Ok((saved.api_base, token));
        }
    }

    let api_base = env::var("AMITY_API_BASE").unwrap_or_else(|_| {
        eprintln!("Enter API base URL (e.g., http://localhost:8000):");
        utils::read_line().unwrap_or_default().trim().to_string()
    });
    let token = env::var("AMITY_TOKEN").unwrap_or_else(|_| {
        eprintln!("Enter session token:");
        utils::read_line().unwrap_or_default().trim().to_string()
    });

    save_credentials(&Credentials::new(&api_base, "", &token))?;
    Ok((api_base, token))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    utils::SimpleLogger::init(args.log_file.as_deref(), LevelFilter::Info)?;

    let (api_base, token) = resolve_credentials(&args)?;
    info!("Starting realtime client against {}", api_base);

    let (client, mut notifications) = RealtimeClient::new(ClientConfig { api_base, token });
    if let Err(e) = client.connect() {
        error!("Failed to start realtime session: {}", e);
        return Err(e.into());
    }

    println!("Connected (or connecting). Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            notification = notifications.recv() => match notification {
                Some(n) => println!("[notification] {}: {} {}", n.kind, n.title, n.message),
                None => break,
            },
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_command(&client, line.trim()) {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    client.disconnect();
    info!("Session closed");
    Ok(())
}

/// Execute one slash command. Returns false when the client should exit.
fn handle_command(client: &RealtimeClient, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }
    let mut parts = line.splitn(3, ' ');
    let command = parts.next().unwrap_or("");

    match command {
        "/quit" => return false,
        "/msg" => match (parts.next().and_then(|s| s.parse().ok()), parts.next()) {
            (Some(to), Some(content)) => {
                if client.send_private_message(to, content) {
                    println!("sent to {}", to);
                } else {
                    println!("offline, queued ({} pending)", client.pending_outbound());
                }
            }
            _ => println!("usage: /msg <user-id> <text>"),
        },
        "/group" => match (parts.next().and_then(|s| s.parse().ok()), parts.next()) {
            (Some(group_id), Some(content)) => {
                if client.send_group_message(group_id, content) {
                    println!("sent to group {}", group_id);
                } else {
                    println!("offline, queued ({} pending)", client.pending_outbound());
                }
            }
            _ => println!("usage: /group <group-id> <text>"),
        },
        "/typing" => match parts.next().and_then(|s| s.parse().ok()) {
            Some(to) => {
                client.notify_typing_private(to, true);
            }
            None => println!("usage: /typing <user-id>"),
        },
        "/read" => match parts.next().and_then(|s| s.parse().ok()) {
            Some(peer) => {
                client.send_read_receipt(peer);
                if let Some(me) = client.self_id() {
                    client.mark_conversation_read(ConversationKey::private(me, peer));
                }
                println!("marked conversation with {} as read", peer);
            }
            None => println!("usage: /read <user-id>"),
        },
        "/history" => match parts.next().and_then(|s| s.parse().ok()) {
            Some(peer) => match client.self_id() {
                Some(me) => {
                    let key = ConversationKey::private(me, peer);
                    for msg in client.messages(key) {
                        let who = if msg.is_own { "me" } else { "them" };
                        println!("[{}] {}: {}", msg.timestamp.format("%H:%M:%S"), who, msg.content);
                    }
                    let typing = client.typing_users(key);
                    if !typing.is_empty() {
                        println!("typing: {:?}", typing);
                    }
                    println!("unread: {}", client.unread_count(key));
                }
                None => println!("identity not resolved yet"),
            },
            None => println!("usage: /history <user-id>"),
        },
        "/who" => {
            println!("online: {:?}", client.online_users());
        }
        "/status" => {
            let status = client.connection_status();
            println!(
                "state: {:?}, attempts: {}, error: {}",
                status.state,
                status.reconnect_attempts,
                status.error.as_deref().unwrap_or("none")
            );
        }
        _ => {
            println!(
                "commands: /msg <id> <text>, /group <id> <text>, /typing <id>, /read <id>, /history <id>, /who, /status, /quit"
            );
        }
    }
    true
}
