use std::error::Error;
use std::sync::Arc;

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use libp2p::Multiaddr;
use tokio::io::{AsyncBufReadExt, BufReader};

use rust_chats::backend::{Backend, HttpAttachmentStore, MemoryBackend};
use rust_chats::config::{self, AppConfig};
use rust_chats::network::{P2PNode, parse_bootstrap_peers};
use rust_chats::storage::{self, MessageDatabase};
use rust_chats::ui::ChatApp;
use rust_chats::ui::components::message_list;
use rust_chats::{ChatError, ChatMessage, Notice, ThreadId, ThreadSession, UserProfile};

#[derive(Parser)]
#[command(name = "rust_chats", version, about = "One-to-one chat client")]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Keep everything in memory instead of joining the P2P network
    #[arg(long)]
    offline: bool,
    /// Save a bootstrap node (`/ip4/.../tcp/.../p2p/<PeerId>`) to the config before starting
    #[arg(long, value_name = "MULTIADDR")]
    add_bootstrap: Option<String>,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Print a thread as messages arrive; each stdin line is sent to it (no UI)
    Tail {
        /// Your id (email)
        #[arg(long)]
        user: String,
        /// The other participant's id
        #[arg(long)]
        friend: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    // Khởi tạo Logger để debug
    env_logger::init();

    let cli = Cli::parse();
    let app_config = match &cli.add_bootstrap {
        Some(entry) => config::add_bootstrap_node(&cli.config, entry)?,
        None => config::load_config(&cli.config),
    };
    let backend = build_backend(&app_config, cli.offline)?;

    match cli.mode {
        Some(Mode::Tail { user, friend }) => {
            run_tail(backend, &app_config, user, friend).await?;
        }
        None => run_ui(backend, &app_config)?,
    }

    Ok(())
}

fn build_backend(config: &AppConfig, offline: bool) -> Result<Backend, Box<dyn Error>> {
    if offline {
        log::info!("Running offline with an in-memory backend");
        return Ok(Backend::memory(MemoryBackend::new()));
    }

    storage::ensure_parent_dir(&config.database_path)?;
    let database = MessageDatabase::with_path(&config.database_path)?;
    let listen_addr: Multiaddr = config.listen_addr.parse()?;
    let bootstrap_peers = parse_bootstrap_peers(&config.bootstrap_nodes);
    log::info!(
        "Starting network node with {} bootstrap peers",
        bootstrap_peers.len()
    );

    // Network node chạy ngầm; UI/tail nói chuyện với nó qua handle.
    let (node, handle) = P2PNode::new(database, listen_addr, bootstrap_peers);
    tokio::spawn(async move {
        if let Err(err) = node.run().await {
            log::error!("Network node terminated: {err}");
        }
    });

    let handle = Arc::new(handle);
    let attachments = Arc::new(HttpAttachmentStore::new(
        config.attachment_base_url.clone(),
    ));
    Ok(Backend::new(handle.clone(), attachments, handle))
}

fn run_ui(backend: Backend, config: &AppConfig) -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions::default();
    let runtime = tokio::runtime::Handle::current();
    let channel_capacity = config.channel_capacity;

    eframe::run_native(
        "Chats",
        options,
        Box::new(move |cc| {
            Ok(Box::new(ChatApp::new(
                cc,
                backend,
                channel_capacity,
                runtime,
            )))
        }),
    )
}

async fn run_tail(
    backend: Backend,
    config: &AppConfig,
    user: String,
    friend: String,
) -> Result<(), ChatError> {
    let profile = UserProfile {
        id: user.clone(),
        display_name: user.split('@').next().unwrap_or(&user).to_string(),
    };
    let thread_id = ThreadId::between(&user, &friend);
    let mut session =
        ThreadSession::open(&backend, profile, thread_id, config.channel_capacity).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            notice = session.next() => match notice {
                Some(Notice::Inserted { id, .. }) => {
                    if let Some(message) = session.messages().iter().find(|m| m.id == id) {
                        println!("{}", format_line(message));
                    }
                }
                Some(Notice::Failed(err)) => eprintln!("{}: {err}", err.title()),
                Some(_) => {}
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(err) = session.send_text(&line) {
                        eprintln!("{}: {err}", err.title());
                    }
                }
                Ok(None) => stdin_open = false,
                Err(err) => {
                    log::warn!("Failed to read stdin: {err}");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received shutdown signal");
                break;
            }
        }
    }

    session.close();
    Ok(())
}

fn format_line(message: &ChatMessage) -> String {
    let time = DateTime::from_timestamp_millis(message.sent_at)
        .map(|time| time.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_default();
    format!(
        "[{time}] {}: {}",
        message.sender_display_name,
        message_list::body(message)
    )
}
