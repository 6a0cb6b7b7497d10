//! Parley CLI
//!
//! Terminal front end for the chat service:
//! - List rooms and open direct rooms
//! - Print a room's history
//! - Join a room and chat interactively

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use parley::api::{ApiClient, HistoryPage};
use parley::config::{generate_default_config, LoggingConfig};
use parley::credentials::provider_from_config;
use parley::view::{time_label, MessageView};
use parley::{ChatClient, ChatView, Config, RoomId, RoomSession, SendOutcome};

#[derive(Parser)]
#[command(name = "parley")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Terminal client for room chat")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// REST API base URL
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// WebSocket base URL
    #[arg(long, global = true)]
    pub ws_base: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List your rooms
    Rooms,

    /// Open (or create) a direct room with another user
    Dm {
        /// Recipient user id
        user_id: u64,
    },

    /// Print a room's message history
    History {
        /// Room id
        room: u64,
        /// Page number, 1 = newest
        #[arg(short, long)]
        page: Option<u32>,
    },

    /// Join a room and chat. Type /quit to leave, /reconnect to retry.
    Join {
        /// Room id
        room: u64,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Config written to {}", path.display());
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = cli.api_base {
        config.server.api_base = url;
    }
    if let Some(url) = cli.ws_base {
        config.server.ws_base = url;
    }

    init_logging(&config.logging)?;
    tracing::debug!(api = %config.server.api_base, ws = %config.server.ws_base, "Parley starting");

    match cli.command {
        Commands::Rooms => {
            let api = api_client(&config)?;
            let rooms = api.list_rooms().await?;

            if rooms.is_empty() {
                println!("No rooms yet.");
                println!();
                println!("Start a direct conversation with:");
                println!("  parley dm <user_id>");
            } else {
                println!("{:<6} {:<32} {:<8} {}", "ID", "Room", "Unread", "Last message");
                println!("{}", "-".repeat(72));

                for room in rooms {
                    let last = room
                        .last_message
                        .as_ref()
                        .map(|m| format!("{}: {}", m.sender_name, m.content))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<6} {:<32} {:<8} {}",
                        room.id,
                        room.title(),
                        room.unread_count,
                        last
                    );
                }
            }
        }

        Commands::Dm { user_id } => {
            let api = api_client(&config)?;
            let room = api.open_direct_room(user_id).await?;
            println!("{} (room {})", room.title(), room.id);
            println!();
            println!("Join it with:");
            println!("  parley join {}", room.id);
        }

        Commands::History { room, page } => {
            let api = api_client(&config)?;
            let page_size = config.connection.history_page_size.unwrap_or(20);
            let page = page.map(|page| HistoryPage { page, page_size });
            let messages = api.load_page(RoomId(room), page).await?;

            if messages.is_empty() {
                println!("No messages.");
            }
            for message in messages {
                println!(
                    "[{}] {}: {}",
                    time_label(&message.sent_at, &chrono::Local),
                    message.sender_display_name(),
                    message.body
                );
            }
        }

        Commands::Join { room } => {
            let client = ChatClient::from_config(&config)?;
            let session = client.enter_room(RoomId(room)).await;
            let result = chat(&session).await;
            session.leave();
            result?;
        }

        // Written before the config is loaded
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn api_client(config: &Config) -> anyhow::Result<ApiClient> {
    let credentials = provider_from_config(&config.session);
    Ok(ApiClient::from_config(config, credentials)?)
}

/// Interactive loop: print new messages as they arrive, send typed lines
async fn chat(session: &RoomSession) -> anyhow::Result<()> {
    let mut changes = session.changes();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0;
    let mut last_header = String::new();

    println!("Joined room {}. Type /quit to leave.", session.room());
    render(&session.view(), &mut printed, &mut last_header);

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                render(&session.view(), &mut printed, &mut last_header);
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "/quit" => break,
                    "/reconnect" => {
                        if let Err(e) = session.reconnect().await {
                            eprintln!("Reconnect failed: {}", e);
                        }
                    }
                    text => match session.send(text) {
                        SendOutcome::Sent | SendOutcome::Empty => {}
                        SendOutcome::NotConnected => {
                            eprintln!("Not connected, message dropped. Type /reconnect to retry.")
                        }
                        SendOutcome::Failed => eprintln!("Send failed, message dropped."),
                    },
                }
            }
        }
    }

    Ok(())
}

/// Print the status line when it changes and any rows not printed yet
fn render(view: &ChatView, printed: &mut usize, last_header: &mut String) {
    let header = match &view.banner {
        Some(banner) => format!("-- {} | {}", view.status_label, banner),
        None => format!("-- {}", view.status_label),
    };
    if header != *last_header {
        println!("{}", header);
        *last_header = header;
    }

    // Seeding history can reshape the list; reprint it whole when it does
    if view.messages.len() < *printed {
        *printed = 0;
    }
    for row in &view.messages[*printed..] {
        print_row(row);
    }
    *printed = view.messages.len();
}

fn print_row(row: &MessageView) {
    println!("[{}] {}: {}", row.time_label, row.sender_name, row.body);
}

/// Initialize tracing from the logging config; RUST_LOG wins when set
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("parley={}", logging.level)))
        .context("invalid log level")?;

    let json = match logging.format.as_str() {
        "json" => true,
        "pretty" => false,
        other => bail!("unknown log format {:?} (expected pretty or json)", other),
    };

    let layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path))?;
            let writer = Arc::new(Mutex::new(file));
            if json {
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(move || LockedFile(Arc::clone(&writer)))
                    .boxed()
            } else {
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(move || LockedFile(Arc::clone(&writer)))
                    .boxed()
            }
        }
        None if json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        None => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry().with(filter).with(layer).init();
    Ok(())
}

/// Shared log file handle
struct LockedFile(Arc<Mutex<std::fs::File>>);

impl std::io::Write for LockedFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).flush()
    }
}
