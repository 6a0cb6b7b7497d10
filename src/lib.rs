//! # Parley
//!
//! Client core for a room-based chat service: REST history reconciled with a
//! live WebSocket feed into one ordered, de-duplicated message list.
//!
//! ## Modules
//!
//! - [`connection`]: owns the live transport, connect/send/disconnect, events
//! - [`api`]: REST client for room history and the room directory
//! - [`reconciler`]: merges history and live messages
//! - [`view`]: renderable view model of a room
//! - [`session`]: per-room wiring of the above
//! - [`client`]: factory for room sessions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley::{ChatClient, Config, RoomId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let client = ChatClient::from_config(&config)?;
//!
//!     let session = client.enter_room(RoomId(4)).await;
//!     session.wait_for_history().await;
//!     session.send("hello");
//!
//!     for row in session.view().messages {
//!         println!("[{}] {}: {}", row.time_label, row.sender_name, row.body);
//!     }
//!
//!     session.leave();
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod events;
pub mod message;
pub mod reconciler;
pub mod session;
pub mod transport;
pub mod view;

pub use client::ChatClient;
pub use config::Config;
pub use connection::{ConnectionManager, ConnectionSettings, ConnectionStatus, SendOutcome};
pub use error::{ChatError, ChatResult};
pub use message::{ChatMessage, MessageId, RoomId};
pub use session::{HistoryState, RoomSession};
pub use view::{ChatView, MessageView};
