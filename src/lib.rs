//! tickwire: a small message-oriented TCP transport.
//!
//! Messages are opaque byte payloads sent as length-prefixed frames. Every
//! connection gets one blocking receive thread and one blocking send thread;
//! the application thread never blocks and instead polls lifecycle and data
//! events at its own cadence, typically once per tick:
//!
//! ```no_run
//! use tickwire::{Event, Server};
//!
//! let server = Server::default();
//! server.start(1337)?;
//! loop {
//!     while let Some(event) = server.next_event() {
//!         match event {
//!             Event::Connected(id) => println!("{id} connected"),
//!             Event::Data(id, payload) => server.send(id, payload)?,
//!             Event::Disconnected(id) => println!("{id} disconnected"),
//!             Event::Error(id, e) => eprintln!("{id}: {e}"),
//!         }
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! # Ok::<(), tickwire::Error>(())
//! ```
//!
//! Diagnostics go through `tracing`; installing a subscriber is up to the
//! application.

mod client;
mod config;
mod error;
mod event;
pub mod protocol;
mod runtime;
mod server;
mod transport;

pub use client::Client;
pub use config::TransportConfig;
pub use error::Error;
pub use event::{ConnectionId, Event, CLIENT_CONNECTION_ID};
pub use runtime::ConnState;
pub use server::Server;
