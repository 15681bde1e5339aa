//! # Beacon - A Single-Shot DHCPv4 Client
//!
//! Beacon obtains an IPv4 lease with exactly one DORA (Discover, Offer,
//! Request, Acknowledge) exchange: one DISCOVER, one OFFER, one REQUEST and
//! one ACK, each reply bounded by a deadline. It reports the assigned
//! address, subnet mask, gateway and DNS servers; it does not configure the
//! interface, renew the lease or retry.
//!
//! ## Layout
//!
//! - [`v4::message`]: DHCP wire format (header, magic cookie, options)
//! - [`v4::handler`]: the DORA state machine, free of I/O
//! - [`client`]: the driver feeding a [`network::Transport`] into the state machine
//! - [`mac`]: hardware address discovery
//!
//! ## Example
//!
//! ```rust,no_run
//! use beacon::{ClientConfig, DhcpClient, MacAddr};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mac_addr = MacAddr::new([0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4]);
//!     let config = ClientConfig::new(Some("eth0".to_string()), mac_addr);
//!     let client = DhcpClient::new(config)?;
//!     let lease = client.run().await?;
//!     println!("Obtained lease: {:?}", lease);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod mac;
pub mod network;
pub mod v4;

pub use client::{DhcpClient, Lease};
pub use config::{Args, ClientConfig};
pub use error::{BeaconError, ErrorKind, FormatError, Phase, ReplyError};
pub use mac::MacAddr;
pub use network::{Transport, UdpTransport};
