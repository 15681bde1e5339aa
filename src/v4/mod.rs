//! DHCPv4 protocol implementation
//!
//! This module contains the DHCPv4-specific implementation including:
//! - Message encoding and decoding
//! - The DORA state machine

pub mod handler;
pub mod message;


pub use handler::DhcpV4Handler;
pub use message::{build_dhcp_discover, build_dhcp_request, DhcpMessage, DhcpOptions, MessageType};
