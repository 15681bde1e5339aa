//! DHCP client driver
//!
//! This module contains the I/O side of the exchange:
//! - The event/action interface between driver and state machine
//! - The lease produced by a successful exchange
//! - The loop that feeds transport results into the state machine

use crate::{
    config::ClientConfig,
    error::{BeaconError, Phase},
    network::{Transport, UdpTransport},
    v4::handler::DhcpV4Handler,
};
use bytes::Bytes;
use std::{
    fmt,
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};
use tokio::time;

/// Largest datagram accepted from the transport.
pub const MAX_DHCP_MESSAGE_SIZE: usize = 1500;

/// Actions the state machine asks the driver to perform.
#[derive(Debug)]
pub enum Action {
    /// Send the datagram, then wait for the reply of the given phase.
    Send(Bytes, SocketAddr, Phase),
    /// The exchange is complete.
    Bind(Lease),
}

/// External events the state machine responds to.
#[derive(Debug)]
pub enum Event<'a> {
    Start,
    PacketReceived(&'a [u8]),
    Timeout(Duration),
}

/// Configuration obtained from the DHCPACK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub assigned_ip: Ipv4Addr,
    pub server_identifier: Ipv4Addr,
    pub subnet_mask: Option<Ipv4Addr>,
    pub routers: Option<Vec<Ipv4Addr>>,
    pub dns_servers: Option<Vec<Ipv4Addr>>,
    pub lease_time: Option<Duration>,
}

impl Lease {
    /// The default gateway: the first router listed by the server.
    pub fn gateway(&self) -> Option<Ipv4Addr> {
        self.routers.as_ref().and_then(|r| r.first().copied())
    }
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Assigned IP: {}", self.assigned_ip)?;
        write!(f, "DHCP Server: {}", self.server_identifier)?;
        if let Some(mask) = self.subnet_mask {
            write!(f, "\nSubnet Mask: {mask}")?;
        }
        if let Some(gateway) = self.gateway() {
            write!(f, "\nDefault Gateway: {gateway}")?;
        }
        if let Some(dns) = &self.dns_servers {
            let dns: Vec<String> = dns.iter().map(ToString::to_string).collect();
            write!(f, "\nDNS Servers: {}", dns.join(", "))?;
        }
        if let Some(lease_time) = self.lease_time {
            write!(f, "\nLease Time: {}s", lease_time.as_secs())?;
        }
        Ok(())
    }
}

/// Common trait for DHCP state machines.
pub trait DhcpStateMachine {
    /// Handles one event and returns the next action for the driver.
    fn handle_event(&mut self, event: Event) -> Result<Action, BeaconError>;
    /// Name of the current state, for logging.
    fn state_name(&self) -> &'static str;
}

pub struct DhcpClient<T> {
    config: ClientConfig,
    transport: T,
    state_machine: Box<dyn DhcpStateMachine + Send>,
}

impl DhcpClient<UdpTransport> {
    /// Binds the UDP transport described by `config`.
    pub fn new(config: ClientConfig) -> Result<Self, BeaconError> {
        config.validate()?;
        let transport =
            UdpTransport::bind(config.interface.as_deref(), config.local_address())?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> DhcpClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        let state_machine = Box::new(DhcpV4Handler::new(
            config.mac_address,
            config.server_target(),
        ));
        Self::with_state_machine(config, transport, state_machine)
    }

    pub fn with_state_machine(
        config: ClientConfig,
        transport: T,
        state_machine: Box<dyn DhcpStateMachine + Send>,
    ) -> Self {
        Self {
            config,
            transport,
            state_machine,
        }
    }

    fn timeout_for(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Offer => self.config.offer_timeout,
            Phase::Ack => self.config.ack_timeout,
        }
    }

    /// Waits for a single reply and hands it, or its absence, to the state machine.
    async fn wait_for_response(&mut self, phase: Phase) -> Result<Action, BeaconError> {
        let duration = self.timeout_for(phase);
        tracing::debug!("Waiting for DHCP {} with timeout: {:?}", phase, duration);
        match time::timeout(duration, self.transport.recv_from(MAX_DHCP_MESSAGE_SIZE)).await {
            Ok(Ok((data, addr))) => {
                tracing::debug!("Received {} bytes from {}", data.len(), addr);
                self.state_machine
                    .handle_event(Event::PacketReceived(&data))
            }
            Ok(Err(e)) => {
                tracing::error!("Transport receive error: {}", e);
                Err(BeaconError::Transport(e))
            }
            Err(_) => {
                tracing::debug!("Timeout waiting for DHCP {}", phase);
                self.state_machine.handle_event(Event::Timeout(duration))
            }
        }
    }

    /// Runs one DORA exchange. The transport is dropped when this returns,
    /// whether the exchange reached BOUND or failed.
    pub async fn run(mut self) -> Result<Lease, BeaconError> {
        let mut next_action = self.state_machine.handle_event(Event::Start)?;

        loop {
            tracing::debug!(
                "State: {}, Action: {:?}",
                self.state_machine.state_name(),
                next_action
            );

            match next_action {
                Action::Send(packet, addr, phase) => {
                    self.transport.send_to(&packet, addr).await?;
                    next_action = self.wait_for_response(phase).await?;
                }
                Action::Bind(lease) => {
                    tracing::info!("DHCP bind successful, assigned {}", lease.assigned_ip);
                    return Ok(lease);
                }
            }
        }
    }
}
