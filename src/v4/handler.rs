//! DHCPv4 state machine implementation
//!
//! This module implements the single-attempt DORA (Discover, Offer,
//! Request, Acknowledge) exchange. Every phase sends once and accepts
//! exactly one reply; anything unexpected ends the exchange in `Failed`.

use super::message::{build_dhcp_discover, build_dhcp_request, options, DhcpMessage, MessageType};
use crate::{
    client::{Action, DhcpStateMachine, Event, Lease},
    error::{BeaconError, Phase, ReplyError},
    mac::MacAddr,
};
use std::{net::Ipv4Addr, net::SocketAddr, time::Duration};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum DhcpV4State {
    Init,
    DiscoverSent,
    OfferReceived,
    RequestSent,
    Bound,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct Offer {
    offered_ip: Ipv4Addr,
    server_identifier: Ipv4Addr,
}

pub struct DhcpV4Handler {
    state: DhcpV4State,
    mac_address: MacAddr,
    target: SocketAddr,
    xid: u32,
    offer: Option<Offer>,
}

impl DhcpV4Handler {
    /// A handler with a random transaction id.
    pub fn new(mac_address: MacAddr, target: SocketAddr) -> Self {
        Self::with_xid(mac_address, target, rand::random())
    }

    pub fn with_xid(mac_address: MacAddr, target: SocketAddr, xid: u32) -> Self {
        Self {
            state: DhcpV4State::Init,
            mac_address,
            target,
            xid,
            offer: None,
        }
    }

    pub fn xid(&self) -> u32 {
        self.xid
    }

    fn fail(&mut self, err: BeaconError) -> Result<Action, BeaconError> {
        tracing::debug!("Exchange failed in state {:?}: {}", self.state, err);
        self.state = DhcpV4State::Failed;
        Err(err)
    }

    fn handle_init(&mut self) -> Result<Action, BeaconError> {
        let discover_packet = match build_dhcp_discover(&self.mac_address, self.xid) {
            Ok(packet) => packet,
            Err(e) => return self.fail(e.into()),
        };
        tracing::info!("Broadcasting DHCP DISCOVER, xid {:#010x}", self.xid);
        self.state = DhcpV4State::DiscoverSent;
        Ok(Action::Send(discover_packet, self.target, Phase::Offer))
    }

    /// Decodes `data` and checks it is the `expected` reply to our transaction.
    fn accept_reply(&self, data: &[u8], expected: MessageType) -> Result<DhcpMessage, ReplyError> {
        let msg = DhcpMessage::decode(data).map_err(|e| {
            tracing::debug!("Failed to decode DHCP message: {}", e);
            e
        })?;

        tracing::debug!(
            "Decoded message: XID={:x}, our XID={:x}",
            msg.xid,
            self.xid
        );
        if msg.xid != self.xid {
            return Err(ReplyError::XidMismatch {
                expected: self.xid,
                received: msg.xid,
            });
        }
        let received = msg.message_type().ok_or(ReplyError::MissingMessageType)?;
        if received != expected as u8 {
            return Err(ReplyError::UnexpectedMessageType {
                expected: expected as u8,
                received,
            });
        }
        Ok(msg)
    }

    fn handle_discover_sent(&mut self, event: Event) -> Result<Action, BeaconError> {
        match event {
            Event::PacketReceived(data) => {
                let msg = match self.accept_reply(data, MessageType::Offer) {
                    Ok(msg) => msg,
                    Err(reason) => {
                        return self.fail(BeaconError::InvalidReply {
                            phase: Phase::Offer,
                            reason,
                        })
                    }
                };

                let server_identifier = msg.options.ipv4(options::SERVER_ID).unwrap_or_else(|| {
                    tracing::warn!("DHCP OFFER carries no usable server identifier, using 0.0.0.0");
                    Ipv4Addr::UNSPECIFIED
                });
                tracing::info!(
                    "Received DHCP OFFER: IP {} from server {}",
                    msg.yiaddr,
                    server_identifier
                );

                self.offer = Some(Offer {
                    offered_ip: msg.yiaddr,
                    server_identifier,
                });
                self.state = DhcpV4State::OfferReceived;
                self.handle_offer_received()
            }
            Event::Timeout(waited) => self.fail(BeaconError::Timeout {
                phase: Phase::Offer,
                waited,
            }),
            Event::Start => self.unexpected_event("Start"),
        }
    }

    fn handle_offer_received(&mut self) -> Result<Action, BeaconError> {
        let Some(offer) = self.offer else {
            return self.fail(BeaconError::Critical(
                "No offer available for request".to_string(),
            ));
        };

        let request_packet = match build_dhcp_request(
            &self.mac_address,
            self.xid,
            offer.offered_ip,
            offer.server_identifier,
        ) {
            Ok(packet) => packet,
            Err(e) => return self.fail(e.into()),
        };
        tracing::info!("Broadcasting DHCP REQUEST for {}", offer.offered_ip);
        self.state = DhcpV4State::RequestSent;
        Ok(Action::Send(request_packet, self.target, Phase::Ack))
    }

    fn handle_request_sent(&mut self, event: Event) -> Result<Action, BeaconError> {
        match event {
            Event::PacketReceived(data) => match self.accept_reply(data, MessageType::Ack) {
                Ok(msg) => {
                    tracing::info!("Received DHCP ACK: assigned IP {}", msg.yiaddr);
                    let lease = self.extract_lease_info(&msg);
                    self.state = DhcpV4State::Bound;
                    Ok(Action::Bind(lease))
                }
                Err(reason) => self.fail(BeaconError::InvalidReply {
                    phase: Phase::Ack,
                    reason,
                }),
            },
            Event::Timeout(waited) => self.fail(BeaconError::Timeout {
                phase: Phase::Ack,
                waited,
            }),
            Event::Start => self.unexpected_event("Start"),
        }
    }

    fn unexpected_event(&mut self, event: &str) -> Result<Action, BeaconError> {
        let state = self.state_name();
        self.fail(BeaconError::Critical(format!(
            "unexpected {event} event in state {state}"
        )))
    }

    /// Options 1/3/6/51 are optional; malformed values are treated as absent.
    fn extract_lease_info(&self, msg: &DhcpMessage) -> Lease {
        let server_identifier = msg
            .options
            .ipv4(options::SERVER_ID)
            .or(self.offer.map(|o| o.server_identifier))
            .unwrap_or(Ipv4Addr::UNSPECIFIED);

        Lease {
            assigned_ip: msg.yiaddr,
            server_identifier,
            subnet_mask: msg.options.ipv4(options::SUBNET_MASK),
            routers: msg.options.ipv4_list(options::ROUTER),
            dns_servers: msg.options.ipv4_list(options::DNS_SERVER),
            lease_time: msg
                .options
                .u32(options::LEASE_TIME)
                .map(|secs| Duration::from_secs(u64::from(secs))),
        }
    }
}

impl DhcpStateMachine for DhcpV4Handler {
    fn state_name(&self) -> &'static str {
        match self.state {
            DhcpV4State::Init => "Init",
            DhcpV4State::DiscoverSent => "DiscoverSent",
            DhcpV4State::OfferReceived => "OfferReceived",
            DhcpV4State::RequestSent => "RequestSent",
            DhcpV4State::Bound => "Bound",
            DhcpV4State::Failed => "Failed",
        }
    }

    fn handle_event(&mut self, event: Event) -> Result<Action, BeaconError> {
        tracing::trace!("Handling event {:?} in state {:?}", event, self.state);
        match self.state {
            DhcpV4State::Init => match event {
                Event::Start => self.handle_init(),
                Event::PacketReceived(_) => self.unexpected_event("PacketReceived"),
                Event::Timeout(_) => self.unexpected_event("Timeout"),
            },
            DhcpV4State::DiscoverSent => self.handle_discover_sent(event),
            DhcpV4State::OfferReceived => self.handle_offer_received(),
            DhcpV4State::RequestSent => self.handle_request_sent(event),
            DhcpV4State::Bound | DhcpV4State::Failed => Err(BeaconError::Critical(format!(
                "exchange already finished in state {}",
                self.state_name()
            ))),
        }
    }
}
