//! DHCPv4 wire format
//!
//! Encoding and decoding of the 236-byte BOOTP header, the magic cookie and
//! the TLV option list that follows it (RFC 2131 §2, RFC 2132).

use crate::{error::FormatError, mac::MacAddr};
use bytes::{BufMut as _, Bytes, BytesMut};
use std::{fmt, net::Ipv4Addr};

/// Length of the fixed header, up to and including `file`.
pub const DHCP_HEADER_LEN: usize = 236;
pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
/// Broadcast bit of `flags`, the most significant bit on the wire.
pub const BROADCAST_FLAG: u16 = 0x8000;

pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;
pub const HTYPE_ETHERNET: u8 = 1;

const MAX_CHADDR_LEN: usize = 16;
const SNAME_LEN: usize = 64;
const FILE_LEN: usize = 128;
const OPTIONS_OFFSET: usize = DHCP_HEADER_LEN + MAGIC_COOKIE.len();

/// DHCP option codes used by this client.
pub mod options {
    pub const PAD: u8 = 0;
    pub const SUBNET_MASK: u8 = 1;
    pub const ROUTER: u8 = 3;
    pub const DNS_SERVER: u8 = 6;
    pub const DOMAIN_NAME: u8 = 15;
    pub const REQUESTED_IP: u8 = 50;
    pub const LEASE_TIME: u8 = 51;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_ID: u8 = 54;
    pub const PARAMETER_REQUEST: u8 = 55;
    pub const END: u8 = 255;
}

/// Parameters asked for in every DISCOVER and REQUEST.
pub const PARAMETER_REQUEST_LIST: [u8; 4] = [
    options::SUBNET_MASK,
    options::ROUTER,
    options::DOMAIN_NAME,
    options::DNS_SERVER,
];

/// DHCP message types (option 53)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            1 => Ok(MessageType::Discover),
            2 => Ok(MessageType::Offer),
            3 => Ok(MessageType::Request),
            4 => Ok(MessageType::Decline),
            5 => Ok(MessageType::Ack),
            6 => Ok(MessageType::Nak),
            7 => Ok(MessageType::Release),
            8 => Ok(MessageType::Inform),
            other => Err(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Discover => "DHCPDISCOVER",
            MessageType::Offer => "DHCPOFFER",
            MessageType::Request => "DHCPREQUEST",
            MessageType::Decline => "DHCPDECLINE",
            MessageType::Ack => "DHCPACK",
            MessageType::Nak => "DHCPNAK",
            MessageType::Release => "DHCPRELEASE",
            MessageType::Inform => "DHCPINFORM",
        };
        f.write_str(name)
    }
}

/// Option map keyed by option code.
///
/// Codes are unique. Emission follows first-insertion order; inserting an
/// existing code replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhcpOptions {
    entries: Vec<(u8, Bytes)>,
}

impl DhcpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: u8, value: impl Into<Bytes>) -> &mut Self {
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| *c == code) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((code, value)),
        }
        self
    }

    pub fn get(&self, code: u8) -> Option<&Bytes> {
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, code: u8) -> bool {
        self.get(code).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &Bytes)> {
        self.entries.iter().map(|(code, value)| (*code, value))
    }

    /// A single IPv4 address; `None` unless the value is exactly 4 bytes.
    pub fn ipv4(&self, code: u8) -> Option<Ipv4Addr> {
        let value: [u8; 4] = self.get(code)?[..].try_into().ok()?;
        Some(Ipv4Addr::from(value))
    }

    /// Every complete 4-byte entry of an address list option.
    pub fn ipv4_list(&self, code: u8) -> Option<Vec<Ipv4Addr>> {
        let addrs: Vec<Ipv4Addr> = self
            .get(code)?
            .chunks_exact(4)
            .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]))
            .collect();
        if addrs.is_empty() {
            None
        } else {
            Some(addrs)
        }
    }

    pub fn u32(&self, code: u8) -> Option<u32> {
        let value: [u8; 4] = self.get(code)?[..].try_into().ok()?;
        Some(u32::from_be_bytes(value))
    }
}

/// Appends one `code | length | value` option to `buf`.
pub fn encode_option(buf: &mut BytesMut, code: u8, value: &[u8]) -> Result<(), FormatError> {
    if code == options::PAD || code == options::END {
        return Err(FormatError::ReservedOptionCode(code));
    }
    let len = u8::try_from(value.len()).map_err(|_| FormatError::OptionTooLong {
        code,
        len: value.len(),
    })?;
    buf.reserve(2 + value.len());
    buf.put_u8(code);
    buf.put_u8(len);
    buf.put_slice(value);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpMessage {
    /// 1 = BOOTREQUEST, 2 = BOOTREPLY
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    /// Transaction ID
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    /// Client hardware address, zero padded. Only the first `hlen` bytes
    /// are meaningful.
    pub chaddr: [u8; MAX_CHADDR_LEN],
    pub options: DhcpOptions,
}

impl Default for DhcpMessage {
    fn default() -> Self {
        Self {
            op: BOOTREQUEST,
            htype: HTYPE_ETHERNET,
            hlen: 0,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: [0u8; MAX_CHADDR_LEN],
            options: DhcpOptions::default(),
        }
    }
}

impl DhcpMessage {
    /// A broadcast BOOTREQUEST from `mac` carrying `msg_type`.
    pub fn request(mac: &MacAddr, xid: u32, msg_type: MessageType) -> Self {
        let mut msg = Self {
            xid,
            flags: BROADCAST_FLAG,
            ..Self::default()
        };
        msg.chaddr[..6].copy_from_slice(mac.as_bytes());
        msg.hlen = 6;
        msg.options
            .insert(options::MESSAGE_TYPE, vec![msg_type as u8]);
        msg
    }

    /// Sets `chaddr` and `hlen` from a hardware address of up to 16 bytes.
    pub fn set_chaddr(&mut self, hwaddr: &[u8]) -> Result<&mut Self, FormatError> {
        if hwaddr.len() > MAX_CHADDR_LEN {
            return Err(FormatError::HardwareAddressTooLong(hwaddr.len()));
        }
        self.chaddr = [0u8; MAX_CHADDR_LEN];
        self.chaddr[..hwaddr.len()].copy_from_slice(hwaddr);
        // Bounded by MAX_CHADDR_LEN above.
        self.hlen = hwaddr.len() as u8;
        Ok(self)
    }

    /// The meaningful `hlen` bytes of `chaddr`.
    pub fn hardware_address(&self) -> &[u8] {
        &self.chaddr[..usize::from(self.hlen).min(MAX_CHADDR_LEN)]
    }

    pub fn is_broadcast(&self) -> bool {
        self.flags & BROADCAST_FLAG != 0
    }

    /// Raw value byte of option 53, if present and non-empty.
    pub fn message_type(&self) -> Option<u8> {
        self.options
            .get(options::MESSAGE_TYPE)
            .and_then(|v| v.first().copied())
    }

    pub fn encode(&self) -> Result<Bytes, FormatError> {
        let mut opts = BytesMut::new();
        for (code, value) in self.options.iter() {
            encode_option(&mut opts, code, value)?;
        }
        Ok(self.encode_with_options(&opts))
    }

    /// Writes the header, magic cookie, `opts` verbatim and the end marker.
    pub fn encode_with_options(&self, opts: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(OPTIONS_OFFSET + opts.len() + 1);
        buf.put_u8(self.op);
        buf.put_u8(self.htype);
        buf.put_u8(self.hlen);
        buf.put_u8(self.hops);
        buf.put_u32(self.xid);
        buf.put_u16(self.secs);
        buf.put_u16(self.flags);
        buf.put_slice(&self.ciaddr.octets());
        buf.put_slice(&self.yiaddr.octets());
        buf.put_slice(&self.siaddr.octets());
        buf.put_slice(&self.giaddr.octets());
        buf.put_slice(&self.chaddr);
        buf.put_bytes(0, SNAME_LEN);
        buf.put_bytes(0, FILE_LEN);
        buf.put_slice(&MAGIC_COOKIE);
        buf.put_slice(opts);
        buf.put_u8(options::END);
        buf.freeze()
    }

    pub fn decode(raw: &[u8]) -> Result<Self, FormatError> {
        if raw.len() < DHCP_HEADER_LEN {
            return Err(FormatError::TooShort {
                len: raw.len(),
                min: DHCP_HEADER_LEN,
            });
        }
        let cookie = &raw[DHCP_HEADER_LEN..raw.len().min(OPTIONS_OFFSET)];
        if cookie != MAGIC_COOKIE {
            return Err(FormatError::InvalidMagicCookie(cookie.to_vec()));
        }

        // sname and file are not used by this client.
        let ipv4_at = |pos: usize| Ipv4Addr::new(raw[pos], raw[pos + 1], raw[pos + 2], raw[pos + 3]);
        let mut chaddr = [0u8; MAX_CHADDR_LEN];
        chaddr.copy_from_slice(&raw[28..28 + MAX_CHADDR_LEN]);

        Ok(Self {
            op: raw[0],
            htype: raw[1],
            hlen: raw[2],
            hops: raw[3],
            xid: u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
            secs: u16::from_be_bytes([raw[8], raw[9]]),
            flags: u16::from_be_bytes([raw[10], raw[11]]),
            ciaddr: ipv4_at(12),
            yiaddr: ipv4_at(16),
            siaddr: ipv4_at(20),
            giaddr: ipv4_at(24),
            chaddr,
            options: decode_options(raw, OPTIONS_OFFSET)?,
        })
    }
}

/// Scans TLVs from `start` until the end marker. Running off the buffer
/// before the end marker is an error, never a partial map.
fn decode_options(raw: &[u8], start: usize) -> Result<DhcpOptions, FormatError> {
    let mut opts = DhcpOptions::new();
    let mut pos = start;
    loop {
        let code = *raw
            .get(pos)
            .ok_or(FormatError::TruncatedOptions { offset: pos })?;
        match code {
            options::END => return Ok(opts),
            options::PAD => pos += 1,
            _ => {
                let len = usize::from(
                    *raw.get(pos + 1)
                        .ok_or(FormatError::TruncatedOptions { offset: pos })?,
                );
                let value = raw
                    .get(pos + 2..pos + 2 + len)
                    .ok_or(FormatError::TruncatedOptions { offset: pos })?;
                opts.insert(code, Bytes::copy_from_slice(value));
                pos += 2 + len;
            }
        }
    }
}

/// Constructs a DHCP Discover message.
pub fn build_dhcp_discover(mac_addr: &MacAddr, xid: u32) -> Result<Bytes, FormatError> {
    let mut msg = DhcpMessage::request(mac_addr, xid, MessageType::Discover);
    msg.options
        .insert(options::PARAMETER_REQUEST, PARAMETER_REQUEST_LIST.to_vec());
    msg.encode()
}

/// Constructs a DHCP Request message for the address a server offered.
pub fn build_dhcp_request(
    mac_addr: &MacAddr,
    xid: u32,
    offered_ip: Ipv4Addr,
    server_ip: Ipv4Addr,
) -> Result<Bytes, FormatError> {
    // ciaddr stays 0.0.0.0 as the address is not confirmed yet.
    let mut msg = DhcpMessage::request(mac_addr, xid, MessageType::Request);
    msg.options
        .insert(options::REQUESTED_IP, offered_ip.octets().to_vec())
        .insert(options::SERVER_ID, server_ip.octets().to_vec())
        .insert(options::PARAMETER_REQUEST, PARAMETER_REQUEST_LIST.to_vec());
    msg.encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn reply(xid: u32, msg_type: MessageType) -> DhcpMessage {
        let mut msg = DhcpMessage {
            op: BOOTREPLY,
            xid,
            yiaddr: Ipv4Addr::new(192, 168, 1, 50),
            ..DhcpMessage::default()
        };
        assert_ok!(msg.set_chaddr(&[0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4]));
        msg.options
            .insert(options::MESSAGE_TYPE, vec![msg_type as u8])
            .insert(options::SERVER_ID, vec![192u8, 168, 1, 1]);
        msg
    }

    #[test]
    fn test_encode_layout() {
        let msg = reply(0xAABBCCDD, MessageType::Offer);
        let raw = assert_ok!(msg.encode());

        assert_eq!(raw.len(), OPTIONS_OFFSET + 3 + 6 + 1);
        assert_eq!(&raw[..4], &[BOOTREPLY, HTYPE_ETHERNET, 6, 0]);
        assert_eq!(&raw[4..8], &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(&raw[16..20], &[192, 168, 1, 50]);
        assert_eq!(&raw[28..34], &[0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4]);
        assert!(raw[34..DHCP_HEADER_LEN].iter().all(|b| *b == 0));
        assert_eq!(&raw[DHCP_HEADER_LEN..OPTIONS_OFFSET], &MAGIC_COOKIE);
        assert_eq!(&raw[OPTIONS_OFFSET..OPTIONS_OFFSET + 3], &[53, 1, 2]);
        assert_eq!(raw[raw.len() - 1], options::END);
    }

    #[test]
    fn test_decode_reproduces_fields() {
        let mut msg = reply(0x01020304, MessageType::Ack);
        msg.secs = 7;
        msg.flags = BROADCAST_FLAG;
        msg.siaddr = Ipv4Addr::new(10, 0, 0, 1);
        msg.options
            .insert(options::DNS_SERVER, vec![8u8, 8, 8, 8, 8, 8, 4, 4])
            .insert(options::DOMAIN_NAME, b"example.org".to_vec());

        let decoded = assert_ok!(DhcpMessage::decode(&assert_ok!(msg.encode())));

        assert_eq!(decoded, msg);
        assert!(decoded.is_broadcast());
        assert_eq!(decoded.hardware_address(), &[0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4]);
    }

    #[test]
    fn test_decode_rejects_bad_magic_cookie() {
        let mut raw = assert_ok!(reply(1, MessageType::Offer).encode()).to_vec();
        raw[DHCP_HEADER_LEN + 3] = 0x64;

        assert!(matches!(
            DhcpMessage::decode(&raw),
            Err(FormatError::InvalidMagicCookie(_))
        ));
    }

    #[test]
    fn test_decode_rejects_short_buffers() {
        assert_eq!(
            DhcpMessage::decode(&[0u8; 100]),
            Err(FormatError::TooShort {
                len: 100,
                min: DHCP_HEADER_LEN
            })
        );
        // A full header with no room for the cookie.
        assert!(matches!(
            DhcpMessage::decode(&[0u8; DHCP_HEADER_LEN + 2]),
            Err(FormatError::InvalidMagicCookie(_))
        ));
    }

    #[test]
    fn test_decode_without_end_marker_is_truncated() {
        let raw = assert_ok!(reply(1, MessageType::Offer).encode());
        let without_end = &raw[..raw.len() - 1];

        assert!(matches!(
            DhcpMessage::decode(without_end),
            Err(FormatError::TruncatedOptions { .. })
        ));
    }

    #[test]
    fn test_decode_option_overrunning_buffer_is_truncated() {
        let msg = DhcpMessage::default();
        // Claims 8 bytes of DNS servers but only carries 4, then ends.
        let raw = msg.encode_with_options(&[6, 8, 8, 8, 8, 8]);
        let raw = &raw[..raw.len() - 1];

        assert_eq!(
            DhcpMessage::decode(raw),
            Err(FormatError::TruncatedOptions {
                offset: OPTIONS_OFFSET
            })
        );
    }

    #[test]
    fn test_decode_duplicate_option_last_wins() {
        let raw = DhcpMessage::default().encode_with_options(&[53, 1, 2, 53, 1, 5]);
        let decoded = assert_ok!(DhcpMessage::decode(&raw));

        assert_eq!(decoded.message_type(), Some(5));
        assert_eq!(decoded.options.len(), 1);
    }

    #[test]
    fn test_decode_skips_pad_and_ignores_trailing_bytes() {
        let raw = DhcpMessage::default().encode_with_options(&[0, 0, 53, 1, 2, 0]);
        let mut raw = raw.to_vec();
        raw.extend_from_slice(&[0xde, 0xad]);

        let decoded = assert_ok!(DhcpMessage::decode(&raw));
        assert_eq!(decoded.message_type(), Some(2));
        assert_eq!(decoded.options.len(), 1);
    }

    #[test]
    fn test_encode_option_limits() {
        let mut buf = BytesMut::new();
        assert_ok!(encode_option(&mut buf, 12, &[b'a'; 255]));
        assert_eq!(buf.len(), 257);

        assert_eq!(
            encode_option(&mut buf, 12, &[0u8; 256]),
            Err(FormatError::OptionTooLong { code: 12, len: 256 })
        );
        assert_err!(encode_option(&mut buf, options::END, &[]));
        assert_err!(encode_option(&mut buf, options::PAD, &[]));
    }

    #[test]
    fn test_set_chaddr_rejects_oversized_address() {
        let mut msg = DhcpMessage::default();
        assert_eq!(
            msg.set_chaddr(&[1u8; 17]).err(),
            Some(FormatError::HardwareAddressTooLong(17))
        );
        assert_ok!(msg.set_chaddr(&[1u8; 16]));
        assert_eq!(msg.hlen, 16);
    }

    #[test]
    fn test_options_insert_replaces_in_place() {
        let mut opts = DhcpOptions::new();
        opts.insert(53, vec![1u8]).insert(55, vec![1u8, 3]).insert(53, vec![3u8]);

        let codes: Vec<u8> = opts.iter().map(|(code, _)| code).collect();
        assert_eq!(codes, vec![53, 55]);
        assert_eq!(opts.get(53).map(|v| v.to_vec()), Some(vec![3u8]));
    }

    #[test]
    fn test_options_typed_readers() {
        let mut opts = DhcpOptions::new();
        opts.insert(options::SUBNET_MASK, vec![255u8, 255, 255, 0])
            .insert(options::ROUTER, vec![10u8, 0, 0, 1, 10, 0, 0, 2, 99])
            .insert(options::SERVER_ID, vec![1u8, 2, 3])
            .insert(options::LEASE_TIME, 3600u32.to_be_bytes().to_vec());

        assert_eq!(
            opts.ipv4(options::SUBNET_MASK),
            Some(Ipv4Addr::new(255, 255, 255, 0))
        );
        assert_eq!(
            opts.ipv4_list(options::ROUTER),
            Some(vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)])
        );
        assert_eq!(opts.ipv4(options::SERVER_ID), None);
        assert_eq!(opts.ipv4_list(options::DNS_SERVER), None);
        assert_eq!(opts.u32(options::LEASE_TIME), Some(3600));
    }

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(MessageType::try_from(2), Ok(MessageType::Offer));
        assert_eq!(MessageType::try_from(6), Ok(MessageType::Nak));
        assert_eq!(MessageType::try_from(42), Err(42));
        assert_eq!(MessageType::Ack.to_string(), "DHCPACK");
    }
}
