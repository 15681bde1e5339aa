use crate::network::SocketError;
use std::{fmt, io, time::Duration};
use thiserror::Error;

/// A buffer could not be encoded to or decoded from the DHCP wire format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("buffer of {len} bytes is shorter than the {min}-byte DHCP header")]
    TooShort { len: usize, min: usize },

    #[error("invalid magic cookie {0:02x?}")]
    InvalidMagicCookie(Vec<u8>),

    #[error("option list truncated at offset {offset}")]
    TruncatedOptions { offset: usize },

    #[error("option {code} value is {len} bytes, at most 255 fit in one TLV")]
    OptionTooLong { code: u8, len: usize },

    #[error("option code {0} is reserved for padding or the end marker")]
    ReservedOptionCode(u8),

    #[error("hardware address of {0} bytes does not fit the 16-byte chaddr field")]
    HardwareAddressTooLong(usize),
}

/// Which reply the exchange was waiting for when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Offer,
    Ack,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Offer => write!(f, "Offer"),
            Phase::Ack => write!(f, "ACK"),
        }
    }
}

/// Why a received datagram was not accepted as the expected reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    #[error("malformed DHCP message")]
    Format(#[from] FormatError),

    #[error("transaction id mismatch: expected {expected:#010x}, received {received:#010x}")]
    XidMismatch { expected: u32, received: u32 },

    #[error("message type option (53) is missing")]
    MissingMessageType,

    #[error("expected message type {expected}, received {received}")]
    UnexpectedMessageType { expected: u8, received: u8 },
}

/// Coarse classification of a [`BeaconError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    ProtocolMismatch,
    Timeout,
    Transport,
    Config,
    Critical,
}

#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("Invalid or mismatched DHCP {phase}")]
    InvalidReply {
        phase: Phase,
        #[source]
        reason: ReplyError,
    },

    #[error("Timed out after {waited:?} waiting for DHCP {phase}")]
    Timeout { phase: Phase, waited: Duration },

    #[error("Datagram transport failed")]
    Transport(#[from] io::Error),

    #[error("Socket operation failed")]
    Socket(#[from] SocketError),

    #[error("Failed to encode DHCP message")]
    Format(#[from] FormatError),

    #[error("Failed to parse MAC address: {0}")]
    MacParse(String),

    #[error("Interface '{0}' not found or has no MAC address")]
    InterfaceInvalid(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("State machine reached a critical failure: {0}")]
    Critical(String),
}

impl BeaconError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BeaconError::InvalidReply {
                reason: ReplyError::Format(_),
                ..
            }
            | BeaconError::Format(_) => ErrorKind::Format,
            BeaconError::InvalidReply { .. } => ErrorKind::ProtocolMismatch,
            BeaconError::Timeout { .. } => ErrorKind::Timeout,
            BeaconError::Transport(_) | BeaconError::Socket(_) => ErrorKind::Transport,
            BeaconError::MacParse(_)
            | BeaconError::InterfaceInvalid(_)
            | BeaconError::Config(_) => ErrorKind::Config,
            BeaconError::Critical(_) => ErrorKind::Critical,
        }
    }

    /// The phase an exchange failure happened in, if it is tied to one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            BeaconError::InvalidReply { phase, .. } | BeaconError::Timeout { phase, .. } => {
                Some(*phase)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_reply_message_names_phase() {
        let offer = BeaconError::InvalidReply {
            phase: Phase::Offer,
            reason: ReplyError::MissingMessageType,
        };
        let ack = BeaconError::InvalidReply {
            phase: Phase::Ack,
            reason: ReplyError::MissingMessageType,
        };

        assert_eq!(offer.to_string(), "Invalid or mismatched DHCP Offer");
        assert_eq!(ack.to_string(), "Invalid or mismatched DHCP ACK");
    }

    #[test]
    fn test_error_kinds() {
        let format = BeaconError::InvalidReply {
            phase: Phase::Offer,
            reason: ReplyError::Format(FormatError::TruncatedOptions { offset: 240 }),
        };
        let mismatch = BeaconError::InvalidReply {
            phase: Phase::Ack,
            reason: ReplyError::XidMismatch {
                expected: 1,
                received: 2,
            },
        };
        let timeout = BeaconError::Timeout {
            phase: Phase::Ack,
            waited: Duration::from_secs(10),
        };
        let transport = BeaconError::from(io::Error::new(io::ErrorKind::Other, "down"));

        assert_eq!(format.kind(), ErrorKind::Format);
        assert_eq!(mismatch.kind(), ErrorKind::ProtocolMismatch);
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert_eq!(transport.kind(), ErrorKind::Transport);
        assert_eq!(timeout.phase(), Some(Phase::Ack));
        assert_eq!(transport.phase(), None);
    }
}
