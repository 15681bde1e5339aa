use crate::{error::BeaconError, mac::MacAddr};
use clap::Parser;
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};

pub const DHCP_CLIENT_PORT: u16 = 68;
pub const DHCP_SERVER_PORT: u16 = 67;
pub const DEFAULT_OFFER_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(version, about = "Obtain an IPv4 lease with a single DHCP exchange", long_about = None)]
pub struct Args {
    /// The network interface to bind to (e.g., 'eth0'); any interface when omitted
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Hardware address to use instead of the interface's (e.g., '52:54:00:12:34:56')
    #[arg(long)]
    pub mac: Option<MacAddr>,

    /// Seconds to wait for a DHCPOFFER
    #[arg(long, default_value_t = DEFAULT_OFFER_TIMEOUT.as_secs())]
    pub offer_timeout: u64,

    /// Seconds to wait for a DHCPACK
    #[arg(long, default_value_t = DEFAULT_ACK_TIMEOUT.as_secs())]
    pub ack_timeout: u64,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Log filter directive used when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub interface: Option<String>,
    pub mac_address: MacAddr,
    pub client_port: u16,
    pub server_port: u16,
    pub broadcast_address: Ipv4Addr,
    /// Local address the transport binds; the port is `client_port`.
    pub bind_address: Ipv4Addr,
    pub offer_timeout: Duration,
    pub ack_timeout: Duration,
}

impl ClientConfig {
    pub fn new(interface: Option<String>, mac_address: MacAddr) -> Self {
        Self {
            interface,
            mac_address,
            client_port: DHCP_CLIENT_PORT,
            server_port: DHCP_SERVER_PORT,
            broadcast_address: Ipv4Addr::BROADCAST,
            bind_address: Ipv4Addr::UNSPECIFIED,
            offer_timeout: DEFAULT_OFFER_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    /// Builds a configuration from command line arguments and the resolved
    /// hardware address.
    pub fn from_args(args: &Args, mac_address: MacAddr) -> Result<Self, BeaconError> {
        let config = Self {
            offer_timeout: Duration::from_secs(args.offer_timeout),
            ack_timeout: Duration::from_secs(args.ack_timeout),
            ..Self::new(args.interface.clone(), mac_address)
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BeaconError> {
        if self.offer_timeout.is_zero() || self.ack_timeout.is_zero() {
            return Err(BeaconError::Config(
                "reply timeouts must be greater than zero".to_string(),
            ));
        }
        if self.server_port == 0 {
            return Err(BeaconError::Config("server port must not be 0".to_string()));
        }
        Ok(())
    }

    /// Where DISCOVER and REQUEST are sent.
    pub fn server_target(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.broadcast_address, self.server_port))
    }

    pub fn local_address(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.bind_address, self.client_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    const MAC: MacAddr = MacAddr::new([0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4]);

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["beacon"]);

        assert_eq!(args.interface, None);
        assert_eq!(args.mac, None);
        assert_eq!(args.offer_timeout, 5);
        assert_eq!(args.ack_timeout, 10);
        assert_eq!(args.log_level(), "info");
    }

    #[test]
    fn test_args_full() {
        let args = Args::parse_from([
            "beacon",
            "-i",
            "eth0",
            "--mac",
            "52:54:00:12:34:56",
            "--offer-timeout",
            "2",
            "--ack-timeout",
            "3",
            "-vv",
        ]);

        assert_eq!(args.interface.as_deref(), Some("eth0"));
        assert_eq!(
            args.mac,
            Some(MacAddr::new([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]))
        );
        assert_eq!(args.log_level(), "trace");

        let config = assert_ok!(ClientConfig::from_args(&args, MAC));
        assert_eq!(config.offer_timeout, Duration::from_secs(2));
        assert_eq!(config.ack_timeout, Duration::from_secs(3));
        assert_eq!(config.interface.as_deref(), Some("eth0"));
    }

    #[test]
    fn test_args_reject_bad_mac() {
        assert_err!(Args::try_parse_from(["beacon", "--mac", "not-a-mac"]));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let args = Args::parse_from(["beacon", "--offer-timeout", "0"]);
        assert!(matches!(
            ClientConfig::from_args(&args, MAC),
            Err(BeaconError::Config(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::new(None, MAC);

        assert_eq!(config.server_target(), "255.255.255.255:67".parse().unwrap());
        assert_eq!(config.local_address(), "0.0.0.0:68".parse().unwrap());
        assert_eq!(config.offer_timeout, DEFAULT_OFFER_TIMEOUT);
        assert_eq!(config.ack_timeout, DEFAULT_ACK_TIMEOUT);
        assert_ok!(config.validate());
    }
}
