//! Ethernet hardware addresses and their discovery through sysfs.

use crate::error::BeaconError;
use std::{
    fmt,
    fs,
    path::Path,
    str::FromStr,
};

pub const ETH_ALEN: usize = 6;
pub const SYSFS_NET_ROOT: &str = "/sys/class/net";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr([u8; ETH_ALEN]);

impl MacAddr {
    pub const fn new(octets: [u8; ETH_ALEN]) -> Self {
        Self(octets)
    }

    pub fn as_bytes(&self) -> &[u8; ETH_ALEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Reads the address of `interface` from `<root>/<interface>/address`.
    pub fn from_sysfs(root: &Path, interface: &str) -> Result<Self, BeaconError> {
        let path = root.join(interface).join("address");
        let mac_str = fs::read_to_string(&path).map_err(|e| {
            tracing::debug!("Failed to read {}: {}", path.display(), e);
            BeaconError::InterfaceInvalid(interface.to_string())
        })?;
        mac_str.trim().parse()
    }

    /// Resolves the hardware address to use as `chaddr`.
    ///
    /// With an interface name the address is read for that interface only.
    /// Otherwise the first interface, by name, other than loopback that has
    /// a non-zero address is used.
    pub fn discover(root: &Path, interface: Option<&str>) -> Result<Self, BeaconError> {
        if let Some(interface) = interface {
            return Self::from_sysfs(root, interface);
        }

        let mut names: Vec<String> = fs::read_dir(root)
            .map_err(|_| BeaconError::InterfaceInvalid(root.display().to_string()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name != "lo")
            .collect();
        names.sort();

        for name in &names {
            match Self::from_sysfs(root, name) {
                Ok(mac) if !mac.is_zero() => {
                    tracing::debug!("Using hardware address of interface {}", name);
                    return Ok(mac);
                }
                Ok(_) => tracing::debug!("Skipping {} with all-zero address", name),
                Err(e) => tracing::debug!("Skipping {}: {}", name, e),
            }
        }
        Err(BeaconError::InterfaceInvalid(format!(
            "any interface under {}",
            root.display()
        )))
    }
}

impl From<[u8; ETH_ALEN]> for MacAddr {
    fn from(octets: [u8; ETH_ALEN]) -> Self {
        Self(octets)
    }
}

impl FromStr for MacAddr {
    type Err = BeaconError;

    /// Parses `0a:1b:2c:3d:4e:5f`.
    fn from_str(mac_str: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; ETH_ALEN];
        let mut count = 0;
        for byte_str in mac_str.split(':') {
            if count == ETH_ALEN || byte_str.is_empty() || byte_str.len() > 2 {
                return Err(BeaconError::MacParse(mac_str.to_string()));
            }
            octets[count] = u8::from_str_radix(byte_str, 16)
                .map_err(|e| BeaconError::MacParse(format!("{mac_str}: {e}")))?;
            count += 1;
        }
        if count != ETH_ALEN {
            return Err(BeaconError::MacParse(mac_str.to_string()));
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}
