//! Device identity derived from network interface MAC addresses.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Tag used when no usable interface exists.
pub const UNKNOWN_DEVICE: &str = "unknown-device";

const ZERO_MAC: &str = "00:00:00:00:00:00";

/// Interface name prefixes of virtual adapters.
const VIRTUAL_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vboxnet", "tun", "tap", "wg", "zt",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacAddress {
    pub interface: String,
    pub mac: String,
}

fn is_virtual(interface: &str) -> bool {
    let lower = interface.to_ascii_lowercase();
    lower.contains("vethernet")
        || lower.contains("virtual")
        || VIRTUAL_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Physical interfaces with a non-zero MAC, sorted by interface name.
pub fn mac_addresses() -> Vec<MacAddress> {
    mac_addresses_in(Path::new("/sys/class/net"))
}

/// Same as `mac_addresses`, reading a sysfs-style tree rooted at `root`
/// (`<root>/<iface>/address`).
pub fn mac_addresses_in(root: &Path) -> Vec<MacAddress> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot list network interfaces in {}: {}", root.display(), e);
            return Vec::new();
        }
    };

    let mut found: Vec<MacAddress> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let interface = entry.file_name().to_string_lossy().into_owned();
            if is_virtual(&interface) {
                return None;
            }
            let mac = std::fs::read_to_string(entry.path().join("address")).ok()?;
            let mac = mac.trim().to_ascii_lowercase();
            if mac.is_empty() || mac == ZERO_MAC {
                return None;
            }
            Some(MacAddress { interface, mac })
        })
        .collect();
    found.sort_by(|a, b| a.interface.cmp(&b.interface));
    found
}

/// Stable, filename-safe tag for this machine.
///
/// The first MAC with `:` replaced by `-` is hashed with SHA-256 and the
/// first 16 hex characters are kept.
pub fn device_tag(macs: &[MacAddress]) -> String {
    let Some(first) = macs.first() else {
        return UNKNOWN_DEVICE.to_string();
    };
    let legal = first.mac.replace(':', "-");
    let digest = Sha256::digest(legal.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn iface(root: &Path, name: &str, mac: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("address"), format!("{mac}\n")).unwrap();
    }

    #[test]
    fn test_filters_loopback_virtual_and_zero() {
        let root = TempDir::new().unwrap();
        iface(root.path(), "lo", "00:00:00:00:00:00");
        iface(root.path(), "docker0", "02:42:ac:11:00:02");
        iface(root.path(), "vEthernet (WSL)", "00:15:5d:00:00:01");
        iface(root.path(), "wlp3s0", "AA:BB:CC:DD:EE:FF");
        iface(root.path(), "enp0s31f6", "11:22:33:44:55:66");
        iface(root.path(), "eth9", "00:00:00:00:00:00");

        let macs = mac_addresses_in(root.path());
        assert_eq!(
            macs,
            vec![
                MacAddress {
                    interface: "enp0s31f6".into(),
                    mac: "11:22:33:44:55:66".into()
                },
                MacAddress {
                    interface: "wlp3s0".into(),
                    mac: "aa:bb:cc:dd:ee:ff".into()
                },
            ]
        );
    }

    #[test]
    fn test_missing_root_is_empty() {
        let root = TempDir::new().unwrap();
        assert!(mac_addresses_in(&root.path().join("none")).is_empty());
    }

    #[test]
    fn test_device_tag_is_stable_hex() {
        let macs = vec![MacAddress {
            interface: "eth0".into(),
            mac: "11:22:33:44:55:66".into(),
        }];
        let tag = device_tag(&macs);
        assert_eq!(tag.len(), 16);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(tag, device_tag(&macs));

        let other = vec![MacAddress {
            interface: "eth0".into(),
            mac: "11:22:33:44:55:67".into(),
        }];
        assert_ne!(tag, device_tag(&other));
    }

    #[test]
    fn test_device_tag_without_interfaces() {
        assert_eq!(device_tag(&[]), UNKNOWN_DEVICE);
    }
}
