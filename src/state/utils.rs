use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a new random (v4) instance UUID
pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Whether `s` parses as an RFC 4122 UUID
pub fn is_valid_uuid(s: &str) -> bool {
    Uuid::parse_str(s).is_ok()
}

/// Maps an instance UUID to the guest's hardware address.
///
/// The mapping must be deterministic: the same UUID always yields the same
/// MAC, so the guest keeps its DHCP lease across restarts.
pub trait MacDeriver: Send + Sync {
    fn derive(&self, uuid: &str) -> Result<String>;
}

/// Locally administered unicast MAC taken from the SHA-256 of the UUID bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashedMac;

impl MacDeriver for HashedMac {
    fn derive(&self, uuid: &str) -> Result<String> {
        let parsed = Uuid::parse_str(uuid)?;
        if parsed.is_nil() {
            bail!("cannot derive a MAC address from the nil UUID");
        }

        let digest = Sha256::digest(parsed.as_bytes());
        // set the locally administered bit, clear the multicast bit
        let first = (digest[0] | 0x02) & 0xfe;
        Ok(format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            first, digest[1], digest[2], digest[3], digest[4], digest[5]
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_is_valid() {
        let id = generate_uuid();
        assert!(is_valid_uuid(&id));
        assert_ne!(id, "random");
        assert_ne!(generate_uuid(), id);
    }

    #[test]
    fn test_is_valid_uuid() {
        assert!(is_valid_uuid("9c9d6e3a-6a0e-4c41-a8d2-2a5f0b8f1d11"));
        assert!(!is_valid_uuid("random"));
        assert!(!is_valid_uuid("9c9d6e3a-6a0e-4c41-a8d2"));
        assert!(!is_valid_uuid(""));
    }

    #[test]
    fn test_hashed_mac_is_deterministic() {
        let uuid = "9c9d6e3a-6a0e-4c41-a8d2-2a5f0b8f1d11";
        let mac = HashedMac.derive(uuid).unwrap();
        assert_eq!(mac, HashedMac.derive(uuid).unwrap());
        assert_eq!(mac.len(), 17);

        let first = u8::from_str_radix(&mac[..2], 16).unwrap();
        assert_eq!(first & 0x02, 0x02, "locally administered bit");
        assert_eq!(first & 0x01, 0x00, "unicast");
    }

    #[test]
    fn test_hashed_mac_rejects_nil_and_garbage() {
        assert!(HashedMac.derive(&Uuid::nil().to_string()).is_err());
        assert!(HashedMac.derive("not-a-uuid").is_err());
    }
}
