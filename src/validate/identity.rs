use anyhow::Result;
use tracing::{info, warn};

use super::ValidationError;
use crate::registry::ResourceRegistry;
use crate::state::{generate_uuid, is_valid_uuid, MacDeriver};

/// Sentinel asking for a freshly generated UUID
pub const RANDOM_UUID: &str = "random";

/// Upper bound on UUIDs tried while looking for one that maps to a MAC
pub const MAX_MAC_ATTEMPTS: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uuid: String,
    pub name: String,
    pub mac_address: String,
}

/// Settle the instance's UUID, name and MAC, and make sure no running
/// instance already uses the UUID or the name.
pub async fn resolve_identity(
    requested_uuid: &str,
    requested_name: Option<&str>,
    macs: &dyn MacDeriver,
    registry: &dyn ResourceRegistry,
) -> Result<Identity> {
    let mut uuid = if requested_uuid == RANDOM_UUID {
        generate_uuid()
    } else if !is_valid_uuid(requested_uuid) {
        warn!(
            requested = requested_uuid,
            "not a valid UUID as it doesn't follow RFC 4122, using a randomly generated one"
        );
        generate_uuid()
    } else {
        requested_uuid.to_string()
    };

    let mut attempts = 0;
    let mac_address = loop {
        attempts += 1;
        match macs.derive(&uuid) {
            Ok(mac) => break mac,
            Err(e) if attempts < MAX_MAC_ATTEMPTS => {
                if requested_uuid != RANDOM_UUID {
                    warn!(
                        uuid = %uuid,
                        error = %e,
                        "unable to guess the MAC address from the UUID, using a randomly generated one"
                    );
                }
                uuid = generate_uuid();
            }
            Err(_) => return Err(ValidationError::MacDerivation { attempts }.into()),
        }
    };

    let name = match requested_name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => uuid.clone(),
    };

    let running = registry.running().await?;
    if let Some(holder) = running.iter().find(|vm| vm.uuid == uuid) {
        return Err(ValidationError::UuidInUse {
            uuid,
            holder: holder.name.clone(),
        }
        .into());
    }
    // names and UUIDs share one lookup namespace
    if let Some(holder) = running.iter().find(|vm| vm.name == name || vm.uuid == name) {
        return Err(ValidationError::NameInUse {
            name,
            holder: holder.uuid.clone(),
        }
        .into());
    }

    info!(target: "identity", uuid = %uuid, name = %name, mac = %mac_address, "identity resolved");
    Ok(Identity {
        uuid,
        name,
        mac_address,
    })
}
