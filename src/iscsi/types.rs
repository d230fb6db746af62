//! iSCSI data model and request/response shapes

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProxyError;

/// Well-known iSCSI port, used whenever a portal leaves its port unset
pub const DEFAULT_ISCSI_PORT: u16 = 3260;

/// An iSCSI portal endpoint
///
/// A port of 0 means "default" and is normalized to 3260 before the portal is
/// stored, listed or compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPortal {
    /// IP address or hostname
    pub address: String,

    #[serde(default)]
    pub port: u16,
}

impl TargetPortal {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Port with the 0 → 3260 default applied
    pub fn effective_port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_ISCSI_PORT
        } else {
            self.port
        }
    }

    /// Copy of this portal with its port normalized
    pub fn normalized(&self) -> Self {
        Self {
            address: self.address.clone(),
            port: self.effective_port(),
        }
    }

    /// Whether both values name the same portal
    pub fn is_same(&self, other: &TargetPortal) -> bool {
        self.address == other.address && self.effective_port() == other.effective_port()
    }

    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.address.trim().is_empty() {
            return Err(ProxyError::InvalidArgument(
                "target portal address must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for TargetPortal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.effective_port())
    }
}

/// Authentication mode for a target login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthType {
    #[default]
    None,
    OneWayChap,
    MutualChap,
}

/// Per-connection CHAP material
#[derive(Clone, Default)]
pub struct ChapCredentials {
    pub auth_type: AuthType,
    pub username: String,
    pub secret: String,
}

impl ChapCredentials {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(auth_type: AuthType, username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            auth_type,
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// Check that the credentials present match the authentication mode
    pub fn validate(&self) -> Result<(), ProxyError> {
        match self.auth_type {
            AuthType::None => {
                if !self.username.is_empty() || !self.secret.is_empty() {
                    return Err(ProxyError::InvalidArgument(
                        "CHAP username and secret must be empty when auth type is NONE"
                            .to_string(),
                    ));
                }
            }
            AuthType::OneWayChap | AuthType::MutualChap => {
                if self.username.is_empty() || self.secret.is_empty() {
                    return Err(ProxyError::InvalidArgument(format!(
                        "CHAP username and secret are required for {:?}",
                        self.auth_type
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ChapCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChapCredentials")
            .field("auth_type", &self.auth_type)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTargetPortalRequest {
    pub target_portal: TargetPortal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddTargetPortalResponse {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTargetPortalsRequest {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTargetPortalsResponse {
    pub target_portals: Vec<TargetPortal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveTargetPortalRequest {
    pub target_portal: TargetPortal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoveTargetPortalResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverTargetPortalRequest {
    pub target_portal: TargetPortal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoverTargetPortalResponse {
    pub iqns: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectTargetRequest {
    pub target_portal: TargetPortal,
    pub iqn: String,

    #[serde(default)]
    pub auth_type: AuthType,

    #[serde(default)]
    pub chap_username: String,

    #[serde(default)]
    pub chap_secret: String,
}

impl ConnectTargetRequest {
    pub fn credentials(&self) -> ChapCredentials {
        ChapCredentials::new(self.auth_type, &self.chap_username, &self.chap_secret)
    }
}

impl fmt::Debug for ConnectTargetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTargetRequest")
            .field("target_portal", &self.target_portal)
            .field("iqn", &self.iqn)
            .field("auth_type", &self.auth_type)
            .field("chap_username", &self.chap_username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectTargetResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectTargetRequest {
    pub target_portal: TargetPortal,
    pub iqn: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisconnectTargetResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTargetDisksRequest {
    pub target_portal: TargetPortal,
    pub iqn: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetTargetDisksResponse {
    /// Disk identifiers in OS enumeration order
    pub disk_ids: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SetMutualChapSecretRequest {
    pub mutual_chap_secret: String,
}

impl fmt::Debug for SetMutualChapSecretRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SetMutualChapSecretRequest { .. }")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetMutualChapSecretResponse {}
