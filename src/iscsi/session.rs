//! iSCSI session manager
//!
//! Portal registration, discovery, CHAP handling and session lifecycle for the
//! host initiator. Nothing is cached here: the OS initiator can be changed
//! behind our back, so every read goes back to [`IscsiOsApi`].

use std::sync::Arc;

use super::secret::MutualChapSecret;
use super::types::{AuthType, ChapCredentials, TargetPortal};
use crate::error::ProxyError;
use crate::os::{ConnectCredentials, IscsiOsApi, OsError};

/// Stateless front end over the OS initiator, plus the shared mutual secret
pub struct SessionManager {
    api: Arc<dyn IscsiOsApi>,
    mutual_secret: MutualChapSecret,
}

impl SessionManager {
    pub fn new(api: Arc<dyn IscsiOsApi>, mutual_secret: MutualChapSecret) -> Self {
        Self { api, mutual_secret }
    }

    /// Handle to the mutual secret this manager reads on every connect
    pub fn mutual_secret(&self) -> &MutualChapSecret {
        &self.mutual_secret
    }

    pub fn add_target_portal(&self, portal: &TargetPortal) -> Result<(), ProxyError> {
        portal.validate()?;
        let portal = portal.normalized();
        log::info!("Adding target portal {}", portal);
        self.api
            .add_target_portal(&portal)
            .map_err(ProxyError::PortalOperationFailed)
    }

    /// Registered portals with normalized ports, in OS order
    pub fn list_target_portals(&self) -> Result<Vec<TargetPortal>, ProxyError> {
        let portals = self
            .api
            .list_target_portals()
            .map_err(ProxyError::PortalOperationFailed)?;
        Ok(portals.iter().map(TargetPortal::normalized).collect())
    }

    pub fn remove_target_portal(&self, portal: &TargetPortal) -> Result<(), ProxyError> {
        portal.validate()?;
        let portal = portal.normalized();
        log::info!("Removing target portal {}", portal);
        self.api
            .remove_target_portal(&portal)
            .map_err(ProxyError::PortalOperationFailed)
    }

    /// Run SendTargets discovery against a portal
    pub fn discover_target_portal(&self, portal: &TargetPortal) -> Result<Vec<String>, ProxyError> {
        portal.validate()?;
        let portal = portal.normalized();
        let iqns = self
            .api
            .discover_target_portal(&portal)
            .map_err(ProxyError::DiscoveryFailed)?;
        log::info!("Discovered {} target(s) on {}", iqns.len(), portal);
        Ok(iqns)
    }

    /// Log in to `iqn` through `portal`.
    ///
    /// Mutual CHAP logins use the mutual secret as it stands at call time.
    pub fn connect_target(
        &self,
        portal: &TargetPortal,
        iqn: &str,
        chap: &ChapCredentials,
    ) -> Result<(), ProxyError> {
        portal.validate()?;
        validate_iqn(iqn)?;
        chap.validate()?;
        let portal = portal.normalized();

        let mutual_secret = match chap.auth_type {
            AuthType::MutualChap => {
                let secret = self.mutual_secret.get();
                if secret.is_none() {
                    log::warn!("Mutual CHAP login to {} without a mutual secret set", iqn);
                }
                secret
            }
            AuthType::None | AuthType::OneWayChap => None,
        };

        let credentials = ConnectCredentials {
            auth_type: chap.auth_type,
            username: chap.username.clone(),
            secret: chap.secret.clone(),
            mutual_secret,
        };

        log::info!("Connecting to {} via {} ({:?})", iqn, portal, chap.auth_type);
        self.api
            .connect_target(&portal, iqn, &credentials)
            .map_err(|e| match e {
                OsError::Authentication(_) => ProxyError::AuthenticationFailed(e),
                _ => ProxyError::ConnectFailed(e),
            })
    }

    /// Log out of the session for (portal, iqn). A missing session is an error.
    pub fn disconnect_target(&self, portal: &TargetPortal, iqn: &str) -> Result<(), ProxyError> {
        portal.validate()?;
        validate_iqn(iqn)?;
        let portal = portal.normalized();
        log::info!("Disconnecting from {} via {}", iqn, portal);
        self.api
            .disconnect_target(&portal, iqn)
            .map_err(ProxyError::DisconnectFailed)
    }

    /// Disks exposed by the connected session for (portal, iqn)
    pub fn get_target_disks(
        &self,
        portal: &TargetPortal,
        iqn: &str,
    ) -> Result<Vec<String>, ProxyError> {
        portal.validate()?;
        validate_iqn(iqn)?;
        let portal = portal.normalized();
        self.api
            .get_target_disks(&portal, iqn)
            .map_err(ProxyError::SessionNotFound)
    }

    /// Replace the initiator-wide mutual CHAP secret
    pub fn set_mutual_chap_secret(&self, secret: &str) -> Result<(), ProxyError> {
        if secret.is_empty() {
            return Err(ProxyError::InvalidArgument(
                "mutual CHAP secret must not be empty".to_string(),
            ));
        }
        self.mutual_secret.replace_with(secret.to_string(), |value| {
            self.api
                .set_mutual_chap_secret(value)
                .map_err(ProxyError::AuthenticationFailed)
        })?;
        log::info!("Mutual CHAP secret updated");
        Ok(())
    }
}

fn validate_iqn(iqn: &str) -> Result<(), ProxyError> {
    if iqn.trim().is_empty() {
        return Err(ProxyError::InvalidArgument(
            "target IQN must not be empty".to_string(),
        ));
    }
    Ok(())
}
