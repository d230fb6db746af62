//! iSCSI initiator API
//!
//! Target portal management, discovery, CHAP and session lifecycle, exposed as
//! versioned operations. `v1alpha1` predates mutual CHAP: it has no
//! `SetMutualChapSecret` and refuses `MUTUAL_CHAP` logins.

pub mod secret;
pub mod session;
pub mod types;

use std::sync::Arc;

use crate::api::Registry;
use crate::error::ProxyError;

pub use secret::MutualChapSecret;
pub use session::SessionManager;
pub use types::*;

pub const ADD_TARGET_PORTAL: &str = "AddTargetPortal";
pub const LIST_TARGET_PORTALS: &str = "ListTargetPortals";
pub const REMOVE_TARGET_PORTAL: &str = "RemoveTargetPortal";
pub const DISCOVER_TARGET_PORTAL: &str = "DiscoverTargetPortal";
pub const CONNECT_TARGET: &str = "ConnectTarget";
pub const DISCONNECT_TARGET: &str = "DisconnectTarget";
pub const GET_TARGET_DISKS: &str = "GetTargetDisks";
pub const SET_MUTUAL_CHAP_SECRET: &str = "SetMutualChapSecret";

/// Versions served by the iSCSI API
pub const VERSIONS: [&str; 3] = ["v1alpha1", "v1alpha2", "v1"];

/// Register every iSCSI operation for every supported version
pub fn register(manager: Arc<SessionManager>, registry: &mut Registry) -> Result<(), ProxyError> {
    for version in VERSIONS {
        let m = Arc::clone(&manager);
        registry.register(ADD_TARGET_PORTAL, version, move |req: AddTargetPortalRequest| {
            m.add_target_portal(&req.target_portal)?;
            Ok(AddTargetPortalResponse {})
        })?;

        let m = Arc::clone(&manager);
        registry.register(LIST_TARGET_PORTALS, version, move |_: ListTargetPortalsRequest| {
            Ok(ListTargetPortalsResponse {
                target_portals: m.list_target_portals()?,
            })
        })?;

        let m = Arc::clone(&manager);
        registry.register(REMOVE_TARGET_PORTAL, version, move |req: RemoveTargetPortalRequest| {
            m.remove_target_portal(&req.target_portal)?;
            Ok(RemoveTargetPortalResponse {})
        })?;

        let m = Arc::clone(&manager);
        registry.register(
            DISCOVER_TARGET_PORTAL,
            version,
            move |req: DiscoverTargetPortalRequest| {
                Ok(DiscoverTargetPortalResponse {
                    iqns: m.discover_target_portal(&req.target_portal)?,
                })
            },
        )?;

        let m = Arc::clone(&manager);
        let allow_mutual = version != "v1alpha1";
        registry.register(CONNECT_TARGET, version, move |req: ConnectTargetRequest| {
            if !allow_mutual && req.auth_type == AuthType::MutualChap {
                return Err(ProxyError::InvalidArgument(
                    "MUTUAL_CHAP is not supported by this API version".to_string(),
                ));
            }
            m.connect_target(&req.target_portal, &req.iqn, &req.credentials())?;
            Ok(ConnectTargetResponse {})
        })?;

        let m = Arc::clone(&manager);
        registry.register(DISCONNECT_TARGET, version, move |req: DisconnectTargetRequest| {
            m.disconnect_target(&req.target_portal, &req.iqn)?;
            Ok(DisconnectTargetResponse {})
        })?;

        let m = Arc::clone(&manager);
        registry.register(GET_TARGET_DISKS, version, move |req: GetTargetDisksRequest| {
            Ok(GetTargetDisksResponse {
                disk_ids: m.get_target_disks(&req.target_portal, &req.iqn)?,
            })
        })?;

        if allow_mutual {
            let m = Arc::clone(&manager);
            registry.register(
                SET_MUTUAL_CHAP_SECRET,
                version,
                move |req: SetMutualChapSecretRequest| {
                    m.set_mutual_chap_secret(&req.mutual_chap_secret)?;
                    Ok(SetMutualChapSecretResponse {})
                },
            )?;
        }
    }

    Ok(())
}
