//! Request dispatcher

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::registry::Registry;
use crate::error::ProxyError;

/// Routes a request to the handler registered for its operation and version.
///
/// Holds nothing but the read-only registry, so clones can be handed to any
/// number of concurrent callers. Handler errors come back unchanged.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn dispatch(
        &self,
        operation: &str,
        version: &str,
        payload: Value,
    ) -> Result<Value, ProxyError> {
        let handler = self.registry.resolve(operation, version).map_err(|e| {
            log::warn!("Rejected {} {}: {}", operation, version, e);
            e
        })?;

        log::debug!("Dispatching {} {}", operation, version);
        handler(payload).map_err(|e| {
            log::warn!("{} {} failed: {}", operation, version, e);
            e
        })
    }

    /// Typed wrapper around [`Dispatcher::dispatch`]
    pub fn call<Req, Resp>(
        &self,
        operation: &str,
        version: &str,
        request: &Req,
    ) -> Result<Resp, ProxyError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request).map_err(|e| {
            ProxyError::Internal(format!("failed to encode {} request: {}", operation, e))
        })?;
        let response = self.dispatch(operation, version, payload)?;
        serde_json::from_value(response).map_err(|e| {
            ProxyError::Internal(format!("failed to decode {} response: {}", operation, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::os::OsError;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    fn dispatcher() -> Dispatcher {
        let mut registry = Registry::new();
        registry
            .register("Ping", "v1", |req: Ping| Ok(Ping { n: req.n + 1 }))
            .unwrap();
        registry
            .register("Fail", "v1", |_: Ping| -> Result<Ping, ProxyError> {
                Err(ProxyError::DiscoveryFailed(OsError::Command(
                    "portal unreachable".to_string(),
                )))
            })
            .unwrap();
        Dispatcher::new(registry)
    }

    #[test]
    fn test_dispatch_routes_to_handler() {
        let response = dispatcher().dispatch("Ping", "v1", json!({ "n": 1 })).unwrap();
        assert_eq!(response, json!({ "n": 2 }));
    }

    #[test]
    fn test_typed_call() {
        let pong: Ping = dispatcher().call("Ping", "v1", &Ping { n: 41 }).unwrap();
        assert_eq!(pong.n, 42);
    }

    #[test]
    fn test_handler_error_passes_through() {
        let err = dispatcher().dispatch("Fail", "v1", json!({ "n": 0 })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DiscoveryFailed);
        assert!(matches!(err.os_cause(), Some(OsError::Command(_))));
    }

    #[test]
    fn test_resolution_failure() {
        let d = dispatcher();
        let err = d.dispatch("Ping", "v2", json!({ "n": 0 })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
        let err = d.dispatch("Pong", "v1", json!({ "n": 0 })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownOperation);
    }

    #[test]
    fn test_shared_across_threads() {
        let d = dispatcher();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let d = d.clone();
                std::thread::spawn(move || {
                    let pong: Ping = d.call("Ping", "v1", &Ping { n: i }).unwrap();
                    pong.n
                })
            })
            .collect();
        let mut results: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort();
        assert_eq!(results, (1..=8).collect::<Vec<_>>());
    }
}
