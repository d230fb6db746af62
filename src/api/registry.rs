//! Version registry
//!
//! Maps (operation, version) to a handler. Handlers are registered explicitly
//! at startup; a repeated registration is a programming error and is reported
//! as [`ProxyError::DuplicateRegistration`]. After startup the registry is only
//! read.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::version::ApiVersion;
use crate::error::ProxyError;

/// Type-erased handler: JSON request in, JSON response out
pub type Handler = Arc<dyn Fn(Value) -> Result<Value, ProxyError> + Send + Sync>;

/// Registered operations and the versions each one supports
#[derive(Default)]
pub struct Registry {
    operations: HashMap<String, BTreeMap<ApiVersion, Handler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for one (operation, version) pair.
    ///
    /// The request is decoded from JSON before `handler` runs; a payload that
    /// does not fit `Req` fails with [`ProxyError::InvalidArgument`].
    pub fn register<Req, Resp, F>(
        &mut self,
        operation: &str,
        version: &str,
        handler: F,
    ) -> Result<(), ProxyError>
    where
        Req: DeserializeOwned,
        Resp: Serialize,
        F: Fn(Req) -> Result<Resp, ProxyError> + Send + Sync + 'static,
    {
        let version = ApiVersion::parse(version)?;
        let handlers = self.operations.entry(operation.to_string()).or_default();
        if handlers.contains_key(&version) {
            return Err(ProxyError::DuplicateRegistration {
                operation: operation.to_string(),
                version: version.to_string(),
            });
        }

        let name = operation.to_string();
        let erased: Handler = Arc::new(move |payload: Value| {
            let request: Req = serde_json::from_value(payload).map_err(|e| {
                ProxyError::InvalidArgument(format!("malformed {} request: {}", name, e))
            })?;
            let response = handler(request)?;
            serde_json::to_value(response).map_err(|e| {
                ProxyError::Internal(format!("failed to encode {} response: {}", name, e))
            })
        });

        log::debug!("Registered {} {}", operation, version);
        handlers.insert(version, erased);
        Ok(())
    }

    /// Handler for an exact (operation, version) match
    pub fn resolve(&self, operation: &str, version: &str) -> Result<&Handler, ProxyError> {
        let handlers = self
            .operations
            .get(operation)
            .ok_or_else(|| ProxyError::UnknownOperation(operation.to_string()))?;

        let version = ApiVersion::parse(version)?;
        handlers
            .get(&version)
            .ok_or_else(|| ProxyError::UnsupportedVersion {
                operation: operation.to_string(),
                version: version.to_string(),
            })
    }

    /// Versions registered for `operation`, newest first
    pub fn versions(&self, operation: &str) -> Option<Vec<&ApiVersion>> {
        self.operations
            .get(operation)
            .map(|handlers| handlers.keys().rev().collect())
    }

    /// Every operation name with its versions, sorted by name
    pub fn operations(&self) -> Vec<(&str, Vec<&ApiVersion>)> {
        let mut operations: Vec<_> = self
            .operations
            .iter()
            .map(|(name, handlers)| (name.as_str(), handlers.keys().rev().collect()))
            .collect();
        operations.sort_by_key(|(name, _)| *name);
        operations
    }

    pub fn len(&self) -> usize {
        self.operations.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
