//! Initiator-wide mutual CHAP secret

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Holder for the mutual CHAP secret shared by every connect attempt
///
/// Cloning yields another handle to the same value. Readers always observe a
/// complete secret; a replacement is applied under the write lock.
#[derive(Clone, Default)]
pub struct MutualChapSecret {
    inner: Arc<RwLock<Option<String>>>,
}

impl MutualChapSecret {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current secret, if one has been set
    pub fn get(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Store `secret` after `apply` accepts it.
    ///
    /// The write lock is held across `apply`, so concurrent replacements land
    /// in the same order on the OS initiator and in this holder. If `apply`
    /// fails the previous secret is kept.
    pub fn replace_with<E, F>(&self, secret: String, apply: F) -> Result<(), E>
    where
        F: FnOnce(&str) -> Result<(), E>,
    {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        apply(&secret)?;
        *slot = Some(secret);
        Ok(())
    }
}

impl fmt::Debug for MutualChapSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutualChapSecret")
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_starts_unset() {
        let secret = MutualChapSecret::new();
        assert!(!secret.is_set());
        assert_eq!(secret.get(), None);
    }

    #[test]
    fn test_failed_apply_keeps_previous() {
        let secret = MutualChapSecret::new();
        secret
            .replace_with::<(), _>("first-secret".to_string(), |_| Ok(()))
            .unwrap();

        let result = secret.replace_with("second".to_string(), |_| Err("rejected"));
        assert_eq!(result, Err("rejected"));
        assert_eq!(secret.get().as_deref(), Some("first-secret"));
    }

    #[test]
    fn test_clones_share_value() {
        let secret = MutualChapSecret::new();
        let handle = secret.clone();
        handle
            .replace_with::<(), _>("shared".to_string(), |_| Ok(()))
            .unwrap();
        assert_eq!(secret.get().as_deref(), Some("shared"));
    }

    #[test]
    fn test_concurrent_readers_see_whole_values() {
        let secret = MutualChapSecret::new();
        let values = ["aaaaaaaaaaaaaaaa", "bbbbbbbbbbbbbbbb"];

        let writer = {
            let secret = secret.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    let value = values[i % 2].to_string();
                    secret.replace_with::<(), _>(value, |_| Ok(())).unwrap();
                }
            })
        };

        for _ in 0..1000 {
            if let Some(value) = secret.get() {
                assert!(values.contains(&value.as_str()));
            }
        }
        writer.join().unwrap();
    }
}
