//! Spec Store: the in-memory mirror of all GslbConfig objects, keyed by
//! object identity.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use slog::{error, Logger};

use crate::crd::{GslbConfigSpec, ObjectId};
use crate::error::GslbError;

#[derive(Default)]
struct Inner {
    by_id: HashMap<ObjectId, Arc<GslbConfigSpec>>,
}

/// Holds the authoritative current set of GslbConfig objects. Safe to share
/// across the watch consumer (sole writer) and the prober/synthesizer
/// (readers via `snapshot`).
pub struct SpecStore {
    inner: RwLock<Inner>,
    log: Logger,
}

impl SpecStore {
    pub fn new(log: Logger) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            log,
        }
    }

    /// `added`/`modified` events both map to `apply`. Rejects the object
    /// (and leaves the store unchanged for that id) if validation fails, or
    /// if its domain collides with a different, already-stored config
    /// (first-seen wins).
    pub fn apply(&self, id: ObjectId, spec: GslbConfigSpec) -> Result<(), GslbError> {
        spec.validate(&id)?;

        let mut inner = self.inner.write().unwrap();
        if let Some((other_id, _)) = inner
            .by_id
            .iter()
            .find(|(other_id, other)| **other_id != id && other.domain == spec.domain)
        {
            let reason = format!(
                "domain {:?} already served by {}/{}",
                spec.domain, other_id.0, other_id.1
            );
            error!(self.log, "rejecting config, domain collision"; "id" => format!("{}/{}", id.0, id.1), "reason" => &reason);
            return Err(GslbError::SpecValidation {
                id: format!("{}/{}", id.0, id.1),
                reason,
            });
        }

        inner.by_id.insert(id, Arc::new(spec));
        Ok(())
    }

    /// `deleted` events map to `remove`.
    pub fn remove(&self, id: &ObjectId) {
        self.inner.write().unwrap().by_id.remove(id);
    }

    /// Point-in-time immutable copy suitable for use by the prober and
    /// synthesizer without holding the store's lock.
    pub fn snapshot(&self) -> Vec<(ObjectId, Arc<GslbConfigSpec>)> {
        self.inner
            .read()
            .unwrap()
            .by_id
            .iter()
            .map(|(id, spec)| (id.clone(), spec.clone()))
            .collect()
    }

    /// Atomic relist replacement: `apply` for each object in
    /// `objects`, `remove` for any id present locally but absent from the
    /// relist result, performed as a single atomic replace of the store
    /// contents. Objects that fail validation are dropped with a reported
    /// error but do not block the rest of the relist.
    pub fn replace_all(&self, objects: Vec<(ObjectId, GslbConfigSpec)>) {
        let mut fresh: HashMap<ObjectId, Arc<GslbConfigSpec>> = HashMap::with_capacity(objects.len());
        let mut seen_domains: HashMap<String, ObjectId> = HashMap::with_capacity(objects.len());

        for (id, spec) in objects {
            if let Err(e) = spec.validate(&id) {
                error!(self.log, "dropping object during relist"; "id" => format!("{}/{}", id.0, id.1), "error" => %e);
                continue;
            }
            if let Some(other_id) = seen_domains.get(&spec.domain) {
                error!(self.log, "dropping object during relist, domain collision";
                    "id" => format!("{}/{}", id.0, id.1),
                    "domain" => &spec.domain,
                    "kept" => format!("{}/{}", other_id.0, other_id.1));
                continue;
            }
            seen_domains.insert(spec.domain.clone(), id.clone());
            fresh.insert(id, Arc::new(spec));
        }

        let mut inner = self.inner.write().unwrap();
        inner.by_id = fresh;
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Nameserver, Protocol, Record, Target};

    fn test_logger() -> Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn spec(domain: &str) -> GslbConfigSpec {
        GslbConfigSpec {
            domain: domain.to_string(),
            nameservers: vec![Nameserver {
                hostname: "ns1.example.com".to_string(),
                address: "10.0.0.1".parse().unwrap(),
            }],
            records: vec![Record {
                name: "app".to_string(),
                targets: vec![Target {
                    address: "10.0.0.2".parse().unwrap(),
                    location: String::new(),
                    weight: 1,
                    protocol: Protocol::Tcp,
                    port: 80,
                    path: "/".to_string(),
                }],
            }],
        }
    }

    #[test]
    fn apply_and_snapshot() {
        let store = SpecStore::new(test_logger());
        let id = ("default".to_string(), "a".to_string());
        store.apply(id.clone(), spec("a.example.com")).unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].0, id);
    }

    #[test]
    fn remove_drops_entry() {
        let store = SpecStore::new(test_logger());
        let id = ("default".to_string(), "a".to_string());
        store.apply(id.clone(), spec("a.example.com")).unwrap();
        store.remove(&id);
        assert!(store.is_empty());
    }

    #[test]
    fn second_seen_domain_collision_rejected() {
        let store = SpecStore::new(test_logger());
        let id_a = ("default".to_string(), "a".to_string());
        let id_b = ("default".to_string(), "b".to_string());
        store.apply(id_a.clone(), spec("same.example.com")).unwrap();
        let err = store.apply(id_b, spec("same.example.com"));
        assert!(err.is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn replace_all_is_atomic_and_drops_invalid() {
        let store = SpecStore::new(test_logger());
        let id_a = ("default".to_string(), "a".to_string());
        store.apply(id_a.clone(), spec("a.example.com")).unwrap();

        let id_b = ("default".to_string(), "b".to_string());
        let mut bad = spec("b.example.com");
        bad.nameservers.clear();
        let id_c = ("default".to_string(), "c".to_string());

        store.replace_all(vec![(id_b.clone(), bad), (id_c.clone(), spec("c.example.com"))]);

        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].0, id_c);
    }
}
