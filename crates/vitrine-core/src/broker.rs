//! Temporary handles for in-memory bundles
//!
//! Decoders speak in locators. The broker lets a multi-file bundle held in
//! memory pass through that interface: every reference found in the bundle's
//! blob map is answered with a short-lived `blob:` handle, anything else is
//! passed through untouched. All handles minted for one load are revoked when
//! that load settles, whether it succeeded, failed, or was dropped mid-flight.

use crate::asset::{BinaryBlob, BlobMap, DecodedAsset};
use crate::error::DecodeError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Scheme prefix of handles minted by [`ObjectUrlRegistry`]
pub const HANDLE_PREFIX: &str = "blob:vitrine/";

/// Decodes a primary document into a scene, resolving every reference it
/// makes through `scope`
#[allow(async_fn_in_trait)]
pub trait AssetDecoder {
    async fn decode(&self, primary: &str, scope: &ResolveScope)
        -> Result<DecodedAsset, DecodeError>;
}

/// Handle bookkeeping counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HandleStats {
    pub minted: u64,
    pub revoked: u64,
    pub live: usize,
}

#[derive(Debug, Default)]
struct RegistryInner {
    live: HashMap<String, BinaryBlob>,
    minted: u64,
    revoked: u64,
}

/// Process-wide table of live temporary handles
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mint a new handle for `blob`
    pub fn create(&self, blob: BinaryBlob) -> String {
        let handle = format!("{}{}", HANDLE_PREFIX, Uuid::new_v4());
        let mut inner = self.lock();
        inner.live.insert(handle.clone(), blob);
        inner.minted += 1;
        handle
    }

    /// Contents behind a live handle
    pub fn open(&self, handle: &str) -> Option<BinaryBlob> {
        self.lock().live.get(handle).cloned()
    }

    /// Release a handle. Returns false if it was not live.
    pub fn revoke(&self, handle: &str) -> bool {
        let mut inner = self.lock();
        if inner.live.remove(handle).is_some() {
            inner.revoked += 1;
            true
        } else {
            false
        }
    }

    pub fn stats(&self) -> HandleStats {
        let inner = self.lock();
        HandleStats {
            minted: inner.minted,
            revoked: inner.revoked,
            live: inner.live.len(),
        }
    }
}

/// Where a decoder should read a reference from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Handle minted from the bundle's blob map
    Temporary(String),
    /// Reference not found in the bundle; passed through unmodified
    External(String),
}

impl Locator {
    pub fn as_str(&self) -> &str {
        match self {
            Locator::Temporary(s) | Locator::External(s) => s,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Locator::Temporary(_))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip `./` and `/` prefixes so `/dir/a.bin`, `./dir/a.bin` and `dir/a.bin`
/// compare equal
fn normalize(reference: &str) -> &str {
    let mut r = reference;
    loop {
        if let Some(rest) = r.strip_prefix("./") {
            r = rest;
        } else if let Some(rest) = r.strip_prefix('/') {
            r = rest;
        } else {
            return r;
        }
    }
}

/// Resolution hook for exactly one decode
///
/// Handles minted through a scope live until [`release`](Self::release) or
/// until the scope is dropped.
#[derive(Debug)]
pub struct ResolveScope {
    registry: ObjectUrlRegistry,
    blobs: BlobMap,
    /// bundle key → handle minted for it
    issued: Mutex<BTreeMap<String, String>>,
}

impl ResolveScope {
    pub fn new(registry: ObjectUrlRegistry, blobs: BlobMap) -> Self {
        Self {
            registry,
            blobs,
            issued: Mutex::new(BTreeMap::new()),
        }
    }

    fn issued(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.issued.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lookup(&self, reference: &str) -> Option<(&String, &BinaryBlob)> {
        if let Some(entry) = self.blobs.get_key_value(reference) {
            return Some(entry);
        }
        let wanted = normalize(reference);
        self.blobs.iter().find(|(key, _)| normalize(key) == wanted)
    }

    /// Map a reference to a locator, minting a handle for bundle members.
    /// The same member resolves to the same handle within one scope.
    pub fn resolve(&self, reference: &str) -> Locator {
        let Some((key, blob)) = self.lookup(reference) else {
            return Locator::External(reference.to_string());
        };
        let mut issued = self.issued();
        let handle = issued
            .entry(key.clone())
            .or_insert_with(|| self.registry.create(blob.clone()));
        Locator::Temporary(handle.clone())
    }

    /// Bytes behind a temporary locator minted by this scope
    pub fn open(&self, locator: &Locator) -> Option<BinaryBlob> {
        match locator {
            Locator::Temporary(handle) => self.registry.open(handle),
            Locator::External(_) => None,
        }
    }

    /// Names of the bundle members available to this scope
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.blobs.keys().map(String::as_str)
    }

    /// Handles minted so far and not yet released
    pub fn outstanding(&self) -> usize {
        self.issued().len()
    }

    /// Revoke every handle minted through this scope. Returns how many.
    pub fn release(&self) -> usize {
        let handles = std::mem::take(&mut *self.issued());
        handles
            .values()
            .filter(|handle| self.registry.revoke(handle))
            .count()
    }
}

impl Drop for ResolveScope {
    fn drop(&mut self) {
        let released = self.release();
        if released > 0 {
            debug!(released, "Released temporary handles on scope drop");
        }
    }
}

/// Runs one decode inside one resolution scope
#[derive(Debug, Clone, Default)]
pub struct ResourceUrlBroker {
    registry: ObjectUrlRegistry,
}

impl ResourceUrlBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ObjectUrlRegistry {
        &self.registry
    }

    /// Decode `primary`, serving references from `blobs`
    ///
    /// One broker serves one in-flight load at a time; the session enforces it.
    pub async fn load<D: AssetDecoder>(
        &self,
        decoder: &D,
        primary: &str,
        blobs: BlobMap,
    ) -> Result<DecodedAsset, DecodeError> {
        let blob_count = blobs.len();
        let scope = ResolveScope::new(self.registry.clone(), blobs);
        let result = decoder.decode(primary, &scope).await;
        let released = scope.release();
        debug!(
            primary = %primary,
            blobs = blob_count,
            released,
            ok = result.is_ok(),
            "Decode settled"
        );
        result
    }

    pub fn stats(&self) -> HandleStats {
        self.registry.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Bundle;
    use crate::scene::SceneNode;
    use std::cell::RefCell;

    /// Resolves every listed reference, records the locators, then succeeds or fails
    struct ScriptedDecoder {
        references: Vec<&'static str>,
        fail: bool,
        seen: RefCell<Vec<Locator>>,
    }

    impl ScriptedDecoder {
        fn new(references: Vec<&'static str>, fail: bool) -> Self {
            Self {
                references,
                fail,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl AssetDecoder for ScriptedDecoder {
        async fn decode(
            &self,
            primary: &str,
            scope: &ResolveScope,
        ) -> Result<DecodedAsset, DecodeError> {
            let main = scope.resolve(primary);
            self.seen.borrow_mut().push(main.clone());
            for reference in &self.references {
                let locator = scope.resolve(reference);
                if locator.is_temporary() && scope.open(&locator).is_none() {
                    return Err(DecodeError::MissingResource(reference.to_string()));
                }
                self.seen.borrow_mut().push(locator);
            }
            if self.fail {
                return Err(DecodeError::Malformed("scripted failure".into()));
            }
            Ok(DecodedAsset {
                root: SceneNode::root(Vec::new()),
                animations: Vec::new(),
            })
        }
    }

    fn blobs(names: &[&str]) -> BlobMap {
        names
            .iter()
            .map(|n| (n.to_string(), Bundle::blob(n.as_bytes().to_vec())))
            .collect()
    }

    #[tokio::test]
    async fn test_bundle_members_get_temporary_handles() {
        let broker = ResourceUrlBroker::new();
        let decoder = ScriptedDecoder::new(vec!["scene.bin", "https://cdn.test/tex.png"], false);
        broker
            .load(&decoder, "scene.gltf", blobs(&["scene.gltf", "scene.bin"]))
            .await
            .unwrap();

        let seen = decoder.seen.borrow();
        assert!(seen[0].as_str().starts_with(HANDLE_PREFIX));
        assert!(seen[1].is_temporary());
        assert_eq!(seen[2], Locator::External("https://cdn.test/tex.png".into()));
        let stats = broker.stats();
        assert_eq!(stats.minted, 2);
        assert_eq!(stats.revoked, 2);
        assert_eq!(stats.live, 0);
    }

    #[tokio::test]
    async fn test_failed_decodes_do_not_leak() {
        let broker = ResourceUrlBroker::new();
        for _ in 0..5 {
            let decoder = ScriptedDecoder::new(vec!["a.bin", "b.png"], true);
            let result = broker
                .load(&decoder, "a.gltf", blobs(&["a.gltf", "a.bin", "b.png"]))
                .await;
            assert!(result.is_err());
        }
        let stats = broker.stats();
        assert_eq!(stats.minted, 15);
        assert_eq!(stats.minted, stats.revoked);
        assert_eq!(stats.live, 0);
    }

    #[tokio::test]
    async fn test_bare_url_load_mints_nothing() {
        let broker = ResourceUrlBroker::new();
        let decoder = ScriptedDecoder::new(vec![], false);
        broker
            .load(&decoder, "https://cdn.test/model.glb", BlobMap::new())
            .await
            .unwrap();
        assert_eq!(
            decoder.seen.borrow()[0],
            Locator::External("https://cdn.test/model.glb".into())
        );
        assert_eq!(broker.stats().minted, 0);
    }

    #[test]
    fn test_repeat_resolution_reuses_handle() {
        let registry = ObjectUrlRegistry::new();
        let scope = ResolveScope::new(registry.clone(), blobs(&["/drop/model/a.bin"]));
        let first = scope.resolve("/drop/model/a.bin");
        let second = scope.resolve("./drop/model/a.bin");
        assert_eq!(first, second);
        assert_eq!(scope.outstanding(), 1);
        assert_eq!(scope.open(&first).as_deref(), Some(&b"/drop/model/a.bin"[..]));
        assert_eq!(scope.release(), 1);
        assert_eq!(scope.release(), 0);
        assert!(registry.open(first.as_str()).is_none());
    }

    #[test]
    fn test_dropped_scope_revokes_handles() {
        let registry = ObjectUrlRegistry::new();
        {
            let scope = ResolveScope::new(registry.clone(), blobs(&["a", "b"]));
            scope.resolve("a");
            scope.resolve("b");
            assert_eq!(registry.stats().live, 2);
        }
        let stats = registry.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.revoked, 2);
    }
}
