//! Kubernetes watchers feeding the store
//!
//! Each feeder follows one resource kind and mirrors it into the store. A
//! (re-)list is buffered and committed in a single update, together with the
//! removal of objects that vanished while the watch was down. An object whose
//! store key changes, such as an EndpointSlice relabelled to another service,
//! leaves its old key in the same commit.

use futures::StreamExt;
use k8s_openapi::api::core::v1::Service as KubeService;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::{Api, Resource, ResourceExt};
use kube_runtime::watcher::{self, Event};
use kube_runtime::WatchStreamExt;
use proxy_api::{ServiceKey, ALL_SOURCES};
use proxy_store::{Store, SyncKind, WriteTx};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::translate::{endpoints_from_slice, service_from_kube, SERVICE_NAME_LABEL};

/// How one Kubernetes resource kind maps onto store writes
pub trait Feed {
    type Object: Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static;
    type Key: Ord + Clone + Display + Send + Sync;

    const KIND: SyncKind;

    /// Store key for an object; None for objects the store does not track
    fn key(obj: &Self::Object) -> Option<Self::Key>;

    fn apply(tx: &mut WriteTx<'_>, obj: &Self::Object) -> proxy_store::Result<()>;

    fn delete(tx: &mut WriteTx<'_>, key: &Self::Key) -> proxy_store::Result<()>;
}

/// Services are visible to every endpoint source
pub struct ServiceFeed;

impl Feed for ServiceFeed {
    type Object = KubeService;
    type Key = ServiceKey;

    const KIND: SyncKind = SyncKind::Services;

    fn key(obj: &KubeService) -> Option<ServiceKey> {
        Some(ServiceKey::new(obj.namespace()?, obj.meta().name.clone()?))
    }

    fn apply(tx: &mut WriteTx<'_>, obj: &KubeService) -> proxy_store::Result<()> {
        match service_from_kube(obj) {
            Some(service) => tx.set_service(service, &[ALL_SOURCES]),
            None => Ok(()),
        }
    }

    fn delete(tx: &mut WriteTx<'_>, key: &ServiceKey) -> proxy_store::Result<()> {
        tx.delete_service(key)
    }
}

/// Store location of one EndpointSlice
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SliceKey {
    pub namespace: String,
    pub service: String,
    pub source: String,
}

impl Display for SliceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.namespace, self.service, self.source)
    }
}

/// Each EndpointSlice is its own source
pub struct EndpointSliceFeed;

impl Feed for EndpointSliceFeed {
    type Object = EndpointSlice;
    type Key = SliceKey;

    const KIND: SyncKind = SyncKind::Endpoints;

    fn key(obj: &EndpointSlice) -> Option<SliceKey> {
        Some(SliceKey {
            namespace: obj.namespace()?,
            service: obj.labels().get(SERVICE_NAME_LABEL)?.clone(),
            source: obj.meta().name.clone()?,
        })
    }

    fn apply(tx: &mut WriteTx<'_>, obj: &EndpointSlice) -> proxy_store::Result<()> {
        match endpoints_from_slice(obj) {
            Some(slice) => tx.set_endpoints_of_source(
                &slice.namespace,
                &slice.service,
                &slice.source,
                slice.endpoints,
            ),
            None => Ok(()),
        }
    }

    fn delete(tx: &mut WriteTx<'_>, key: &SliceKey) -> proxy_store::Result<()> {
        tx.delete_endpoints_of_source(&key.namespace, &key.service, &key.source)
    }
}

/// Namespace and name of a watched object
type ObjectId = (String, String);

fn object_id<K: Resource>(obj: &K) -> ObjectId {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Applies watch events of one kind to the store
pub struct Feeder<F: Feed> {
    store: Arc<Store>,
    /// Store key each watched object is currently written under
    known: BTreeMap<ObjectId, F::Key>,
    /// Objects seen since the last `Init`, committed on `InitDone`
    relist: Option<BTreeMap<ObjectId, F::Object>>,
    _feed: PhantomData<fn() -> F>,
}

impl<F: Feed> Feeder<F> {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            known: BTreeMap::new(),
            relist: None,
            _feed: PhantomData,
        }
    }

    pub async fn handle(&mut self, event: Event<F::Object>) -> proxy_store::Result<()> {
        match event {
            Event::Init => {
                debug!(kind = ?F::KIND, "Watch (re)list started");
                self.relist = Some(BTreeMap::new());
            }
            Event::InitApply(obj) => {
                if let Some(relist) = self.relist.as_mut() {
                    relist.insert(object_id(&obj), obj);
                } else {
                    self.apply(obj).await?;
                }
            }
            Event::InitDone => self.finish_relist().await,
            Event::Apply(obj) => self.apply(obj).await?,
            Event::Delete(obj) => self.delete(&obj).await?,
        }
        Ok(())
    }

    /// Write `obj` under its current key. When the key moved since the last
    /// write, the old key is removed in the same commit.
    async fn apply(&mut self, obj: F::Object) -> proxy_store::Result<()> {
        let id = object_id(&obj);
        let key = F::key(&obj);
        let moved_from = self
            .known
            .get(&id)
            .filter(|known| Some(*known) != key.as_ref())
            .cloned();
        if key.is_none() && moved_from.is_none() {
            return Ok(());
        }

        let (removed, applied) = self
            .store
            .update(|tx| {
                let removed = match &moved_from {
                    Some(old) => F::delete(tx, old).map(|()| true),
                    None => Ok(false),
                };
                let applied = match &key {
                    Some(_) if removed.is_ok() => F::apply(tx, &obj).map(|()| true),
                    _ => Ok(false),
                };
                (removed, applied)
            })
            .await;

        if removed? {
            if let Some(old) = &moved_from {
                debug!(kind = ?F::KIND, %old, "Moved");
            }
            self.known.remove(&id);
        }
        if let (true, Some(key)) = (applied?, key) {
            debug!(kind = ?F::KIND, %key, "Applied");
            self.known.insert(id, key);
        }
        Ok(())
    }

    async fn delete(&mut self, obj: &F::Object) -> proxy_store::Result<()> {
        let id = object_id(obj);
        let Some(key) = self.known.get(&id).cloned() else {
            return Ok(());
        };

        self.store.update(|tx| F::delete(tx, &key)).await?;
        debug!(kind = ?F::KIND, %key, "Deleted");
        self.known.remove(&id);
        Ok(())
    }

    /// Commit the buffered listing. Objects the store rejects are skipped so
    /// the rest of the listing still lands and the kind is marked synced.
    async fn finish_relist(&mut self) {
        let listed: BTreeMap<ObjectId, (F::Key, F::Object)> = self
            .relist
            .take()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(id, obj)| Some((id, (F::key(&obj)?, obj))))
            .collect();
        let stale: Vec<F::Key> = self
            .known
            .iter()
            .filter(|(id, key)| listed.get(*id).map(|(listed_key, _)| listed_key) != Some(*key))
            .map(|(_, key)| key.clone())
            .collect();

        let (known, removed) = self
            .store
            .update(|tx| {
                let mut removed = 0usize;
                for key in &stale {
                    match F::delete(tx, key) {
                        Ok(()) => removed += 1,
                        Err(e) => {
                            warn!(kind = ?F::KIND, %key, "Failed to remove stale object: {}", e)
                        }
                    }
                }

                let mut known = BTreeMap::new();
                for (id, (key, obj)) in &listed {
                    match F::apply(tx, obj) {
                        Ok(()) => {
                            known.insert(id.clone(), key.clone());
                        }
                        Err(e) => warn!(kind = ?F::KIND, %key, "Skipping listed object: {}", e),
                    }
                }

                tx.set_synced(F::KIND);
                (known, removed)
            })
            .await;

        info!(
            kind = ?F::KIND,
            listed = listed.len(),
            applied = known.len(),
            removed,
            "Watch list committed"
        );
        self.known = known;
    }

    pub fn known(&self) -> &BTreeMap<ObjectId, F::Key> {
        &self.known
    }
}

/// Watch `api` and feed every event into `store` until the watch ends
pub async fn run<F: Feed>(api: Api<F::Object>, store: Arc<Store>) {
    let mut feeder = Feeder::<F>::new(store);
    let mut events = watcher::watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    info!(kind = ?F::KIND, "Starting feeder");
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                if let Err(e) = feeder.handle(event).await {
                    warn!(kind = ?F::KIND, "Rejected watch event: {}", e);
                }
            }
            Err(e) => warn!(kind = ?F::KIND, "Watch error: {}", e),
        }
    }
    warn!(kind = ?F::KIND, known = feeder.known().len(), "Watch stream ended");
}
