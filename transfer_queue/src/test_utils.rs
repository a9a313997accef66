//! Scriptable in-memory collaborators for exercising a [`TransferQueue`](crate::TransferQueue).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::adapter::{AdapterManifest, NewAdapterFn, ProgressCallback, TransferAdapter, BASIC_ADAPTER_NAME};
use crate::batch_api::{Action, BatchApi, BatchObject, BatchResponse, ObjectResource};
use crate::errors::{Result, TransferError};
use crate::{Direction, TransferResult, Transferable};

/// Builds a transferable with a deterministic oid and path for `i`.
pub fn test_transferable(i: usize, size: u64) -> Transferable {
    Transferable::new(format!("file_{i}.bin"), format!("{i:064x}"), size, format!("/lfs/objects/{i}"))
}

#[derive(Default)]
struct MockBatchApiState {
    requests: Vec<Vec<BatchObject>>,
    request_times: Vec<Instant>,
    advertised: Vec<Vec<String>>,
    batch_failures: VecDeque<TransferError>,
    adapter_names: VecDeque<Option<String>>,
    object_errors: HashMap<String, (i32, String)>,
    already_present: HashSet<String>,
    expire_once: HashSet<String>,
    omitted: HashSet<String>,
    unknown_objects: Vec<ObjectResource>,
}

/// A batch endpoint that accepts every object unless told otherwise.
#[derive(Default)]
pub struct MockBatchApi {
    state: Mutex<MockBatchApiState>,
}

impl MockBatchApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next call fails as a whole with `err`.  Calls queue up.
    pub fn fail_next_batch(&self, err: TransferError) {
        self.state.lock().batch_failures.push_back(err);
    }

    /// Successive responses name these adapters; once exhausted no adapter is named.
    pub fn push_adapter_name(&self, name: Option<&str>) {
        self.state.lock().adapter_names.push_back(name.map(str::to_owned));
    }

    pub fn set_object_error(&self, oid: &str, code: i32, message: &str) {
        self.state.lock().object_errors.insert(oid.to_owned(), (code, message.to_owned()));
    }

    /// The object is returned without actions, i.e. nothing to transfer.
    pub fn set_already_present(&self, oid: &str) {
        self.state.lock().already_present.insert(oid.to_owned());
    }

    /// The first response for `oid` carries an action that is about to expire.
    pub fn expire_action_once(&self, oid: &str) {
        self.state.lock().expire_once.insert(oid.to_owned());
    }

    /// Responses leave `oid` out entirely.
    pub fn omit_object(&self, oid: &str) {
        self.state.lock().omitted.insert(oid.to_owned());
    }

    /// The next response also carries an object nobody asked for.
    pub fn add_unknown_object(&self, oid: &str, size: u64) {
        self.state.lock().unknown_objects.push(ObjectResource::new(oid, size));
    }

    pub fn requests(&self) -> Vec<Vec<BatchObject>> {
        self.state.lock().requests.clone()
    }

    /// When each request arrived, on the tokio clock.
    pub fn request_times(&self) -> Vec<Instant> {
        self.state.lock().request_times.clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().requests.iter().map(Vec::len).collect()
    }

    pub fn advertised_adapters(&self) -> Vec<Vec<String>> {
        self.state.lock().advertised.clone()
    }
}

#[async_trait]
impl BatchApi for MockBatchApi {
    async fn batch(
        &self,
        direction: Direction,
        objects: &[BatchObject],
        adapter_names: &[String],
    ) -> Result<BatchResponse> {
        let mut state = self.state.lock();
        state.requests.push(objects.to_vec());
        state.request_times.push(Instant::now());
        state.advertised.push(adapter_names.to_vec());

        if let Some(err) = state.batch_failures.pop_front() {
            return Err(err);
        }

        let mut response = BatchResponse {
            objects: Vec::with_capacity(objects.len()),
            transfer_adapter_name: state.adapter_names.pop_front().flatten(),
        };

        for obj in objects {
            if state.omitted.contains(&obj.oid) {
                continue;
            }

            let mut resource = ObjectResource::new(obj.oid.clone(), obj.size);
            resource.authenticated = true;

            if let Some((code, message)) = state.object_errors.get(&obj.oid) {
                resource = resource.with_error(*code, message.clone());
            } else if !state.already_present.contains(&obj.oid) {
                let mut action = Action::new(format!("https://lfs.example.com/objects/{}", obj.oid));
                if state.expire_once.remove(&obj.oid) {
                    action = action.with_expiry(Utc::now() + Duration::seconds(1));
                }
                resource = resource.with_action(direction.as_str(), action);
            }
            response.objects.push(resource);
        }

        response.objects.append(&mut state.unknown_objects);
        Ok(response)
    }
}

/// Shared, inspectable state of every [`MockAdapter`] built by one factory.
#[derive(Default)]
pub struct MockAdapterState {
    begins: AtomicUsize,
    ends: AtomicUsize,
    max_concurrency: AtomicUsize,
    fail_begin: AtomicBool,
    created: Mutex<Vec<String>>,
    events: Mutex<Vec<String>>,
    added: Mutex<Vec<Transferable>>,
    failures: Mutex<HashMap<String, VecDeque<TransferError>>>,
}

impl MockAdapterState {
    /// The next `times` attempts for `oid` fail with `err`.
    pub fn fail_with(&self, oid: &str, err: TransferError, times: usize) {
        let mut failures = self.failures.lock();
        let queue = failures.entry(oid.to_owned()).or_default();
        queue.extend(std::iter::repeat(err).take(times));
    }

    pub fn fail_begin(&self) {
        self.fail_begin.store(true, Ordering::Relaxed);
    }

    pub fn begin_count(&self) -> usize {
        self.begins.load(Ordering::Relaxed)
    }

    pub fn end_count(&self) -> usize {
        self.ends.load(Ordering::Relaxed)
    }

    /// The concurrency passed to the most recent `begin`.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.load(Ordering::Relaxed)
    }

    /// Adapter names constructed so far, in order.
    pub fn created(&self) -> Vec<String> {
        self.created.lock().clone()
    }

    /// `begin:<name>` / `end:<name>` in the order they happened.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn added(&self) -> Vec<Transferable> {
        self.added.lock().clone()
    }

    pub fn add_count(&self) -> usize {
        self.added.lock().len()
    }

    fn next_failure(&self, oid: &str) -> Option<TransferError> {
        self.failures.lock().get_mut(oid).and_then(VecDeque::pop_front)
    }
}

struct Session {
    progress: ProgressCallback,
    results: UnboundedSender<TransferResult>,
}

/// An adapter that "transfers" each object on its own task, reporting full progress and
/// then success, unless a failure was scripted for it.
pub struct MockAdapter {
    name: String,
    direction: Direction,
    state: Arc<MockAdapterState>,
    session: Mutex<Option<Session>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl MockAdapter {
    pub fn new(name: &str, direction: Direction, state: Arc<MockAdapterState>) -> Self {
        Self {
            name: name.to_owned(),
            direction,
            state,
            session: Mutex::new(None),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// A constructor for the adapter registry, plus the state every adapter it builds shares.
    pub fn factory() -> (Arc<MockAdapterState>, NewAdapterFn) {
        let state = Arc::new(MockAdapterState::default());
        let shared = state.clone();
        let new_adapter: NewAdapterFn = Arc::new(move |name: &str, direction: Direction| {
            shared.created.lock().push(name.to_owned());
            Arc::new(MockAdapter::new(name, direction, shared.clone())) as Arc<dyn TransferAdapter>
        });
        (state, new_adapter)
    }
}

#[async_trait]
impl TransferAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    async fn begin(
        &self,
        max_concurrency: usize,
        progress: ProgressCallback,
        results: UnboundedSender<TransferResult>,
    ) -> Result<()> {
        if self.state.fail_begin.load(Ordering::Relaxed) {
            return Err(TransferError::adapter(format!("{} failed to start", self.name)));
        }
        self.state.begins.fetch_add(1, Ordering::Relaxed);
        self.state.max_concurrency.store(max_concurrency, Ordering::Relaxed);
        self.state.events.lock().push(format!("begin:{}", self.name));
        *self.session.lock() = Some(Session { progress, results });
        Ok(())
    }

    fn add(&self, transfer: Transferable) {
        self.state.added.lock().push(transfer.clone());

        let Some((progress, results)) = self
            .session
            .lock()
            .as_ref()
            .map(|s| (s.progress.clone(), s.results.clone()))
        else {
            panic!("MockAdapter::add called before begin");
        };

        let failure = self.state.next_failure(transfer.oid());
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            let result = match failure {
                Some(err) => TransferResult::failure(transfer, err),
                None => {
                    let size = transfer.size();
                    progress(transfer.name(), size, size, size);
                    TransferResult::success(transfer)
                },
            };
            let _ = results.send(result);
        });
        self.in_flight.lock().push(handle);
    }

    async fn end(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.in_flight.lock());
        for handle in handles {
            let _ = handle.await;
        }
        self.session.lock().take();
        self.state.ends.fetch_add(1, Ordering::Relaxed);
        self.state.events.lock().push(format!("end:{}", self.name));
    }
}

/// A registry holding a mock "basic" adapter for `direction`.
pub fn basic_manifest(direction: Direction) -> (Arc<AdapterManifest>, Arc<MockAdapterState>) {
    let manifest = AdapterManifest::new(false);
    let (state, new_adapter) = MockAdapter::factory();
    manifest.register_adapter(BASIC_ADAPTER_NAME, direction, new_adapter);
    (Arc::new(manifest), state)
}
