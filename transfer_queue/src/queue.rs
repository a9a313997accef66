use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lfs_config::TransferConfig;
use parking_lot::Mutex;
use progress_tracking::{ProgressMeter, TransferMeter};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterManifest, ProgressCallback, TransferAdapter, BASIC_ADAPTER_NAME};
use crate::batch_api::{BatchApi, BatchObject, BatchResponse};
use crate::batcher::Batcher;
use crate::errors::{Result, TransferError};
use crate::pending::PendingCount;
use crate::retry_counter::RetryCounter;
use crate::{Direction, TransferResult, Transferable};

/// Everything a [`TransferQueue`] is configured with.
#[derive(Clone, Debug)]
pub struct TransferQueueOptions {
    pub batch_size: usize,
    pub concurrent_transfers: usize,
    pub max_retries: i64,
    pub force_single_retry: bool,
    pub max_retry_delay: Duration,
    pub dry_run: bool,
    pub meter: Arc<dyn ProgressMeter>,
}

impl TransferQueueOptions {
    pub fn from_config(config: &TransferConfig) -> Self {
        let meter =
            TransferMeter::from_progress_log_setting(config.progress_log.as_deref()).with_dry_run(config.dry_run);

        Self {
            batch_size: config.batch_size,
            concurrent_transfers: config.concurrent_transfers,
            max_retries: config.max_retries,
            force_single_retry: config.force_single_retry,
            max_retry_delay: Duration::from_secs(config.max_retry_delay),
            dry_run: config.dry_run,
            meter: Arc::new(meter),
        }
    }

    pub fn with_meter(mut self, meter: Arc<dyn ProgressMeter>) -> Self {
        self.meter = meter;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_retries(mut self, max_retries: i64) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_retry_delay(mut self, max_retry_delay: Duration) -> Self {
        self.max_retry_delay = max_retry_delay;
        self
    }

    pub fn with_concurrent_transfers(mut self, concurrent_transfers: usize) -> Self {
        self.concurrent_transfers = concurrent_transfers;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl Default for TransferQueueOptions {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

/// Moves a set of objects in one direction.
///
/// Objects are added with [`add`](Self::add), grouped into batches, checked against the
/// batch API and handed to the transfer adapter the server selects.  Failed objects are
/// retried up to the configured limit.  [`wait`](Self::wait) blocks until every added
/// object has either been transferred or failed for good, and shuts the queue down.
///
/// Must be created inside a tokio runtime; it spawns its background tasks immediately.
pub struct TransferQueue {
    inner: Arc<QueueInner>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

struct BackgroundTasks {
    batch_api: JoinHandle<()>,
    retries: JoinHandle<()>,
    results: JoinHandle<()>,
    errors: JoinHandle<()>,
}

impl BackgroundTasks {
    fn abort(self) {
        self.batch_api.abort();
        self.retries.abort();
        self.results.abort();
        self.errors.abort();
    }
}

/// A failed object on its way back into the batcher.
struct Retry {
    transfer: Transferable,

    /// Set when the server dictated when the object may be sent again.
    retry_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct AdapterSlot {
    adapter: Option<Arc<dyn TransferAdapter>>,
    in_progress: bool,
}

struct QueueInner {
    direction: Direction,
    client: Arc<dyn BatchApi>,
    manifest: Arc<AdapterManifest>,
    meter: Arc<dyn ProgressMeter>,
    dry_run: bool,
    concurrent_transfers: usize,

    batcher: Batcher<Transferable>,
    retry_counter: RetryCounter,
    pending: PendingCount,

    // Lock order: never hold `transferables` while acquiring `adapter`.
    transferables: Mutex<HashMap<String, Transferable>>,
    adapter: tokio::sync::Mutex<AdapterSlot>,

    errors: Mutex<Vec<TransferError>>,
    error_tx: Mutex<Option<UnboundedSender<TransferError>>>,
    retry_tx: Mutex<Option<UnboundedSender<Retry>>>,
    results_tx: UnboundedSender<TransferResult>,
    watchers: Mutex<Vec<UnboundedSender<String>>>,

    shutdown: CancellationToken,
    finished: AtomicBool,
}

impl TransferQueue {
    pub fn new(
        direction: Direction,
        client: Arc<dyn BatchApi>,
        manifest: Arc<AdapterManifest>,
        options: TransferQueueOptions,
    ) -> Self {
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(QueueInner {
            direction,
            client,
            manifest,
            meter: options.meter,
            dry_run: options.dry_run,
            concurrent_transfers: options.concurrent_transfers.max(1),
            batcher: Batcher::new(options.batch_size),
            retry_counter: RetryCounter::new(options.max_retries, options.force_single_retry)
                .with_max_retry_delay(options.max_retry_delay),
            pending: PendingCount::new(),
            transferables: Mutex::new(HashMap::new()),
            adapter: tokio::sync::Mutex::new(AdapterSlot::default()),
            errors: Mutex::new(Vec::new()),
            error_tx: Mutex::new(Some(error_tx)),
            retry_tx: Mutex::new(Some(retry_tx)),
            results_tx,
            watchers: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            finished: AtomicBool::new(false),
        });

        let tasks = BackgroundTasks {
            errors: tokio::spawn(inner.clone().collect_errors(error_rx)),
            retries: tokio::spawn(inner.clone().collect_retries(retry_rx)),
            results: tokio::spawn(inner.clone().collect_results(results_rx)),
            batch_api: tokio::spawn(inner.clone().batch_api_routine()),
        };

        Self {
            inner,
            tasks: Mutex::new(Some(tasks)),
        }
    }

    pub fn direction(&self) -> Direction {
        self.inner.direction
    }

    pub fn batch_size(&self) -> usize {
        self.inner.batcher.batch_size()
    }

    /// How many times `oid` has been retried so far.
    pub fn retry_count(&self, oid: &str) -> usize {
        self.inner.retry_counter.count_for(oid)
    }

    /// Objects added but not yet transferred or failed for good.
    pub fn pending(&self) -> usize {
        self.inner.pending.get()
    }

    /// Queues an object.  An object whose OID is already queued is ignored.
    ///
    /// Returns once the object has been placed into a batch, so a slow batch API slows
    /// down producers.  Fails with `QueueFinished` once `wait` has been called.
    pub async fn add(&self, transfer: Transferable) -> Result<()> {
        if self.inner.finished.load(Ordering::Acquire) {
            return Err(TransferError::QueueFinished);
        }

        if !self.inner.remember(&transfer) {
            debug!("Already transferring {}, skipping duplicate", transfer.oid());
            return Ok(());
        }

        let oid = transfer.oid().to_owned();
        if let Err(e) = self.inner.batcher.add(vec![transfer]).await {
            self.inner.forget(&oid);
            return Err(e);
        }
        Ok(())
    }

    /// A channel receiving the OID of every object transferred successfully from now on.
    /// The channel closes when the queue finishes.
    pub fn watch(&self) -> UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.inner.finished.load(Ordering::Acquire) {
            self.inner.watchers.lock().push(tx);
        }
        rx
    }

    /// Blocks until every added object reached a final outcome, then shuts the queue down:
    /// the adapter is ended, watchers are closed and the progress meter is finished.
    ///
    /// May be called once; later calls return `QueueFinished`.
    pub async fn wait(&self) -> Result<()> {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return Err(TransferError::QueueFinished);
        }
        let Some(tasks) = self.tasks.lock().take() else {
            return Err(TransferError::QueueFinished);
        };
        let inner = &self.inner;

        debug!("Waiting for {} pending transfers", inner.pending.get());
        inner.batcher.exit();
        inner.pending.wait().await;

        // Nothing is pending, so nothing can be retried any more.
        inner.retry_tx.lock().take();
        tasks.retries.await?;

        inner.batcher.close();
        tasks.batch_api.await?;

        {
            let mut slot = inner.adapter.lock().await;
            end_adapter(&mut slot).await;
        }

        inner.shutdown.cancel();
        tasks.results.await?;

        inner.error_tx.lock().take();
        tasks.errors.await?;

        inner.watchers.lock().clear();
        inner.meter.finish();

        let n_errors = inner.errors.lock().len();
        if n_errors > 0 {
            info!("{} transfer queue finished with {n_errors} failed objects", inner.direction);
        } else {
            debug!("{} transfer queue finished", inner.direction);
        }
        Ok(())
    }

    /// Every error recorded so far; complete once `wait` has returned.
    pub fn errors(&self) -> Vec<TransferError> {
        self.inner.errors.lock().clone()
    }
}

impl Drop for TransferQueue {
    fn drop(&mut self) {
        // Dropped without wait(): stop the background tasks instead of leaking them.
        if let Some(tasks) = self.tasks.get_mut().take() {
            self.inner.batcher.close();
            self.inner.shutdown.cancel();
            tasks.abort();
        }
    }
}

async fn end_adapter(slot: &mut AdapterSlot) {
    if let Some(adapter) = slot.adapter.take() {
        if slot.in_progress {
            debug!("Ending transfer adapter {:?}", adapter.name());
            adapter.end().await;
        }
    }
    slot.in_progress = false;
}

impl QueueInner {
    /// Records a new transferable; false if its OID is already known.
    fn remember(&self, transfer: &Transferable) -> bool {
        let mut transferables = self.transferables.lock();
        if transferables.contains_key(transfer.oid()) {
            return false;
        }
        transferables.insert(transfer.oid().to_owned(), transfer.clone());
        self.pending.add(1);
        true
    }

    fn forget(&self, oid: &str) {
        if self.transferables.lock().remove(oid).is_some() {
            self.pending.done();
        }
    }

    fn is_known(&self, oid: &str) -> bool {
        self.transferables.lock().contains_key(oid)
    }

    fn update_transferable(&self, transfer: &Transferable) {
        if let Some(entry) = self.transferables.lock().get_mut(transfer.oid()) {
            *entry = transfer.clone();
        }
    }

    fn record_error(&self, err: TransferError) {
        debug!("Transfer error: {err}");
        let err = match self.error_tx.lock().as_ref() {
            Some(tx) => match tx.send(err) {
                Ok(()) => return,
                Err(e) => e.0,
            },
            None => err,
        };
        self.errors.lock().push(err);
    }

    fn can_retry(&self, oid: &str, err: &TransferError) -> bool {
        if !err.is_retriable() {
            return false;
        }
        let (count, can_retry) = self.retry_counter.can_retry(oid);
        if !can_retry {
            debug!("Refusing to retry {oid}: already retried {count} times");
        }
        can_retry
    }

    fn enqueue_retry(&self, transfer: Transferable, retry_at: Option<DateTime<Utc>>) {
        let retry = Retry { transfer, retry_at };
        let transfer = match self.retry_tx.lock().as_ref() {
            Some(tx) => match tx.send(retry) {
                Ok(()) => return,
                Err(e) => e.0.transfer,
            },
            None => retry.transfer,
        };
        self.record_error(TransferError::internal("retry requested after shutdown").for_object(transfer.oid()));
        self.pending.done();
    }

    /// Sends a failed object around again if the error and its budget allow it; otherwise
    /// records the failure as final.  Returns whether the object was retried.
    fn retry_or_fail(&self, transfer: Transferable, err: TransferError) -> bool {
        if self.can_retry(transfer.oid(), &err) {
            debug!("Enqueueing retry for {}: {err}", transfer.oid());
            self.enqueue_retry(transfer, err.retry_at());
            true
        } else {
            self.record_error(err.for_object(transfer.oid()));
            self.pending.done();
            false
        }
    }

    fn handle_transfer_result(&self, result: TransferResult) {
        let TransferResult { transfer, error } = result;

        if let Some(err) = error {
            self.retry_or_fail(transfer, err);
            return;
        }

        let oid = transfer.oid();
        self.watchers.lock().retain(|w| w.send(oid.to_owned()).is_ok());
        self.meter.finish_transfer(transfer.name());
        self.pending.done();
    }

    async fn collect_errors(self: Arc<Self>, mut rx: UnboundedReceiver<TransferError>) {
        while let Some(err) = rx.recv().await {
            self.errors.lock().push(err);
        }
    }

    async fn collect_retries(self: Arc<Self>, mut rx: UnboundedReceiver<Retry>) {
        while let Some(Retry { transfer, retry_at }) = rx.recv().await {
            let oid = transfer.oid().to_owned();
            let count = self.retry_counter.increment(&oid);
            let delay = match retry_at {
                Some(at) => (at - Utc::now()).to_std().unwrap_or_default(),
                None => self.retry_counter.retry_delay(&oid),
            };
            debug!("Retrying {oid} (retry {count}) after {delay:?}");

            if delay.is_zero() {
                self.requeue(transfer).await;
                continue;
            }

            // Held back on its own task so later retries are not queued behind this one.
            // The object stays pending meanwhile, so wait() cannot finish before it is requeued.
            let inner = self.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => inner.requeue(transfer).await,
                    _ = inner.shutdown.cancelled() => {},
                }
            });
        }
    }

    async fn requeue(&self, transfer: Transferable) {
        let oid = transfer.oid().to_owned();
        if let Err(e) = self.batcher.add(vec![transfer]).await {
            self.record_error(e.for_object(&oid));
            self.pending.done();
            return;
        }
        // Retries should not wait for a full batch.
        self.batcher.flush();
    }

    async fn collect_results(self: Arc<Self>, mut rx: UnboundedReceiver<TransferResult>) {
        loop {
            tokio::select! {
                biased;
                result = rx.recv() => match result {
                    Some(result) => self.handle_transfer_result(result),
                    None => break,
                },
                _ = self.shutdown.cancelled() => break,
            }
        }
    }

    async fn batch_api_routine(self: Arc<Self>) {
        loop {
            let Some(batch) = self.batcher.next().await else {
                // Retries may still arrive after an exit; only a closed batcher is final.
                if self.batcher.is_closed() {
                    break;
                }
                continue;
            };

            if !batch.is_empty() {
                self.process_batch(batch).await;
            }
        }
        debug!("Batch API routine finished");
    }

    async fn process_batch(&self, mut batch: Vec<Transferable>) {
        // Largest first, so a big object does not hold up the adapter at the end of a batch.
        batch.sort_by_key(|t| Reverse(t.size()));
        let objects: Vec<BatchObject> = batch.iter().map(Transferable::batch_object).collect();
        let adapter_names = self.manifest.adapter_names(self.direction);
        debug!("Batch API {} request for {} objects", self.direction, objects.len());

        let response = match self.client.batch(self.direction, &objects, &adapter_names).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Batch API {} request for {} objects failed: {err}", self.direction, batch.len());
                for transfer in batch {
                    let size = transfer.size();
                    if !self.retry_or_fail(transfer, err.clone()) {
                        self.meter.skip(size);
                    }
                }
                return;
            },
        };

        let BatchResponse {
            objects: response_objects,
            transfer_adapter_name,
        } = response;

        self.meter.start();

        let mut unresolved: HashMap<String, Transferable> =
            batch.into_iter().map(|t| (t.oid().to_owned(), t)).collect();
        let mut to_transfer = Vec::new();

        for object in response_objects {
            let Some(mut transfer) = unresolved.remove(&object.oid) else {
                if self.is_known(&object.oid) {
                    warn!("Batch API returned {} outside of its batch; ignoring", object.oid);
                } else {
                    self.record_error(TransferError::UnknownObject(object.oid.clone()));
                    self.meter.skip(object.size);
                }
                continue;
            };

            if let Some(err) = object.object_error() {
                self.record_error(err);
                self.meter.skip(object.size);
                self.pending.done();
                continue;
            }

            match object.rel(self.direction).map(|action| action.is_some()) {
                Err(err) => {
                    if !self.retry_or_fail(transfer, err) {
                        self.meter.skip(object.size);
                    }
                },
                Ok(false) => {
                    debug!("{} needs no {}", object.oid, self.direction);
                    self.meter.skip(object.size);
                    self.pending.done();
                },
                Ok(true) => {
                    transfer.set_object(object);
                    self.update_transferable(&transfer);
                    self.meter.start_transfer(transfer.name());
                    to_transfer.push(transfer);
                },
            }
        }

        for (oid, transfer) in unresolved {
            self.record_error(TransferError::MissingFromResponse(oid));
            self.meter.skip(transfer.size());
            self.pending.done();
        }

        if to_transfer.is_empty() {
            return;
        }

        if self.dry_run {
            for transfer in to_transfer {
                self.send_result(TransferResult::success(transfer));
            }
            return;
        }

        let adapter = match self.use_adapter(transfer_adapter_name.as_deref()).await {
            Ok(adapter) => adapter,
            Err(err) => {
                warn!("No transfer adapter for {}: {err}", self.direction);
                self.fail_all(to_transfer, &err);
                return;
            },
        };

        self.add_to_adapter(adapter, to_transfer).await;
    }

    fn send_result(&self, result: TransferResult) {
        // The receiver lives until wait() has seen the pending count reach zero.
        if let Err(e) = self.results_tx.send(result) {
            self.handle_transfer_result(e.0);
        }
    }

    fn fail_all(&self, transfers: Vec<Transferable>, err: &TransferError) {
        for transfer in transfers {
            self.record_error(err.clone().for_object(transfer.oid()));
            self.meter.skip(transfer.size());
            self.pending.done();
        }
    }

    /// Binds the adapter the server asked for, ending a different adapter bound earlier.
    /// An adapter is only constructed when the bound one does not already have that name.
    async fn use_adapter(&self, name: Option<&str>) -> Result<Arc<dyn TransferAdapter>> {
        let not_found = || TransferError::AdapterNotFound(name.unwrap_or(BASIC_ADAPTER_NAME).to_owned());

        let mut slot = self.adapter.lock().await;
        let resolved = self.manifest.resolve_adapter_name(name, self.direction).ok_or_else(not_found)?;

        if let Some(current) = &slot.adapter {
            if current.name() == resolved {
                return Ok(current.clone());
            }
            info!("Switching transfer adapter from {:?} to {resolved:?}", current.name());
            end_adapter(&mut slot).await;
        }

        let adapter = self.manifest.new_adapter(&resolved, self.direction).ok_or_else(not_found)?;
        slot.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    async fn ensure_adapter_begun(&self, adapter: &Arc<dyn TransferAdapter>) -> Result<()> {
        let mut slot = self.adapter.lock().await;
        if slot.in_progress {
            return Ok(());
        }

        let meter = self.meter.clone();
        let direction = self.direction;
        let progress: ProgressCallback = Arc::new(move |name: &str, total: u64, read: u64, current: u64| {
            meter.transfer_bytes(direction.as_str(), name, read, total, current);
        });

        debug!(
            "Starting {} transfer adapter {:?} with {} concurrent transfers",
            direction,
            adapter.name(),
            self.concurrent_transfers
        );
        adapter.begin(self.concurrent_transfers, progress, self.results_tx.clone()).await?;
        slot.in_progress = true;
        Ok(())
    }

    async fn add_to_adapter(&self, adapter: Arc<dyn TransferAdapter>, transfers: Vec<Transferable>) {
        let mut present = Vec::with_capacity(transfers.len());
        for transfer in transfers {
            if self.direction == Direction::Upload {
                if let Err(err) = check_local_object(&transfer).await {
                    self.send_result(TransferResult::failure(transfer, err));
                    continue;
                }
            }
            present.push(transfer);
        }

        if present.is_empty() {
            return;
        }

        if let Err(err) = self.ensure_adapter_begun(&adapter).await {
            warn!("Failed to start transfer adapter {:?}: {err}", adapter.name());
            self.fail_all(present, &err);
            return;
        }

        for transfer in present {
            adapter.add(transfer);
        }
    }
}

/// Uploads need the object in the local store, with the size the pointer claims.
async fn check_local_object(transfer: &Transferable) -> Result<()> {
    match tokio::fs::metadata(transfer.path()).await {
        Ok(meta) if meta.is_file() && meta.len() == transfer.size() => Ok(()),
        Ok(meta) if meta.is_file() => Err(TransferError::CorruptObject {
            name: transfer.name().to_owned(),
            oid: transfer.oid().to_owned(),
            expected: transfer.size(),
            actual: meta.len(),
        }),
        Ok(_) => Err(TransferError::MissingObject {
            name: transfer.name().to_owned(),
            oid: transfer.oid().to_owned(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TransferError::MissingObject {
            name: transfer.name().to_owned(),
            oid: transfer.oid().to_owned(),
        }),
        Err(e) => Err(e.into()),
    }
}
