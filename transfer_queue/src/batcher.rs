use std::mem::take;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::errors::{Result, TransferError};

enum Command<T> {
    Items(Vec<T>, oneshot::Sender<()>),
    Flush,
    Exit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BatcherState {
    Accumulating,

    /// The remaining lot and the end-of-batches signal were sent.  Adding more items moves
    /// the batcher back to `Accumulating`, so work that arrives late (retries) still flows.
    Exited,
}

/// Groups items from any number of producers into batches of `batch_size`.
///
/// A single background task owns the batch in progress.  Commands reach it through one
/// channel, so a `flush` issued after an `add` from the same producer always covers the
/// added items.  Completed batches are handed to [`Batcher::next`] one at a time; producers
/// are held in `add` while the consumer has not picked up the previous batch.
///
/// `next` returns `None` once after each `exit` (after any partial batch), and for good
/// once the batcher is closed.
pub struct Batcher<T> {
    batch_size: usize,
    commands: Mutex<Option<mpsc::UnboundedSender<Command<T>>>>,
    ready: tokio::sync::Mutex<mpsc::Receiver<Option<Vec<T>>>>,
    closed: AtomicBool,
}

impl<T: Send + 'static> Batcher<T> {
    /// Creates the batcher and spawns its accumulation task on the current tokio runtime.
    ///
    /// A `batch_size` of 0 releases every item as a batch of its own.
    pub fn new(batch_size: usize) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = mpsc::channel(1);

        tokio::spawn(accumulate(batch_size.max(1), command_rx, ready_tx));

        Self {
            batch_size,
            commands: Mutex::new(Some(command_tx)),
            ready: tokio::sync::Mutex::new(ready_rx),
            closed: AtomicBool::new(false),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn send(&self, command: Command<T>) -> Result<()> {
        let commands = self.commands.lock();
        let tx = commands.as_ref().ok_or(TransferError::BatcherClosed)?;
        tx.send(command).map_err(|_| TransferError::BatcherClosed)
    }

    /// Adds items, returning once all of them have been placed into a batch.
    pub async fn add(&self, items: Vec<T>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Items(items, ack_tx))?;
        ack_rx.await.map_err(|_| TransferError::BatcherClosed)
    }

    /// Waits for the next batch.  `None` signals an exit, or that the batcher was closed.
    pub async fn next(&self) -> Option<Vec<T>> {
        self.ready.lock().await.recv().await.flatten()
    }

    /// Releases the batch in progress now, whatever its size.
    pub fn flush(&self) {
        if self.send(Command::Flush).is_err() {
            trace!("flush on closed batcher ignored");
        }
    }

    /// Releases the batch in progress and then signals the end of batches to `next`.
    pub fn exit(&self) {
        if self.send(Command::Exit).is_err() {
            trace!("exit on closed batcher ignored");
        }
    }

    /// Stops the accumulation task.  Items not yet released are dropped; pending and later
    /// `next` calls return `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.commands.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn accumulate<T>(
    batch_size: usize,
    mut commands: mpsc::UnboundedReceiver<Command<T>>,
    ready: mpsc::Sender<Option<Vec<T>>>,
) {
    let mut state = BatcherState::Accumulating;
    let mut lot: Vec<T> = Vec::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Items(items, ack) => {
                if state == BatcherState::Exited {
                    trace!("batcher: items added after exit, accumulating again");
                    state = BatcherState::Accumulating;
                }

                for item in items {
                    lot.push(item);
                    if lot.len() >= batch_size && ready.send(Some(take(&mut lot))).await.is_err() {
                        return;
                    }
                }
                let _ = ack.send(());
            },
            Command::Flush => {
                if !lot.is_empty() && ready.send(Some(take(&mut lot))).await.is_err() {
                    return;
                }
            },
            Command::Exit => {
                if state == BatcherState::Exited {
                    continue;
                }
                if !lot.is_empty() && ready.send(Some(take(&mut lot))).await.is_err() {
                    return;
                }
                if ready.send(None).await.is_err() {
                    return;
                }
                state = BatcherState::Exited;
            },
        }
    }
}
