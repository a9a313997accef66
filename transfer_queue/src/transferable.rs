use std::path::{Path, PathBuf};

use crate::batch_api::{BatchObject, ObjectResource};
use crate::errors::TransferError;

/// A unit of work: one content-addressed object to move.
///
/// Identity is the `oid`; the queue never holds two transferables with the same one.
/// The `object` slot is filled from the batch response before the transfer is handed to an
/// adapter, and carries the actions the adapter needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transferable {
    name: String,
    oid: String,
    size: u64,
    path: PathBuf,
    object: Option<ObjectResource>,
}

impl Transferable {
    pub fn new(name: impl Into<String>, oid: impl Into<String>, size: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            oid: oid.into(),
            size,
            path: path.into(),
            object: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn oid(&self) -> &str {
        &self.oid
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn object(&self) -> Option<&ObjectResource> {
        self.object.as_ref()
    }

    pub fn set_object(&mut self, object: ObjectResource) {
        self.object = Some(object);
    }

    pub(crate) fn batch_object(&self) -> BatchObject {
        BatchObject {
            oid: self.oid.clone(),
            size: self.size,
        }
    }
}

/// The outcome of one transfer attempt, as reported by an adapter.
#[derive(Clone, Debug)]
pub struct TransferResult {
    pub transfer: Transferable,
    pub error: Option<TransferError>,
}

impl TransferResult {
    pub fn success(transfer: Transferable) -> Self {
        Self { transfer, error: None }
    }

    pub fn failure(transfer: Transferable, error: TransferError) -> Self {
        Self {
            transfer,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
