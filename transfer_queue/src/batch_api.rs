use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, TransferError};
use crate::Direction;

/// Actions expiring sooner than this are treated as already expired.
const ACTION_EXPIRATION_BUFFER_SECONDS: i64 = 5;

/// One object in a batch request; only the id and size are sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchObject {
    pub oid: String,
    pub size: u64,
}

/// A server-provided way to perform a transfer: where to send or fetch the bytes and
/// which headers to use.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub href: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub header: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Action {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            ..Default::default()
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// True if the action has expired, or will within the expiration buffer.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(t) => t < now + Duration::seconds(ACTION_EXPIRATION_BUFFER_SECONDS),
            None => false,
        }
    }
}

/// A per-object error reported inside an otherwise successful batch response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectError {
    pub code: i32,
    pub message: String,
}

/// The server's answer for a single object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectResource {
    pub oid: String,
    pub size: u64,

    #[serde(default)]
    pub authenticated: bool,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub actions: HashMap<String, Action>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ObjectError>,
}

impl ObjectResource {
    pub fn new(oid: impl Into<String>, size: u64) -> Self {
        Self {
            oid: oid.into(),
            size,
            ..Default::default()
        }
    }

    pub fn with_action(mut self, rel: impl Into<String>, action: Action) -> Self {
        self.actions.insert(rel.into(), action);
        self
    }

    pub fn with_error(mut self, code: i32, message: impl Into<String>) -> Self {
        self.error = Some(ObjectError {
            code,
            message: message.into(),
        });
        self
    }

    /// The action to use for `direction`.
    ///
    /// `Ok(None)` means the server has nothing for us to do (e.g. the object already exists
    /// remotely).  An action about to expire yields a retriable `ActionExpired` error so the
    /// object is sent through the batch API again for a fresh one.
    pub fn rel(&self, direction: Direction) -> Result<Option<&Action>> {
        let rel = direction.as_str();
        let Some(action) = self.actions.get(rel) else {
            return Ok(None);
        };

        match action.expires_at {
            Some(expires_at) if action.is_expired_at(Utc::now()) => Err(TransferError::ActionExpired {
                rel: rel.to_owned(),
                expires_at,
            }),
            _ => Ok(Some(action)),
        }
    }

    /// The per-object error, scoped to this object's id.
    pub fn object_error(&self) -> Option<TransferError> {
        self.error.as_ref().map(|e| TransferError::ObjectError {
            oid: self.oid.clone(),
            code: e.code,
            message: e.message.clone(),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub objects: Vec<ObjectResource>,

    /// The adapter the server picked from the advertised names; `None` means "basic".
    #[serde(default, rename = "transfer", skip_serializing_if = "Option::is_none")]
    pub transfer_adapter_name: Option<String>,
}

/// The remote batch endpoint.
///
/// Given the objects of one batch and the adapter names this client supports, the server
/// answers per object whether, and how, it must be transferred.  Implementations classify
/// transport failures through the `TransferError` variant they return; see
/// [`TransferError::is_retriable`].
#[async_trait]
pub trait BatchApi: Send + Sync {
    async fn batch(&self, direction: Direction, objects: &[BatchObject], adapter_names: &[String])
        -> Result<BatchResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rel_present_missing_and_expired() {
        let obj = ObjectResource::new("abc", 10).with_action("download", Action::new("https://example.com/abc"));
        assert_eq!(obj.rel(Direction::Download).unwrap().unwrap().href, "https://example.com/abc");
        assert!(obj.rel(Direction::Upload).unwrap().is_none());

        let soon = Utc::now() + Duration::seconds(2);
        let obj = ObjectResource::new("abc", 10).with_action("upload", Action::new("h").with_expiry(soon));
        let err = obj.rel(Direction::Upload).unwrap_err();
        assert!(matches!(err, TransferError::ActionExpired { .. }));
        assert!(err.is_retriable());

        let later = Utc::now() + Duration::hours(1);
        let obj = ObjectResource::new("abc", 10).with_action("upload", Action::new("h").with_expiry(later));
        assert!(obj.rel(Direction::Upload).unwrap().is_some());
    }

    #[test]
    fn test_object_error_is_scoped() {
        let obj = ObjectResource::new("abc", 10).with_error(404, "Object does not exist");
        let err = obj.object_error().unwrap();
        assert_eq!(err.oid(), Some("abc"));
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "transfer": "basic",
            "objects": [
                {"oid": "1111", "size": 123, "authenticated": true,
                 "actions": {"download": {"href": "https://some-download.com",
                                          "header": {"Key": "value"},
                                          "expires_at": "2100-01-01T00:00:00Z"}}},
                {"oid": "2222", "size": 5, "error": {"code": 404, "message": "Object does not exist"}}
            ]
        }"#;

        let response: BatchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.transfer_adapter_name.as_deref(), Some("basic"));
        assert_eq!(response.objects.len(), 2);

        let first = &response.objects[0];
        assert!(first.authenticated);
        let action = first.rel(Direction::Download).unwrap().unwrap();
        assert_eq!(action.header.get("Key").map(String::as_str), Some("value"));

        let second = &response.objects[1];
        assert!(second.actions.is_empty());
        assert_eq!(second.error.as_ref().unwrap().code, 404);
    }
}
