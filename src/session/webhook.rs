//! Webhook payload normalization and validation.
//!
//! Accepts either of two storage-event shapes and normalizes both down
//! to [`NormalizedEvent`] before any ingest gate runs.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const ACCEPTED_EVENT_TYPES: &[&str] = &[
    "ObjectCreated:Post",
    "storage-object-uploaded",
    "storage-object-created",
    "INSERT_storage.objects",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("unrecognized webhook payload shape")]
    UnrecognizedShape,
    #[error("event type '{event_type}' is not accepted")]
    UnacceptedEventType { event_type: String },
    #[error("file extension must be .c3d, got '{object_name}'")]
    WrongExtension { object_name: String },
    #[error("bucket '{bucket}' does not match the configured ingest bucket '{expected}'")]
    WrongBucket { bucket: String, expected: String },
    #[error("file size {size} bytes is out of bounds (must be > 0 and <= {limit})")]
    SizeOutOfBounds { size: u64, limit: u64 },
    #[error("HMAC signature verification failed")]
    BadSignature,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyShape {
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub bucket: String,
    #[serde(rename = "objectName")]
    pub object_name: String,
    #[serde(rename = "objectSize")]
    pub object_size: u64,
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbTriggerRecord {
    pub id: String,
    pub name: String,
    pub bucket_id: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbTriggerShape {
    #[serde(rename = "type")]
    pub event_type: String,
    pub table: String,
    pub schema: String,
    pub record: DbTriggerRecord,
    pub old_record: Option<DbTriggerRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    Legacy(LegacyShape),
    DbTrigger(DbTriggerShape),
}

#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    pub event_type: String,
    pub bucket: String,
    pub object_name: String,
    pub object_size: u64,
    pub content_type: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

pub fn normalize(payload: &WebhookPayload) -> NormalizedEvent {
    match payload {
        WebhookPayload::Legacy(shape) => NormalizedEvent {
            event_type: shape.event_type.clone(),
            bucket: shape.bucket.clone(),
            object_name: shape.object_name.clone(),
            object_size: shape.object_size,
            content_type: shape.content_type.clone(),
            timestamp: shape.timestamp,
        },
        WebhookPayload::DbTrigger(shape) => {
            let size = shape
                .record
                .metadata
                .as_ref()
                .and_then(|m| m.get("size"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let content_type = shape
                .record
                .metadata
                .as_ref()
                .and_then(|m| m.get("mimetype"))
                .and_then(|v| v.as_str())
                .map(str::to_string);
            NormalizedEvent {
                event_type: shape.event_type.clone(),
                bucket: shape.record.bucket_id.clone(),
                object_name: shape.record.name.clone(),
                object_size: size,
                content_type,
                timestamp: shape.record.created_at,
            }
        }
    }
}

/// Validation gates, run in order: event type,
/// extension, bucket, size. Signature verification (when configured)
/// runs separately over the raw body before this is even parsed.
pub fn validate(event: &NormalizedEvent, ingest_bucket: &str, max_file_size_bytes: u64) -> Result<(), WebhookError> {
    if !ACCEPTED_EVENT_TYPES.contains(&event.event_type.as_str()) {
        return Err(WebhookError::UnacceptedEventType {
            event_type: event.event_type.clone(),
        });
    }
    if !event.object_name.to_lowercase().ends_with(".c3d") {
        return Err(WebhookError::WrongExtension {
            object_name: event.object_name.clone(),
        });
    }
    if event.bucket != ingest_bucket {
        return Err(WebhookError::WrongBucket {
            bucket: event.bucket.clone(),
            expected: ingest_bucket.to_string(),
        });
    }
    if event.object_size == 0 || event.object_size > max_file_size_bytes {
        return Err(WebhookError::SizeOutOfBounds {
            size: event.object_size,
            limit: max_file_size_bytes,
        });
    }
    Ok(())
}

/// Constant-time HMAC-SHA256 verification over the raw request body.
pub fn verify_signature(secret: &str, raw_body: &[u8], provided_signature_hex: &str) -> Result<(), WebhookError> {
    let provided_bytes = hex::decode(provided_signature_hex).map_err(|_| WebhookError::BadSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::BadSignature)?;
    mac.update(raw_body);
    mac.verify_slice(&provided_bytes).map_err(|_| WebhookError::BadSignature)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_shape_normalizes_directly() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"eventType":"ObjectCreated:Post","bucket":"c3d-examples","objectName":"a.c3d","objectSize":1024,"contentType":"application/octet-stream"}"#,
        )
        .unwrap();
        let event = normalize(&payload);
        assert_eq!(event.bucket, "c3d-examples");
        assert_eq!(event.object_size, 1024);
    }

    #[test]
    fn db_trigger_shape_normalizes_through_record() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"type":"INSERT_storage.objects","table":"objects","schema":"storage","record":{"id":"1","name":"b.c3d","bucket_id":"c3d-examples","metadata":{"size":2048,"mimetype":"application/octet-stream"}}}"#,
        )
        .unwrap();
        let event = normalize(&payload);
        assert_eq!(event.object_name, "b.c3d");
        assert_eq!(event.object_size, 2048);
    }

    #[test]
    fn validate_rejects_wrong_extension() {
        let event = NormalizedEvent {
            event_type: "ObjectCreated:Post".to_string(),
            bucket: "c3d-examples".to_string(),
            object_name: "a.txt".to_string(),
            object_size: 10,
            content_type: None,
            timestamp: None,
        };
        let result = validate(&event, "c3d-examples", 1000);
        assert!(matches!(result, Err(WebhookError::WrongExtension { .. })));
    }

    #[test]
    fn validate_rejects_oversized_file() {
        let event = NormalizedEvent {
            event_type: "ObjectCreated:Post".to_string(),
            bucket: "c3d-examples".to_string(),
            object_name: "a.c3d".to_string(),
            object_size: 2000,
            content_type: None,
            timestamp: None,
        };
        let result = validate(&event, "c3d-examples", 1000);
        assert!(matches!(result, Err(WebhookError::SizeOutOfBounds { .. })));
    }

    #[test]
    fn signature_round_trips() {
        let secret = "topsecret";
        let body = b"raw-request-body";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        assert!(verify_signature(secret, body, &sig).is_ok());
        assert!(verify_signature(secret, body, "deadbeef").is_err());
    }
}
