//! Core domain models.
//!
//! Defines the opaque event payload, subscriber endpoints, and the pending
//! delivery record that tracks a failed delivery awaiting retry. A record is
//! addressed by its `(event, subscriber)` pair; `DeliveryKey` is the stable
//! digest of that pair used as the storage primary key.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{canonical, time::timestamp_format};

/// Opaque event payload.
///
/// The relay never inspects the contents of an event and delivers the
/// payload exactly as it was published. The canonical form is derived once
/// and used only for identity and persistence, so the same document always
/// maps to the same pending delivery record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct Event {
    payload: Value,
    canonical: String,
}

impl Event {
    /// Wraps a JSON document.
    pub fn new(payload: Value) -> Self {
        let canonical = canonical::to_canonical_string(&payload);
        Self { payload, canonical }
    }

    /// Returns the payload as published.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Consumes the event and returns the payload.
    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Returns the canonical JSON text of the payload.
    pub fn canonical_json(&self) -> &str {
        &self.canonical
    }

    /// Returns the canonical form of the payload, as persisted.
    pub fn canonical_payload(&self) -> Value {
        canonical::canonicalize(self.payload.clone())
    }
}

impl From<Value> for Event {
    fn from(payload: Value) -> Self {
        Self::new(payload)
    }
}

impl From<Event> for Value {
    fn from(event: Event) -> Self {
        event.payload
    }
}

/// A destination registered to receive events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscriber {
    /// URL-like destination the event is POSTed to.
    pub endpoint: String,
}

impl Subscriber {
    /// Creates a subscriber for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into() }
    }
}

/// Stable identity of a pending delivery.
///
/// Hex-encoded SHA-256 over the canonical event JSON and the subscriber
/// endpoint. Two records with equal events and subscribers always share a
/// key, independent of how the event's numbers were encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryKey(String);

impl DeliveryKey {
    /// Derives the key for an `(event, subscriber)` pair.
    pub fn new(event: &Event, subscriber: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(event.canonical_json().as_bytes());
        // Separator keeps ("ab", "c") and ("a", "bc") distinct.
        hasher.update([0u8]);
        hasher.update(subscriber.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an already-derived key, as read back from storage.
    pub fn from_stored(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted marker of a failed delivery awaiting retry.
///
/// Created on the first failed attempt and never updated in place; it is
/// removed on successful delivery or once the expiry window has elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelivery {
    /// Identity derived from `event` and `subscriber`.
    pub id: DeliveryKey,
    /// Payload to redeliver.
    pub event: Event,
    /// Destination endpoint.
    pub subscriber: String,
    /// Time of the first failed attempt.
    #[serde(with = "timestamp_format")]
    pub created_at: DateTime<Utc>,
}

impl PendingDelivery {
    /// Creates a record for a delivery that failed at `created_at`.
    pub fn new(event: Event, subscriber: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let subscriber = subscriber.into();
        let id = DeliveryKey::new(&event, &subscriber);
        Self { id, event, subscriber, created_at }
    }

    /// Returns the instant after which the record is dropped, or `None` if
    /// it lies beyond the representable range.
    pub fn expires_at(&self, expiry_window: chrono::Duration) -> Option<DateTime<Utc>> {
        self.created_at.checked_add_signed(expiry_window)
    }

    /// Whether the record has outlived the expiry window at `now`.
    ///
    /// Strictly greater: a record exactly at its expiry instant is still
    /// retried once more. A window too large to represent never expires.
    pub fn is_expired(&self, now: DateTime<Utc>, expiry_window: chrono::Duration) -> bool {
        self.expires_at(expiry_window).is_some_and(|expires_at| now > expires_at)
    }
}
