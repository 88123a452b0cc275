//! Test data builders for events and pending delivery records.

use chrono::{DateTime, Duration, Utc};
use relay_core::{Event, PendingDelivery};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Builder for test events.
pub struct EventBuilder {
    fields: Map<String, Value>,
}

impl EventBuilder {
    /// Creates an empty event.
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    /// Creates an event with a random `id` and a `type`.
    pub fn with_defaults() -> Self {
        Self::new().field("id", Uuid::new_v4().to_string()).field("type", "test.event")
    }

    /// Sets a top-level field.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Builds the event.
    pub fn build(self) -> Event {
        Event::new(Value::Object(self.fields))
    }
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for pending delivery records with a controllable age.
pub struct PendingDeliveryBuilder {
    event: Event,
    subscriber: String,
    age: Duration,
}

impl PendingDeliveryBuilder {
    /// Starts a record for `subscriber` with event `{"id": 1}`, created now.
    pub fn new(subscriber: impl Into<String>) -> Self {
        Self {
            event: Event::new(json!({"id": 1})),
            subscriber: subscriber.into(),
            age: Duration::zero(),
        }
    }

    /// Sets the event.
    #[must_use]
    pub fn event(mut self, event: Event) -> Self {
        self.event = event;
        self
    }

    /// Sets how long before `now` the first failure happened.
    #[must_use]
    pub fn age(mut self, age: Duration) -> Self {
        self.age = age;
        self
    }

    /// Builds the record relative to `now`.
    pub fn build_at(self, now: DateTime<Utc>) -> PendingDelivery {
        PendingDelivery::new(self.event, self.subscriber, now - self.age)
    }
}
