//! Local mirror of the player's pushed state.
//!
//! The store is fed exclusively from `pushState` events and read by the
//! controller for best-effort confirmation of play commands. It keeps a
//! strict projection of the push payload: only `service`, `title` and
//! `uri` are ever stored, everything else Volumio pushes is dropped.
//!
//! Merge semantics are an intersection-merge: an allowed key present in
//! the push overwrites (or clears, when null) the stored value; an
//! allowed key absent from the push leaves the previous value in place.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde_json::Value;

/// Last known playback snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlaybackState {
    /// Backend service reported by the player, e.g. `mpd` or `spop`.
    pub service: Option<String>,
    /// Title of the current track.
    pub title: Option<String>,
    /// Uri of the current track.
    pub uri: Option<String>,
    /// When the last push was applied.
    pub last_updated: Option<SystemTime>,
}

/// The keys kept from a `pushState` payload.
const ALLOWED_KEYS: [&str; 3] = ["service", "title", "uri"];

/// Shared, internally synchronized store of the last playback snapshot.
///
/// Cloning is cheap and yields a handle to the same snapshot; the channel
/// task writes through one handle while the controller reads another.
#[derive(Clone, Debug, Default)]
pub struct StateStore {
    inner: Arc<Mutex<PlaybackState>>,
}

impl StateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a pushed state payload.
    ///
    /// Non-object payloads are ignored with a warning; the remote is not
    /// supposed to push anything else, but a malformed push must never
    /// poison the snapshot.
    pub fn apply_push(&self, payload: &Value) {
        let Some(object) = payload.as_object() else {
            warn!("ignoring non-object state push: {payload}");
            return;
        };

        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let PlaybackState {
            service,
            title,
            uri,
            last_updated,
        } = &mut *state;

        for (key, field) in ALLOWED_KEYS.into_iter().zip([service, title, uri]) {
            match object.get(key) {
                Some(Value::String(value)) => *field = Some(value.clone()),
                Some(Value::Null) => *field = None,
                Some(other) => trace!("dropping non-string value for {key}: {other}"),
                None => {}
            }
        }
        *last_updated = Some(SystemTime::now());
    }

    /// Returns a read-only copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> PlaybackState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projects_onto_allowed_keys() {
        let store = StateStore::new();
        store.apply_push(&json!({
            "service": "mpd",
            "title": "Blue in Green",
            "status": "play",
            "volume": 62,
            "extra": "z",
        }));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.service.as_deref(), Some("mpd"));
        assert_eq!(snapshot.title.as_deref(), Some("Blue in Green"));
        assert_eq!(snapshot.uri, None);
        assert!(snapshot.last_updated.is_some());
    }

    #[test]
    fn absent_keys_keep_previous_values() {
        let store = StateStore::new();
        store.apply_push(&json!({ "title": "So What", "uri": "lib:track/1" }));
        store.apply_push(&json!({ "uri": "lib:track/2" }));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.title.as_deref(), Some("So What"));
        assert_eq!(snapshot.uri.as_deref(), Some("lib:track/2"));
    }

    #[test]
    fn null_clears_a_field() {
        let store = StateStore::new();
        store.apply_push(&json!({ "title": "So What" }));
        store.apply_push(&json!({ "title": null }));

        assert_eq!(store.snapshot().title, None);
    }

    #[test]
    fn non_object_pushes_are_ignored() {
        let store = StateStore::new();
        store.apply_push(&json!({ "title": "So What" }));
        store.apply_push(&json!("garbage"));

        assert_eq!(store.snapshot().title.as_deref(), Some("So What"));
    }
}
