//! Wire protocol for the Volumio socket.io API.
//!
//! Volumio exposes its remote-control surface over socket.io with the
//! engine.io v3 framing. Every websocket text frame is one packet:
//!
//! * `0{json}` - engine.io open, carries the session handshake
//! * `1` - engine.io close
//! * `2` / `3` - engine.io ping / pong (the client pings)
//! * `40` / `41` - socket.io connect / disconnect on the default namespace
//! * `42["event",payload]` - socket.io event, both directions
//!
//! There is no request/response framing: commands go out as events and
//! state comes back as separately pushed events. This module keeps all
//! event names behind the typed [`Emit`] and [`PushKind`] enums so a typo
//! in an event name is a compile error, not a silently dead handler.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{Error, Result};

/// Engine.io ping frame, sent by the client on the handshake interval.
pub const PING_FRAME: &str = "2";

/// Session parameters from the engine.io open packet.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Server-assigned session id.
    pub sid: String,
    /// Interval at which the client must ping, in milliseconds.
    pub ping_interval: u64,
    /// Grace period for the matching pong, in milliseconds.
    pub ping_timeout: u64,
}

impl Handshake {
    /// Ping interval as a [`Duration`].
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval)
    }
}

/// A decoded inbound packet.
#[derive(Clone, Debug)]
pub enum Packet {
    /// Engine.io open with session handshake.
    Open(Handshake),
    /// Engine.io close.
    Close,
    /// Engine.io ping.
    Ping,
    /// Engine.io pong.
    Pong,
    /// Socket.io connect acknowledgement.
    Connect,
    /// Socket.io disconnect.
    Disconnect,
    /// Socket.io event with its name and payload.
    Event {
        /// Wire name of the event.
        name: String,
        /// Event payload; `Value::Null` when the event carries none.
        payload: Value,
    },
}

/// Decodes one websocket text frame into a [`Packet`].
///
/// # Errors
///
/// Returns `DataLoss` for frames that are not valid engine.io/socket.io
/// packets. Unknown but well-formed packet types are an error too: the
/// remote speaking a different protocol revision is not something we can
/// paper over.
pub fn decode(frame: &str) -> Result<Packet> {
    let mut chars = frame.chars();
    match chars.next() {
        Some('0') => {
            let handshake = serde_json::from_str(chars.as_str())?;
            Ok(Packet::Open(handshake))
        }
        Some('1') => Ok(Packet::Close),
        Some('2') => Ok(Packet::Ping),
        Some('3') => Ok(Packet::Pong),
        Some('4') => match chars.next() {
            Some('0') => Ok(Packet::Connect),
            Some('1') => Ok(Packet::Disconnect),
            Some('2') => decode_event(chars.as_str()),
            other => Err(Error::data_loss(format!(
                "unsupported socket.io packet type: {other:?}"
            ))),
        },
        other => Err(Error::data_loss(format!(
            "unsupported engine.io packet type: {other:?}"
        ))),
    }
}

/// Decodes the `["name", payload?]` array of a socket.io event packet.
fn decode_event(text: &str) -> Result<Packet> {
    let array: Vec<Value> = serde_json::from_str(text)?;
    let mut parts = array.into_iter();

    let name = match parts.next() {
        Some(Value::String(name)) => name,
        other => {
            return Err(Error::data_loss(format!(
                "event name missing or not a string: {other:?}"
            )))
        }
    };
    let payload = parts.next().unwrap_or(Value::Null);

    Ok(Packet::Event { name, payload })
}

/// Encodes an event into a socket.io text frame.
#[must_use]
pub fn encode_event(name: &str, payload: &Value) -> String {
    format!("42{}", json!([name, payload]))
}

/// Commands emitted to Volumio.
///
/// The wire protocol is fire-and-forget: none of these produce a direct
/// response, though most cause a later `pushState`.
#[derive(Clone, Debug, PartialEq)]
pub enum Emit {
    /// Request a state push.
    GetState,
    /// Clear the queue and play the given uri.
    AddPlay {
        /// Track or playlist uri, e.g. `spotify:track:...` or `lib:...`.
        uri: String,
    },
    /// Toggle between play and pause.
    Toggle,
    /// Volume change: `"+"`, `"-"`, or an absolute level.
    Volume(VolumeTarget),
    /// Skip to the next track.
    Next,
    /// Skip to the previous track.
    Previous,
    /// Ask the player host to power down.
    Shutdown,
}

/// Payload of a `volume` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeTarget {
    /// One step louder.
    Up,
    /// One step quieter.
    Down,
    /// Absolute level from 0 to 100.
    Absolute(u8),
}

impl Emit {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetState => "getState",
            Self::AddPlay { .. } => "addPlay",
            Self::Toggle => "toggle",
            Self::Volume(_) => "volume",
            Self::Next => "next",
            Self::Previous => "prev",
            Self::Shutdown => "shutdown",
        }
    }

    /// Wire payload of the event.
    ///
    /// Volumio expects an empty string, not `null`, for events without a
    /// meaningful payload.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::GetState | Self::Toggle | Self::Next | Self::Previous | Self::Shutdown => {
                Value::String(String::new())
            }
            Self::AddPlay { uri } => json!({ "uri": uri }),
            Self::Volume(VolumeTarget::Up) => Value::String("+".to_owned()),
            Self::Volume(VolumeTarget::Down) => Value::String("-".to_owned()),
            Self::Volume(VolumeTarget::Absolute(level)) => json!(level),
        }
    }

    /// Encodes this command as a websocket text frame.
    #[must_use]
    pub fn encode(&self) -> String {
        encode_event(self.name(), &self.payload())
    }
}

/// Events pushed by Volumio that this crate consumes.
///
/// Anything else pushed on the wire is dropped with a trace log.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PushKind {
    /// `pushState`: current playback snapshot.
    State,
    /// `pushBrowseLibrary`: browsing results; logged, not consumed.
    BrowseLibrary,
}

impl PushKind {
    /// Maps a wire event name onto a known push kind.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pushState" => Some(Self::State),
            "pushBrowseLibrary" => Some(Self::BrowseLibrary),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_open_handshake() {
        let packet =
            decode(r#"0{"sid":"WDCsd87","upgrades":[],"pingInterval":25000,"pingTimeout":5000}"#)
                .unwrap();
        match packet {
            Packet::Open(handshake) => {
                assert_eq!(handshake.sid, "WDCsd87");
                assert_eq!(handshake.ping_interval(), Duration::from_secs(25));
            }
            other => panic!("expected open packet, got {other:?}"),
        }
    }

    #[test]
    fn decodes_push_state_event() {
        let packet =
            decode(r#"42["pushState",{"status":"play","service":"mpd","uri":"lib:track/a"}]"#)
                .unwrap();
        match packet {
            Packet::Event { name, payload } => {
                assert_eq!(PushKind::from_name(&name), Some(PushKind::State));
                assert_eq!(payload["service"], "mpd");
            }
            other => panic!("expected event packet, got {other:?}"),
        }
    }

    #[test]
    fn decodes_control_packets() {
        assert!(matches!(decode("40"), Ok(Packet::Connect)));
        assert!(matches!(decode("41"), Ok(Packet::Disconnect)));
        assert!(matches!(decode("2"), Ok(Packet::Ping)));
        assert!(matches!(decode("3"), Ok(Packet::Pong)));
        assert!(matches!(decode("1"), Ok(Packet::Close)));
    }

    #[test]
    fn rejects_garbage_frames() {
        assert!(decode("").is_err());
        assert!(decode("9").is_err());
        assert!(decode("42{not an array}").is_err());
        assert!(decode("42[42]").is_err());
    }

    #[test]
    fn event_without_payload_decodes_to_null() {
        match decode(r#"42["pushShutdown"]"#).unwrap() {
            Packet::Event { payload, .. } => assert_eq!(payload, Value::Null),
            other => panic!("expected event packet, got {other:?}"),
        }
    }

    #[test]
    fn encodes_emits_in_volumio_format() {
        assert_eq!(Emit::GetState.encode(), r#"42["getState",""]"#);
        assert_eq!(Emit::Next.encode(), r#"42["next",""]"#);
        assert_eq!(
            Emit::AddPlay {
                uri: "spotify:track:0RQOZ6q9OTvfQX8HCGzmIB".to_owned()
            }
            .encode(),
            r#"42["addPlay",{"uri":"spotify:track:0RQOZ6q9OTvfQX8HCGzmIB"}]"#
        );
        assert_eq!(
            Emit::Volume(VolumeTarget::Up).encode(),
            r#"42["volume","+"]"#
        );
        assert_eq!(
            Emit::Volume(VolumeTarget::Absolute(57)).encode(),
            r#"42["volume",57]"#
        );
    }

    #[test]
    fn unknown_push_names_are_not_a_kind() {
        assert_eq!(PushKind::from_name("pushQueue"), None);
    }
}
