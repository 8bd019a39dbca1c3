//! Scanned-token grammar and the typed commands it produces.
//!
//! Tokens are case-sensitive and colon-delimited:
//!
//! * `cmd:toggle` / `cmd:next` / `cmd:previous`
//! * `cmd:volume:+` / `cmd:volume:-` / `cmd:volume:<0-100>`
//! * `spotify:...` - play the token itself as a streaming uri
//! * `lib:...` - play the token itself as a library uri
//!
//! Parsing is total and deterministic; anything else is an
//! `InvalidArgument` error and the token is dropped by the caller.

use std::str::FromStr;

use crate::error::{Error, Result};

/// Where a playable uri points.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SourceKind {
    /// Local music library (`lib:` prefix).
    Library,
    /// Streaming service (`spotify:` prefix).
    Streaming,
}

/// Direction of a relative volume change.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Direction {
    /// `cmd:volume:+`
    Up,
    /// `cmd:volume:-`
    Down,
}

/// A parsed playback command.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Command {
    /// Toggle between play and pause.
    Toggle,
    /// Skip to the next track.
    Next,
    /// Skip to the previous track.
    Previous,
    /// Nudge the volume one step.
    VolumeRelative(Direction),
    /// Set the volume to an absolute level, 0 to 100.
    VolumeAbsolute(u8),
    /// Start playing a uri.
    PlayUri {
        /// The full scanned token; Volumio takes it verbatim.
        uri: String,
        /// Library or streaming, from the token prefix.
        source: SourceKind,
    },
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        if let Some(task) = token.strip_prefix("cmd:") {
            return parse_task(token, task);
        }

        if token.starts_with("spotify:") {
            return Ok(Self::PlayUri {
                uri: token.to_owned(),
                source: SourceKind::Streaming,
            });
        }

        if token.starts_with("lib:") {
            return Ok(Self::PlayUri {
                uri: token.to_owned(),
                source: SourceKind::Library,
            });
        }

        Err(Error::invalid_argument(format!(
            "unknown token: {token:?}"
        )))
    }
}

/// Parses the part after `cmd:`.
fn parse_task(token: &str, task: &str) -> Result<Command> {
    match task {
        "toggle" => Ok(Command::Toggle),
        "next" => Ok(Command::Next),
        "previous" => Ok(Command::Previous),
        _ => {
            if let Some(target) = task.strip_prefix("volume:") {
                return parse_volume(target);
            }
            Err(Error::invalid_argument(format!(
                "command not understood: {token:?}"
            )))
        }
    }
}

/// Parses the payload of `cmd:volume:`.
fn parse_volume(target: &str) -> Result<Command> {
    match target {
        "+" => Ok(Command::VolumeRelative(Direction::Up)),
        "-" => Ok(Command::VolumeRelative(Direction::Down)),
        _ => {
            let level: i64 = target.parse()?;
            let level = u8::try_from(level)
                .ok()
                .filter(|level| *level <= 100)
                .ok_or_else(|| {
                    Error::out_of_range(format!("volume level {level} not within 0-100"))
                })?;
            Ok(Command::VolumeAbsolute(level))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_simple_commands() {
        assert_eq!("cmd:toggle".parse::<Command>().unwrap(), Command::Toggle);
        assert_eq!("cmd:next".parse::<Command>().unwrap(), Command::Next);
        assert_eq!(
            "cmd:previous".parse::<Command>().unwrap(),
            Command::Previous
        );
    }

    #[test]
    fn parses_relative_volume() {
        assert_eq!(
            "cmd:volume:+".parse::<Command>().unwrap(),
            Command::VolumeRelative(Direction::Up)
        );
        assert_eq!(
            "cmd:volume:-".parse::<Command>().unwrap(),
            Command::VolumeRelative(Direction::Down)
        );
    }

    #[test]
    fn parses_absolute_volume() {
        assert_eq!(
            "cmd:volume:57".parse::<Command>().unwrap(),
            Command::VolumeAbsolute(57)
        );
        assert_eq!(
            "cmd:volume:0".parse::<Command>().unwrap(),
            Command::VolumeAbsolute(0)
        );
        assert_eq!(
            "cmd:volume:100".parse::<Command>().unwrap(),
            Command::VolumeAbsolute(100)
        );
    }

    #[test]
    fn rejects_malformed_volume() {
        let err = "cmd:volume:abc".parse::<Command>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let err = "cmd:volume:101".parse::<Command>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);

        let err = "cmd:volume:-5".parse::<Command>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);
    }

    #[test]
    fn parses_streaming_uris() {
        assert_eq!(
            "spotify:track:0RQOZ6q9OTvfQX8HCGzmIB"
                .parse::<Command>()
                .unwrap(),
            Command::PlayUri {
                uri: "spotify:track:0RQOZ6q9OTvfQX8HCGzmIB".to_owned(),
                source: SourceKind::Streaming,
            }
        );
    }

    #[test]
    fn parses_library_uris() {
        assert_eq!(
            "lib:track:/mnt/music/a.flac".parse::<Command>().unwrap(),
            Command::PlayUri {
                uri: "lib:track:/mnt/music/a.flac".to_owned(),
                source: SourceKind::Library,
            }
        );
    }

    #[test]
    fn rejects_unknown_tokens() {
        for token in ["", "play", "cmd:", "cmd:louder", "CMD:toggle", "Spotify:x"] {
            let err = token.parse::<Command>().unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidArgument, "token {token:?}");
        }
    }

    #[test]
    fn parsing_is_deterministic() {
        let token = "cmd:volume:42";
        assert_eq!(
            token.parse::<Command>().unwrap(),
            token.parse::<Command>().unwrap()
        );
    }
}
