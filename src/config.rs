//! Runtime configuration.

/// Default port of the Volumio socket.io API.
pub const DEFAULT_PORT: u16 = 3000;

/// Default code reader invocation, as shipped on the scanner host.
const DEFAULT_SCANNER_COMMAND: [&str; 3] = ["/usr/bin/zbarcam", "--nodisplay", "--prescale=300x250"];

/// Everything the controller and scanner need to run.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Config {
    /// Hostname or address of the player.
    pub host: String,
    /// Port of the player's socket.io API.
    pub port: u16,

    /// Program and arguments of the external code reader.
    pub scanner_command: Vec<String>,
}

impl Config {
    /// Creates a configuration for the given player host, with the
    /// standard port and reader command.
    #[must_use]
    pub fn with_host(host: String) -> Self {
        Self {
            host,
            port: DEFAULT_PORT,

            scanner_command: DEFAULT_SCANNER_COMMAND
                .iter()
                .map(|part| (*part).to_owned())
                .collect(),
        }
    }

    /// The websocket endpoint of the player's socket.io API.
    ///
    /// Volumio speaks the engine.io v3 framing, hence the pinned `EIO`
    /// revision in the query string.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!(
            "ws://{}:{}/socket.io/?EIO=3&transport=websocket",
            self.host, self.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_pins_the_protocol_revision() {
        let mut config = Config::with_host("volumio.local".to_owned());
        config.port = 3001;
        assert_eq!(
            config.endpoint(),
            "ws://volumio.local:3001/socket.io/?EIO=3&transport=websocket"
        );
    }
}
