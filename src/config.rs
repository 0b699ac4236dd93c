//! Session configuration, threaded through the session and module
//! controllers rather than read from an ambient global (see the "Ambient
//! globals" design note).

/// Configuration shared by [`crate::session::SessionController`] and
/// [`crate::module::ModuleController`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the CAN interface as known to the transport (e.g. `"can0"`).
    pub interface_name: String,
    /// Interface channel (for adapters that multiplex several buses on one
    /// connection, e.g. `host:port` for an AnaGate unit).
    pub interface_channel: String,
    /// CAN bitrate, in kbit/s.
    pub bitrate: u32,
    /// Raises traced output to `debug`; installed as a `tracing` filter by
    /// the caller rather than checked ad hoc by each component.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            interface_name: String::new(),
            interface_channel: String::new(),
            bitrate: 500,
            verbose: false,
        }
    }
}
