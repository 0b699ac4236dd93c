//! Error types for the bootloader protocol engine.
//!
//! `MessageError` covers a single received frame failing a codec check;
//! `ModuleError` covers protocol-level violations (timeouts, wrong module,
//! unexpected message where only one kind is valid). Per the error handling
//! design, a `MessageError` is promoted to `ModuleError` everywhere except
//! the one branch point in flash-mode entry that explicitly matches on it.

/// A received frame failed one of the three codec checks, in the order they
/// are applied: arbitration ID, length, then filter fields.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("expected frame with id {expected:#010x} but got {actual:#010x}")]
    WrongId { expected: u32, actual: u32 },

    #[error("expected {kind} payload of {expected} bytes but got {actual}")]
    WrongLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{kind} field {field} is {actual:#x} but expected {expected:#x}")]
    WrongFilterField {
        kind: &'static str,
        field: usize,
        expected: u64,
        actual: u64,
    },
}

/// A module-level protocol violation: the request/response exchange did not
/// resolve the way the protocol allows.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ModuleError {
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("wrong module responded: expected {expected:#010x}, got {actual:#010x}")]
    WrongModule { expected: u32, actual: u32 },

    #[error("unexpected reply to {context}: {source}")]
    UnexpectedReply {
        context: &'static str,
        #[source]
        source: MessageError,
    },

    #[error("unexpected message on the bus during {0}")]
    UnexpectedTraffic(&'static str),

    #[error("could not open module EEPROM for writing")]
    EepromOpenRejected,

    #[error("could not write EEPROM data")]
    EepromWriteRejected,

    #[error("error disabling EEPROM write mode")]
    EepromCloseRejected,

    #[error("unexpected response to terminal S-record")]
    TerminalRecordRejected,

    #[error("attempt to look up non-existent parameter {0:?}")]
    UnknownParameter(&'static str),

    #[error("parameter {0:?} is not writable")]
    NotWritable(&'static str),

    #[error("unsupported CAN baudrate {0} kbit/s")]
    UnsupportedBaudrate(u32),

    #[error("value {value:?} too long for {field:?}: max {max} bytes")]
    ValueTooLong {
        field: &'static str,
        value: String,
        max: usize,
    },
}

impl From<MessageError> for ModuleError {
    fn from(e: MessageError) -> Self {
        ModuleError::UnexpectedReply {
            context: "request",
            source: e,
        }
    }
}

/// Top-level error type returned by the CLI and by operations that may fail
/// either way.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("bus error: {0}")]
    Bus(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
