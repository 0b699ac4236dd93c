//! Host-side bootloader programmer for MRS Microplex 7* and CC16 CAN
//! modules: frame codec, bus transport, power control, session and module
//! controllers, and the static EEPROM parameter map.

pub mod bus;
pub mod config;
pub mod error;
pub mod frame;
pub mod message;
pub mod module;
pub mod parameters;
pub mod power;
pub mod session;
pub mod srecord;

pub use bus::BusAdapter;
pub use config::Config;
pub use error::{Error, MessageError, ModuleError};
pub use frame::{CanFrame, FrameId};
pub use module::{ModuleController, NullProgress, ParameterInput, ParameterValue, ProgressSink};
pub use power::{AnalogOutputs, AnalogPower, ManualPower, PowerAgent};
pub use session::{ScannedModule, SessionController};
pub use srecord::{FileSrecords, SrecordSource};

#[cfg(feature = "socketcan-bus")]
pub use bus::SocketCanBus;
