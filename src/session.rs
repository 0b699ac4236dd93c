//! Session controller (C4): detect, scan, console-receive. Owns the bus and
//! power agent for the duration of a programming session.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::bus::BusAdapter;
use crate::config::Config;
use crate::error::{Error, ModuleError};
use crate::frame::{CanFrame, FrameId};
use crate::message::{Ack, AckReason, Ping, RxMessage, Selected, TxMessage};
use crate::power::PowerAgent;

/// Summary of one module seen during a [`SessionController::scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedModule {
    pub status_code: u8,
    pub reason: AckReason,
    pub sw_version: u16,
}

/// Owns the CAN bus and power rail for one programming session.
pub struct SessionController<B: BusAdapter, P: PowerAgent> {
    bus: B,
    power: P,
    config: Config,
}

impl<B: BusAdapter, P: PowerAgent> SessionController<B, P> {
    pub fn new(bus: B, power: P, config: Config) -> Self {
        SessionController { bus, power, config }
    }

    /// Sends a message, tracing it when `config.verbose` is set.
    pub fn send<M: TxMessage>(&mut self, message: &M) -> Result<(), Error> {
        let frame = message.to_frame();
        if self.config.verbose {
            trace!(%frame, "CAN TX");
        }
        self.bus
            .send(&frame)
            .map_err(|e| Error::Bus(e.to_string()))
    }

    /// Waits up to `timeout` for the next frame on the receive filter.
    pub fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>, Error> {
        let frame = self
            .bus
            .recv(timeout)
            .map_err(|e| Error::Bus(e.to_string()))?;
        if self.config.verbose {
            if let Some(f) = &frame {
                trace!(%f, "CAN RX");
            }
        }
        Ok(frame)
    }

    /// Drains buffered frames until a quiet window or the frame cap.
    pub fn drain(&mut self) -> Result<(), Error> {
        self.bus.drain().map_err(|e| Error::Bus(e.to_string()))
    }

    pub fn set_power_off(&mut self) {
        self.power.set_power_off();
    }

    pub fn set_power_t30(&mut self) {
        self.power.set_power_t30();
    }

    pub fn set_power_t30_t15(&mut self) {
        self.power.set_power_t30_t15();
    }

    /// Powers on the module and waits for it to sign on in the bootloader,
    /// then selects it to hold it there. Must be called exactly once per
    /// session, before any [`crate::module::ModuleController`] operation.
    pub fn detect(&mut self) -> Result<u32, Error> {
        self.set_power_off();
        std::thread::sleep(Duration::from_millis(250));
        self.drain()?;
        self.set_power_t30();

        let frame = self
            .recv(Duration::from_secs(5))?
            .ok_or(ModuleError::Timeout("power-on message from module"))?;
        let ack = Ack::parse(&frame).map_err(|_| {
            ModuleError::UnexpectedReply {
                context: "power-on",
                source: crate::error::MessageError::WrongId {
                    expected: FrameId::Ack.as_u32(),
                    actual: frame.id(),
                },
            }
        })?;
        debug!(module_id = format_args!("{:#010x}", ack.module_id), "module signed on");

        self.send(&crate::message::Select {
            module_id: ack.module_id,
        })?;
        let frame = self
            .recv(Duration::from_secs(1))?
            .ok_or(ModuleError::Timeout("select response from module"))?;
        let selected = Selected::parse(&frame)?;
        Ok(selected.module_id)
    }

    /// Broadcasts pings for about a second, collecting de-duplicated ACK
    /// replies keyed by module id.
    pub fn scan(&mut self) -> Result<HashMap<u32, ScannedModule>, Error> {
        let mut modules = HashMap::new();
        let scan_end = std::time::Instant::now() + Duration::from_secs(1);
        self.send(&Ping)?;
        loop {
            match self.recv(Duration::from_millis(50))? {
                Some(frame) => {
                    let ack = Ack::parse(&frame)
                        .map_err(|_| ModuleError::UnexpectedTraffic("scan"))?;
                    modules.insert(
                        ack.module_id,
                        ScannedModule {
                            status_code: ack.status_code,
                            reason: ack.reason,
                            sw_version: ack.sw_version,
                        },
                    );
                }
                None if std::time::Instant::now() < scan_end => {
                    self.send(&Ping)?;
                }
                None => break,
            }
        }
        Ok(modules)
    }

    /// Blocks, discarding ACK frames (logging resets), until a CONSOLE
    /// frame arrives, then returns its payload. A quiet receive window is
    /// not a failure here: unlike a command reply, console output has no
    /// expected arrival time, so the wait simply continues.
    pub fn get_console_data(&mut self) -> Result<Vec<u8>, Error> {
        loop {
            let Some(frame) = self.recv(Duration::from_secs(1))? else {
                continue;
            };
            if let Ok(ack) = Ack::parse(&frame) {
                warn!(reason = ?ack.reason, "module reset");
                continue;
            }
            if frame.frame_id() == Some(FrameId::Console) {
                return Ok(frame.data().to_vec());
            }
        }
    }

    /// Test-only escape hatch so `module.rs` tests can seed/inspect the bus
    /// without a public API for it.
    #[cfg(test)]
    pub(crate) fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}
