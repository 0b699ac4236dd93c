//! Module controller (C5): per-module operations built from
//! `send request -> receive expected response` sequences.

use std::time::Duration;

use tracing::{debug, info};

use crate::bus::BusAdapter;
use crate::error::{Error, MessageError, ModuleError};
use crate::frame::FrameId;
use crate::message::{
    CloseEeprom, EepromClosed, EepromOpen, EepromWriteOk, EraseCmd, EraseDone, NoProgram,
    ProgramAck, ProgramCmd, ProgramNak, Progress, ReadEeprom, RxMessage, Select, Selected,
    SrecContOk, SrecEndOk, SrecStartOk, SrecordFragment, SrecordsDone, TxMessage,
    WriteEepromData, WriteEepromEnable,
};
use crate::parameters::{self, Encoding};
use crate::power::PowerAgent;
use crate::session::SessionController;
use crate::srecord::SrecordSource;

/// Per-module operations. Holds the module's id and borrows the session for
/// the duration of the call; every addressed operation re-selects the
/// module first, per §4.4.1.
pub struct ModuleController<'a, B: BusAdapter, P: PowerAgent> {
    session: &'a mut SessionController<B, P>,
    module_id: u32,
}

/// Renders an erase/flash progress update. Callers supply their own sink
/// (stdout progress bar, a channel, a test recorder, ...).
pub trait ProgressSink {
    fn progress(&mut self, title: &str, position: u32, limit: u32);
}

/// A [`ProgressSink`] that does nothing, for callers that don't care.
pub struct NullProgress;
impl ProgressSink for NullProgress {
    fn progress(&mut self, _title: &str, _position: u32, _limit: u32) {}
}

/// Clamps `limit` and `position` before computing a display scale, per the
/// resolved open question: a simulator reporting `limit == 0` must not
/// produce a degenerate or overflowing bar.
pub fn clamp_progress(limit: u32, position: u32) -> (u32, u32) {
    let limit = limit.max(1);
    let position = position.min(limit);
    (limit, position)
}

impl<'a, B: BusAdapter, P: PowerAgent> ModuleController<'a, B, P> {
    pub fn new(session: &'a mut SessionController<B, P>, module_id: u32) -> Self {
        ModuleController { session, module_id }
    }

    /// Sends `message`, waits up to 1 s, and parses the reply as `R`,
    /// promoting a codec mismatch to `ModuleError` per §7.
    fn cmd<M: TxMessage, R: RxMessage>(&mut self, message: &M) -> Result<R, Error> {
        self.session.send(message)?;
        let frame = self
            .session
            .recv(Duration::from_secs(1))?
            .ok_or(ModuleError::Timeout(R::NAME))?;
        Ok(R::parse(&frame).map_err(|e| ModuleError::UnexpectedReply {
            context: R::NAME,
            source: e,
        })?)
    }

    /// Selects the module for subsequent commands (§4.4.1).
    fn select(&mut self) -> Result<u16, Error> {
        self.session.send(&Select {
            module_id: self.module_id,
        })?;
        let frame = self
            .session
            .recv(Duration::from_secs(1))?
            .ok_or(ModuleError::Timeout("selected"))?;
        let selected = Selected::parse(&frame)?;
        if selected.module_id != self.module_id {
            return Err(ModuleError::WrongModule {
                expected: self.module_id,
                actual: selected.module_id,
            }
            .into());
        }
        Ok(selected.sw_version)
    }

    /// Reads `length` bytes of EEPROM starting at `address` (§4.4.2).
    fn read_eeprom(&mut self, mut address: u16, mut length: u16) -> Result<Vec<u8>, Error> {
        self.select()?;
        let mut result = Vec::with_capacity(length as usize);
        while length > 0 {
            let count = length.min(8) as u8;
            self.session.send(&ReadEeprom { address, count })?;
            let frame = self
                .session
                .recv(Duration::from_secs(1))?
                .ok_or(ModuleError::Timeout("eeprom data"))?;
            if frame.frame_id() != Some(FrameId::Data) {
                return Err(ModuleError::UnexpectedReply {
                    context: "eeprom read",
                    source: MessageError::WrongId {
                        expected: FrameId::Data.as_u32(),
                        actual: frame.id(),
                    },
                }
                .into());
            }
            result.extend_from_slice(frame.data());
            length -= count as u16;
            address += count as u16;
        }
        Ok(result)
    }

    /// Writes `data` to EEPROM starting at `address` (§4.4.3).
    fn write_eeprom(&mut self, address: u16, data: &[u8]) -> Result<(), Error> {
        self.select()?;
        self.cmd::<_, EepromOpen>(&WriteEepromEnable)
            .map_err(|_| ModuleError::EepromOpenRejected)?;

        let mut addr = address;
        for chunk in data.chunks(6) {
            self.cmd::<_, EepromWriteOk>(&WriteEepromData {
                address: addr,
                data: chunk,
            })
            .map_err(|_| ModuleError::EepromWriteRejected)?;
            addr += chunk.len() as u16;
        }

        self.cmd::<_, EepromClosed>(&CloseEeprom)
            .map_err(|_| ModuleError::EepromCloseRejected)?;
        Ok(())
    }

    /// Waits for the ACK broadcast by a module rebooting into the
    /// bootloader (§4.4.4).
    fn wait_for_boot(&mut self, timeout: Duration) -> Result<(), Error> {
        use crate::message::Ack;

        loop {
            let frame = self
                .session
                .recv(timeout)?
                .ok_or(ModuleError::Timeout("module reboot"))?;
            let Ok(ack) = Ack::parse(&frame) else {
                continue;
            };
            if ack.module_id != self.module_id {
                continue;
            }
            if !ack.reason.is_reboot() {
                continue;
            }
            return Ok(());
        }
    }

    /// Puts the module into flash/erase mode (§4.4.4).
    fn enter_flash_mode(&mut self) -> Result<(), Error> {
        self.select()?;
        self.session.send(&ProgramCmd)?;
        let frame = self
            .session
            .recv(Duration::from_secs(1))?
            .ok_or(ModuleError::Timeout("program response"))?;

        match ProgramNak::parse(&frame) {
            Ok(_) => {
                info!("application running, waiting for reboot into bootloader");
                self.wait_for_boot(Duration::from_secs(2))?;
                self.select()?;
                self.session.send(&ProgramCmd)?;
                let frame = self
                    .session
                    .recv(Duration::from_secs(1))?
                    .ok_or(ModuleError::Timeout("program response"))?;
                ProgramAck::parse(&frame)?;
            }
            Err(_) => {
                ProgramAck::parse(&frame)?;
            }
        }
        Ok(())
    }

    /// Erases the currently-selected module's flash (§4.4.5).
    fn erase_inner(&mut self, progress: &mut dyn ProgressSink) -> Result<(), Error> {
        self.session.send(&EraseCmd)?;
        loop {
            let frame = self
                .session
                .recv(Duration::from_secs(2))?
                .ok_or(ModuleError::Timeout("erase progress"))?;
            if EraseDone::parse(&frame).is_ok() {
                return Ok(());
            }
            let p = Progress::parse(&frame).map_err(|_| {
                ModuleError::UnexpectedReply {
                    context: "erase progress",
                    source: MessageError::WrongId {
                        expected: FrameId::Rsp.as_u32(),
                        actual: frame.id(),
                    },
                }
            })?;
            let (limit, position) = clamp_progress(p.limit.saturating_sub(1) as u32, p.progress as u32);
            progress.progress("ERASE", position, limit);
        }
    }

    /// Streams S-records to the module (§4.4.6).
    fn program(
        &mut self,
        srecords: &dyn SrecordSource,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), Error> {
        let records: Vec<Vec<u8>> = srecords.upload_records().collect();
        let (memory_records, terminal) = records
            .split_last()
            .map(|(last, rest)| (rest, last.clone()))
            .expect("srecord source must yield at least a terminal record");

        let progress_limit = memory_records.len().saturating_sub(1) as u32;
        for (i, record) in memory_records.iter().enumerate() {
            progress.progress("FLASH", i as u32, progress_limit);
            self.send_record_fragments(record)?;
        }

        self.session.send(&SrecordFragment { bytes: &terminal })?;
        let frame = self
            .session
            .recv(Duration::from_secs(1))?
            .ok_or(ModuleError::Timeout("terminal S-record response"))?;
        if NoProgram::parse(&frame).is_ok() {
            debug!("module ROM rejected the uploaded image");
        }
        SrecordsDone::parse(&frame).map_err(|_| ModuleError::TerminalRecordRejected)?;
        Ok(())
    }

    /// Fragments a single memory record per §4.4.6's ordering rules.
    fn send_record_fragments(&mut self, record: &[u8]) -> Result<(), Error> {
        let mut remaining = record;

        if remaining.len() > 8 {
            let (head, rest) = remaining.split_at(8);
            self.cmd::<_, SrecStartOk>(&SrecordFragment { bytes: head })?;
            remaining = rest;
        }

        while remaining.len() > 8 {
            let (head, rest) = remaining.split_at(8);
            self.cmd::<_, SrecContOk>(&SrecordFragment { bytes: head })?;
            remaining = rest;
        }

        self.cmd::<_, SrecEndOk>(&SrecordFragment { bytes: remaining })?;
        Ok(())
    }

    /// Uploads firmware: enter flash mode, erase, then stream S-records.
    pub fn upload(
        &mut self,
        srecords: &dyn SrecordSource,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), Error> {
        self.enter_flash_mode()?;
        self.erase_inner(progress)?;
        self.program(srecords, progress)
    }

    /// Erases the module without uploading anything.
    pub fn erase(&mut self, progress: &mut dyn ProgressSink) -> Result<(), Error> {
        self.enter_flash_mode()?;
        self.erase_inner(progress)
    }

    /// Reads and decodes a named parameter from the EEPROM table.
    pub fn parameter(&mut self, name: &str) -> Result<ParameterValue, Error> {
        let (offset, field) = parameters::lookup(name)
            .ok_or_else(|| ModuleError::UnknownParameter(leak_name(name)))?;
        let bytes = self.read_eeprom(offset as u16, field.encoding.width() as u16)?;
        Ok(decode(field.encoding, &bytes))
    }

    /// Writes a named, writable parameter.
    pub fn set_parameter(&mut self, name: &str, value: ParameterInput) -> Result<(), Error> {
        let (offset, field) = parameters::lookup(name)
            .ok_or_else(|| ModuleError::UnknownParameter(leak_name(name)))?;
        if !field.writable {
            return Err(ModuleError::NotWritable(leak_name(name)).into());
        }
        debug!(parameter = name, "writing parameter");

        match (name, field.encoding, value) {
            ("BaudrateBootloader1", Encoding::U16, ParameterInput::U32(kbps)) => {
                let code = parameters::baudrate_code(kbps)
                    .ok_or(ModuleError::UnsupportedBaudrate(kbps))?;
                self.write_eeprom(offset as u16, &code)
            }
            (_, Encoding::FixedStr(width), ParameterInput::Str(s)) => {
                if s.len() > width {
                    return Err(ModuleError::ValueTooLong {
                        field: leak_name(name),
                        value: s.clone(),
                        max: width,
                    }
                    .into());
                }
                let mut buf = vec![0u8; width];
                buf[..s.len()].copy_from_slice(s.as_bytes());
                self.write_eeprom(offset as u16, &buf)
            }
            _ => Err(ModuleError::NotWritable(leak_name(name)).into()),
        }
    }

    /// Names of the parameters visible to users (hidden names excluded).
    pub fn parameter_names(&self) -> impl Iterator<Item = &'static str> {
        parameters::visible_names()
    }
}

/// Parameter table names are `&'static str` constants; callers only ever
/// pass one of those back in, so interning a borrowed name for an error path
/// is safe to model as `'static` without unsafe code by matching against
/// the table instead of trusting the caller's string directly.
fn leak_name(name: &str) -> &'static str {
    parameters::PARAMETER_MAP
        .iter()
        .find(|f| f.name == name)
        .map(|f| f.name)
        .unwrap_or("<unknown>")
}

/// A decoded parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    U8(u8),
    U16(u16),
    U32(u32),
    Str(String),
}

/// A value to encode when writing a parameter.
pub enum ParameterInput {
    U32(u32),
    Str(String),
}

fn decode(encoding: Encoding, bytes: &[u8]) -> ParameterValue {
    match encoding {
        Encoding::U8 => ParameterValue::U8(bytes[0]),
        Encoding::U16 => ParameterValue::U16(u16::from_be_bytes([bytes[0], bytes[1]])),
        Encoding::U32 => {
            ParameterValue::U32(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        Encoding::FixedStr(_) => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            ParameterValue::Str(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SimulatedBus;
    use crate::config::Config;
    use crate::frame::{CanFrame, FrameId};
    use crate::power::ManualPower;

    fn harness() -> SessionController<SimulatedBus, ManualPower> {
        SessionController::new(SimulatedBus::new(), ManualPower, Config::default())
    }

    fn push_select_response(bus: &mut SimulatedBus, module_id: u32) {
        let mut data = vec![0x21, 0x10];
        data.extend_from_slice(&module_id.to_be_bytes());
        data.extend_from_slice(&[0x00, 0x00]);
        bus.push(CanFrame::new(FrameId::Rsp.as_u32(), &data));
    }

    #[test]
    fn read_eeprom_chunks_in_units_of_eight() {
        let mut session = harness();
        push_select_response(session.bus_mut(), 0x01020304);
        session
            .bus_mut()
            .push(CanFrame::new(FrameId::Data.as_u32(), &[1, 2, 3, 4]));
        let mut module = ModuleController::new(&mut session, 0x01020304);
        let data = module.read_eeprom(4, 4).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn erase_done_tail_byte_accepts_0xff() {
        let mut session = harness();
        session.bus_mut().push(CanFrame::new(
            FrameId::Rsp.as_u32(),
            &[0x00, 0x00, 0xFF, 0x01],
        ));
        let mut module = ModuleController::new(&mut session, 0x01020304);
        module.erase_inner(&mut NullProgress).unwrap();
    }

    #[test]
    fn clamp_progress_handles_limit_of_one() {
        assert_eq!(clamp_progress(0, 0), (1, 0));
        assert_eq!(clamp_progress(5, 9), (5, 5));
    }

    fn push_srec_start_ok(bus: &mut SimulatedBus) {
        bus.push(CanFrame::new(
            FrameId::Rsp.as_u32(),
            &[0x00, 0x01, 0x01, 0x01, 0x01],
        ));
    }

    fn push_srec_cont_ok(bus: &mut SimulatedBus) {
        bus.push(CanFrame::new(FrameId::Rsp.as_u32(), &[0x00, 0x01]));
    }

    fn push_srec_end_ok(bus: &mut SimulatedBus) {
        bus.push(CanFrame::new(FrameId::Rsp.as_u32(), &[0x00, 0x00, 0x01]));
    }

    /// L <= 8: exactly one SREC frame, expecting `srec_end_ok` (property 7).
    #[test]
    fn fragmentation_short_record_sends_a_single_end_fragment() {
        let mut session = harness();
        push_srec_end_ok(session.bus_mut());
        let mut module = ModuleController::new(&mut session, 0x01020304);
        let record = [0xAAu8; 5];
        module.send_record_fragments(&record).unwrap();

        let sent: Vec<_> = session
            .bus_mut()
            .sent
            .iter()
            .filter(|f| f.frame_id() == Some(FrameId::Srec))
            .collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data(), &record);
    }

    /// 8 < L <= 16: one start fragment, one end fragment, no middles.
    #[test]
    fn fragmentation_medium_record_sends_start_then_end() {
        let mut session = harness();
        push_srec_start_ok(session.bus_mut());
        push_srec_end_ok(session.bus_mut());
        let mut module = ModuleController::new(&mut session, 0x01020304);
        let record = [0xBBu8; 12];
        module.send_record_fragments(&record).unwrap();

        let sent: Vec<_> = session
            .bus_mut()
            .sent
            .iter()
            .filter(|f| f.frame_id() == Some(FrameId::Srec))
            .collect();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].data(), &record[..8]);
        assert_eq!(sent[1].data(), &record[8..]);
    }

    /// L > 16: one start, one or more middle fragments, one end fragment.
    #[test]
    fn fragmentation_long_record_sends_start_middle_end() {
        let mut session = harness();
        push_srec_start_ok(session.bus_mut());
        push_srec_cont_ok(session.bus_mut());
        push_srec_end_ok(session.bus_mut());
        let mut module = ModuleController::new(&mut session, 0x01020304);
        let record = [0xCCu8; 20];
        module.send_record_fragments(&record).unwrap();

        let sent: Vec<_> = session
            .bus_mut()
            .sent
            .iter()
            .filter(|f| f.frame_id() == Some(FrameId::Srec))
            .collect();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].data(), &record[..8]);
        assert_eq!(sent[1].data(), &record[8..16]);
        assert_eq!(sent[2].data(), &record[16..]);
    }

    /// A middle fragment that gets back the wrong response is a protocol
    /// violation, not silently accepted.
    #[test]
    fn fragmentation_rejects_wrong_response_kind() {
        let mut session = harness();
        push_srec_start_ok(session.bus_mut());
        // Wrong: module replies srec_end_ok where srec_cont_ok is expected.
        push_srec_end_ok(session.bus_mut());
        let mut module = ModuleController::new(&mut session, 0x01020304);
        let record = [0xDDu8; 20];
        assert!(module.send_record_fragments(&record).is_err());
    }
}
