//! Fixed-layout message kinds for the bootloader protocol.
//!
//! Every kind here is a distinct type with a dedicated `to_frame`/`parse`
//! pair rather than a format-string descriptor: `TxMessage` captures the
//! host-to-module direction, `RxMessage` the module-to-host direction. Both
//! enforce the checks from §4.2 in the order specified: id, then length,
//! then filter fields.

use crate::error::MessageError;
use crate::frame::{CanFrame, FrameId};

/// A message the host can send to the module.
pub trait TxMessage {
    /// The arbitration ID this message is sent on.
    const FRAME_ID: FrameId;

    /// Serializes the fixed-layout payload (always ≤ 8 bytes).
    fn payload(&self) -> Vec<u8>;

    fn to_frame(&self) -> CanFrame {
        CanFrame::new(Self::FRAME_ID.as_u32(), &self.payload())
    }
}

/// A message the host expects to receive from the module.
pub trait RxMessage: Sized {
    /// Name used in error messages (`"selected"`, `"eeprom_open"`, ...).
    const NAME: &'static str;
    /// The arbitration ID this message must arrive on.
    const FRAME_ID: FrameId;
    /// The exact payload length this message requires.
    const LEN: usize;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError>;
}

/// Checks id and length; every `RxMessage::parse` starts with this.
fn check_frame<T: RxMessage>(frame: &CanFrame) -> Result<(), MessageError> {
    if frame.id() != T::FRAME_ID.as_u32() {
        return Err(MessageError::WrongId {
            expected: T::FRAME_ID.as_u32(),
            actual: frame.id(),
        });
    }
    if frame.dlc() != T::LEN {
        return Err(MessageError::WrongLength {
            kind: T::NAME,
            expected: T::LEN,
            actual: frame.dlc(),
        });
    }
    Ok(())
}

fn check_field<T: RxMessage>(field: usize, expected: u64, actual: u64) -> Result<(), MessageError> {
    if expected != actual {
        return Err(MessageError::WrongFilterField {
            kind: T::NAME,
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------
// TX messages (CMD_ID unless noted)
// ---------------------------------------------------------------------

/// All-call message, solicits an ACK from every module on the bus.
pub struct Ping;
impl TxMessage for Ping {
    const FRAME_ID: FrameId = FrameId::Cmd;
    fn payload(&self) -> Vec<u8> {
        0x0000u16.to_be_bytes().to_vec()
    }
}

/// Selects a specific module for subsequent non-addressed commands.
pub struct Select {
    pub module_id: u32,
}
impl TxMessage for Select {
    const FRAME_ID: FrameId = FrameId::Cmd;
    fn payload(&self) -> Vec<u8> {
        let mut v = 0x2010u16.to_be_bytes().to_vec();
        v.extend_from_slice(&self.module_id.to_be_bytes());
        v
    }
}

/// Requests up to 8 bytes of EEPROM data starting at `address`.
pub struct ReadEeprom {
    pub address: u16,
    pub count: u8,
}
impl TxMessage for ReadEeprom {
    const FRAME_ID: FrameId = FrameId::Cmd;
    fn payload(&self) -> Vec<u8> {
        let mut v = 0x2003u16.to_be_bytes().to_vec();
        v.extend_from_slice(&self.address.to_be_bytes());
        v.push(self.count);
        v
    }
}

/// Enables writing to the EEPROM; carries the fixed unlock sequence.
pub struct WriteEepromEnable;
impl TxMessage for WriteEepromEnable {
    const FRAME_ID: FrameId = FrameId::Cmd;
    fn payload(&self) -> Vec<u8> {
        let mut v = 0x2011u16.to_be_bytes().to_vec();
        v.extend_from_slice(&[0xF3, 0x33, 0xAF]);
        v
    }
}

/// Writes up to 6 bytes of EEPROM data at `address`, sent on EEPROM_ID.
pub struct WriteEepromData<'a> {
    pub address: u16,
    pub data: &'a [u8],
}
impl<'a> TxMessage for WriteEepromData<'a> {
    const FRAME_ID: FrameId = FrameId::Eeprom;
    fn payload(&self) -> Vec<u8> {
        debug_assert!(self.data.len() <= 6);
        let mut v = self.address.to_be_bytes().to_vec();
        v.extend_from_slice(self.data);
        v
    }
}

/// Disables writing to the EEPROM.
pub struct CloseEeprom;
impl TxMessage for CloseEeprom {
    const FRAME_ID: FrameId = FrameId::Cmd;
    fn payload(&self) -> Vec<u8> {
        0x2002u16.to_be_bytes().to_vec()
    }
}

/// Commands the selected module to enter programming mode.
pub struct ProgramCmd;
impl TxMessage for ProgramCmd {
    const FRAME_ID: FrameId = FrameId::Cmd;
    fn payload(&self) -> Vec<u8> {
        0x2000u16.to_be_bytes().to_vec()
    }
}

/// Commands the selected module to erase its flash.
pub struct EraseCmd;
impl TxMessage for EraseCmd {
    const FRAME_ID: FrameId = FrameId::Cmd;
    fn payload(&self) -> Vec<u8> {
        0x0202u16.to_be_bytes().to_vec()
    }
}

/// A fragment of raw S-record bytes, sent on SREC_ID.
pub struct SrecordFragment<'a> {
    pub bytes: &'a [u8],
}
impl<'a> TxMessage for SrecordFragment<'a> {
    const FRAME_ID: FrameId = FrameId::Srec;
    fn payload(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

// ---------------------------------------------------------------------
// RX messages (RSP_ID unless noted)
// ---------------------------------------------------------------------

/// ACK reason codes broadcast by a module on power-up, reset, or crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckReason {
    PowerOn,
    Reset,
    LowVoltage,
    ClockLost,
    AddressError,
    IllegalOpcode,
    Watchdog,
    Unknown(u8),
}

impl AckReason {
    fn from_code(code: u8) -> Self {
        match code {
            0x00 => AckReason::PowerOn,
            0x01 => AckReason::Reset,
            0x11 => AckReason::LowVoltage,
            0x21 => AckReason::ClockLost,
            0x31 => AckReason::AddressError,
            0x41 => AckReason::IllegalOpcode,
            0x51 => AckReason::Watchdog,
            other => AckReason::Unknown(other),
        }
    }

    /// Whether this is the "reboot" marker `_enter_flash_mode` waits for.
    pub fn is_reboot(self) -> bool {
        matches!(self, AckReason::Reset)
    }
}

/// Broadcast message sent by a module on power-up, reset, or crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub reason: AckReason,
    pub module_id: u32,
    pub status_code: u8,
    pub sw_version: u16,
}
impl RxMessage for Ack {
    const NAME: &'static str = "ack";
    const FRAME_ID: FrameId = FrameId::Ack;
    const LEN: usize = 8;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        let d = frame.data();
        Ok(Ack {
            reason: AckReason::from_code(d[0]),
            module_id: u32::from_be_bytes([d[1], d[2], d[3], d[4]]),
            status_code: d[5],
            sw_version: u16::from_be_bytes([d[6], d[7]]),
        })
    }
}

/// Response to `Select` confirming selection.
///
/// `sw_version` is zero if the application is running, non-zero in the
/// bootloader; the core treats it only as an informational signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selected {
    pub module_id: u32,
    pub sw_version: u16,
}
impl RxMessage for Selected {
    const NAME: &'static str = "selected";
    const FRAME_ID: FrameId = FrameId::Rsp;
    const LEN: usize = 8;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        let d = frame.data();
        let opcode = u16::from_be_bytes([d[0], d[1]]);
        check_field::<Self>(0, 0x2110, opcode as u64)?;
        Ok(Selected {
            module_id: u32::from_be_bytes([d[2], d[3], d[4], d[5]]),
            sw_version: u16::from_be_bytes([d[6], d[7]]),
        })
    }
}

/// Response to `WriteEepromEnable`.
pub struct EepromOpen;
impl RxMessage for EepromOpen {
    const NAME: &'static str = "eeprom_open";
    const FRAME_ID: FrameId = FrameId::Rsp;
    const LEN: usize = 5;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        let d = frame.data();
        let opcode = u16::from_be_bytes([d[0], d[1]]);
        check_field::<Self>(0, 0x2111, opcode as u64)?;
        check_field::<Self>(1, 0x010000, u32::from_be_bytes([0, d[2], d[3], d[4]]) as u64)?;
        Ok(EepromOpen)
    }
}

/// Response to `WriteEepromData`.
pub struct EepromWriteOk;
impl RxMessage for EepromWriteOk {
    const NAME: &'static str = "eeprom_write_ok";
    const FRAME_ID: FrameId = FrameId::Rsp;
    const LEN: usize = 5;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        let d = frame.data();
        let opcode = u16::from_be_bytes([d[0], d[1]]);
        check_field::<Self>(0, 0x20E8, opcode as u64)?;
        check_field::<Self>(1, 0x000000, u32::from_be_bytes([0, d[2], d[3], d[4]]) as u64)?;
        Ok(EepromWriteOk)
    }
}

/// Response to `CloseEeprom`.
pub struct EepromClosed;
impl RxMessage for EepromClosed {
    const NAME: &'static str = "eeprom_closed";
    const FRAME_ID: FrameId = FrameId::Rsp;
    const LEN: usize = 5;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        let d = frame.data();
        let opcode = u16::from_be_bytes([d[0], d[1]]);
        check_field::<Self>(0, 0x20F0, opcode as u64)?;
        check_field::<Self>(1, 0x020000, u32::from_be_bytes([0, d[2], d[3], d[4]]) as u64)?;
        Ok(EepromClosed)
    }
}

/// Response sent to `ProgramCmd` when the application was running; the
/// module reboots into the bootloader after sending this.
pub struct ProgramNak {
    pub module_id: u32,
}
impl RxMessage for ProgramNak {
    const NAME: &'static str = "program_nak";
    const FRAME_ID: FrameId = FrameId::Rsp;
    const LEN: usize = 8;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        let d = frame.data();
        let opcode = u16::from_be_bytes([d[0], d[1]]);
        check_field::<Self>(0, 0x2FFF, opcode as u64)?;
        Ok(ProgramNak {
            module_id: u32::from_be_bytes([d[2], d[3], d[4], d[5]]),
        })
    }
}

/// Response sent to `ProgramCmd` when the bootloader is already running.
pub struct ProgramAck {
    pub module_id: u32,
}
impl RxMessage for ProgramAck {
    const NAME: &'static str = "program_ack";
    const FRAME_ID: FrameId = FrameId::Rsp;
    const LEN: usize = 8;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        let d = frame.data();
        let opcode = u16::from_be_bytes([d[0], d[1]]);
        check_field::<Self>(0, 0x2100, opcode as u64)?;
        Ok(ProgramAck {
            module_id: u32::from_be_bytes([d[2], d[3], d[4], d[5]]),
        })
    }
}

/// One frame of the erase progress stream: `progress` counts from 0 toward
/// `limit - 1`.
pub struct Progress {
    pub progress: u8,
    pub limit: u8,
}
impl RxMessage for Progress {
    const NAME: &'static str = "progress";
    const FRAME_ID: FrameId = FrameId::Rsp;
    const LEN: usize = 4;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        let d = frame.data();
        check_field::<Self>(0, 0, d[0] as u64)?;
        check_field::<Self>(3, 0, d[3] as u64)?;
        Ok(Progress {
            progress: d[1],
            limit: d[2],
        })
    }
}

/// Terminal message of the erase stream: opcode `0x0000` (bytes 0-1), then
/// a trailing byte at index 2 that must be 0 or 0xFF (the membership check
/// authoritative per the resolved open question), then `d[3] == 0x01`.
pub struct EraseDone;
impl RxMessage for EraseDone {
    const NAME: &'static str = "erase_done";
    const FRAME_ID: FrameId = FrameId::Rsp;
    const LEN: usize = 4;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        let d = frame.data();
        let opcode = u16::from_be_bytes([d[0], d[1]]);
        check_field::<Self>(0, 0x0000, opcode as u64)?;
        if d[2] != 0x00 && d[2] != 0xFF {
            return Err(MessageError::WrongFilterField {
                kind: Self::NAME,
                field: 2,
                expected: 0,
                actual: d[2] as u64,
            });
        }
        check_field::<Self>(3, 0x01, d[3] as u64)?;
        Ok(EraseDone)
    }
}

/// Sent in response to the first fragment of a multi-fragment S-record.
pub struct SrecStartOk;
impl RxMessage for SrecStartOk {
    const NAME: &'static str = "srec_start_ok";
    const FRAME_ID: FrameId = FrameId::Rsp;
    const LEN: usize = 5;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        const EXPECT: [u8; 5] = [0x00, 0x01, 0x01, 0x01, 0x01];
        if frame.data() != EXPECT {
            return Err(mismatch::<Self>(frame.data(), &EXPECT));
        }
        Ok(SrecStartOk)
    }
}

/// Sent in response to an internal (middle) fragment of an S-record.
pub struct SrecContOk;
impl RxMessage for SrecContOk {
    const NAME: &'static str = "srec_cont_ok";
    const FRAME_ID: FrameId = FrameId::Rsp;
    const LEN: usize = 2;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        const EXPECT: [u8; 2] = [0x00, 0x01];
        if frame.data() != EXPECT {
            return Err(mismatch::<Self>(frame.data(), &EXPECT));
        }
        Ok(SrecContOk)
    }
}

/// Sent in response to the final fragment of an S-record.
pub struct SrecEndOk;
impl RxMessage for SrecEndOk {
    const NAME: &'static str = "srec_end_ok";
    const FRAME_ID: FrameId = FrameId::Rsp;
    const LEN: usize = 3;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        const EXPECT: [u8; 3] = [0x00, 0x00, 0x01];
        if frame.data() != EXPECT {
            return Err(mismatch::<Self>(frame.data(), &EXPECT));
        }
        Ok(SrecEndOk)
    }
}

/// Sent in response to the terminal S-record.
pub struct SrecordsDone;
impl RxMessage for SrecordsDone {
    const NAME: &'static str = "srecords_done";
    const FRAME_ID: FrameId = FrameId::Rsp;
    const LEN: usize = 3;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        const EXPECT: [u8; 3] = [0x00, 0x12, 0x34];
        if frame.data() != EXPECT {
            return Err(mismatch::<Self>(frame.data(), &EXPECT));
        }
        Ok(SrecordsDone)
    }
}

/// Sent instead of `SrecordsDone` if the ROM rejects the uploaded image.
pub struct NoProgram;
impl RxMessage for NoProgram {
    const NAME: &'static str = "no_program";
    const FRAME_ID: FrameId = FrameId::Rsp;
    const LEN: usize = 5;

    fn parse(frame: &CanFrame) -> Result<Self, MessageError> {
        check_frame::<Self>(frame)?;
        const EXPECT: [u8; 5] = [0x00, 0x02, 0x02, 0x02, 0x02];
        if frame.data() != EXPECT {
            return Err(mismatch::<Self>(frame.data(), &EXPECT));
        }
        Ok(NoProgram)
    }
}

/// Helper for the `s` (byte-string) filter fields: compares the whole
/// payload against an expected constant and reports the first byte that
/// differs.
fn mismatch<T: RxMessage>(actual: &[u8], expected: &[u8]) -> MessageError {
    let field = actual
        .iter()
        .zip(expected)
        .position(|(a, e)| a != e)
        .unwrap_or(0);
    MessageError::WrongFilterField {
        kind: T::NAME,
        field,
        expected: expected[field] as u64,
        actual: actual[field] as u64,
    }
}
