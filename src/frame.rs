//! Raw CAN frame representation and the fixed set of arbitration IDs used by
//! the bootloader protocol.

/// The closed set of 29-bit extended arbitration IDs this protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameId {
    /// Module power-on/reset/crash broadcast (RX).
    Ack,
    /// Host to module commands (TX).
    Cmd,
    /// Module to host responses (RX).
    Rsp,
    /// S-record byte stream (TX).
    Srec,
    /// EEPROM read response, variable length (RX).
    Data,
    /// EEPROM write payload (TX).
    Eeprom,
    /// Application console output (RX).
    Console,
}

impl FrameId {
    pub const fn as_u32(self) -> u32 {
        match self {
            FrameId::Ack => 0x1FFF_FFF0,
            FrameId::Cmd => 0x1FFF_FFF1,
            FrameId::Rsp => 0x1FFF_FFF2,
            FrameId::Srec => 0x1FFF_FFF3,
            FrameId::Data => 0x1FFF_FFF4,
            FrameId::Eeprom => 0x1FFF_FFF5,
            FrameId::Console => 0x1FFF_FFFE,
        }
    }

    pub const fn from_u32(id: u32) -> Option<Self> {
        match id {
            0x1FFF_FFF0 => Some(FrameId::Ack),
            0x1FFF_FFF1 => Some(FrameId::Cmd),
            0x1FFF_FFF2 => Some(FrameId::Rsp),
            0x1FFF_FFF3 => Some(FrameId::Srec),
            0x1FFF_FFF4 => Some(FrameId::Data),
            0x1FFF_FFF5 => Some(FrameId::Eeprom),
            0x1FFF_FFFE => Some(FrameId::Console),
            _ => None,
        }
    }
}

/// Frames whose ID the bus adapter is allowed to hand back to the session
/// controller. Everything else (notably our own TX IDs looped back, and any
/// traffic not part of this protocol) is dropped at the bus adapter.
pub const RECEIVE_FILTER: [FrameId; 4] =
    [FrameId::Ack, FrameId::Rsp, FrameId::Data, FrameId::Console];

/// A single CAN frame: a 29-bit arbitration ID and up to 8 data bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    id: u32,
    len: u8,
    data: [u8; 8],
}

impl CanFrame {
    /// Builds a frame from a raw 29-bit id and a payload of at most 8 bytes.
    ///
    /// Panics if `bytes` is longer than 8 bytes: every caller in this crate
    /// constructs payloads from fixed-layout formats that are known at
    /// compile time to fit, so this indicates a programming error rather
    /// than something a caller should recover from.
    pub fn new(id: u32, bytes: &[u8]) -> Self {
        assert!(bytes.len() <= 8, "CAN payload must be at most 8 bytes");
        let mut data = [0u8; 8];
        data[..bytes.len()].copy_from_slice(bytes);
        CanFrame {
            id,
            len: bytes.len() as u8,
            data,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn frame_id(&self) -> Option<FrameId> {
        FrameId::from_u32(self.id)
    }

    pub fn dlc(&self) -> usize {
        self.len as usize
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl std::fmt::Display for CanFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x} [{}]", self.id, self.dlc())?;
        for b in self.data() {
            write!(f, " {b:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_id_round_trips() {
        for id in [
            FrameId::Ack,
            FrameId::Cmd,
            FrameId::Rsp,
            FrameId::Srec,
            FrameId::Data,
            FrameId::Eeprom,
            FrameId::Console,
        ] {
            assert_eq!(FrameId::from_u32(id.as_u32()), Some(id));
        }
    }

    #[test]
    fn unknown_id_is_none() {
        assert_eq!(FrameId::from_u32(0x1234), None);
    }

    #[test]
    #[should_panic]
    fn oversized_payload_panics() {
        CanFrame::new(FrameId::Cmd.as_u32(), &[0u8; 9]);
    }
}
