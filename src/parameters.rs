//! The static EEPROM parameter table (C6).
//!
//! Mirrors the teacher's per-parameter metadata (name, encoding, access)
//! but, per the design notes, as one data-driven table rather than a
//! macro-generated type per field — the 30-odd records here are homogeneous
//! enough that a table is the simpler, more honest model of "this is a
//! constant layout", and it's what lets `offset_of`/`parameter` stay a
//! couple of lines each.

/// How a parameter's bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    U8,
    U16,
    U32,
    /// Fixed-width ASCII, right-padded with NUL on write.
    FixedStr(usize),
}

impl Encoding {
    pub const fn width(self) -> usize {
        match self {
            Encoding::U8 => 1,
            Encoding::U16 => 2,
            Encoding::U32 => 4,
            Encoding::FixedStr(n) => n,
        }
    }
}

/// One record of the EEPROM layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterField {
    pub name: &'static str,
    pub encoding: Encoding,
    pub writable: bool,
}

const fn field(name: &'static str, encoding: Encoding) -> ParameterField {
    ParameterField {
        name,
        encoding,
        writable: false,
    }
}

const fn writable(name: &'static str, encoding: Encoding) -> ParameterField {
    ParameterField {
        name,
        encoding,
        writable: true,
    }
}

/// Constant tagging a valid EEPROM, stored at offset 2.
pub const PARAMETER_MAGIC: u16 = 1331;

/// The EEPROM layout, in on-module order. Offsets are the running sum of
/// widths of everything before a field (see [`offset_of`]).
///
/// Names beginning with `_` are hidden from [`crate::parameters::visible_names`].
pub const PARAMETER_MAP: &[ParameterField] = &[
    field("_Reserved0", Encoding::U16),
    field("_ParameterMagic", Encoding::U16),
    field("SerialNumber", Encoding::U32),
    field("PartNumber", Encoding::FixedStr(12)),
    field("DrawingNumber", Encoding::FixedStr(12)),
    field("Name", Encoding::FixedStr(20)),
    field("OrderNumber", Encoding::FixedStr(8)),
    field("TestDate", Encoding::FixedStr(8)),
    field("HardwareVersion", Encoding::U16),
    field("ResetCounter", Encoding::U8),
    field("LibraryVersion", Encoding::U16),
    field("ResetReasonLVD", Encoding::U8),
    field("ResetReasonLOC", Encoding::U8),
    field("ResetReasonILAD", Encoding::U8),
    field("ResetReasonILOP", Encoding::U8),
    field("ResetReasonCOP", Encoding::U8),
    field("MCUType", Encoding::U8),
    field("HardwareCANActive", Encoding::U8),
    field("_Reserved1_0", Encoding::U8),
    field("_Reserved1_1", Encoding::U8),
    field("_Reserved1_2", Encoding::U8),
    field("BootloaderVersion", Encoding::U16),
    field("ProgramState", Encoding::U16),
    field("Portbyte1", Encoding::U16),
    field("Portbyte2", Encoding::U16),
    writable("BaudrateBootloader1", Encoding::U16),
    field("BaudrateBootloader2", Encoding::U16),
    field("BootloaderIDExt1", Encoding::U8),
    field("BootloaderID1", Encoding::U32),
    field("BootloaderIDCRC1", Encoding::U8),
    field("BootloaderIDExt2", Encoding::U8),
    field("BootloaderID2", Encoding::U32),
    field("BootloaderIDCRC2", Encoding::U8),
    writable("SoftwareVersion", Encoding::FixedStr(20)),
    writable("ModuleName", Encoding::FixedStr(30)),
    field("BootloaderCANBus", Encoding::U8),
    field("COPWatchdogTimeout", Encoding::U16),
    field("_Reserved2_0", Encoding::U8),
    field("_Reserved2_1", Encoding::U8),
    field("_Reserved2_2", Encoding::U8),
    field("_Reserved2_3", Encoding::U8),
    field("_Reserved2_4", Encoding::U8),
    field("_Reserved2_5", Encoding::U8),
    field("_Reserved2_6", Encoding::U8),
];

/// Looks up a parameter's `(offset, field)` by name.
///
/// Returns `None` for any name not present in [`PARAMETER_MAP`].
pub fn lookup(name: &str) -> Option<(usize, ParameterField)> {
    let mut offset = 0;
    for f in PARAMETER_MAP {
        if f.name == name {
            return Some((offset, *f));
        }
        offset += f.encoding.width();
    }
    None
}

/// Names visible to users (hidden names, beginning with `_`, are omitted).
pub fn visible_names() -> impl Iterator<Item = &'static str> {
    PARAMETER_MAP
        .iter()
        .map(|f| f.name)
        .filter(|name| !name.starts_with('_'))
}

/// Encoding table for the `BaudrateBootloader1`/`BaudrateBootloader2`
/// parameters: value in kbit/s to its 2-byte EEPROM code.
pub fn baudrate_code(kbps: u32) -> Option<[u8; 2]> {
    match kbps {
        1000 => Some([0xFE, 0x01]),
        800 => Some([0xFD, 0x02]),
        500 => Some([0xFC, 0x03]),
        250 => Some([0xFB, 0x04]),
        125 => Some([0xFA, 0x05]),
        100 => Some([0xF6, 0x09]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_is_at_offset_two() {
        let (offset, field) = lookup("_ParameterMagic").unwrap();
        assert_eq!(offset, 2);
        assert_eq!(field.encoding, Encoding::U16);
    }

    #[test]
    fn serial_number_is_at_offset_four() {
        let (offset, _) = lookup("SerialNumber").unwrap();
        assert_eq!(offset, 4);
    }

    #[test]
    fn module_name_offset_matches_running_sum() {
        // Reserved0(2) + Magic(2) + SerialNumber(4) + PartNumber(12) +
        // DrawingNumber(12) + Name(20) + OrderNumber(8) + TestDate(8) +
        // HardwareVersion(2) + ResetCounter(1) + LibraryVersion(2) +
        // 5 reset-reason bytes(5) + MCUType(1) + HardwareCANActive(1) +
        // Reserved1(3) + BootloaderVersion(2) + ProgramState(2) +
        // Portbyte1(2) + Portbyte2(2) + BaudrateBootloader1(2) +
        // BaudrateBootloader2(2) + BootloaderIDExt1(1) + BootloaderID1(4) +
        // BootloaderIDCRC1(1) + BootloaderIDExt2(1) + BootloaderID2(4) +
        // BootloaderIDCRC2(1) + SoftwareVersion(20) = 127
        let (offset, field) = lookup("ModuleName").unwrap();
        assert_eq!(offset, 127);
        assert_eq!(field.encoding, Encoding::FixedStr(30));
    }

    #[test]
    fn only_three_parameters_are_writable() {
        let writable: Vec<_> = PARAMETER_MAP
            .iter()
            .filter(|f| f.writable)
            .map(|f| f.name)
            .collect();
        assert_eq!(
            writable,
            vec!["BaudrateBootloader1", "SoftwareVersion", "ModuleName"]
        );
    }

    #[test]
    fn hidden_names_are_excluded_from_visible_list() {
        assert!(!visible_names().any(|n| n.starts_with('_')));
        assert!(visible_names().any(|n| n == "SerialNumber"));
    }

    #[test]
    fn unknown_parameter_is_none() {
        assert!(lookup("NoSuchParameter").is_none());
    }

    #[test]
    fn baudrate_table_matches_spec() {
        assert_eq!(baudrate_code(1000), Some([0xFE, 0x01]));
        assert_eq!(baudrate_code(100), Some([0xF6, 0x09]));
        assert_eq!(baudrate_code(42), None);
    }
}
