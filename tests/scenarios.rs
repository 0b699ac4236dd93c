//! End-to-end scenarios against `SimulatedBus`, one per case in the core's
//! testable-properties list (spec §8, S1-S6).

use mrs_flash::bus::SimulatedBus;
use mrs_flash::{
    CanFrame, Config, FrameId, ManualPower, ModuleController, NullProgress, ParameterInput,
    ParameterValue, ProgressSink, SessionController, SrecordSource,
};

fn select_response(module_id: u32) -> CanFrame {
    let mut data = vec![0x21, 0x10];
    data.extend_from_slice(&module_id.to_be_bytes());
    data.extend_from_slice(&[0x00, 0x00]);
    CanFrame::new(FrameId::Rsp.as_u32(), &data)
}

fn program_ack_response(module_id: u32) -> CanFrame {
    let mut data = vec![0x21, 0x00];
    data.extend_from_slice(&module_id.to_be_bytes());
    data.extend_from_slice(&[0x00, 0x00]);
    CanFrame::new(FrameId::Rsp.as_u32(), &data)
}

fn erase_done() -> CanFrame {
    CanFrame::new(FrameId::Rsp.as_u32(), &[0x00, 0x00, 0xFF, 0x01])
}

#[test]
fn s1_detect_returns_the_module_id() {
    let mut bus = SimulatedBus::new();
    bus.push(CanFrame::new(
        FrameId::Ack.as_u32(),
        &[0x00, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00],
    ));
    bus.push(select_response(0x0102_0304));

    let mut sess = SessionController::new(bus, ManualPower, Config::default());
    let id = sess.detect().unwrap();
    assert_eq!(id, 0x0102_0304);
}

#[test]
fn s2_parameter_read_decodes_serial_number() {
    let mut bus = SimulatedBus::new();
    bus.push(select_response(0x0102_0304));
    bus.push(CanFrame::new(FrameId::Data.as_u32(), &[0x01, 0x02, 0x03, 0x04]));

    let mut sess = SessionController::new(bus, ManualPower, Config::default());
    let mut module = ModuleController::new(&mut sess, 0x0102_0304);
    let value = module.parameter("SerialNumber").unwrap();
    assert_eq!(value, ParameterValue::U32(0x0102_0304));
}

#[test]
fn s3_set_module_name_succeeds_with_chunked_writes() {
    let mut bus = SimulatedBus::new();
    bus.push(select_response(0x0102_0304));
    bus.push(CanFrame::new(
        FrameId::Rsp.as_u32(),
        &[0x21, 0x11, 0x01, 0x00, 0x00],
    ));
    for _ in 0..5 {
        bus.push(CanFrame::new(
            FrameId::Rsp.as_u32(),
            &[0x20, 0xE8, 0x00, 0x00, 0x00],
        ));
    }
    bus.push(CanFrame::new(
        FrameId::Rsp.as_u32(),
        &[0x20, 0xF0, 0x02, 0x00, 0x00],
    ));

    let mut sess = SessionController::new(bus, ManualPower, Config::default());
    let mut module = ModuleController::new(&mut sess, 0x0102_0304);
    module
        .set_parameter("ModuleName", ParameterInput::Str("X".to_string()))
        .unwrap();
}

#[test]
fn s4_flash_mode_entry_recovers_from_program_nak() {
    let mut bus = SimulatedBus::new();
    // First select/program: application running, nak, then a reboot ACK.
    bus.push(select_response(0x0102_0304));
    let mut nak = vec![0x2F, 0xFF];
    nak.extend_from_slice(&0x0102_0304u32.to_be_bytes());
    nak.extend_from_slice(&[0x00, 0x00]);
    bus.push(CanFrame::new(FrameId::Rsp.as_u32(), &nak));
    bus.push(CanFrame::new(
        FrameId::Ack.as_u32(),
        &[0x01, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00],
    ));
    // Second select/program: bootloader already running.
    bus.push(select_response(0x0102_0304));
    bus.push(program_ack_response(0x0102_0304));
    // Erase completes immediately with no progress frames.
    bus.push(erase_done());

    let mut sess = SessionController::new(bus, ManualPower, Config::default());
    let mut module = ModuleController::new(&mut sess, 0x0102_0304);
    module.erase(&mut NullProgress).unwrap();
}

#[test]
fn s5_erase_reports_progress_five_times_then_completes() {
    let mut bus = SimulatedBus::new();
    bus.push(select_response(0x0102_0304));
    bus.push(program_ack_response(0x0102_0304));
    for cur in 0..5u8 {
        bus.push(CanFrame::new(
            FrameId::Rsp.as_u32(),
            &[0x00, cur, 0x05, 0x00],
        ));
    }
    bus.push(erase_done());

    struct Counter(u32);
    impl ProgressSink for Counter {
        fn progress(&mut self, _title: &str, _position: u32, _limit: u32) {
            self.0 += 1;
        }
    }

    let mut sess = SessionController::new(bus, ManualPower, Config::default());
    let mut module = ModuleController::new(&mut sess, 0x0102_0304);
    let mut counter = Counter(0);
    module.erase(&mut counter).unwrap();
    assert_eq!(counter.0, 5);
}

struct SingleTerminalRecord;
impl SrecordSource for SingleTerminalRecord {
    fn upload_records(&self) -> Box<dyn Iterator<Item = Vec<u8>> + '_> {
        Box::new(std::iter::once(vec![b'S', b'9', 0x00]))
    }
    fn text_records(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(std::iter::empty())
    }
}

#[test]
fn s6_rejected_image_raises_module_error() {
    let mut bus = SimulatedBus::new();
    bus.push(select_response(0x0102_0304));
    bus.push(program_ack_response(0x0102_0304));
    bus.push(erase_done());
    bus.push(CanFrame::new(
        FrameId::Rsp.as_u32(),
        &[0x00, 0x02, 0x02, 0x02, 0x02],
    ));

    let mut sess = SessionController::new(bus, ManualPower, Config::default());
    let mut module = ModuleController::new(&mut sess, 0x0102_0304);
    let err = module
        .upload(&SingleTerminalRecord, &mut NullProgress)
        .unwrap_err();
    assert!(err.to_string().contains("unexpected response to terminal S-record"));
}
