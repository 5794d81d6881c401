//! End-to-end panic path on the mock board: run with
//! `cargo test -p firmware --test panic_sequence`
// Test file: expect/unwrap/panic/indexing are intentional test mechanisms.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]

mod common;

use common::*;
use firmware::fault::dump::FaultDump;
use firmware::fault::{FaultKind, FlashState, PanicPhase, PanicSlot, RECORD_LEN};
use firmware::{Supervisor, SupervisorConfig};
use platform::cpu::ExceptionFrame;
use platform::mocks::{CpuEvent, MockFlash, MockWatchdog};
use platform::{WatchdogClientId, WatchdogTriggerHandler};

const FRAME_SP: u32 = RAM_BASE + 0x800;
const FRAME: [u32; 8] = [
    0x1111_1111,
    0x2222_2222,
    0x3333_3333,
    0x4444_4444,
    0x0000_0012,
    0x0800_0101,
    0x0800_0200,
    0x0100_0000,
];

#[test]
fn watchdog_timeout_is_recorded_persisted_and_reset() {
    let recorder = recorder_pattern(100);
    let mut p = parts(&recorder, 1234);
    p.cpu.link_register = 0x0800_1235;
    p.cpu.stack_pointer = RAM_BASE + 0xF00;
    let mut c = controller_with(p, MockFlash::new(FLASH_SECTORS), config());

    expect_reset(|| c.on_watchdog_trigger(WatchdogClientId(7)));

    let record = *c.record();
    assert_eq!(record.fault_kind, FaultKind::WatchdogTimeout);
    assert_eq!(record.fault_param, 7);
    assert_eq!(record.timestamp_ms, 1234);
    assert_eq!(record.link_register_at_fault, 0x0800_1235);
    assert_eq!(record.stack_pointer_at_fault, RAM_BASE + 0xF00);
    assert!(record.exception_frame.is_zero());
    assert_eq!(c.phase(), PanicPhase::Resetting);

    let cpu = &c.parts().cpu;
    assert_eq!(
        cpu.events,
        vec![
            CpuEvent::InterruptsDisabled,
            CpuEvent::MpuDisabled,
            CpuEvent::StackSwitched(RAM_END),
            CpuEvent::Reset,
        ]
    );
    assert_eq!(cpu.read_count(), 0, "software entry never reads a frame");
    assert!(!c.parts().recorder.logging_enabled);
    assert!(c.parts().console.contains("Fault type=1 (watchdog) param=7"));

    let dump = FaultDump::parse(region(&c)).unwrap();
    assert_eq!(dump.record, record);
    assert_eq!(dump.recorder, &recorder[..]);
    assert_eq!(dump.total_len, RECORD_LEN + 100 + 8);
}

#[test]
fn watchdog_is_fed_around_erase_and_every_granule() {
    let mut c = controller(&recorder_pattern(100), 10);
    expect_reset(|| c.on_watchdog_trigger(WatchdogClientId(0)));

    // 96 + 100 + 8 = 204 bytes: six full granules plus one padded by finish().
    let flash = c.store().flash();
    assert_eq!(flash.erases, 1);
    assert_eq!(flash.writes, 7);
    assert_eq!(flash.dirty_writes, 0);
    // Entry feed, two around the erase, one per granule.
    assert_eq!(c.parts().watchdog.feeds, 1 + 2 + 7);
}

#[test]
fn processor_exception_captures_the_stacked_frame() {
    let mut p = parts(&recorder_pattern(40), 99);
    p.cpu.active_exception = 3;
    p.cpu.fault_status.cfsr = 0x0000_8200;
    p.cpu.fault_status.bfar = 0x2002_0000;
    p.cpu.poke(FRAME_SP, &FRAME);
    let mut c = controller_with(p, MockFlash::new(FLASH_SECTORS), config());

    expect_reset(|| c.exception_entry(FRAME_SP, 0xFFFF_FFF9));

    let record = *c.record();
    assert_eq!(record.fault_kind, FaultKind::ProcessorException);
    assert_eq!(record.fault_param, 3);
    assert_eq!(record.exception_frame, ExceptionFrame::from_words(FRAME));
    assert_eq!(record.exception_frame.return_address, 0x0800_0200);
    assert_eq!(record.stack_pointer_at_fault, FRAME_SP);
    assert_eq!(record.link_register_at_fault, 0xFFFF_FFF9);
    assert_eq!(record.status.cfsr, 0x0000_8200);
    assert_eq!(record.status.bfar, 0x2002_0000);
    assert_eq!(record.timestamp_ms, 99);

    let cpu = &c.parts().cpu;
    assert_eq!(cpu.read_count(), 1);
    assert_eq!(cpu.switched_stack(), None, "trampoline already switched stacks");
    assert!(cpu.interrupts_disabled());
    assert!(cpu.mpu_disabled());
    assert!(c.parts().console.contains("Fault type=2 (exception) param=3"));

    let dump = FaultDump::parse(region(&c)).unwrap();
    assert_eq!(dump.record.exception_frame, ExceptionFrame::from_words(FRAME));
}

#[test]
fn unreadable_frame_pointers_leave_the_frame_zeroed() {
    for sp in [FRAME_SP + 4, RAM_END - 16, RAM_END, 0, u32::MAX - 7] {
        let mut p = parts(&[], 0);
        p.cpu.poke(FRAME_SP, &FRAME);
        let mut c = controller_with(p, MockFlash::new(FLASH_SECTORS), config());

        expect_reset(|| c.exception_entry(sp, 0xFFFF_FFFD));

        assert!(c.record().exception_frame.is_zero(), "sp {sp:#010x}");
        assert_eq!(c.record().stack_pointer_at_fault, sp);
        assert_eq!(c.parts().cpu.read_count(), 0, "sp {sp:#010x}");
    }
}

#[test]
fn frame_ending_exactly_at_ram_end_is_read() {
    let sp = RAM_END - 32;
    let mut p = parts(&[], 0);
    p.cpu.poke(sp, &FRAME);
    let mut c = controller_with(p, MockFlash::new(FLASH_SECTORS), config());

    expect_reset(|| c.exception_entry(sp, 0xFFFF_FFF9));

    assert_eq!(c.record().exception_frame, ExceptionFrame::from_words(FRAME));
}

#[test]
fn second_fault_leaves_the_first_dump_byte_identical() {
    let mut first = controller(&recorder_pattern(64), 500);
    expect_reset(|| first.on_watchdog_trigger(WatchdogClientId(2)));
    let before = first.store().flash().contents().to_vec();

    let mut flash = MockFlash::new(FLASH_SECTORS);
    flash.preload(0, &before);
    let mut p = parts(&recorder_pattern(300), 9_000);
    p.cpu.active_exception = 4;
    let mut second = controller_with(p, flash, config());

    expect_reset(|| second.exception_entry(0, 0xFFFF_FFF9));

    let flash = second.store().flash();
    assert_eq!(flash.contents(), &before[..]);
    assert_eq!(flash.erases, 0);
    assert_eq!(flash.writes, 0);
    assert_eq!(second.store().state(), FlashState::Preserving);

    let dump = FaultDump::parse(region(&second)).unwrap();
    assert_eq!(dump.record.fault_kind, FaultKind::WatchdogTimeout);
    assert_eq!(dump.record.fault_param, 2);
    assert_eq!(dump.record.timestamp_ms, 500);

    // The console still shows the new fault.
    assert!(second.parts().console.contains("Fault type=2 (exception) param=4"));
}

#[test]
fn erase_failure_is_reported_and_still_resets() {
    let mut flash = MockFlash::new(FLASH_SECTORS);
    flash.fail_erase = true;
    let mut c = controller_with(parts(&recorder_pattern(10), 0), flash, config());

    expect_reset(|| c.on_watchdog_trigger(WatchdogClientId(1)));

    assert_eq!(c.store().state(), FlashState::Failed);
    assert_eq!(c.store().flash().writes, 0);
    assert!(c.parts().console.contains("panic store: flash erase failed: device error"));
    assert_eq!(c.parts().cpu.events.last(), Some(&CpuEvent::Reset));
}

#[test]
fn write_failure_stops_flash_output_but_not_the_sequence() {
    let mut flash = MockFlash::new(FLASH_SECTORS);
    flash.fail_write_at = Some(1);
    let mut c = controller_with(parts(&recorder_pattern(200), 0), flash, config());

    expect_reset(|| c.on_watchdog_trigger(WatchdogClientId(1)));

    assert_eq!(c.store().state(), FlashState::Failed);
    // First granule landed, the second failed, nothing after it was attempted.
    assert_eq!(c.store().flash().writes, 1);
    assert!(c.parts().console.contains("panic store: flash write failed: device error"));
    assert_eq!(c.parts().cpu.events.last(), Some(&CpuEvent::Reset));
}

#[test]
fn oversized_recorder_is_truncated_to_the_region() {
    let recorder = recorder_pattern(3000);
    let mut c = controller(&recorder, 0);

    expect_reset(|| c.on_watchdog_trigger(WatchdogClientId(0)));

    let capacity = REGION_SIZE as usize - RECORD_LEN - 8;
    let dump = FaultDump::parse(region(&c)).unwrap();
    assert_eq!(dump.recorder, &recorder[..capacity]);
    assert_eq!(dump.total_len, REGION_SIZE as usize);
    assert!(!c.parts().console.contains("panic store:"));
}

#[test]
fn console_only_store_never_touches_flash() {
    let mut cfg = config();
    cfg.store.to_flash = false;
    let mut c = controller_with(parts(&recorder_pattern(100), 0), MockFlash::new(FLASH_SECTORS), cfg);

    expect_reset(|| c.on_watchdog_trigger(WatchdogClientId(3)));

    let flash = c.store().flash();
    assert_eq!(flash.erases, 0);
    assert_eq!(flash.writes, 0);
    assert!(flash.contents().iter().all(|b| *b == 0xFF));

    let console = &c.parts().console;
    // 96-byte record, 100 recorder bytes, 8-byte marker at 32 bytes per line.
    let hex_lines = console.lines.iter().filter(|l| l.contains(": ")).count();
    assert_eq!(hex_lines, 3 + 4 + 1);
    assert!(console.contains("00000000: 7ada17fa"));
    assert!(console.contains("000000c4: d0e0d0e000000000"));
}

#[test]
fn flash_only_store_prints_just_the_announcement() {
    let mut cfg = config();
    cfg.store.to_console = false;
    let mut c = controller_with(parts(&recorder_pattern(100), 0), MockFlash::new(FLASH_SECTORS), cfg);

    expect_reset(|| c.on_watchdog_trigger(WatchdogClientId(3)));

    assert_eq!(c.parts().console.lines, vec!["Fault type=1 (watchdog) param=3".to_string()]);
    assert!(FaultDump::parse(region(&c)).is_ok());
}

#[test]
fn supervisor_hands_a_starved_client_to_the_installed_controller() {
    let slot: &'static PanicSlot<MockController> = Box::leak(Box::new(PanicSlot::new()));
    let installed: &'static mut MockController =
        Box::leak(Box::new(controller(&recorder_pattern(16), 0)));
    let observed: *const MockController = installed;
    assert!(slot.install(installed).is_ok());

    let mut supervisor: Supervisor<&'static PanicSlot<MockController>, 2> =
        Supervisor::new(SupervisorConfig::board_default()).unwrap();
    supervisor.register_trigger_handler(slot);
    supervisor.register(WatchdogClientId(1), 50, 0).unwrap();

    let mut hardware = MockWatchdog::new();
    assert_eq!(supervisor.run(40, &mut hardware), None);
    assert_eq!(hardware.feeds, 1);

    expect_reset(|| {
        supervisor.run(100, &mut hardware);
    });

    assert!(!slot.is_armed());
    assert_eq!(hardware.feeds, 1, "starved cycle does not feed the hardware");
    // SAFETY: the controller was leaked above and the slot gave up its only
    // handle when it was taken; nothing else references it now.
    let controller = unsafe { &*observed };
    assert_eq!(controller.record().fault_kind, FaultKind::WatchdogTimeout);
    assert_eq!(controller.record().fault_param, 1);
    assert!(FaultDump::parse(region(controller)).is_ok());
}
