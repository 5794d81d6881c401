//! Fault capture firmware - Main Entry Point
//!
//! Hardware-only entry point for STM32H743ZI. Follows
//! `firmware::boot::BOOT_SEQUENCE_STEPS`.

#![no_std]
#![no_main]

use core::fmt::Write as _;

use embassy_executor::Spawner;
use embassy_stm32::flash::{Blocking, Flash};
use embassy_stm32::peripherals::{DMA1_CH0, DMA1_CH1, USART3};
use embassy_stm32::usart::{self, Uart};
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_time::{Duration, Ticker};
use platform::{MillisClock, ResetCauseRegister, ResetFlags, WatchdogClientId};
use static_cell::StaticCell;

use firmware::boot;
use firmware::fault::command::{execute, CommandError, CommandOutcome, FaultCommand, OperatorContext};
use firmware::fault::{FaultRegion, PanicConfig, PanicController, PanicParts, PanicSlot};
use firmware::hal::{
    self, BoardController, CortexMCpu, EmbassyClock, EmbassyIwdg, Iwdg, PanicUart, RccResetCause,
    StackRam, BOARD_RECORDER_BYTES, FLIGHT_RECORDER, PANIC_SLOT,
};
use firmware::{ResetReasonCache, StackWatermark, Supervisor, SupervisorConfig};

// RTT transport + panic handler. panic-probe ends in `udf`, which the
// HardFault trampoline turns into a recorded processor exception.
use defmt_rtt as _;
use panic_probe as _;

bind_interrupts!(struct Irqs {
    USART3 => usart::InterruptHandler<peripherals::USART3>;
});

type ConsoleUart = Uart<'static, USART3, DMA1_CH0, DMA1_CH1>;

static CONTROLLER: StaticCell<BoardController> = StaticCell::new();

/// Supervised activities.
const SUPERVISED_CLIENTS: usize = 2;
const MAIN_LOOP: WatchdogClientId = WatchdogClientId(0);
const MAIN_LOOP_PERIOD_MS: u32 = 1_000;

const CONSOLE_LINE_BYTES: usize = 80;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // Step 1: latch the reset reason before anything else can reset us.
    let mut reset_reason = ResetReasonCache::new();
    let reset_flags = reset_reason.get(&mut RccResetCause);

    // Step 2: arm the guard below the stack.
    let Some(stack) = hal::linker_stack_bounds() else {
        defmt::error!("linker stack symbols out of range");
        cortex_m::peripheral::SCB::sys_reset();
    };
    let watermark = StackWatermark::new(stack);
    if let Err(e) = boot::hardware::apply_stack_guard_from_peripherals(stack) {
        defmt::error!("stack guard not armed: {}", e);
    }

    // Step 3: clocks.
    let p = embassy_stm32::init(boot::build_embassy_config());
    defmt::info!("Fault capture firmware v{=str}", env!("CARGO_PKG_VERSION"));
    defmt::info!("RSR at power on: 0x{=u32:08x}", reset_flags.0);
    for name in reset_flags.names() {
        defmt::info!("  {=str} reset", name);
    }

    // Step 4: panic controller.
    let config = PanicConfig::board_default();
    let parts = PanicParts {
        cpu: CortexMCpu,
        watchdog: Iwdg,
        recorder: &FLIGHT_RECORDER,
        clock: EmbassyClock,
        console: PanicUart,
    };
    let controller = CONTROLLER.init(PanicController::new(parts, hal::steal_panic_flash(), config));
    if PANIC_SLOT.install(controller).is_err() {
        defmt::error!("panic slot already armed");
    }

    // Step 5: supervisor, then the hardware watchdog.
    let clock = EmbassyClock;
    let sup_config = SupervisorConfig::board_default();
    let mut supervisor: Supervisor<&'static PanicSlot<BoardController>, SUPERVISED_CLIENTS> =
        match Supervisor::new(sup_config) {
            Ok(supervisor) => supervisor,
            Err(e) => {
                defmt::error!("supervisor config rejected: {}", e);
                cortex_m::peripheral::SCB::sys_reset();
            }
        };
    supervisor.register_trigger_handler(&PANIC_SLOT);
    if let Err(e) = supervisor.register(MAIN_LOOP, MAIN_LOOP_PERIOD_MS, clock.milliseconds_since_boot()) {
        defmt::error!("main loop not supervised: {}", e);
    }

    let mut iwdg = EmbassyIwdg(IndependentWatchdog::new(
        p.IWDG1,
        boot::iwdg_timeout_us(&sup_config),
    ));
    iwdg.0.unleash(); // cannot be stopped after this point
    defmt::info!(
        "IWDG armed: timeout={=u32}ms, checks every {=u32}ms",
        sup_config.hardware_timeout_ms,
        sup_config.check_period_ms
    );

    // Operator path: the panic region as left by the previous run.
    let mut region = FaultRegion::new(Flash::new_blocking(p.FLASH), &config.store);
    match region.read_record() {
        Ok(Some(record)) => defmt::warn!(
            "Stored fault: type={=u32} ({=str}) param={=u32} at {=u32}ms",
            record.fault_kind.as_u32(),
            record.fault_kind.name(),
            record.fault_param,
            record.timestamp_ms
        ),
        Ok(None) => defmt::info!("No stored fault"),
        Err(e) => defmt::warn!("Panic region unreadable: {}", defmt::Display2Format(&e)),
    }

    match Uart::new(
        p.USART3,
        p.PD9, // RX
        p.PD8, // TX
        Irqs,
        p.DMA1_CH0,
        p.DMA1_CH1,
        usart::Config::default(),
    ) {
        Ok(uart) => {
            if let Err(e) = spawner.spawn(console_task(uart, region, watermark, reset_flags)) {
                defmt::error!("console task not spawned: {}", e);
            }
        }
        Err(e) => defmt::error!("USART3 config rejected: {}", e),
    }

    FLIGHT_RECORDER.record(b"boot\n");

    // Step 6: paint the free stack.
    watermark.paint(&mut StackRam);

    // Step 7: supervisor loop.
    defmt::info!("Entering main loop");
    let mut ticker = Ticker::every(Duration::from_millis(u64::from(sup_config.check_period_ms)));
    loop {
        ticker.next().await;
        let now = clock.milliseconds_since_boot();
        if let Err(e) = supervisor.feed(MAIN_LOOP, now) {
            defmt::error!("main loop feed rejected: {}", e);
        }
        // Diverges into the panic controller if a client starved.
        let _ = supervisor.run(now, &mut iwdg);
    }
}

/// Line-oriented operator console on USART3.
#[embassy_executor::task]
async fn console_task(
    mut uart: ConsoleUart,
    mut region: FaultRegion<Flash<'static, Blocking>>,
    watermark: StackWatermark,
    reset_flags: ResetFlags,
) {
    let mut rx = [0u8; 32];
    let mut line: heapless::Vec<u8, CONSOLE_LINE_BYTES> = heapless::Vec::new();
    loop {
        let Ok(n) = uart.read_until_idle(&mut rx).await else {
            line.clear();
            continue;
        };
        for &byte in rx.get(..n).unwrap_or(&[]) {
            if byte != b'\r' && byte != b'\n' {
                if line.push(byte).is_err() {
                    line.clear();
                }
                continue;
            }
            let mut ctx = OperatorContext {
                region: &mut region,
                watermark: &watermark,
                stack_memory: &StackRam,
                reset_flags,
                live_reset_raw: RccResetCause.read_raw(),
                recorder_len: BOARD_RECORDER_BYTES,
            };
            run_line(&line, &mut ctx, &mut uart);
            line.clear();
        }
    }
}

fn run_line(
    line: &[u8],
    ctx: &mut OperatorContext<'_, Flash<'static, Blocking>, StackRam>,
    uart: &mut ConsoleUart,
) {
    let Ok(text) = core::str::from_utf8(line) else {
        return;
    };
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    FLIGHT_RECORDER.record(text.as_bytes());
    FLIGHT_RECORDER.record(b"\n");

    let mut out = ConsoleOut(uart);
    let outcome = FaultCommand::parse(text).and_then(|command| execute(command, ctx, &mut out));
    match outcome {
        Ok(CommandOutcome::Done) | Err(CommandError::NotFaultCommand) => {}
        Ok(CommandOutcome::Trigger(test)) => {
            let _ = writeln!(out, "Triggering fault test");
            hal::run_fault_test(test)
        }
        Err(e) => {
            let _ = writeln!(out, "{e}");
        }
    }
}

/// `core::fmt::Write` over the console UART, with CRLF line endings.
struct ConsoleOut<'a>(&'a mut ConsoleUart);

impl ConsoleOut<'_> {
    fn put(&mut self, bytes: &[u8]) -> core::fmt::Result {
        self.0.blocking_write(bytes).map_err(|_| core::fmt::Error)
    }
}

impl core::fmt::Write for ConsoleOut<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let mut pieces = s.split('\n');
        if let Some(first) = pieces.next() {
            self.put(first.as_bytes())?;
        }
        for piece in pieces {
            self.put(b"\r\n")?;
            self.put(piece.as_bytes())?;
        }
        Ok(())
    }
}
