//! `picofreq`: drive frequency measurement sessions on a simulated RP2040.
//!
//! ```text
//! USAGE:
//!   picofreq counter --pin <n> --freq <hz> [--duty <%>]    PIO high/low counter
//!   picofreq meter --pin <n> --freq <hz> [--capture-ms]    Edge-timed period meter
//!   picofreq status                                        Chip resources
//!   picofreq raw <opcode> --pin <n> [--freq <hz>]          Send one report
//! ```
//!
//! Every command runs against a fresh `SoftwareBoard` with the given
//! square wave applied to the pin. Set `RUST_LOG=debug` to follow the
//! resource arbitration.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use picofreq_driver::protocol::{self, command};
use picofreq_driver::{
    chip, CounterClient, CounterConfig, FrequencyService, MeterClient, MeterConfig,
    ServiceConfig, Signal, SoftwareBoard, MAX_FREQ_COUNTERS, MAX_FREQ_METERS, NUM_EDGE_TIMES,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "picofreq", about = "RP2040 frequency measurement CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Args)]
struct SignalArgs {
    /// Pin to measure (GPIO number).
    #[arg(long)]
    pin: u8,
    /// Frequency of the simulated input in Hz. Omit to leave the pin idle.
    #[arg(long)]
    freq: Option<f64>,
    /// Duty cycle of the simulated input in percent.
    #[arg(long, default_value_t = 50.0)]
    duty: f64,
}

#[derive(Subcommand)]
enum Cmd {
    /// Measure high/low time with a PIO counter session.
    Counter {
        #[command(flatten)]
        signal: SignalArgs,
        /// Number of windows to read.
        #[arg(long, default_value_t = 1)]
        samples: u32,
        /// Deadline per window in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Measure the averaged period with an edge-timed meter session.
    Meter {
        #[command(flatten)]
        signal: SignalArgs,
        /// Capture time between start and read in milliseconds.
        #[arg(long)]
        capture_ms: Option<u64>,
    },
    /// Print the chip resources the sessions arbitrate.
    Status,
    /// Send one raw command report and dump the response.
    Raw {
        /// Opcode, decimal or 0x-prefixed hex (e.g. 0xA0).
        opcode: String,
        #[command(flatten)]
        signal: SignalArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Counter {
            signal,
            samples,
            timeout_ms,
        } => cmd_counter(&signal, samples, timeout_ms)?,
        Cmd::Meter { signal, capture_ms } => cmd_meter(&signal, capture_ms)?,
        Cmd::Status => cmd_status(),
        Cmd::Raw { opcode, signal } => cmd_raw(&opcode, &signal)?,
    }

    Ok(())
}

fn board_with(signal: &SignalArgs) -> SoftwareBoard {
    let mut board = SoftwareBoard::new();
    if let Some(hz) = signal.freq {
        board.apply_signal(signal.pin, Signal::new(hz, signal.duty));
    }
    board
}

fn cmd_counter(signal: &SignalArgs, samples: u32, timeout_ms: Option<u64>) -> Result<()> {
    let counter_cfg = match (timeout_ms, signal.freq) {
        (Some(ms), _) => CounterConfig::default().with_measure_timeout(Duration::from_millis(ms)),
        (None, Some(hz)) => CounterConfig::for_min_frequency(hz / 2.0),
        (None, None) => CounterConfig::default(),
    };
    let config = ServiceConfig::default().with_counter(counter_cfg);
    let mut link = FrequencyService::new(board_with(signal), config);

    let mut counter = CounterClient::open(signal.pin, &mut link)
        .with_context(|| format!("opening counter on GPIO{}", signal.pin))?;
    println!("Counter on GPIO{} (clk_sys {} Hz)", signal.pin, counter.sys_clock_hz());

    for n in 1..=samples {
        let counts = counter.measure_counts(&mut link)?;
        println!(
            "  [{n}] high {:>10}  low {:>10}  → {:.3} Hz, {:.2} % duty",
            counts.high_cycles,
            counts.low_cycles,
            counts.frequency_hz(counter.sys_clock_hz()),
            counts.duty_cycle_percent()
        );
    }

    counter.close(&mut link)?;
    Ok(())
}

fn cmd_meter(signal: &SignalArgs, capture_ms: Option<u64>) -> Result<()> {
    let meter_cfg = match signal.freq {
        Some(hz) => MeterConfig::for_min_frequency(hz),
        None => MeterConfig::default(),
    };
    let capture = capture_ms.map_or(meter_cfg.capture_holdoff, Duration::from_millis);
    let config = ServiceConfig::default().with_meter(meter_cfg);
    let mut link = FrequencyService::new(board_with(signal), config);

    let mut meter = MeterClient::open(signal.pin, &mut link)
        .with_context(|| format!("opening meter on GPIO{}", signal.pin))?;
    meter.start(&mut link)?;
    link.backend_mut().advance(capture);

    let period = meter.read_period_ticks(&mut link)?;
    println!(
        "Meter on GPIO{}: {} µs period → {:.3} Hz (capture {:?})",
        signal.pin,
        period.ticks(),
        period.frequency_hz(),
        capture
    );
    let captured = link
        .meters()
        .slot(signal.pin)
        .map_or(0, |s| s.edge_times.captured_len());
    if captured < NUM_EDGE_TIMES {
        println!("  {captured} of {NUM_EDGE_TIMES} edges captured");
    }

    meter.close(&mut link)?;
    Ok(())
}

fn cmd_status() {
    println!("PIO state machines : {}", chip::TOTAL_STATE_MACHINES);
    println!(
        "Counter program    : '{}', {} of {} instruction slots per block",
        chip::FREQ_COUNTER_PROGRAM.name,
        chip::FREQ_COUNTER_PROGRAM.length,
        chip::INSTRUCTION_MEMORY_SIZE
    );
    println!("PWM slices         : {}", chip::NUM_SLICES);
    println!("Counter sessions   : {MAX_FREQ_COUNTERS}");
    println!("Meter sessions     : {MAX_FREQ_METERS} ({NUM_EDGE_TIMES} edges each)");
    println!("clk_sys            : {} Hz", chip::DEFAULT_SYS_CLK_HZ);
    println!("Timer              : {} Hz", chip::TIMER_HZ);
    println!();
    println!("Meter pins (channel B):");
    for slice in 0..u8::try_from(chip::NUM_SLICES).unwrap_or(u8::MAX) {
        let pins: Vec<String> = (0..30u8)
            .filter(|&p| {
                chip::gpio_to_slice(p) == Some(slice)
                    && chip::gpio_to_channel(p) == Some(chip::PwmChannel::B)
            })
            .map(|p| format!("GPIO{p}"))
            .collect();
        println!("  slice {slice}: {}", pins.join(", "));
    }
}

fn cmd_raw(opcode: &str, signal: &SignalArgs) -> Result<()> {
    let op = parse_u8(opcode).with_context(|| format!("invalid opcode '{opcode}'"))?;
    let mut link = FrequencyService::new(board_with(signal), ServiceConfig::default());

    let (status, response) = link.process(&command(op, signal.pin));
    println!("status   : {status:?}");
    println!("response : {}", hex(&response[..11]));
    if status == protocol::CmdStatus::Nok {
        println!("code     : 0x{:02x}", protocol::error_code(&response));
    }
    Ok(())
}

fn parse_u8(text: &str) -> Result<u8> {
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16)?,
        None => text.parse()?,
    };
    Ok(value)
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
