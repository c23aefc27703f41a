//! Counter and meter side by side on one simulated board
//!
//! Runs both subsystems through the report protocol, the way a host
//! talks to the firmware.

use picofreq_driver::prelude::*;
use std::time::Duration;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("picofreq_driver=info")
        .init();

    let mut link = FrequencyService::new(
        SoftwareBoard::new(),
        ServiceConfig::default().with_meter(MeterConfig::for_min_frequency(500.0)),
    );
    link.backend_mut().apply_signal(15, Signal::new(12_345.0, 33.0));
    link.backend_mut().apply_signal(7, Signal::new(800.0, 50.0));

    let mut counter = CounterClient::open(15, &mut link)?;
    let mut meter = MeterClient::open(7, &mut link)?;

    let (hz, duty) = counter.measure(&mut link)?;
    println!("GPIO15 counter: {hz:.2} Hz, {duty:.2} % duty");

    meter.start(&mut link)?;
    link.backend_mut().advance(Duration::from_millis(30));
    let period = meter.read_period_ticks(&mut link)?;
    println!("GPIO7 meter:    {} µs → {:.2} Hz", period.ticks(), period.frequency_hz());

    // GPIO 23 shares slice 3 with GPIO 7.
    match MeterClient::open(23, &mut link) {
        Ok(_) => println!("GPIO23 meter opened (unexpected)"),
        Err(e) => println!("GPIO23 meter refused: {e}"),
    }

    counter.close(&mut link)?;
    meter.close(&mut link)?;
    println!("Registry idle: {}", link.registry().is_idle());
    Ok(())
}
