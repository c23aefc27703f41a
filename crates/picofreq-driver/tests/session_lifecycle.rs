//! End-to-end session lifecycles
//!
//! Every scenario goes through `FrequencyService::process` on a simulated
//! board, exactly as commands arrive from a host.

use picofreq_driver::protocol::{self, command, opcode};
use picofreq_driver::{
    CmdStatus, FrequencyService, HardwareBackend, MeterConfig, Report, ServiceConfig, Signal,
    SliceOwner, SoftwareBoard,
};
use std::time::Duration;

fn service() -> FrequencyService<SoftwareBoard> {
    FrequencyService::new(SoftwareBoard::new(), ServiceConfig::default())
}

fn send(svc: &mut FrequencyService<SoftwareBoard>, op: u8, pin: u8) -> (CmdStatus, Report) {
    svc.process(&command(op, pin))
}

#[test]
fn counter_full_lifecycle() {
    let mut svc = service();
    svc.backend_mut().apply_signal(15, Signal::new(50_000.0, 30.0));

    let (status, rsp) = send(&mut svc, opcode::FREQ_COUNTER_INIT, 15);
    assert_eq!(status, CmdStatus::Ok);
    let sys_clk = protocol::word(&rsp, 0);

    let (status, rsp) = send(&mut svc, opcode::FREQ_COUNTER_GET_MEASUREMENT, 15);
    assert_eq!(status, CmdStatus::Ok);
    let (high, low) = (protocol::word(&rsp, 0), protocol::word(&rsp, 1));
    assert_eq!(high + low, 2_500);
    assert_eq!(f64::from(sys_clk) / f64::from(high + low), 50_000.0);
    assert_eq!(high, 750);

    assert_eq!(send(&mut svc, opcode::FREQ_COUNTER_DEINIT, 15).0, CmdStatus::Ok);
    assert!(svc.registry().is_idle());
    assert_eq!(svc.backend().programs_loaded(0), 0);
}

#[test]
fn counter_deinit_unknown_pin_not_found() {
    let mut svc = service();
    let (status, rsp) = send(&mut svc, opcode::FREQ_COUNTER_DEINIT, 3);
    assert_eq!(status, CmdStatus::Nok);
    assert_eq!(protocol::error_code(&rsp), protocol::counter_code::NOT_FOUND);
}

#[test]
fn meter_deinit_unknown_pin_succeeds() {
    let mut svc = service();
    let (status, rsp) = send(&mut svc, opcode::FREQ_METER_DEINIT, 3);
    assert_eq!(status, CmdStatus::Ok);
    assert_eq!(rsp[2], 3);
}

#[test]
fn counter_exhaustion_then_release_one() {
    let mut svc = service();
    for pin in 0..8 {
        assert_eq!(send(&mut svc, opcode::FREQ_COUNTER_INIT, pin).0, CmdStatus::Ok);
    }
    let (status, rsp) = send(&mut svc, opcode::FREQ_COUNTER_INIT, 8);
    assert_eq!(status, CmdStatus::Nok);
    assert_eq!(protocol::error_code(&rsp), protocol::counter_code::RESOURCE_EXHAUSTED);

    send(&mut svc, opcode::FREQ_COUNTER_DEINIT, 5);
    assert_eq!(send(&mut svc, opcode::FREQ_COUNTER_INIT, 8).0, CmdStatus::Ok);
    assert_eq!(send(&mut svc, opcode::FREQ_COUNTER_INIT, 9).0, CmdStatus::Nok);
}

#[test]
fn second_block_used_after_first_fills() {
    let mut svc = service();
    for pin in 0..5 {
        send(&mut svc, opcode::FREQ_COUNTER_INIT, pin);
    }
    assert_eq!(svc.backend().programs_loaded(0), 1);
    assert_eq!(svc.backend().programs_loaded(1), 1);

    send(&mut svc, opcode::FREQ_COUNTER_DEINIT, 4);
    assert_eq!(svc.backend().programs_loaded(1), 0);
}

#[test]
fn meter_start_then_immediate_read_is_invalid() {
    let mut svc = service();
    svc.backend_mut().apply_signal(7, Signal::new(1_000.0, 50.0));
    send(&mut svc, opcode::FREQ_METER_INIT, 7);
    send(&mut svc, opcode::FREQ_METER_START, 7);

    let (status, rsp) = send(&mut svc, opcode::FREQ_METER_GET_PERIOD_TICKS, 7);
    assert_eq!(status, CmdStatus::Nok);
    assert_eq!(protocol::error_code(&rsp), protocol::meter_code::NO_DMA_OR_INVALID);
    assert!(svc.meters().is_active(7), "failed read keeps the session");
}

#[test]
fn meter_restart_measures_new_signal() {
    let mut svc = FrequencyService::new(
        SoftwareBoard::new(),
        ServiceConfig::default().with_meter(MeterConfig::for_min_frequency(500.0)),
    );
    svc.backend_mut().apply_signal(7, Signal::new(1_000.0, 50.0));
    send(&mut svc, opcode::FREQ_METER_INIT, 7);
    send(&mut svc, opcode::FREQ_METER_START, 7);
    svc.backend_mut().advance(Duration::from_millis(30));
    let (_, rsp) = send(&mut svc, opcode::FREQ_METER_GET_PERIOD_TICKS, 7);
    assert_eq!(protocol::word(&rsp, 0), 1_000);

    svc.backend_mut().apply_signal(7, Signal::new(4_000.0, 50.0));
    send(&mut svc, opcode::FREQ_METER_START, 7);
    svc.backend_mut().advance(Duration::from_millis(30));
    let (status, rsp) = send(&mut svc, opcode::FREQ_METER_GET_PERIOD_TICKS, 7);
    assert_eq!(status, CmdStatus::Ok);
    assert_eq!(protocol::word(&rsp, 0), 250);
}

#[test]
fn partial_capture_still_averages() {
    let mut svc = service();
    svc.backend_mut().apply_signal(3, Signal::new(1_000.0, 50.0));
    send(&mut svc, opcode::FREQ_METER_INIT, 3);
    send(&mut svc, opcode::FREQ_METER_START, 3);
    // Four edges: three intervals.
    svc.backend_mut().advance(Duration::from_micros(4_500));

    let (status, rsp) = send(&mut svc, opcode::FREQ_METER_GET_PERIOD_TICKS, 3);
    assert_eq!(status, CmdStatus::Ok);
    assert_eq!(protocol::word(&rsp, 0), 1_000);
}

#[test]
fn capture_across_timer_wrap() {
    let board = SoftwareBoard::new().with_timer_origin(u64::from(u32::MAX) - 3_000);
    let mut svc = FrequencyService::new(board, ServiceConfig::default());
    svc.backend_mut().apply_signal(1, Signal::new(1_000.0, 50.0));
    send(&mut svc, opcode::FREQ_METER_INIT, 1);
    send(&mut svc, opcode::FREQ_METER_START, 1);
    svc.backend_mut().advance(Duration::from_millis(20));

    // The wrapped interval reads as non-increasing and is skipped.
    let (status, rsp) = send(&mut svc, opcode::FREQ_METER_GET_PERIOD_TICKS, 1);
    assert_eq!(status, CmdStatus::Ok);
    assert_eq!(protocol::word(&rsp, 0), 1_000);
}

#[test]
fn meter_and_counter_coexist() {
    let mut svc = service();
    svc.backend_mut().apply_signal(7, Signal::new(1_000.0, 50.0));
    assert_eq!(send(&mut svc, opcode::FREQ_METER_INIT, 7).0, CmdStatus::Ok);
    assert_eq!(send(&mut svc, opcode::FREQ_COUNTER_INIT, 9).0, CmdStatus::Ok);
    assert_eq!(svc.registry().slices.owner(3), Some(SliceOwner::FrequencyMeter));
    assert_eq!(svc.registry().units.claimed_count(), 1);
}

#[test]
fn meter_slice_shared_by_two_pins_conflicts() {
    let mut svc = service();
    send(&mut svc, opcode::FREQ_METER_INIT, 7);
    // GPIO 23 is channel B of slice 3 as well.
    let (status, rsp) = send(&mut svc, opcode::FREQ_METER_INIT, 23);
    assert_eq!(status, CmdStatus::Nok);
    assert_eq!(protocol::error_code(&rsp), protocol::meter_code::BUSY_OR_NOT_FOUND);
    assert!(!svc.meters().is_active(23));
}

#[test]
fn meter_slots_exhaust_at_four() {
    let mut svc = service();
    for pin in [1, 3, 5, 7] {
        assert_eq!(send(&mut svc, opcode::FREQ_METER_INIT, pin).0, CmdStatus::Ok);
    }
    let (status, rsp) = send(&mut svc, opcode::FREQ_METER_INIT, 9);
    assert_eq!(status, CmdStatus::Nok);
    assert_eq!(protocol::error_code(&rsp), protocol::meter_code::NO_SLOT);
}

#[test]
fn dma_exhaustion_leaves_slice_free() {
    let mut svc = service();
    svc.backend_mut().claim_dma_channels(12);
    let (status, rsp) = send(&mut svc, opcode::FREQ_METER_INIT, 7);
    assert_eq!(status, CmdStatus::Nok);
    assert_eq!(protocol::error_code(&rsp), protocol::meter_code::NO_DMA_OR_INVALID);
    assert!(!svc.registry().slices.is_busy(3));
    assert!(!svc.meters().arbiter().is_bound(3));
}

#[test]
fn meter_deinit_restores_pin() {
    let mut svc = service();
    send(&mut svc, opcode::FREQ_METER_INIT, 7);
    let channel = svc.meters().slot(7).map(|s| s.dma_channel).unwrap();
    send(&mut svc, opcode::FREQ_METER_DEINIT, 7);

    assert!(!svc.backend().dma_is_claimed(channel));
    assert!(!svc.backend().pulls_enabled(7));
    assert!(svc.registry().is_idle());
}

#[test]
fn drop_releases_everything() {
    let mut svc = service();
    send(&mut svc, opcode::FREQ_COUNTER_INIT, 2);
    send(&mut svc, opcode::FREQ_METER_INIT, 5);
    svc.shutdown();
    svc.shutdown();
    assert!(svc.registry().is_idle());
    assert_eq!(svc.backend().dma_claimed_count(), 0);
    drop(svc);
}
