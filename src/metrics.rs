//! Process-wide counters for the bridge.
//! Read through [`snapshot`]; the control surface reports them in `status`.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

static INBOUND: AtomicU64 = AtomicU64::new(0);
static OUTBOUND: AtomicU64 = AtomicU64::new(0);
static FETCH_FAILURES: AtomicU64 = AtomicU64::new(0);
static COMMAND_FAILURES: AtomicU64 = AtomicU64::new(0);
static CYCLE_FAILURES: AtomicU64 = AtomicU64::new(0);
static CYCLES: AtomicU64 = AtomicU64::new(0);
static FORWARD_FAILURES: AtomicU64 = AtomicU64::new(0);

pub fn add_inbound(n: u64) {
    INBOUND.fetch_add(n, Ordering::Relaxed);
}

pub fn inc_outbound() {
    OUTBOUND.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_fetch_failures() {
    FETCH_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_command_failures() {
    COMMAND_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_cycle_failures() {
    CYCLE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_cycles() {
    CYCLES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_forward_failures() {
    FORWARD_FAILURES.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub inbound: u64,
    pub outbound: u64,
    pub fetch_failures: u64,
    pub command_failures: u64,
    pub cycle_failures: u64,
    pub cycles: u64,
    pub forward_failures: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        inbound: INBOUND.load(Ordering::Relaxed),
        outbound: OUTBOUND.load(Ordering::Relaxed),
        fetch_failures: FETCH_FAILURES.load(Ordering::Relaxed),
        command_failures: COMMAND_FAILURES.load(Ordering::Relaxed),
        cycle_failures: CYCLE_FAILURES.load(Ordering::Relaxed),
        cycles: CYCLES.load(Ordering::Relaxed),
        forward_failures: FORWARD_FAILURES.load(Ordering::Relaxed),
    }
}
