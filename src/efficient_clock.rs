//! Timestamp sources for record headers.
//!
//! Records carry a 32 bit timestamp. On hardware this is typically a free
//! running cycle counter divided down; the value wraps and is only meaningful
//! relative to neighbouring records.

use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::_rdtsc;

/// Conversion factor: how many CPU ticks per timestamp unit.
/// Adjust this constant to match your CPU and desired resolution.
pub const TICKS_PER_UNIT: u64 = 30_000;

/// Source of the timestamp stored in each record header.
pub trait Clock: Send + Sync {
    /// Current time in clock units. Wraps at `u32::MAX`.
    fn now(&self) -> u32;
}

/// Clock built on the CPU cycle counter.
///
/// Values are relative to the moment the clock was created, in units of
/// [`TICKS_PER_UNIT`] ticks.
///
/// # Examples
///
/// ```
/// # use ring_recorder::efficient_clock::{Clock, CycleClock};
/// let clock = CycleClock::new();
/// let first = clock.now();
/// let second = clock.now();
/// assert!(second >= first);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CycleClock {
    base: u64,
}

impl CycleClock {
    pub fn new() -> Self {
        Self {
            base: get_timestamp(),
        }
    }
}

impl Default for CycleClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for CycleClock {
    #[inline(always)]
    fn now(&self) -> u32 {
        (get_timestamp().saturating_sub(self.base) / TICKS_PER_UNIT) as u32
    }
}

/// Clock that only moves when told to. Used by tests and by hosts that keep
/// their own tick count.
#[derive(Debug, Default)]
pub struct ManualClock {
    value: AtomicU32,
}

impl ManualClock {
    pub const fn new(start: u32) -> Self {
        Self {
            value: AtomicU32::new(start),
        }
    }

    pub fn set(&self, value: u32) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn advance(&self, by: u32) {
        self.value.fetch_add(by, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u32 {
        self.value.load(Ordering::Relaxed)
    }
}

impl<C: Clock> Clock for std::sync::Arc<C> {
    fn now(&self) -> u32 {
        (**self).now()
    }
}

/// Returns a monotonic timestamp with the highest precision available.
///
/// This function uses architecture-specific instructions when available:
/// - x86_64: RDTSC instruction (CPU time stamp counter)
/// - aarch64: CNTVCT_EL0 register (ARM virtual counter)
/// - Other platforms: System time with nanosecond precision
#[inline(always)]
pub fn get_timestamp() -> u64 {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        _rdtsc()
    }

    #[cfg(target_arch = "aarch64")]
    unsafe {
        let mut value: u64;
        std::arch::asm!("mrs {}, cntvct_el0", out(reg) value);
        value
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}
