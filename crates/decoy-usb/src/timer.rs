//! Delay gate and indicator service, driven by a periodic 10 ms tick.
//!
//! A single countdown paces the scripted sequence: any action that must be
//! followed by a quiescent period loads the counter, and the scheduler skips
//! all action processing until it reaches zero. The same tick renders the
//! board indicator.
//!
//! Field ownership: the tick interrupt is the only decrementer of the delay
//! counter and the only writer of the animation state; the foreground loop
//! and request handlers only load the counter and switch modes. The counter
//! is atomic because the decrement in the interrupt races the reload from
//! the loop.

use core::sync::atomic::{AtomicU16, AtomicU8, Ordering};

/// Two board lamps. Implementations drive GPIO lines; tests record calls.
pub trait StatusLamp {
    fn set_red(&mut self, on: bool);
    fn set_green(&mut self, on: bool);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum IndicatorMode {
    /// Slow alternating blink while the device is still working through the
    /// scripted sequence.
    Boot = 0,
    /// Both lamps held on once the sequence has reached its goal.
    Ready = 1,
    /// Dark, with a short decaying flash on every chirp.
    Chirp = 2,
}

/// Ticks per blink phase in `Boot` mode (200 ms at the 10 ms tick).
const BLINK_DIVIDER: u8 = 20;
/// Ticks a chirp flash stays lit.
const CHIRP_TICKS: u8 = 2;

pub struct TickTimer {
    delay: AtomicU16,
    mode: AtomicU8,
    flash: AtomicU8,
    blink_div: AtomicU8,
    blink_on: AtomicU8,
}

impl TickTimer {
    /// Tick period in milliseconds.
    pub const TICK_MS: u16 = 10;

    pub const fn new() -> Self {
        Self {
            delay: AtomicU16::new(0),
            mode: AtomicU8::new(IndicatorMode::Boot as u8),
            flash: AtomicU8::new(0),
            blink_div: AtomicU8::new(0),
            blink_on: AtomicU8::new(0),
        }
    }

    /// Loads the settle countdown, in ticks.
    pub fn delay(&self, ticks: u16) {
        self.delay.store(ticks, Ordering::Relaxed);
    }

    /// Whether the scheduler may process actions this iteration.
    pub fn gate_open(&self) -> bool {
        self.delay.load(Ordering::Relaxed) == 0
    }

    pub fn pending_ticks(&self) -> u16 {
        self.delay.load(Ordering::Relaxed)
    }

    pub fn set_mode(&self, mode: IndicatorMode) {
        self.mode.store(mode as u8, Ordering::Relaxed);
    }

    pub fn mode(&self) -> IndicatorMode {
        match self.mode.load(Ordering::Relaxed) {
            1 => IndicatorMode::Ready,
            2 => IndicatorMode::Chirp,
            _ => IndicatorMode::Boot,
        }
    }

    /// Requests a short indicator flash. Rendered by the next ticks while in
    /// `Chirp` mode; harmless in the other modes.
    pub fn chirp(&self) {
        self.flash.store(CHIRP_TICKS, Ordering::Relaxed);
    }

    /// Advances the countdown and the indicator animation by one tick.
    /// Called from the periodic timer interrupt.
    pub fn tick(&self, lamp: &mut dyn StatusLamp) {
        let _ = self
            .delay
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));

        match self.mode() {
            IndicatorMode::Boot => {
                let div = self.blink_div.load(Ordering::Relaxed);
                if div >= BLINK_DIVIDER {
                    self.blink_div.store(0, Ordering::Relaxed);
                    let on = self.blink_on.load(Ordering::Relaxed) == 0;
                    self.blink_on.store(on as u8, Ordering::Relaxed);
                    lamp.set_red(on);
                    lamp.set_green(!on);
                } else {
                    self.blink_div.store(div + 1, Ordering::Relaxed);
                }
            }
            IndicatorMode::Ready => {
                lamp.set_red(true);
                lamp.set_green(true);
            }
            IndicatorMode::Chirp => {
                let flash = self.flash.load(Ordering::Relaxed);
                if flash == 0 {
                    lamp.set_red(false);
                } else {
                    self.flash.store(flash - 1, Ordering::Relaxed);
                    lamp.set_red(true);
                }
            }
        }
    }
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::new()
    }
}
