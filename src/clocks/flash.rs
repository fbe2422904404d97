//! Flash wait-state provisioning.
//!
//! Flash reads take a fixed time regardless of the core clock, so the number
//! of extra cycles the core must stall grows with frequency. The controller
//! raises wait states before speeding up and lowers them only after a slower
//! clock is confirmed.

use super::ClockError;
use crate::regs::{ftfc, Mmio};

/// Worst-case flash read access time.
pub const FLASH_ACCESS_TIME_NS: u32 = 40;

/// Largest value the wait-state field can hold.
pub const MAX_WAIT_STATES: u8 = 15;

/// Wait states the flash needs at `frequency_hz`.
///
/// `ceil(f × t_access) - 1` cycles, clamped to [`MAX_WAIT_STATES`]. Never
/// decreases as the frequency grows.
pub const fn wait_states_for(frequency_hz: u32) -> u8 {
    let scaled = frequency_hz as u64 * FLASH_ACCESS_TIME_NS as u64;
    let cycles = scaled.div_ceil(1_000_000_000);
    let wait_states = cycles.saturating_sub(1);
    if wait_states > MAX_WAIT_STATES as u64 {
        MAX_WAIT_STATES
    } else {
        wait_states as u8
    }
}

/// Whatever sets the flash controller's wait states.
pub trait FlashTiming {
    /// Currently programmed wait states.
    fn wait_states(&self) -> u8;

    fn set_wait_states(&mut self, wait_states: u8) -> Result<(), ClockError>;
}

/// Wait states programmed through the FTFC command interface.
pub struct Ftfc {
    regs: Mmio,
    wait_states: u8,
    poll_limit: u32,
}

impl Ftfc {
    /// `reset_wait_states` is what the flash is known to be running with,
    /// e.g. `wait_states_for(RESET_CORE_CLOCK)` straight out of reset.
    pub fn new(regs: Mmio, reset_wait_states: u8) -> Self {
        Self {
            regs,
            wait_states: reset_wait_states,
            poll_limit: super::DEFAULT_POLL_LIMIT,
        }
    }

    pub fn with_poll_limit(mut self, poll_limit: u32) -> Self {
        self.poll_limit = poll_limit;
        self
    }

    fn wait_command_complete(&self) -> Result<(), ClockError> {
        for _ in 0..self.poll_limit.max(1) {
            if self.regs.read8(ftfc::FSTAT) & ftfc::CCIF != 0 {
                return Ok(());
            }
        }
        Err(ClockError::FlashTimeout)
    }
}

impl FlashTiming for Ftfc {
    fn wait_states(&self) -> u8 {
        self.wait_states
    }

    fn set_wait_states(&mut self, wait_states: u8) -> Result<(), ClockError> {
        let wait_states = wait_states.min(MAX_WAIT_STATES);

        // A previous command may still be running
        self.wait_command_complete()?;

        self.regs.write8(ftfc::FCCOB3, wait_states);
        self.regs.write8(ftfc::FCCOB2, 0);
        self.regs.write8(ftfc::FCCOB1, 0);
        self.regs.write8(ftfc::FCCOB0, 0);
        // write-1-to-clear launches the command
        self.regs.write8(ftfc::FSTAT, ftfc::CCIF);

        self.wait_command_complete()?;
        self.wait_states = wait_states;
        debug!("flash: {} wait states", wait_states);
        Ok(())
    }
}
