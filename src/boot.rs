//! Boot-time bring-up: clock tree, then peripheral clock gates, then pins.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::clocks::config::ClockTreeConfig;
use crate::clocks::flash::{wait_states_for, FlashTiming, Ftfc};
use crate::clocks::pcc::{PeripheralClockController, PeripheralClockGate};
use crate::clocks::{ClockError, ClockTreeController, RESET_CORE_CLOCK, SYSTEM_CLOCKS};
use crate::pins::{MmioPorts, PinError, PinRoute, PinRouter, PortBank};
use crate::regs::{ftfc, pcc, scg, Mmio, RegisterBlock};

/// Attempts at the primary clock tree before falling back.
const PRIMARY_ATTEMPTS: u32 = 2;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Everything a board needs brought up at boot.
pub struct BoardConfig<'a> {
    pub clocks: &'a ClockTreeConfig,
    /// Tried when the primary tree keeps timing out
    pub fallback_clocks: Option<&'a ClockTreeConfig>,
    pub gates: &'a [PeripheralClockGate],
    pub pins: &'a [PinRoute],
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootError {
    Clock(ClockError),
    Pin(PinError),
}

impl From<ClockError> for BootError {
    fn from(err: ClockError) -> Self {
        BootError::Clock(err)
    }
}

impl From<PinError> for BootError {
    fn from(err: PinError) -> Self {
        BootError::Pin(err)
    }
}

/// Which clock tree ended up running.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Primary,
    Fallback,
}

/// Run the whole bring-up sequence against the given hardware.
///
/// A timeout on the primary clock tree is retried once, then the fallback
/// tree is tried. An invalid configuration is returned immediately.
pub fn bring_up<S, F, P, B>(
    board: &BoardConfig<'_>,
    clocks: &mut ClockTreeController<'_, S, F>,
    gates: &mut PeripheralClockController<'_, P>,
    pins: &mut PinRouter<B>,
) -> Result<Profile, BootError>
where
    S: RegisterBlock,
    F: FlashTiming,
    P: RegisterBlock,
    B: PortBank,
{
    let profile = configure_clocks(board, clocks)?;
    gates.apply(board.gates)?;
    pins.apply(gates, board.pins)?;
    Ok(profile)
}

fn configure_clocks<S: RegisterBlock, F: FlashTiming>(
    board: &BoardConfig<'_>,
    clocks: &mut ClockTreeController<'_, S, F>,
) -> Result<Profile, ClockError> {
    let mut attempt = 1;
    let err = loop {
        match clocks.configure(board.clocks) {
            Ok(()) => return Ok(Profile::Primary),
            Err(err) if !err.is_recoverable() => return Err(err),
            Err(err) => {
                warn!("boot: clock tree attempt {} failed: {:?}", attempt, err);
                if attempt >= PRIMARY_ATTEMPTS {
                    break err;
                }
                attempt += 1;
            }
        }
    };

    let Some(fallback) = board.fallback_clocks else {
        return Err(err);
    };
    warn!("boot: using fallback clock tree");
    clocks.configure(fallback)?;
    Ok(Profile::Fallback)
}

/// Bring the S32K148 from reset to the board's clock and pin configuration.
///
/// Runs with interrupts masked. Only the first call does anything. If the
/// board cannot be brought up, the core is dropped to the SIRC safe mode
/// and halted.
pub fn init() {
    cortex_m::interrupt::free(|_| {
        if INITIALIZED.load(Ordering::Relaxed) {
            warn!("boot: init called twice, ignoring");
            return;
        }
        INITIALIZED.store(true, Ordering::Relaxed);

        // SAFETY: fixed S32K148 addresses, used once with interrupts masked
        let (scg_regs, ftfc_regs, pcc_regs, ports) = unsafe {
            (
                Mmio::new(scg::BASE),
                Mmio::new(ftfc::BASE),
                Mmio::new(pcc::BASE),
                MmioPorts::new(),
            )
        };
        let flash = Ftfc::new(ftfc_regs, wait_states_for(RESET_CORE_CLOCK));
        let mut clocks = ClockTreeController::new(scg_regs, flash, &SYSTEM_CLOCKS);
        let mut gates = PeripheralClockController::new(pcc_regs, &SYSTEM_CLOCKS);
        let mut pins = PinRouter::new(ports);

        match bring_up(&crate::board::BOARD, &mut clocks, &mut gates, &mut pins) {
            Ok(profile) => {
                let clocks = SYSTEM_CLOCKS.system_clocks();
                info!(
                    "boot: {:?} profile, core {} Hz, bus {} Hz, slow {} Hz",
                    profile,
                    clocks.core,
                    clocks.bus,
                    clocks.slow
                );
            }
            Err(err) => {
                error!("boot: bring-up failed: {:?}", err);
                if let Err(err) = clocks.enter_safe_mode() {
                    error!("boot: safe mode failed: {:?}", err);
                }
                halt()
            }
        }
    })
}

/// Park the core forever.
pub fn halt() -> ! {
    loop {
        cfg_if::cfg_if! {
            if #[cfg(all(target_arch = "arm", target_os = "none"))] {
                cortex_m::asm::wfi();
            } else {
                core::hint::spin_loop();
            }
        }
    }
}
