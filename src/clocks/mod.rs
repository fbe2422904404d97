use core::cell::Cell;

use critical_section::Mutex;

use self::config::{AsyncDiv, ClockSource, ClockTreeConfig, RunMode, RunModeClockConfig, SourceProgram, CSR_CONTROL};
use self::flash::{wait_states_for, FlashTiming};
use crate::regs::{scg, RegisterBlock};

pub mod config;
pub mod flash;
pub mod pcc;

/// Core clock straight out of reset (FIRC, no division)
pub const RESET_CORE_CLOCK: u32 = 48_000_000;
/// Bus clock straight out of reset
pub const RESET_BUS_CLOCK: u32 = 48_000_000;
/// Slow clock straight out of reset (DIVSLOW resets to /2)
pub const RESET_SLOW_CLOCK: u32 = 24_000_000;

/// Register reads allowed while waiting for a source to become valid or a
/// switch to be confirmed.
pub const DEFAULT_POLL_LIMIT: u32 = 100_000;

/// Process-wide record of the last confirmed clock configuration.
///
/// Only [`ClockTreeController`] writes it: new frequencies once the hardware
/// has confirmed a switch or when they are read back with
/// [`ClockTreeController::update_from_hardware`], and `ready = false` when a
/// configuration is abandoned half way. Until the first switch it holds the
/// reset values and [`is_ready`] is false.
pub static SYSTEM_CLOCKS: ClockState = ClockState::new();

/// Frequencies derived from the core clock source by DIVCORE/DIVBUS/DIVSLOW.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemClocks {
    pub core: u32,
    pub bus: u32,
    pub slow: u32,
}

/// DIV1/DIV2 outputs of each SCG source, `None` when gated or not running.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AsyncClocks {
    div1: [Option<u32>; 4],
    div2: [Option<u32>; 4],
}

impl AsyncClocks {
    pub const NONE: AsyncClocks = AsyncClocks {
        div1: [None; 4],
        div2: [None; 4],
    };

    pub fn div1_of(&self, source: ClockSource) -> Option<u32> {
        self.div1[source.slot()?]
    }

    pub fn div2_of(&self, source: ClockSource) -> Option<u32> {
        self.div2[source.slot()?]
    }

    pub(crate) fn set(&mut self, source: ClockSource, div1: Option<u32>, div2: Option<u32>) {
        if let Some(slot) = source.slot() {
            self.div1[slot] = div1;
            self.div2[slot] = div2;
        }
    }
}

/// Snapshot of the clock tree as last confirmed.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Clocks {
    pub system: SystemClocks,
    /// Source feeding the core
    pub source: ClockSource,
    pub mode: RunMode,
    pub async_clocks: AsyncClocks,
    /// Set once a configured switch has been confirmed by hardware
    pub ready: bool,
}

impl Clocks {
    pub const RESET: Clocks = Clocks {
        system: SystemClocks {
            core: RESET_CORE_CLOCK,
            bus: RESET_BUS_CLOCK,
            slow: RESET_SLOW_CLOCK,
        },
        source: ClockSource::InternalFast,
        mode: RunMode::Run,
        async_clocks: AsyncClocks::NONE,
        ready: false,
    };
}

/// Shared, read-mostly clock record.
///
/// Readers always get a whole [`Clocks`] copy taken inside a critical section,
/// so core/bus/slow can never be observed half-updated.
pub struct ClockState {
    inner: Mutex<Cell<Clocks>>,
}

impl ClockState {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(Clocks::RESET)),
        }
    }

    pub fn clocks(&self) -> Clocks {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    pub fn system_clocks(&self) -> SystemClocks {
        self.clocks().system
    }

    pub fn core_clock(&self) -> u32 {
        self.clocks().system.core
    }

    pub fn bus_clock(&self) -> u32 {
        self.clocks().system.bus
    }

    pub fn slow_clock(&self) -> u32 {
        self.clocks().system.slow
    }

    pub fn async_clocks(&self) -> AsyncClocks {
        self.clocks().async_clocks
    }

    pub fn is_ready(&self) -> bool {
        self.clocks().ready
    }

    fn publish(&self, clocks: Clocks) {
        critical_section::with(|cs| self.inner.borrow(cs).set(clocks));
    }
}

impl Default for ClockState {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only access to [`SYSTEM_CLOCKS`].
pub fn clocks() -> Clocks {
    SYSTEM_CLOCKS.clocks()
}

pub fn core_clock() -> u32 {
    SYSTEM_CLOCKS.core_clock()
}

pub fn bus_clock() -> u32 {
    SYSTEM_CLOCKS.bus_clock()
}

pub fn slow_clock() -> u32 {
    SYSTEM_CLOCKS.slow_clock()
}

pub fn is_ready() -> bool {
    SYSTEM_CLOCKS.is_ready()
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockError {
    /// A source was enabled but never reported valid
    SourceNotReady { source: ClockSource },
    /// The clock control register was written but CSR never reflected it
    SwitchTimeout { requested: ClockSource },
    /// The requested configuration was impossible or conflicting
    InvalidConfig { reason: &'static str },
    /// Peripheral clocks were requested before the clock tree was confirmed
    TreeNotReady,
    /// The flash controller never completed the wait-state command
    FlashTimeout,
}

impl ClockError {
    fn bad_config(reason: &'static str) -> Self {
        Self::InvalidConfig { reason }
    }

    /// Timeouts may clear on a second attempt; a bad configuration never will.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClockError::SourceNotReady { .. } | ClockError::SwitchTimeout { .. } | ClockError::FlashTimeout
        )
    }
}

/// Sources that must not be disabled, because they currently clock the core
/// directly or through the PLL.
#[derive(Clone, Copy)]
struct InUse {
    core: Option<ClockSource>,
    pll_reference: Option<ClockSource>,
}

impl InUse {
    fn contains(&self, source: ClockSource) -> bool {
        self.core == Some(source) || self.pll_reference == Some(source)
    }
}

/// What one `configure` call did to a source.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
enum SourceChange {
    #[default]
    Untouched,
    Dividers,
    Restarted,
}

/// SCG writes made so far by one `configure` call.
#[derive(Default)]
struct Applied {
    sources: [SourceChange; 4],
    switched: bool,
}

impl Applied {
    fn record(&mut self, source: ClockSource, change: SourceChange) {
        if let Some(slot) = source.slot() {
            self.sources[slot] = change;
        }
    }

    fn change(&self, source: ClockSource) -> SourceChange {
        source.slot().map_or(SourceChange::Untouched, |slot| self.sources[slot])
    }

    fn restarted(&self, source: ClockSource) -> bool {
        self.change(source) == SourceChange::Restarted
    }

    fn wrote_anything(&self) -> bool {
        self.switched || self.sources.iter().any(|c| *c != SourceChange::Untouched)
    }
}

/// Source feeding the PLL according to an SPLLCFG word.
fn pll_reference(cfg: u32) -> ClockSource {
    match scg::SPLL_SOURCE.read(cfg) {
        0 => ClockSource::ExternalOscillator,
        _ => ClockSource::InternalFast,
    }
}

/// Drives the SCG from whatever state it is in to a [`ClockTreeConfig`].
///
/// ```text
///  validate ─▶ enable sources ─▶ raise flash ─▶ switch xCCR ─▶ publish ─▶ lower flash
///              (SIRC,FIRC,SOSC,     wait states    poll CSR                 wait states
///               SPLL; poll VLD)
/// ```
///
/// Every wait is bounded by the poll limit. Any failure stops the sequence.
/// The published frequencies only change after a confirmed switch; a failure
/// after the first SCG write clears [`Clocks::ready`] and the async outputs
/// of every source that was touched.
pub struct ClockTreeController<'a, S, F> {
    scg: S,
    flash: F,
    state: &'a ClockState,
    poll_limit: u32,
}

impl<'a, S: RegisterBlock, F: FlashTiming> ClockTreeController<'a, S, F> {
    pub fn new(scg: S, flash: F, state: &'a ClockState) -> Self {
        Self {
            scg,
            flash,
            state,
            poll_limit: DEFAULT_POLL_LIMIT,
        }
    }

    pub fn with_poll_limit(mut self, poll_limit: u32) -> Self {
        self.poll_limit = poll_limit;
        self
    }

    pub fn release(self) -> (S, F) {
        (self.scg, self.flash)
    }

    /// Fall back to the SIRC-only tree. Used when nothing better can be brought up.
    pub fn enter_safe_mode(&mut self) -> Result<(), ClockError> {
        warn!("clocks: entering safe mode");
        self.configure(&ClockTreeConfig::SAFE_MODE)
    }

    pub fn configure(&mut self, tree: &ClockTreeConfig) -> Result<(), ClockError> {
        tree.validate()?;
        let mode = tree.active_mode;
        let mode_cfg = *tree
            .mode_config(mode)
            .ok_or(ClockError::bad_config("active run mode has no clock configuration"))?;
        let target = tree
            .system_clocks(mode)
            .ok_or(ClockError::bad_config("run mode source frequency is unknown"))?;

        let in_use = self.in_use();
        let programs = ClockSource::SOURCES.map(|source| tree.source_program(source));
        self.check_programmable(&programs, in_use)?;

        info!(
            "clocks: {:?} -> core {} Hz, bus {} Hz, slow {} Hz",
            mode_cfg.source,
            target.core,
            target.bus,
            target.slow
        );

        let mut applied = Applied::default();
        if let Err(err) = self.enable_and_switch(&programs, in_use, mode, &mode_cfg, target.core, &mut applied) {
            if applied.wrote_anything() {
                self.mark_unsettled(&applied);
            }
            return Err(err);
        }

        self.state.publish(Clocks {
            system: target,
            source: mode_cfg.source,
            mode,
            async_clocks: tree.async_clocks(),
            ready: true,
        });

        let settled = wait_states_for(target.core);
        if self.flash.wait_states() > settled {
            self.flash.set_wait_states(settled)?;
        }

        // Inactive modes only take effect on a mode transition
        for other in RunMode::ALL {
            if other == mode {
                continue;
            }
            if let Some(cfg) = tree.mode_config(other) {
                self.scg.write(other.control_register(), cfg.ccr_word());
            }
        }

        self.disable_unused(tree);
        Ok(())
    }

    /// Re-derive the published clocks from what the SCG reports, e.g. after
    /// the caller moved the chip into VLPR or HSRUN.
    ///
    /// The oscillator frequency is not visible in the SCG, so undivided source
    /// frequencies come from `tree`. Async outputs are kept only for sources
    /// that report valid.
    pub fn update_from_hardware(&mut self, tree: &ClockTreeConfig) -> Result<Clocks, ClockError> {
        let csr = self.scg.read(scg::CSR);
        let source = ClockSource::from_select_code(scg::SCS.read(csr))
            .ok_or(ClockError::bad_config("core clock source is not a known SCG source"))?;
        let hz = tree
            .source_frequency(source)
            .ok_or(ClockError::bad_config("core clock source is not part of the tree"))?;

        let core = hz / (scg::DIVCORE.read(csr) + 1);
        let system = SystemClocks {
            core,
            bus: core / (scg::DIVBUS.read(csr) + 1),
            slow: core / (scg::DIVSLOW.read(csr) + 1),
        };

        // CSR mirrors the control register of the current run mode
        let previous = self.state.clocks();
        let selected = csr & scg::SWITCH_FIELDS;
        let mode = core::iter::once(previous.mode)
            .chain(RunMode::ALL)
            .find(|m| self.scg.read(m.control_register()) & scg::SWITCH_FIELDS == selected)
            .unwrap_or(previous.mode);

        let mut async_clocks = AsyncClocks::NONE;
        for each in ClockSource::SOURCES {
            let (Some(regs), Some(undivided)) = (each.registers(), tree.source_frequency(each)) else {
                continue;
            };
            if !scg::VLD.is_set(self.scg.read(regs.csr)) {
                continue;
            }
            let div = self.scg.read(regs.div);
            async_clocks.set(
                each,
                AsyncDiv::from_bits(scg::DIV1.read(div)).apply(undivided),
                AsyncDiv::from_bits(scg::DIV2.read(div)).apply(undivided),
            );
        }

        let clocks = Clocks {
            system,
            source,
            mode,
            async_clocks,
            ready: true,
        };
        debug!(
            "clocks: hardware reports {:?} in {:?}, core {} Hz",
            source,
            mode,
            system.core
        );
        self.state.publish(clocks);
        Ok(clocks)
    }

    fn in_use(&self) -> InUse {
        let csr = self.scg.read(scg::CSR);
        let core = ClockSource::from_select_code(scg::SCS.read(csr));
        let pll_reference = match core {
            Some(ClockSource::Pll) => Some(pll_reference(self.scg.read(scg::SPLLCFG))),
            _ => None,
        };
        InUse { core, pll_reference }
    }

    /// Reject plans that would require touching a source we cannot touch,
    /// before anything is written.
    fn check_programmable(&self, programs: &[Option<SourceProgram>; 4], in_use: InUse) -> Result<(), ClockError> {
        for program in programs.iter().flatten() {
            let regs = program.registers;
            let csr = self.scg.read(regs.csr);
            let cfg = self.scg.read(regs.cfg);
            if in_use.contains(program.source) {
                if cfg != program.cfg {
                    return Err(ClockError::bad_config(
                        "cannot reprogram a source that is currently clocking the core",
                    ));
                }
                if csr & CSR_CONTROL != program.csr {
                    return Err(ClockError::bad_config(
                        "cannot change the control flags of a source that is currently clocking the core",
                    ));
                }
            }
            if scg::LK.is_set(csr) && (csr & CSR_CONTROL != program.csr || cfg != program.cfg) {
                return Err(ClockError::bad_config("source control register is locked"));
            }
        }
        Ok(())
    }

    fn enable_and_switch(
        &mut self,
        programs: &[Option<SourceProgram>; 4],
        in_use: InUse,
        mode: RunMode,
        mode_cfg: &RunModeClockConfig,
        target_core: u32,
        applied: &mut Applied,
    ) -> Result<(), ClockError> {
        // SOURCES order puts the PLL after both of its possible references
        for program in programs.iter().flatten() {
            self.enable_source(program, in_use.contains(program.source), applied)?;
        }

        let required = wait_states_for(self.state.core_clock()).max(wait_states_for(target_core));
        if self.flash.wait_states() < required {
            self.flash.set_wait_states(required)?;
        }

        applied.switched = true;
        self.switch(mode, mode_cfg)
    }

    fn enable_source(&mut self, program: &SourceProgram, in_use: bool, applied: &mut Applied) -> Result<(), ClockError> {
        let regs = program.registers;
        let csr = self.scg.read(regs.csr);
        let div = self.scg.read(regs.div);

        if in_use {
            if div != program.div {
                debug!("clocks: {:?} in use, updating dividers only", program.source);
                applied.record(program.source, SourceChange::Dividers);
                self.scg.write(regs.div, program.div);
            }
            return Ok(());
        }

        let reference_restarted = program.source == ClockSource::Pll && applied.restarted(pll_reference(program.cfg));
        let running = scg::EN.is_set(csr) && scg::VLD.is_set(csr);
        if running
            && !reference_restarted
            && csr & CSR_CONTROL == program.csr
            && div == program.div
            && self.scg.read(regs.cfg) == program.cfg
        {
            trace!("clocks: {:?} already running", program.source);
            return Ok(());
        }

        if reference_restarted {
            debug!("clocks: relocking PLL after its reference restarted");
        } else {
            debug!("clocks: enabling {:?}", program.source);
        }
        applied.record(program.source, SourceChange::Restarted);
        self.scg.write(regs.csr, 0);
        self.scg.write(regs.div, program.div);
        self.scg.write(regs.cfg, program.cfg);
        self.scg.write(regs.csr, program.csr);

        if self.poll(|block| scg::VLD.is_set(block.read(regs.csr))) {
            Ok(())
        } else {
            error!("clocks: {:?} never became valid", program.source);
            Err(ClockError::SourceNotReady { source: program.source })
        }
    }

    fn switch(&mut self, mode: RunMode, cfg: &RunModeClockConfig) -> Result<(), ClockError> {
        let word = cfg.ccr_word();
        self.scg.write(mode.control_register(), word);

        let expected = word & scg::SWITCH_FIELDS;
        if self.poll(|block| block.read(scg::CSR) & scg::SWITCH_FIELDS == expected) {
            Ok(())
        } else {
            error!("clocks: switch to {:?} not confirmed", cfg.source);
            Err(ClockError::SwitchTimeout { requested: cfg.source })
        }
    }

    /// Keep core/bus/slow as published, since the core never left its
    /// source, but stop peripherals from being put on anything that was
    /// touched.
    fn mark_unsettled(&self, applied: &Applied) {
        let mut clocks = self.state.clocks();
        clocks.ready = false;
        let pll_reference = pll_reference(self.scg.read(scg::SPLLCFG));
        for source in ClockSource::SOURCES {
            let fed_by_restart = source == ClockSource::Pll && applied.restarted(pll_reference);
            if applied.change(source) != SourceChange::Untouched || fed_by_restart {
                clocks.async_clocks.set(source, None, None);
            }
        }
        warn!("clocks: configuration aborted, tree marked not ready");
        self.state.publish(clocks);
    }

    /// Turn off sources the new tree leaves unconfigured, PLL first since it
    /// may depend on the others.
    fn disable_unused(&mut self, tree: &ClockTreeConfig) {
        let in_use = self.in_use();
        for source in ClockSource::SOURCES.iter().rev().copied() {
            if tree.is_enabled(source) || in_use.contains(source) {
                continue;
            }
            let Some(regs) = source.registers() else {
                continue;
            };
            let csr = self.scg.read(regs.csr);
            if scg::EN.is_set(csr) && !scg::LK.is_set(csr) {
                debug!("clocks: disabling unused {:?}", source);
                self.scg.write(regs.csr, 0);
            }
        }
    }

    fn poll<P: FnMut(&S) -> bool>(&self, mut done: P) -> bool {
        (0..self.poll_limit.max(1)).any(|_| done(&self.scg))
    }
}
