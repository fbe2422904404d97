//! Clock tree configuration: which SCG sources run, how they are divided, and
//! which source feeds the core in each run mode.
//!
//! ```text
//!             ┌──────┐ DIV1/DIV2
//!  SIRC 8M ──▶│      │──────────▶ SIRCDIV1/2_CLK
//!  FIRC 48M ─▶│      │──────────▶ FIRCDIV1/2_CLK
//!  SOSC ─────▶│      │──────────▶ SOSCDIV1/2_CLK        ┌──────┐   DIVCORE  core
//!    │        └──────┘                             ┌──▶│ xCCR │──▶ DIVBUS   bus
//!    │  ┌─────────────────┐                        │   │ SCS  │    DIVSLOW  slow
//!    └─▶│ SPLL            │───▶ SPLLDIV1/2_CLK     │   └──────┘
//!  FIRC▶│ ÷PREDIV × MULT  │────────────────────────┘
//!       └─────────────────┘
//! ```

use super::{AsyncClocks, ClockError, SystemClocks};
use crate::regs::scg;

/// An SCG clock source, as selected by the SCS field of a clock control register.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockSource {
    Off,
    /// SIRC, 2 or 8 MHz
    InternalSlow,
    /// FIRC, 48 MHz
    InternalFast,
    /// SOSC, crystal or external clock
    ExternalOscillator,
    /// SPLL
    Pll,
}

/// Register offsets for one source's control/status, divider and configuration registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SourceRegisters {
    pub csr: usize,
    pub div: usize,
    pub cfg: usize,
}

impl ClockSource {
    /// Every real source, in the order they must be brought up. The PLL
    /// depends on one of the others, so it comes last.
    pub const SOURCES: [ClockSource; 4] = [
        ClockSource::InternalSlow,
        ClockSource::InternalFast,
        ClockSource::ExternalOscillator,
        ClockSource::Pll,
    ];

    /// SCS encoding
    pub const fn select_code(self) -> Option<u32> {
        match self {
            ClockSource::Off => None,
            ClockSource::ExternalOscillator => Some(1),
            ClockSource::InternalSlow => Some(2),
            ClockSource::InternalFast => Some(3),
            ClockSource::Pll => Some(6),
        }
    }

    pub const fn from_select_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ClockSource::ExternalOscillator),
            2 => Some(ClockSource::InternalSlow),
            3 => Some(ClockSource::InternalFast),
            6 => Some(ClockSource::Pll),
            _ => None,
        }
    }

    pub(crate) const fn slot(self) -> Option<usize> {
        match self {
            ClockSource::Off => None,
            ClockSource::InternalSlow => Some(0),
            ClockSource::InternalFast => Some(1),
            ClockSource::ExternalOscillator => Some(2),
            ClockSource::Pll => Some(3),
        }
    }

    pub(crate) const fn registers(self) -> Option<SourceRegisters> {
        match self {
            ClockSource::Off => None,
            ClockSource::InternalSlow => Some(SourceRegisters {
                csr: scg::SIRCCSR,
                div: scg::SIRCDIV,
                cfg: scg::SIRCCFG,
            }),
            ClockSource::InternalFast => Some(SourceRegisters {
                csr: scg::FIRCCSR,
                div: scg::FIRCDIV,
                cfg: scg::FIRCCFG,
            }),
            ClockSource::ExternalOscillator => Some(SourceRegisters {
                csr: scg::SOSCCSR,
                div: scg::SOSCDIV,
                cfg: scg::SOSCCFG,
            }),
            ClockSource::Pll => Some(SourceRegisters {
                csr: scg::SPLLCSR,
                div: scg::SPLLDIV,
                cfg: scg::SPLLCFG,
            }),
        }
    }
}

/// Asynchronous peripheral divider (the DIV1/DIV2 outputs of every source).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AsyncDiv {
    Off = 0,
    Div1 = 1,
    Div2 = 2,
    Div4 = 3,
    Div8 = 4,
    Div16 = 5,
    Div32 = 6,
    Div64 = 7,
}

impl AsyncDiv {
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// Decode a DIV1/DIV2 field; only the low three bits are used.
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b111 {
            0 => AsyncDiv::Off,
            1 => AsyncDiv::Div1,
            2 => AsyncDiv::Div2,
            3 => AsyncDiv::Div4,
            4 => AsyncDiv::Div8,
            5 => AsyncDiv::Div16,
            6 => AsyncDiv::Div32,
            _ => AsyncDiv::Div64,
        }
    }

    /// Output frequency for an input of `hz`, or `None` when the output is gated.
    pub const fn apply(self, hz: u32) -> Option<u32> {
        match self {
            AsyncDiv::Off => None,
            div => Some(hz >> (div as u32 - 1)),
        }
    }

    const fn div_word(div1: AsyncDiv, div2: AsyncDiv) -> u32 {
        scg::DIV1.bits(div1.bits()) | scg::DIV2.bits(div2.bits())
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SircRange {
    /// 2 MHz
    Low = 0,
    /// 8 MHz
    High = 1,
}

impl SircRange {
    pub const fn frequency(self) -> u32 {
        match self {
            SircRange::Low => 2_000_000,
            SircRange::High => 8_000_000,
        }
    }
}

/// Slow internal reference clock
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SircConfig {
    pub range: SircRange,
    pub div1: AsyncDiv,
    pub div2: AsyncDiv,
    /// Keep running in stop modes
    pub enable_in_stop: bool,
    /// Keep running in VLPS/VLPR
    pub enable_in_low_power: bool,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FircRange {
    Mhz48 = 0,
}

/// Fast internal reference clock
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FircConfig {
    pub range: FircRange,
    pub div1: AsyncDiv,
    pub div2: AsyncDiv,
}

/// Oscillator frequency range, selecting the internal crystal amplifier settings
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoscRange {
    /// 4 to 8 MHz
    Medium = 2,
    /// 8 to 40 MHz
    High = 3,
}

impl SoscRange {
    pub const fn contains(self, hz: u32) -> bool {
        match self {
            SoscRange::Medium => hz >= 4_000_000 && hz <= 8_000_000,
            SoscRange::High => hz >= 8_000_000 && hz <= 40_000_000,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoscGain {
    Low = 0,
    High = 1,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoscReference {
    /// Clock fed directly into EXTAL
    ExternalClock = 0,
    /// Crystal across EXTAL/XTAL
    Crystal = 1,
}

/// System oscillator
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoscConfig {
    /// Frequency of the attached crystal or clock, in Hz
    pub frequency: u32,
    pub range: SoscRange,
    pub gain: SoscGain,
    pub reference: SoscReference,
    pub div1: AsyncDiv,
    pub div2: AsyncDiv,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PllReference {
    ExternalOscillator = 0,
    InternalFast = 1,
}

impl PllReference {
    pub const fn source(self) -> ClockSource {
        match self {
            PllReference::ExternalOscillator => ClockSource::ExternalOscillator,
            PllReference::InternalFast => ClockSource::InternalFast,
        }
    }
}

/// System PLL. Output is `reference × mult / prediv`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpllConfig {
    pub reference: PllReference,
    /// 1..=8
    pub prediv: u8,
    /// 16..=47
    pub mult: u8,
    pub div1: AsyncDiv,
    pub div2: AsyncDiv,
}

/// The source and divider triple of one run mode's clock control register.
///
/// Dividers are plain ratios in `1..=8`; `bus_div` and `slow_div` divide the core clock.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunModeClockConfig {
    pub source: ClockSource,
    pub core_div: u8,
    pub bus_div: u8,
    pub slow_div: u8,
}

impl RunModeClockConfig {
    pub const fn new(source: ClockSource, core_div: u8, bus_div: u8, slow_div: u8) -> Self {
        Self {
            source,
            core_div,
            bus_div,
            slow_div,
        }
    }

    /// RCCR/VCCR/HCCR value. CSR reports the same fields once the switch completes.
    pub const fn ccr_word(&self) -> u32 {
        let scs = match self.source.select_code() {
            Some(code) => code,
            None => 0,
        };
        scg::SCS.bits(scs)
            | scg::DIVCORE.bits(self.core_div.saturating_sub(1) as u32)
            | scg::DIVBUS.bits(self.bus_div.saturating_sub(1) as u32)
            | scg::DIVSLOW.bits(self.slow_div.saturating_sub(1) as u32)
    }

    const fn dividers_in_range(&self) -> bool {
        const fn ok(div: u8) -> bool {
            div >= 1 && div <= 8
        }
        ok(self.core_div) && ok(self.bus_div) && ok(self.slow_div)
    }
}

/// Upper bounds for the derived clocks of a run mode
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeLimits {
    pub core: u32,
    pub bus: u32,
    pub slow: u32,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// RUN, controlled by RCCR
    Run,
    /// VLPR, controlled by VCCR
    VeryLowPower,
    /// HSRUN, controlled by HCCR
    HighSpeed,
}

impl RunMode {
    pub const ALL: [RunMode; 3] = [RunMode::Run, RunMode::VeryLowPower, RunMode::HighSpeed];

    pub const fn control_register(self) -> usize {
        match self {
            RunMode::Run => scg::RCCR,
            RunMode::VeryLowPower => scg::VCCR,
            RunMode::HighSpeed => scg::HCCR,
        }
    }

    pub const fn limits(self) -> ModeLimits {
        match self {
            RunMode::Run => ModeLimits {
                core: 80_000_000,
                bus: 48_000_000,
                slow: 26_666_667,
            },
            RunMode::VeryLowPower => ModeLimits {
                core: 4_000_000,
                bus: 4_000_000,
                slow: 1_000_000,
            },
            RunMode::HighSpeed => ModeLimits {
                core: 112_000_000,
                bus: 56_000_000,
                slow: 28_000_000,
            },
        }
    }

    /// Whether `source` may clock the core in this mode.
    pub const fn allows(self, source: ClockSource) -> bool {
        match (self, source) {
            (_, ClockSource::Off) => false,
            (RunMode::VeryLowPower, ClockSource::InternalSlow) => true,
            (RunMode::VeryLowPower, _) => false,
            (RunMode::HighSpeed, ClockSource::InternalFast | ClockSource::Pll) => true,
            (RunMode::HighSpeed, _) => false,
            (RunMode::Run, _) => true,
        }
    }
}

/// Register image for bringing one source up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SourceProgram {
    pub source: ClockSource,
    pub registers: SourceRegisters,
    /// control/status word, enable bit included
    pub csr: u32,
    pub div: u32,
    pub cfg: u32,
}

/// Bits of a source CSR that configuration controls (the rest are status or lock).
pub(crate) const CSR_CONTROL: u32 = scg::EN.mask() | scg::SIRCSTEN.mask() | scg::SIRCLPEN.mask();

/// A complete SCG plan. A source is enabled if and only if its entry is `Some`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockTreeConfig {
    pub sirc: Option<SircConfig>,
    pub firc: Option<FircConfig>,
    pub sosc: Option<SoscConfig>,
    pub spll: Option<SpllConfig>,
    /// RUN mode, always required
    pub run: RunModeClockConfig,
    pub vlpr: Option<RunModeClockConfig>,
    pub hsrun: Option<RunModeClockConfig>,
    /// The mode whose control register is switched and confirmed
    pub active_mode: RunMode,
}

impl ClockTreeConfig {
    /// Minimal tree that only needs the 8 MHz SIRC: core 8 MHz, bus 8 MHz, slow 4 MHz.
    pub const SAFE_MODE: ClockTreeConfig = ClockTreeConfig {
        sirc: Some(SircConfig {
            range: SircRange::High,
            div1: AsyncDiv::Div1,
            div2: AsyncDiv::Div2,
            enable_in_stop: false,
            enable_in_low_power: false,
        }),
        firc: None,
        sosc: None,
        spll: None,
        run: RunModeClockConfig::new(ClockSource::InternalSlow, 1, 1, 2),
        vlpr: None,
        hsrun: None,
        active_mode: RunMode::Run,
    };

    pub const fn is_enabled(&self, source: ClockSource) -> bool {
        match source {
            ClockSource::Off => false,
            ClockSource::InternalSlow => self.sirc.is_some(),
            ClockSource::InternalFast => self.firc.is_some(),
            ClockSource::ExternalOscillator => self.sosc.is_some(),
            ClockSource::Pll => self.spll.is_some(),
        }
    }

    pub fn mode_config(&self, mode: RunMode) -> Option<&RunModeClockConfig> {
        match mode {
            RunMode::Run => Some(&self.run),
            RunMode::VeryLowPower => self.vlpr.as_ref(),
            RunMode::HighSpeed => self.hsrun.as_ref(),
        }
    }

    /// Undivided output of `source`, if that source is part of this tree.
    pub fn source_frequency(&self, source: ClockSource) -> Option<u32> {
        match source {
            ClockSource::Off => None,
            ClockSource::InternalSlow => self.sirc.map(|c| c.range.frequency()),
            ClockSource::InternalFast => self.firc.map(|_| 48_000_000),
            ClockSource::ExternalOscillator => self.sosc.map(|c| c.frequency),
            ClockSource::Pll => {
                let spll = self.spll?;
                if spll.prediv == 0 {
                    return None;
                }
                let reference = self.source_frequency(spll.reference.source())?;
                let hz = reference as u64 * spll.mult as u64 / spll.prediv as u64;
                u32::try_from(hz).ok()
            }
        }
    }

    /// Core, bus and slow clocks that `mode` would produce.
    pub fn system_clocks(&self, mode: RunMode) -> Option<SystemClocks> {
        let cfg = self.mode_config(mode)?;
        if !cfg.dividers_in_range() {
            return None;
        }
        let core = self.source_frequency(cfg.source)? / cfg.core_div as u32;
        Some(SystemClocks {
            core,
            bus: core / cfg.bus_div as u32,
            slow: core / cfg.slow_div as u32,
        })
    }

    fn async_dividers(&self, source: ClockSource) -> Option<(AsyncDiv, AsyncDiv)> {
        match source {
            ClockSource::Off => None,
            ClockSource::InternalSlow => self.sirc.map(|c| (c.div1, c.div2)),
            ClockSource::InternalFast => self.firc.map(|c| (c.div1, c.div2)),
            ClockSource::ExternalOscillator => self.sosc.map(|c| (c.div1, c.div2)),
            ClockSource::Pll => self.spll.map(|c| (c.div1, c.div2)),
        }
    }

    /// DIV1/DIV2 outputs of every configured source.
    pub fn async_clocks(&self) -> AsyncClocks {
        let mut clocks = AsyncClocks::NONE;
        for source in ClockSource::SOURCES {
            let (Some((div1, div2)), Some(hz)) = (self.async_dividers(source), self.source_frequency(source)) else {
                continue;
            };
            clocks.set(source, div1.apply(hz), div2.apply(hz));
        }
        clocks
    }

    pub(crate) fn source_program(&self, source: ClockSource) -> Option<SourceProgram> {
        let registers = source.registers()?;
        let (csr, div, cfg) = match source {
            ClockSource::Off => return None,
            ClockSource::InternalSlow => {
                let c = self.sirc?;
                let csr = scg::EN.mask()
                    | scg::SIRCSTEN.bits(c.enable_in_stop as u32)
                    | scg::SIRCLPEN.bits(c.enable_in_low_power as u32);
                (csr, AsyncDiv::div_word(c.div1, c.div2), scg::SIRC_RANGE.bits(c.range as u32))
            }
            ClockSource::InternalFast => {
                let c = self.firc?;
                (
                    scg::EN.mask(),
                    AsyncDiv::div_word(c.div1, c.div2),
                    scg::FIRC_RANGE.bits(c.range as u32),
                )
            }
            ClockSource::ExternalOscillator => {
                let c = self.sosc?;
                let cfg = scg::SOSC_RANGE.bits(c.range as u32)
                    | scg::HGO.bits(c.gain as u32)
                    | scg::EREFS.bits(c.reference as u32);
                (scg::EN.mask(), AsyncDiv::div_word(c.div1, c.div2), cfg)
            }
            ClockSource::Pll => {
                let c = self.spll?;
                let cfg = scg::SPLL_SOURCE.bits(c.reference as u32)
                    | scg::PREDIV.bits(c.prediv.saturating_sub(1) as u32)
                    | scg::MULT.bits(c.mult.saturating_sub(16) as u32);
                (scg::EN.mask(), AsyncDiv::div_word(c.div1, c.div2), cfg)
            }
        };
        Some(SourceProgram {
            source,
            registers,
            csr,
            div,
            cfg,
        })
    }

    /// Check the whole tree. Nothing touches hardware until this passes.
    pub fn validate(&self) -> Result<(), ClockError> {
        if let Some(sosc) = &self.sosc {
            if !sosc.range.contains(sosc.frequency) {
                return Err(ClockError::bad_config("SOSC frequency outside of the selected range"));
            }
        }
        if let Some(spll) = &self.spll {
            if !(1..=8).contains(&spll.prediv) {
                return Err(ClockError::bad_config("SPLL prediv must be within 1..=8"));
            }
            if !(16..=47).contains(&spll.mult) {
                return Err(ClockError::bad_config("SPLL mult must be within 16..=47"));
            }
            if !self.is_enabled(spll.reference.source()) {
                return Err(ClockError::bad_config("SPLL reference source is not enabled"));
            }
        }
        if self.mode_config(self.active_mode).is_none() {
            return Err(ClockError::bad_config("active run mode has no clock configuration"));
        }
        for mode in RunMode::ALL {
            if let Some(cfg) = self.mode_config(mode) {
                self.validate_mode(mode, cfg)?;
            }
        }
        Ok(())
    }

    fn validate_mode(&self, mode: RunMode, cfg: &RunModeClockConfig) -> Result<(), ClockError> {
        if !cfg.dividers_in_range() {
            return Err(ClockError::bad_config("run mode dividers must be within 1..=8"));
        }
        if cfg.source == ClockSource::Off {
            return Err(ClockError::bad_config("run mode source is Off"));
        }
        if !mode.allows(cfg.source) {
            return Err(ClockError::bad_config("source cannot clock the core in this run mode"));
        }
        if !self.is_enabled(cfg.source) {
            return Err(ClockError::bad_config("run mode source is not enabled"));
        }
        let clocks = self
            .system_clocks(mode)
            .ok_or(ClockError::bad_config("run mode source frequency is unknown"))?;
        let limits = mode.limits();
        if clocks.core > limits.core || clocks.bus > limits.bus || clocks.slow > limits.slow {
            return Err(ClockError::bad_config("derived clocks exceed the run mode limits"));
        }
        Ok(())
    }
}
