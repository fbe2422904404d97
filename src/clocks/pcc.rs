//! Peripheral clock gating (PCC).
//!
//! Each peripheral has one PCC register holding its functional clock source
//! (PCS), an optional divider (PCD/FRAC) and the gate (CGC). The source may
//! only be changed while the gate is off, so a change of source is always
//! written as gate off, new selection, gate on.

use paste::paste;

use super::config::ClockSource;
use super::{AsyncClocks, ClockError, ClockState};
use crate::regs::{pcc, RegisterBlock};

macro_rules! impl_peripherals {
    ($($name:ident = $index:literal),* $(,)?) => {
        paste! {
            /// A peripheral with a PCC slot. The discriminant is its PCC index.
            #[cfg_attr(feature = "defmt", derive(defmt::Format))]
            #[derive(Clone, Copy, Debug, PartialEq, Eq)]
            #[repr(u8)]
            pub enum Peripheral {
                $(
                    #[doc = "PCC slot of " $name]
                    $name = $index,
                )*
            }

            impl Peripheral {
                pub const ALL: &'static [Peripheral] = &[$(Peripheral::$name),*];

                pub const fn index(self) -> u8 {
                    self as u8
                }
            }
        }
    };
}

impl_peripherals! {
    Ftfc = 32,
    Dmamux = 33,
    FlexCan0 = 36,
    FlexCan1 = 37,
    Ftm3 = 38,
    Adc1 = 39,
    FlexCan2 = 43,
    Lpspi0 = 44,
    Lpspi1 = 45,
    Lpspi2 = 46,
    Pdb1 = 49,
    Crc = 50,
    Pdb0 = 54,
    Lpit = 55,
    Ftm0 = 56,
    Ftm1 = 57,
    Ftm2 = 58,
    Adc0 = 59,
    Rtc = 61,
    Lptmr0 = 64,
    PortA = 73,
    PortB = 74,
    PortC = 75,
    PortD = 76,
    PortE = 77,
    FlexIo = 90,
    Ewm = 97,
    Lpi2c0 = 102,
    Lpi2c1 = 103,
    Lpuart0 = 106,
    Lpuart1 = 107,
    Lpuart2 = 108,
    Ftm4 = 110,
    Ftm5 = 111,
    Ftm6 = 112,
    Ftm7 = 113,
    Cmp0 = 115,
    Enet = 121,
}

/// Functional clock options (PCS). Each selects a source's DIV2 output.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeripheralClockSource {
    /// Bus clock only, no functional clock
    None = 0,
    SoscDiv2 = 1,
    SircDiv2 = 2,
    FircDiv2 = 3,
    SpllDiv2 = 6,
}

impl PeripheralClockSource {
    pub const fn clock_source(self) -> Option<ClockSource> {
        match self {
            PeripheralClockSource::None => None,
            PeripheralClockSource::SoscDiv2 => Some(ClockSource::ExternalOscillator),
            PeripheralClockSource::SircDiv2 => Some(ClockSource::InternalSlow),
            PeripheralClockSource::FircDiv2 => Some(ClockSource::InternalFast),
            PeripheralClockSource::SpllDiv2 => Some(ClockSource::Pll),
        }
    }
}

/// One row of the gate table.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeripheralClockGate {
    pub peripheral: Peripheral,
    pub enabled: bool,
    pub source: PeripheralClockSource,
    /// 1..=8
    pub divider: u8,
}

impl PeripheralClockGate {
    /// Gate on, bus clock only.
    pub const fn enabled(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            enabled: true,
            source: PeripheralClockSource::None,
            divider: 1,
        }
    }

    pub const fn disabled(peripheral: Peripheral) -> Self {
        Self {
            enabled: false,
            ..Self::enabled(peripheral)
        }
    }

    pub const fn clocked_from(self, source: PeripheralClockSource, divider: u8) -> Self {
        Self {
            source,
            divider,
            ..self
        }
    }

    /// Register value this gate asks for.
    pub const fn word(&self) -> u32 {
        pcc::PCS.bits(self.source as u32)
            | pcc::PCD.bits(self.divider.saturating_sub(1) as u32)
            | pcc::CGC.bits(self.enabled as u32)
    }
}

const SELECTION: u32 = pcc::PCS.mask() | pcc::PCD.mask() | pcc::FRAC.mask();

/// Applies a gate table, consistent with the clocks published in a [`ClockState`].
pub struct PeripheralClockController<'a, P> {
    pcc: P,
    clocks: &'a ClockState,
}

impl<'a, P: RegisterBlock> PeripheralClockController<'a, P> {
    pub fn new(pcc: P, clocks: &'a ClockState) -> Self {
        Self { pcc, clocks }
    }

    pub fn release(self) -> P {
        self.pcc
    }

    /// Program every row of `gates`.
    ///
    /// Nothing is written unless the clock tree has been confirmed and every
    /// row is valid. Rows whose register already matches are skipped, so
    /// applying the same table twice writes nothing the second time.
    pub fn apply(&mut self, gates: &[PeripheralClockGate]) -> Result<(), ClockError> {
        let clocks = self.clocks.clocks();
        if !clocks.ready {
            return Err(ClockError::TreeNotReady);
        }
        for gate in gates {
            self.check(gate, &clocks.async_clocks)?;
        }
        for gate in gates {
            self.program(gate);
        }
        Ok(())
    }

    pub fn is_enabled(&self, peripheral: Peripheral) -> bool {
        pcc::CGC.is_set(self.pcc.read(pcc::offset(peripheral.index())))
    }

    /// Gate a peripheral off, leaving its source selection alone.
    pub fn disable(&mut self, peripheral: Peripheral) {
        let offset = pcc::offset(peripheral.index());
        let current = self.pcc.read(offset);
        if pcc::CGC.is_set(current) {
            self.pcc.write(offset, current & SELECTION);
        }
    }

    /// Frequency a gate would deliver to its peripheral, if it delivers one.
    pub fn functional_clock(&self, gate: &PeripheralClockGate) -> Option<u32> {
        if !gate.enabled || gate.divider == 0 {
            return None;
        }
        let source = gate.source.clock_source()?;
        Some(self.clocks.async_clocks().div2_of(source)? / gate.divider as u32)
    }

    fn check(&self, gate: &PeripheralClockGate, async_clocks: &AsyncClocks) -> Result<(), ClockError> {
        if !(1..=8).contains(&gate.divider) {
            return Err(ClockError::bad_config("peripheral divider must be within 1..=8"));
        }
        if !pcc::PR.is_set(self.pcc.read(pcc::offset(gate.peripheral.index()))) {
            return Err(ClockError::bad_config("peripheral is not present on this device"));
        }
        if let Some(source) = gate.source.clock_source() {
            if async_clocks.div2_of(source).is_none() {
                return Err(ClockError::bad_config("peripheral clock source is not running"));
            }
        }
        Ok(())
    }

    fn program(&mut self, gate: &PeripheralClockGate) {
        let offset = pcc::offset(gate.peripheral.index());
        let current = self.pcc.read(offset);
        let wanted = gate.word();
        if current & pcc::WRITABLE == wanted {
            return;
        }

        if current & SELECTION != wanted & SELECTION {
            if pcc::CGC.is_set(current) {
                self.pcc.write(offset, current & SELECTION);
            }
            self.pcc.write(offset, wanted & SELECTION);
            if gate.enabled {
                self.pcc.write(offset, wanted);
            }
        } else {
            self.pcc.write(offset, wanted);
        }
        trace!("pcc: {:?} enabled={}", gate.peripheral, gate.enabled);
    }
}
