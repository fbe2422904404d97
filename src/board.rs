//! S32K148 evaluation board tables.
//!
//! 8 MHz crystal on EXTAL/XTAL, CAN0 transceiver on PTA12/PTA13, LEDs on
//! PTD0/PTD15/PTD16 and the PROG button on PTC13.

use crate::boot::BoardConfig;
use crate::clocks::config::{
    AsyncDiv, ClockSource, ClockTreeConfig, FircConfig, FircRange, PllReference, RunMode, RunModeClockConfig,
    SircConfig, SircRange, SoscConfig, SoscGain, SoscRange, SoscReference, SpllConfig,
};
use crate::clocks::pcc::{Peripheral, PeripheralClockGate, PeripheralClockSource};
use crate::pins::{PinMux, PinRoute, Port, Pull};

const SIRC: SircConfig = SircConfig {
    range: SircRange::High,
    div1: AsyncDiv::Div1,
    div2: AsyncDiv::Div2,
    enable_in_stop: true,
    enable_in_low_power: true,
};

const FIRC: FircConfig = FircConfig {
    range: FircRange::Mhz48,
    div1: AsyncDiv::Div1,
    div2: AsyncDiv::Div1,
};

const VLPR: RunModeClockConfig = RunModeClockConfig::new(ClockSource::InternalSlow, 2, 1, 4);

/// SPLL from the crystal: 8 MHz × 20 = 160 MHz, core 80 MHz, bus 40 MHz, slow 20 MHz.
pub const CLOCKS: ClockTreeConfig = ClockTreeConfig {
    sirc: Some(SIRC),
    firc: Some(FIRC),
    sosc: Some(SoscConfig {
        frequency: 8_000_000,
        range: SoscRange::High,
        gain: SoscGain::High,
        reference: SoscReference::Crystal,
        div1: AsyncDiv::Div1,
        div2: AsyncDiv::Div1,
    }),
    spll: Some(SpllConfig {
        reference: PllReference::ExternalOscillator,
        prediv: 1,
        mult: 20,
        div1: AsyncDiv::Div2,
        div2: AsyncDiv::Div4,
    }),
    run: RunModeClockConfig::new(ClockSource::Pll, 2, 2, 4),
    vlpr: Some(VLPR),
    hsrun: Some(RunModeClockConfig::new(ClockSource::Pll, 2, 2, 4)),
    active_mode: RunMode::Run,
};

/// Internal oscillators only, for when the crystal or PLL will not start:
/// core 48 MHz, bus 48 MHz, slow 24 MHz.
pub const FALLBACK_CLOCKS: ClockTreeConfig = ClockTreeConfig {
    sirc: Some(SIRC),
    firc: Some(FIRC),
    sosc: None,
    spll: None,
    run: RunModeClockConfig::new(ClockSource::InternalFast, 1, 1, 2),
    vlpr: Some(VLPR),
    hsrun: None,
    active_mode: RunMode::Run,
};

pub const GATES: [PeripheralClockGate; 9] = [
    PeripheralClockGate::enabled(Peripheral::PortA),
    PeripheralClockGate::enabled(Peripheral::PortB),
    PeripheralClockGate::enabled(Peripheral::PortC),
    PeripheralClockGate::enabled(Peripheral::PortD),
    PeripheralClockGate::enabled(Peripheral::PortE),
    // FlexCAN picks its protocol clock in CTRL1[CLKSRC]
    PeripheralClockGate::enabled(Peripheral::FlexCan0),
    PeripheralClockGate::enabled(Peripheral::FlexCan1),
    PeripheralClockGate::enabled(Peripheral::FlexCan2),
    PeripheralClockGate::enabled(Peripheral::Lpuart1).clocked_from(PeripheralClockSource::FircDiv2, 1),
];

pub const PINS: [PinRoute; 6] = [
    // CAN0_TX
    PinRoute::new(Port::A, 12, PinMux::Alt2).output(),
    // CAN0_RX
    PinRoute::new(Port::A, 13, PinMux::Alt2),
    // LEDs
    PinRoute::new(Port::D, 0, PinMux::Gpio).output(),
    PinRoute::new(Port::D, 15, PinMux::Gpio).output(),
    PinRoute::new(Port::D, 16, PinMux::Gpio).output(),
    // PROG button
    PinRoute::new(Port::C, 13, PinMux::Gpio).pull(Pull::Up),
];

pub static BOARD: BoardConfig<'static> = BoardConfig {
    clocks: &CLOCKS,
    fallback_clocks: Some(&FALLBACK_CLOCKS),
    gates: &GATES,
    pins: &PINS,
};
