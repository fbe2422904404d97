//! Pin routing: PORT pin control registers and GPIO direction.

use paste::paste;

use crate::clocks::pcc::{Peripheral, PeripheralClockController};
use crate::regs::{gpio, port, Mmio, RegisterBlock};

/// Number of pins per port.
pub const PINS_PER_PORT: u8 = 32;

macro_rules! impl_ports {
    ($($letter:ident),* $(,)?) => {
        paste! {
            #[cfg_attr(feature = "defmt", derive(defmt::Format))]
            #[derive(Clone, Copy, Debug, PartialEq, Eq)]
            pub enum Port {
                $($letter),*
            }

            impl Port {
                pub const ALL: &'static [Port] = &[$(Port::$letter),*];

                /// PCC gate that must be on before the port's registers respond.
                pub const fn peripheral(self) -> Peripheral {
                    match self {
                        $(Port::$letter => Peripheral::[<Port $letter>]),*
                    }
                }

                pub const fn index(self) -> usize {
                    self as usize
                }

                pub const fn port_base(self) -> usize {
                    port::base(self.index())
                }

                pub const fn gpio_base(self) -> usize {
                    gpio::base(self.index())
                }
            }
        }
    };
}

impl_ports!(A, B, C, D, E);

/// Pin function select (PCR MUX).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinMux {
    /// Analog / disabled
    Disabled = 0,
    Gpio = 1,
    Alt2 = 2,
    Alt3 = 3,
    Alt4 = 4,
    Alt5 = 5,
    Alt6 = 6,
    Alt7 = 7,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pull {
    Disabled,
    Down,
    Up,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriveStrength {
    Low,
    High,
}

/// Pin interrupt/DMA request configuration (PCR IRQC).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinInterrupt {
    Disabled = 0,
    DmaRisingEdge = 1,
    DmaFallingEdge = 2,
    DmaEitherEdge = 3,
    LogicLow = 8,
    RisingEdge = 9,
    FallingEdge = 10,
    EitherEdge = 11,
    LogicHigh = 12,
}

/// One row of the pin route table.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinRoute {
    pub port: Port,
    pub pin: u8,
    pub mux: PinMux,
    /// Only meaningful for [`PinMux::Gpio`], but always written to PDDR
    pub direction: Direction,
    pub pull: Pull,
    pub drive: DriveStrength,
    pub passive_filter: bool,
    /// Lock the PCR until the next reset
    pub lock: bool,
    pub interrupt: PinInterrupt,
}

impl PinRoute {
    /// An input with no pull, low drive, no filter, no interrupt.
    pub const fn new(port: Port, pin: u8, mux: PinMux) -> Self {
        Self {
            port,
            pin,
            mux,
            direction: Direction::Input,
            pull: Pull::Disabled,
            drive: DriveStrength::Low,
            passive_filter: false,
            lock: false,
            interrupt: PinInterrupt::Disabled,
        }
    }

    pub const fn output(self) -> Self {
        Self {
            direction: Direction::Output,
            ..self
        }
    }

    pub const fn pull(self, pull: Pull) -> Self {
        Self { pull, ..self }
    }

    pub const fn drive(self, drive: DriveStrength) -> Self {
        Self { drive, ..self }
    }

    pub const fn filtered(self) -> Self {
        Self {
            passive_filter: true,
            ..self
        }
    }

    pub const fn locked(self) -> Self {
        Self { lock: true, ..self }
    }

    pub const fn interrupt(self, interrupt: PinInterrupt) -> Self {
        Self { interrupt, ..self }
    }

    pub const fn pcr_word(&self) -> u32 {
        let (pe, ps) = match self.pull {
            Pull::Disabled => (0, 0),
            Pull::Down => (1, 0),
            Pull::Up => (1, 1),
        };
        port::MUX.bits(self.mux as u32)
            | port::PE.bits(pe)
            | port::PS.bits(ps)
            | port::DSE.bits(matches!(self.drive, DriveStrength::High) as u32)
            | port::PFE.bits(self.passive_filter as u32)
            | port::LK.bits(self.lock as u32)
            | port::IRQC.bits(self.interrupt as u32)
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinError {
    /// The port's PCC gate is off, its registers would fault
    PortNotClocked { port: Port },
    InvalidPin { port: Port, pin: u8 },
    /// The PCR is locked with a different configuration
    Locked { port: Port, pin: u8 },
}

/// Access to the PORT and GPIO register blocks of every port.
pub trait PortBank {
    type Block: RegisterBlock;

    fn port(&mut self, port: Port) -> &mut Self::Block;

    fn gpio(&mut self, port: Port) -> &mut Self::Block;
}

/// The on-chip PORTA..E and PTA..PTE blocks.
pub struct MmioPorts {
    ports: [Mmio; 5],
    gpio: [Mmio; 5],
}

impl MmioPorts {
    /// # Safety
    ///
    /// Must only be created once, with nothing else touching the PORT or GPIO blocks.
    pub unsafe fn new() -> Self {
        Self {
            ports: [
                Mmio::new(Port::A.port_base()),
                Mmio::new(Port::B.port_base()),
                Mmio::new(Port::C.port_base()),
                Mmio::new(Port::D.port_base()),
                Mmio::new(Port::E.port_base()),
            ],
            gpio: [
                Mmio::new(Port::A.gpio_base()),
                Mmio::new(Port::B.gpio_base()),
                Mmio::new(Port::C.gpio_base()),
                Mmio::new(Port::D.gpio_base()),
                Mmio::new(Port::E.gpio_base()),
            ],
        }
    }
}

impl PortBank for MmioPorts {
    type Block = Mmio;

    fn port(&mut self, port: Port) -> &mut Mmio {
        &mut self.ports[port.index()]
    }

    fn gpio(&mut self, port: Port) -> &mut Mmio {
        &mut self.gpio[port.index()]
    }
}

pub struct PinRouter<B> {
    bank: B,
}

impl<B: PortBank> PinRouter<B> {
    pub fn new(bank: B) -> Self {
        Self { bank }
    }

    pub fn release(self) -> B {
        self.bank
    }

    /// Apply a route table. Every route is checked before any pin is touched,
    /// and pins already configured as requested are left alone.
    pub fn apply<P: RegisterBlock>(
        &mut self,
        gates: &PeripheralClockController<'_, P>,
        routes: &[PinRoute],
    ) -> Result<(), PinError> {
        for route in routes {
            self.check(gates, route)?;
        }
        for route in routes {
            self.route(route);
        }
        debug!("pins: {} routes applied", routes.len());
        Ok(())
    }

    fn check<P: RegisterBlock>(
        &mut self,
        gates: &PeripheralClockController<'_, P>,
        route: &PinRoute,
    ) -> Result<(), PinError> {
        let (port, pin) = (route.port, route.pin);
        if pin >= PINS_PER_PORT {
            return Err(PinError::InvalidPin { port, pin });
        }
        if !gates.is_enabled(port.peripheral()) {
            return Err(PinError::PortNotClocked { port });
        }
        let current = self.bank.port(port).read(port::pcr(pin));
        if port::LK.is_set(current) && current & port::CONFIG != route.pcr_word() {
            return Err(PinError::Locked { port, pin });
        }
        Ok(())
    }

    fn route(&mut self, route: &PinRoute) {
        let offset = port::pcr(route.pin);
        let word = route.pcr_word();
        let pcr = self.bank.port(route.port);
        if pcr.read(offset) & port::CONFIG != word {
            pcr.write(offset, word);
        }

        let bit = 1u32 << route.pin;
        let gpio = self.bank.gpio(route.port);
        let pddr = gpio.read(gpio::PDDR);
        let wanted = match route.direction {
            Direction::Output => pddr | bit,
            Direction::Input => pddr & !bit,
        };
        if wanted != pddr {
            gpio.write(gpio::PDDR, wanted);
        }
    }
}
