//! Simulated SCG, PCC, PORT/GPIO and flash blocks for host tests.
//!
//! Every block shares one [`EventLog`] so tests can assert on the order of
//! writes across blocks, e.g. wait states before the clock switch.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::clocks::config::{
    AsyncDiv, ClockSource, ClockTreeConfig, FircConfig, FircRange, PllReference, RunMode, RunModeClockConfig,
    SircConfig, SircRange, SoscConfig, SoscGain, SoscRange, SoscReference, SpllConfig,
};
use crate::clocks::flash::FlashTiming;
use crate::clocks::pcc::Peripheral;
use crate::clocks::{ClockError, ClockState, ClockTreeController};
use crate::pins::{Port, PortBank};
use crate::regs::{pcc, scg, RegisterBlock};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Block {
    Scg,
    Pcc,
    Port(Port),
    Gpio(Port),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    Write { block: Block, offset: usize, value: u32 },
    WaitStates(u8),
}

#[derive(Clone, Default)]
pub(crate) struct EventLog(Rc<RefCell<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// Plain register file. Writes are logged and bits in `read_only` keep their value.
pub(crate) struct SimBlock {
    block: Block,
    regs: BTreeMap<usize, u32>,
    read_only: u32,
    log: EventLog,
}

impl SimBlock {
    pub fn new(block: Block, log: &EventLog) -> Self {
        Self {
            block,
            regs: BTreeMap::new(),
            read_only: 0,
            log: log.clone(),
        }
    }

    /// PCC with every known peripheral present and gated off.
    pub fn pcc(log: &EventLog) -> Self {
        let mut sim = Self::new(Block::Pcc, log);
        sim.read_only = pcc::PR.mask();
        for peripheral in Peripheral::ALL {
            sim.set(pcc::offset(peripheral.index()), pcc::PR.mask());
        }
        sim
    }

    /// Set a register without logging.
    pub fn set(&mut self, offset: usize, value: u32) {
        self.regs.insert(offset, value);
    }
}

impl RegisterBlock for SimBlock {
    fn read(&self, offset: usize) -> u32 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    fn write(&mut self, offset: usize, value: u32) {
        self.log.push(Event::Write {
            block: self.block,
            offset,
            value,
        });
        let kept = self.read(offset) & self.read_only;
        self.regs.insert(offset, (value & !self.read_only) | kept);
    }
}

/// How many status reads it takes for something to complete.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Readiness {
    After(u32),
    Never,
}

#[derive(Clone, Copy, Debug)]
enum Progress {
    Idle,
    Pending(u32),
    Stuck,
}

impl Progress {
    fn start(readiness: Readiness) -> Self {
        match readiness {
            Readiness::After(reads) => Progress::Pending(reads),
            Readiness::Never => Progress::Stuck,
        }
    }
}

/// SCG model: sources become valid some reads after being enabled, and CSR
/// follows the control register of the current run mode some reads after it
/// is written. Control registers of other modes are just stored.
pub(crate) struct SimScg {
    regs: RefCell<BTreeMap<usize, u32>>,
    readiness: [Readiness; 4],
    sources: RefCell<[Progress; 4]>,
    mode: RunMode,
    switch_readiness: Readiness,
    switch: RefCell<Progress>,
    log: EventLog,
}

impl SimScg {
    /// Reset state: FIRC clocking the core, SIRC running, DIVSLOW /2.
    pub fn new(log: &EventLog) -> Self {
        let csr = scg::SCS.bits(3) | scg::DIVSLOW.bits(1);
        let running = scg::EN.mask() | scg::VLD.mask();
        let regs = BTreeMap::from([
            (scg::CSR, csr),
            (scg::RCCR, csr),
            (scg::FIRCCSR, running),
            (scg::SIRCCSR, running),
            (scg::SIRCCFG, scg::SIRC_RANGE.bits(1)),
        ]);
        Self {
            regs: RefCell::new(regs),
            readiness: [Readiness::After(2); 4],
            sources: RefCell::new([Progress::Idle; 4]),
            mode: RunMode::Run,
            switch_readiness: Readiness::After(1),
            switch: RefCell::new(Progress::Idle),
            log: log.clone(),
        }
    }

    pub fn with_source(mut self, source: ClockSource, readiness: Readiness) -> Self {
        if let Some(slot) = source.slot() {
            self.readiness[slot] = readiness;
        }
        self
    }

    pub fn with_switch(mut self, readiness: Readiness) -> Self {
        self.switch_readiness = readiness;
        self
    }

    /// Start out in `mode`, its control register holding the reset selection.
    pub fn in_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self.poke(mode.control_register(), self.peek(scg::CSR));
        self
    }

    /// Power-mode transition: CSR takes the selection from the new mode's
    /// control register at once.
    pub fn enter_mode(&mut self, mode: RunMode) {
        self.mode = mode;
        let selected = self.peek(mode.control_register()) & scg::SWITCH_FIELDS;
        let csr = self.peek(scg::CSR) & !scg::SWITCH_FIELDS;
        self.poke(scg::CSR, csr | selected);
    }

    /// Register contents without side effects.
    pub fn peek(&self, offset: usize) -> u32 {
        self.regs.borrow().get(&offset).copied().unwrap_or(0)
    }

    fn poke(&self, offset: usize, value: u32) {
        self.regs.borrow_mut().insert(offset, value);
    }

    fn source_at(offset: usize) -> Option<ClockSource> {
        ClockSource::SOURCES
            .into_iter()
            .find(|s| s.registers().map(|r| r.csr) == Some(offset))
    }

    fn pll_reference_valid(&self) -> bool {
        let csr = match scg::SPLL_SOURCE.read(self.peek(scg::SPLLCFG)) {
            0 => scg::SOSCCSR,
            _ => scg::FIRCCSR,
        };
        scg::VLD.is_set(self.peek(csr))
    }

    fn advance_source(&self, source: ClockSource, slot: usize, csr_offset: usize) {
        let mut sources = self.sources.borrow_mut();
        match sources[slot] {
            Progress::Pending(0) => {
                if source == ClockSource::Pll && !self.pll_reference_valid() {
                    return;
                }
                sources[slot] = Progress::Idle;
                self.poke(csr_offset, scg::VLD.write(self.peek(csr_offset), 1));
            }
            Progress::Pending(n) => sources[slot] = Progress::Pending(n - 1),
            Progress::Idle | Progress::Stuck => {}
        }
    }

    fn advance_switch(&self) {
        let mut switch = self.switch.borrow_mut();
        match *switch {
            Progress::Pending(0) => {
                *switch = Progress::Idle;
                let selected = self.peek(self.mode.control_register()) & scg::SWITCH_FIELDS;
                let csr = self.peek(scg::CSR) & !scg::SWITCH_FIELDS;
                self.poke(scg::CSR, csr | selected);
            }
            Progress::Pending(n) => *switch = Progress::Pending(n - 1),
            Progress::Idle | Progress::Stuck => {}
        }
    }
}

impl RegisterBlock for SimScg {
    fn read(&self, offset: usize) -> u32 {
        if offset == scg::CSR {
            self.advance_switch();
        } else if let Some(source) = Self::source_at(offset) {
            if let Some(slot) = source.slot() {
                self.advance_source(source, slot, offset);
            }
        }
        self.peek(offset)
    }

    fn write(&mut self, offset: usize, value: u32) {
        self.log.push(Event::Write {
            block: Block::Scg,
            offset,
            value,
        });
        if offset == self.mode.control_register() {
            self.poke(offset, value);
            *self.switch.borrow_mut() = Progress::start(self.switch_readiness);
        } else if let Some(source) = Self::source_at(offset) {
            let Some(slot) = source.slot() else {
                return;
            };
            // VLD is status only and drops whenever the source is (re)enabled or disabled
            self.poke(offset, scg::VLD.write(value, 0));
            self.sources.borrow_mut()[slot] = if scg::EN.is_set(value) {
                Progress::start(self.readiness[slot])
            } else {
                Progress::Idle
            };
        } else {
            self.poke(offset, value);
        }
    }
}

pub(crate) struct SimFlash {
    wait_states: u8,
    fail: bool,
    log: EventLog,
}

impl SimFlash {
    pub fn new(log: &EventLog, wait_states: u8) -> Self {
        Self {
            wait_states,
            fail: false,
            log: log.clone(),
        }
    }

    /// Every command times out.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl FlashTiming for SimFlash {
    fn wait_states(&self) -> u8 {
        self.wait_states
    }

    fn set_wait_states(&mut self, wait_states: u8) -> Result<(), ClockError> {
        if self.fail {
            return Err(ClockError::FlashTimeout);
        }
        self.log.push(Event::WaitStates(wait_states));
        self.wait_states = wait_states;
        Ok(())
    }
}

pub(crate) struct SimPorts {
    ports: Vec<SimBlock>,
    gpio: Vec<SimBlock>,
}

impl SimPorts {
    pub fn new(log: &EventLog) -> Self {
        Self {
            ports: Port::ALL.iter().map(|&p| SimBlock::new(Block::Port(p), log)).collect(),
            gpio: Port::ALL.iter().map(|&p| SimBlock::new(Block::Gpio(p), log)).collect(),
        }
    }
}

impl PortBank for SimPorts {
    type Block = SimBlock;

    fn port(&mut self, port: Port) -> &mut SimBlock {
        &mut self.ports[port.index()]
    }

    fn gpio(&mut self, port: Port) -> &mut SimBlock {
        &mut self.gpio[port.index()]
    }
}

/// 8 MHz crystal, PLL ×20, core /2: 80 MHz core, 40 MHz bus, 20 MHz slow.
pub(crate) fn scenario_tree() -> ClockTreeConfig {
    ClockTreeConfig {
        sirc: Some(SircConfig {
            range: SircRange::High,
            div1: AsyncDiv::Div1,
            div2: AsyncDiv::Div2,
            enable_in_stop: false,
            enable_in_low_power: false,
        }),
        firc: Some(FircConfig {
            range: FircRange::Mhz48,
            div1: AsyncDiv::Div1,
            div2: AsyncDiv::Div1,
        }),
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
        vlpr: None,
        hsrun: None,
        active_mode: RunMode::Run,
    }
}

/// Bring `state` to the scenario tree through a simulated SCG.
pub(crate) fn publish_scenario(state: &ClockState) {
    let log = EventLog::default();
    let mut controller = ClockTreeController::new(SimScg::new(&log), SimFlash::new(&log, 1), state);
    controller.configure(&scenario_tree()).unwrap();
}
