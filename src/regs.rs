//! Raw register access for the blocks touched during bring-up.
//!
//! Everything above this module talks to hardware through [`RegisterBlock`],
//! addressed by byte offset from the block base. On target that is [`Mmio`];
//! host tests substitute simulated blocks.

/// A contiguous bit field inside a 32-bit register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    shift: u8,
    width: u8,
}

impl Field {
    pub const fn new(shift: u8, width: u8) -> Self {
        Self { shift, width }
    }

    pub const fn bit(shift: u8) -> Self {
        Self::new(shift, 1)
    }

    pub const fn mask(self) -> u32 {
        (((1u64 << self.width) - 1) as u32) << self.shift
    }

    /// Extract the field value from `word`.
    pub const fn read(self, word: u32) -> u32 {
        (word & self.mask()) >> self.shift
    }

    /// Return `word` with the field replaced by `value` (excess bits are dropped).
    pub const fn write(self, word: u32, value: u32) -> u32 {
        (word & !self.mask()) | ((value << self.shift) & self.mask())
    }

    /// The field holding `value`, every other bit clear.
    pub const fn bits(self, value: u32) -> u32 {
        self.write(0, value)
    }

    pub const fn is_set(self, word: u32) -> bool {
        word & self.mask() != 0
    }
}

/// Word-wide access to a memory-mapped register block.
pub trait RegisterBlock {
    fn read(&self, offset: usize) -> u32;

    fn write(&mut self, offset: usize, value: u32);
}

/// A register block at a fixed physical address.
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// # Safety
    ///
    /// `base` must be the address of a peripheral block that is valid for
    /// volatile access at every offset later used, and nothing else may be
    /// driving the same block concurrently.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    pub fn read8(&self, offset: usize) -> u8 {
        // SAFETY: upheld by the contract of `Mmio::new`
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u8) }
    }

    pub fn write8(&mut self, offset: usize, value: u8) {
        // SAFETY: upheld by the contract of `Mmio::new`
        unsafe { core::ptr::write_volatile((self.base + offset) as *mut u8, value) }
    }
}

impl RegisterBlock for Mmio {
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: upheld by the contract of `Mmio::new`
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&mut self, offset: usize, value: u32) {
        // SAFETY: upheld by the contract of `Mmio::new`
        unsafe { core::ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}

/// System Clock Generator
pub mod scg {
    use super::Field;

    pub const BASE: usize = 0x4006_4000;

    pub const CSR: usize = 0x010;
    pub const RCCR: usize = 0x014;
    pub const VCCR: usize = 0x018;
    pub const HCCR: usize = 0x01C;

    pub const SOSCCSR: usize = 0x100;
    pub const SOSCDIV: usize = 0x104;
    pub const SOSCCFG: usize = 0x108;
    pub const SIRCCSR: usize = 0x200;
    pub const SIRCDIV: usize = 0x204;
    pub const SIRCCFG: usize = 0x208;
    pub const FIRCCSR: usize = 0x300;
    pub const FIRCDIV: usize = 0x304;
    pub const FIRCCFG: usize = 0x308;
    pub const SPLLCSR: usize = 0x600;
    pub const SPLLDIV: usize = 0x604;
    pub const SPLLCFG: usize = 0x608;

    // CSR / RCCR / VCCR / HCCR
    pub const SCS: Field = Field::new(24, 4);
    pub const DIVCORE: Field = Field::new(16, 4);
    pub const DIVBUS: Field = Field::new(4, 4);
    pub const DIVSLOW: Field = Field::new(0, 4);

    // xCSR
    pub const EN: Field = Field::bit(0);
    pub const SIRCSTEN: Field = Field::bit(1);
    pub const SIRCLPEN: Field = Field::bit(2);
    pub const LK: Field = Field::bit(23);
    pub const VLD: Field = Field::bit(24);

    // xDIV
    pub const DIV1: Field = Field::new(0, 3);
    pub const DIV2: Field = Field::new(8, 3);

    // xCFG
    pub const EREFS: Field = Field::bit(2);
    pub const HGO: Field = Field::bit(3);
    pub const SOSC_RANGE: Field = Field::new(4, 2);
    pub const SIRC_RANGE: Field = Field::bit(0);
    pub const FIRC_RANGE: Field = Field::new(0, 2);
    pub const SPLL_SOURCE: Field = Field::bit(0);
    pub const PREDIV: Field = Field::new(8, 3);
    pub const MULT: Field = Field::new(16, 5);

    /// Fields of CSR that mirror a clock control register once a switch completes.
    pub const SWITCH_FIELDS: u32 = SCS.mask() | DIVCORE.mask() | DIVBUS.mask() | DIVSLOW.mask();
}

/// Peripheral Clock Controller
pub mod pcc {
    use super::Field;

    pub const BASE: usize = 0x4006_5000;

    pub const fn offset(index: u8) -> usize {
        index as usize * 4
    }

    pub const PCD: Field = Field::new(0, 3);
    pub const FRAC: Field = Field::bit(3);
    pub const PCS: Field = Field::new(24, 3);
    pub const CGC: Field = Field::bit(30);
    pub const PR: Field = Field::bit(31);

    /// Bits software may change; PR is read-only.
    pub const WRITABLE: u32 = PCD.mask() | FRAC.mask() | PCS.mask() | CGC.mask();
}

/// Port control (pin mux)
pub mod port {
    use super::Field;

    pub const BASE: usize = 0x4004_9000;
    /// Distance between PORTA, PORTB, ...
    pub const STRIDE: usize = 0x1000;

    pub const fn base(index: usize) -> usize {
        BASE + index * STRIDE
    }

    pub const fn pcr(pin: u8) -> usize {
        pin as usize * 4
    }

    pub const PS: Field = Field::bit(0);
    pub const PE: Field = Field::bit(1);
    pub const PFE: Field = Field::bit(4);
    pub const DSE: Field = Field::bit(6);
    pub const MUX: Field = Field::new(8, 3);
    pub const LK: Field = Field::bit(15);
    pub const IRQC: Field = Field::new(16, 4);

    /// Configuration bits; the interrupt status flag is excluded.
    pub const CONFIG: u32 =
        PS.mask() | PE.mask() | PFE.mask() | DSE.mask() | MUX.mask() | LK.mask() | IRQC.mask();
}

/// GPIO data direction
pub mod gpio {
    pub const BASE: usize = 0x400F_F000;
    pub const STRIDE: usize = 0x40;

    pub const fn base(index: usize) -> usize {
        BASE + index * STRIDE
    }

    pub const PDDR: usize = 0x14;
}

/// Flash memory module, byte-wide registers
pub mod ftfc {
    pub const BASE: usize = 0x4002_0000;

    pub const FSTAT: usize = 0x0;
    pub const FCCOB3: usize = 0x4;
    pub const FCCOB2: usize = 0x5;
    pub const FCCOB1: usize = 0x6;
    pub const FCCOB0: usize = 0x7;

    pub const CCIF: u8 = 1 << 7;
}
