#![cfg_attr(not(test), no_std)]

//! Boot-time clock and pin bring-up for the NXP S32K148.
//!
//! [`init`] takes the chip from reset to the evaluation board's clock tree
//! (SPLL, 80 MHz core), gates the peripheral clocks the board uses and routes
//! its pins. The pieces are also usable on their own:
//!
//! - [`clocks::ClockTreeController`] moves the SCG to a [`clocks::config::ClockTreeConfig`]
//! - [`clocks::pcc::PeripheralClockController`] applies a PCC gate table
//! - [`pins::PinRouter`] applies a pin route table
//!
//! Derived frequencies are published in [`clocks::SYSTEM_CLOCKS`] once a switch is confirmed.
//!
//! ## Feature flags
#![doc = document_features::document_features!(feature_label = r#"<span class="stab portability"><code>{feature}</code></span>"#)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod board;
pub mod boot;
pub mod clocks;
pub mod pins;
pub mod regs;

#[cfg(test)]
pub(crate) mod testing;

pub use boot::{bring_up, halt, init, BoardConfig, BootError, Profile};
pub use clocks::{bus_clock, core_clock, is_ready, slow_clock, ClockError, Clocks, SystemClocks};
