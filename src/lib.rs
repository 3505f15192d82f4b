//! Timer resource manager, tick scheduler and battery-monitor firmware for the
//! ATmega328P.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "avr", feature(abi_avr_interrupt, asm_experimental_arch))]

pub mod application;
pub mod config;
pub mod diagnostics;
pub mod drivers;
pub mod hal;
pub mod logger;
pub mod rtos;
pub mod testing;
