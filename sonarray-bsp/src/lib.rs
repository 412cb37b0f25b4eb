#![cfg_attr(not(any(test, feature = "sim")), no_std)]

pub mod bram;
pub mod ecat;
#[cfg(feature = "sim")]
pub mod sim;
