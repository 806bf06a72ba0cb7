//! Protocol module - sensor frame formats and the streaming decoder.
//!
//! This module is sans-IO:
//! - 8-bit XOR checksum
//! - Frame profiles (Zephyr, Polar) behind the [`FrameProfile`] trait
//! - Fixed-size frame decoder with resynchronization

mod checksum;
mod decoder;
mod profile;

pub mod polar;
pub mod zephyr;

pub use checksum::checksum8;
pub use decoder::{Decoded, FrameDecoder};
pub use polar::{PolarProfile, POLAR_FRAME_SIZE};
pub use profile::{FrameProfile, ProfileKind};
pub use zephyr::{ZephyrProfile, ZEPHYR_FRAME_SIZE};
