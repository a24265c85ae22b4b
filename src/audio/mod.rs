//! Audio path: capture, conversion, and playback scheduling.

pub mod capture;
pub mod codec;
#[cfg(feature = "cpal-audio")]
pub mod cpal_io;
pub mod frame;
pub mod playback;
pub mod resample;
pub mod wav;
