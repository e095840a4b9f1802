//! Aeon Frame core - hardware-independent logic for a deep-sleep e-paper frame
//!
//! Every wake cycle the [`controller`] decides, from the persisted [`fram`]
//! record and the live sensor inputs, whether to go straight back to sleep or
//! to redisplay an image. Redisplay streams a SLIC image through the
//! resumable [`slic`] decoder into the panel via the [`delivery`] loop, so the
//! decoded image never exists in memory as a whole.
//!
//! The hardware itself (SPI bus, SD card, panel, ADC, RNG, RTC) lives behind
//! the traits in [`board`], [`library`] and [`delivery`], implemented by the
//! firmware crate and by in-memory fakes in the tests.

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod config;
pub mod controller;
pub mod delivery;
pub mod fram;
pub mod journal;
pub mod library;
pub mod selection;
pub mod sleep;
pub mod slic;

pub use config::FrameConfig;
pub use controller::{SleepPlan, WakeController};
pub use fram::{PersistentState, SleepReason};
pub use slic::SlicDecoder;
