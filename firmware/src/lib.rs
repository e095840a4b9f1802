#![no_std]

pub mod board;
pub mod epd;
pub mod logger;
pub mod sd;
