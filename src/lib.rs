//! Turns scanned QR codes into playback commands for a Volumio player.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod channel;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod probe;
pub mod protocol;
pub mod scanner;
pub mod signal;
pub mod state;
