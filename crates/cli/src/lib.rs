//! # rampay-cli
//!
//! Command line utilities of the `rampay` binary.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

pub mod handler;
pub mod opts;
pub mod utils;
