// Copyright (c) 2024 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Home Assistant live-state connection manager and voice pipeline core of the smart-home
//! dashboard.

pub mod chat;
pub mod client;
pub mod entity;
pub mod util;
pub mod voice;

pub mod configuration;
pub mod errors;
pub mod startup;

pub use client::{ConnectionStatus, HassConnection};
pub use startup::*;
