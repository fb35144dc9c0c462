// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Components shipped with the core catalogue.

pub mod esphome;
pub mod i2c;
pub mod interval;
pub mod logger;
pub mod mcp23017;
pub mod sensor;
pub mod switch;
pub mod uart;

use crate::catalogue::Catalogue;

pub fn register_all(catalogue: &mut Catalogue) -> fw_config_core::Result<()> {
    esphome::register(catalogue)?;
    logger::register(catalogue)?;
    uart::register(catalogue)?;
    i2c::register(catalogue)?;
    mcp23017::register(catalogue)?;
    switch::register(catalogue)?;
    sensor::register(catalogue)?;
    interval::register(catalogue)?;
    Ok(())
}
