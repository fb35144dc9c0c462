// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::path::PathBuf;

use clap::Subcommand;
use fw_logging::CliLoggingArgs;

pub mod commands;

pub use clap::Parser;

/// Parse a `KEY=VALUE` argument.
fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    fw_core::settings::layers::parse_flag(raw).map_err(|e| e.to_string())
}

#[derive(clap::Parser, Debug)]
#[command(
    name = "fwcfg",
    about = "Validate firmware configurations and generate their C++ program",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Tool settings file (default: ./fwcfg.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Override a tool setting, e.g. `--set target-platform=esp8266`
    #[arg(long = "set", global = true, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,

    /// Local checkout to use for a remote package repository
    #[arg(long = "package-dir", global = true, value_name = "URL=DIR", value_parser = parse_key_value)]
    pub package_dirs: Vec<(String, String)>,

    #[command(flatten)]
    pub logging: CliLoggingArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a configuration and print the validated result
    Config(commands::ConfigArgs),
    /// Validate a configuration and print the generated program
    Compile(commands::CompileArgs),
    /// Show the resolved tool settings
    Settings(commands::SettingsArgs),
}
