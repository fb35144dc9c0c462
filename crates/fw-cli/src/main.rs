// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::Result;
use fw_cli::commands::{self, Session};
use fw_cli::{Cli, Commands, Parser};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let session = Session::from_cli(&cli)?;
    let configured = session.log_level()?;
    cli.logging.clone().init("fwcfg", configured)?;

    let mut stdout = std::io::stdout().lock();
    match &cli.command {
        Commands::Config(args) => commands::run_config(&session, args, &mut stdout),
        Commands::Compile(args) => commands::run_compile(&session, args, &mut stdout),
        Commands::Settings(args) => commands::run_settings(&session, args, &mut stdout),
    }
}
