// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Subcommand implementations. Output goes to the writer passed in so that
//! the commands can be exercised without a terminal.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use fw_codegen::CodegenModel;
use fw_config_core::{dump, LocalCheckouts};
use fw_core::settings::{self, ResolvedSettings, SettingsSources};
use fw_core::{Catalogue, Orchestrator, ValidatedConfig};
use fw_logging::CliLogLevel;
use tracing::info;

use crate::Cli;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Device configuration file
    pub file: PathBuf,
    /// Also list which package supplied each overridden value
    #[arg(long)]
    pub show_packages: bool,
}

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Device configuration file
    pub file: PathBuf,
    /// Write `src/main.cpp` and the defines header under the build path
    #[arg(long)]
    pub write: bool,
}

#[derive(Args, Debug)]
pub struct SettingsArgs {
    /// Show the layer each value came from
    #[arg(long)]
    pub show_origin: bool,
}

/// Resolved settings plus the package checkouts named on the command line.
pub struct Session {
    pub settings: ResolvedSettings,
    pub packages: LocalCheckouts,
}

impl Session {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let sources = SettingsSources {
            file: cli.settings.clone(),
            env: None,
            flags: cli.overrides.clone(),
        };
        Self::load(&sources, &cli.package_dirs)
    }

    pub fn load(sources: &SettingsSources, package_dirs: &[(String, String)]) -> Result<Self> {
        let settings = settings::load(sources).context("loading tool settings")?;
        let mut packages = LocalCheckouts::new();
        for (url, dir) in package_dirs {
            packages.insert(url.clone(), dir.clone());
        }
        Ok(Self { settings, packages })
    }

    /// The log level requested by the settings, if any.
    pub fn log_level(&self) -> Result<Option<CliLogLevel>> {
        self.settings
            .settings
            .log_level
            .as_deref()
            .map(|level| level.parse::<CliLogLevel>().map_err(anyhow::Error::msg))
            .transpose()
            .context("reading log-level setting")
    }

    fn orchestrator<'a>(&'a self, catalogue: &'a Catalogue) -> Result<Orchestrator<'a>> {
        let target = self.settings.settings.target()?;
        Ok(Orchestrator::new(catalogue, target)
            .with_package_source(&self.packages)
            .check_pin_use(self.settings.settings.check_pin_use))
    }

    fn validate(&self, catalogue: &Catalogue, file: &Path) -> Result<ValidatedConfig> {
        let validated = self
            .orchestrator(catalogue)?
            .validate_file(file)
            .with_context(|| format!("validating {}", file.display()))?;
        Ok(validated)
    }
}

pub fn run_config(session: &Session, args: &ConfigArgs, out: &mut dyn Write) -> Result<()> {
    let catalogue = Catalogue::builtin()?;
    let validated = session.validate(&catalogue, &args.file)?;
    info!("Configuration is valid!");

    let printed = validated.printable(session.settings.settings.include_auto_loaded);
    write!(out, "{}", dump(&printed)?)?;
    if args.show_packages && !validated.trace.is_empty() {
        writeln!(out)?;
        writeln!(out, "# Values replaced while merging packages:")?;
        for (path, layer) in &validated.trace.winner {
            writeln!(out, "#   {path}: {layer}")?;
        }
    }
    Ok(())
}

pub fn run_compile(session: &Session, args: &CompileArgs, out: &mut dyn Write) -> Result<()> {
    let catalogue = Catalogue::builtin()?;
    let validated = session.validate(&catalogue, &args.file)?;
    let model = session
        .orchestrator(&catalogue)?
        .emit(&validated)
        .with_context(|| format!("generating code for {}", args.file.display()))?;

    let program = render_program(&model);
    write!(out, "{program}")?;
    writeln!(out)?;
    write!(out, "{}", render_build_summary(&model))?;

    if args.write {
        let src = session.settings.settings.build_path.join("src");
        write_file(&src.join("main.cpp"), &program)?;
        write_file(&src.join("esphome").join("core").join("defines.h"), &render_defines(&model))?;
        info!(path = %src.display(), "Wrote generated sources");
    }
    Ok(())
}

pub fn run_settings(session: &Session, args: &SettingsArgs, out: &mut dyn Write) -> Result<()> {
    let resolved = &session.settings;
    if !args.show_origin {
        writeln!(out, "{}", serde_json::to_string_pretty(&resolved.json)?)?;
        return Ok(());
    }
    for (key, scope) in &resolved.provenance {
        let value = resolved
            .json
            .pointer(&format!("/{}", key.replace('.', "/")))
            .map(|v| v.to_string())
            .unwrap_or_default();
        writeln!(out, "{key}={value} (from {scope})")?;
    }
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

/// The complete `main.cpp`.
pub fn render_program(model: &CodegenModel) -> String {
    let mut text = String::from("// Auto generated code by fwcfg\n#include \"esphome.h\"\n\n");
    for line in model.render_globals() {
        text.push_str(&line);
        text.push('\n');
    }
    text.push_str("\nvoid setup() {\n");
    for line in model.render_main() {
        for part in line.lines() {
            text.push_str("  ");
            text.push_str(part);
            text.push('\n');
        }
    }
    text.push_str("  App.setup();\n}\n\nvoid loop() {\n  App.loop();\n}\n");
    text
}

pub fn render_defines(model: &CodegenModel) -> String {
    let mut text = String::from("#pragma once\n");
    for define in model.defines() {
        text.push_str(&define.as_macro());
        text.push('\n');
    }
    text
}

/// Side outputs of the build, as comments.
pub fn render_build_summary(model: &CodegenModel) -> String {
    let mut text = String::new();
    let mut section = |title: &str, lines: Vec<String>| {
        if lines.is_empty() {
            return;
        }
        text.push_str(&format!("// {title}:\n"));
        for line in lines {
            text.push_str(&format!("//   {line}\n"));
        }
    };
    section("Defines", model.defines().map(|d| d.as_build_flag()).collect());
    section("Build flags", model.build_flags().iter().cloned().collect());
    section("Libraries", model.libraries().iter().map(|l| l.as_lib_dep()).collect());
    section(
        "PlatformIO options",
        model
            .platformio_options()
            .iter()
            .map(|(k, v)| format!("{k} = {v}"))
            .collect(),
    );
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const DEVICE: &str = r#"
esphome:
  name: porch
logger:
i2c:
  id: bus_a
switch:
  - platform: gpio
    id: light
    name: Porch Light
    pin: GPIO4
"#;

    fn session(flags: &[(&str, &str)]) -> Session {
        let sources = SettingsSources {
            file: None,
            env: Some(HashMap::new()),
            flags: flags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        };
        Session::load(&sources, &[]).unwrap()
    }

    fn device_file(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("porch.yaml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn config_prints_the_validated_yaml_without_generated_ids() {
        let dir = tempfile::tempdir().unwrap();
        let args = ConfigArgs {
            file: device_file(&dir, DEVICE),
            show_packages: false,
        };
        let mut out = Vec::new();
        run_config(&session(&[]), &args, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("name: porch"), "{text}");
        assert!(text.contains("restore_mode: ALWAYS_OFF"), "{text}");
        assert!(!text.contains("logger_logger"), "{text}");
    }

    #[test]
    fn config_reports_every_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = ConfigArgs {
            file: device_file(&dir, "esphome:\n  name: porch\nuart:\n  baud_rate: fast\n"),
            show_packages: false,
        };
        let err = run_config(&session(&[]), &args, &mut Vec::new()).unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("validating"), "{chain}");
        assert!(chain.contains("uart->0->baud_rate"), "{chain}");
    }

    #[test]
    fn compile_renders_the_program_and_writes_it() {
        let dir = tempfile::tempdir().unwrap();
        let build = dir.path().join("build");
        let build_flag = build.to_string_lossy().to_string();
        let session = session(&[("build-path", build_flag.as_str())]);
        let args = CompileArgs {
            file: device_file(&dir, DEVICE),
            write: true,
        };
        let mut out = Vec::new();
        run_compile(&session, &args, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("void setup() {\n"), "{text}");
        assert!(text.contains("  App.setup();\n"), "{text}");
        assert!(text.contains("//   -DUSE_SWITCH"), "{text}");
        assert!(text.contains("//   Wire"), "{text}");

        let main = std::fs::read_to_string(build.join("src/main.cpp")).unwrap();
        assert!(main.contains("light = new esphome::gpio::GPIOSwitch("), "{main}");
        let defines = std::fs::read_to_string(build.join("src/esphome/core/defines.h")).unwrap();
        assert!(defines.starts_with("#pragma once\n"));
        assert!(defines.contains("#define USE_I2C"));
    }

    #[test]
    fn settings_can_be_shown_with_their_origin() {
        let session = session(&[("board", "esp32-s3-devkitc-1")]);
        let mut out = Vec::new();
        run_settings(&session, &SettingsArgs { show_origin: true }, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("board=\"esp32-s3-devkitc-1\" (from flags)"), "{text}");
        assert!(text.contains("check-pin-use=true (from defaults)"), "{text}");
    }

    #[test]
    fn unknown_log_levels_are_rejected() {
        assert!(session(&[("log-level", "loud")]).log_level().is_err());
        assert_eq!(session(&[("log-level", "debug")]).log_level().unwrap(), Some(CliLogLevel::Debug));
    }
}
