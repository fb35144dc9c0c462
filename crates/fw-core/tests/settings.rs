// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::collections::HashMap;
use std::io::Write;

use fw_config_core::{Framework, TargetPlatform};
use fw_core::settings::{load, Scope, SettingsSources};
use pretty_assertions::assert_eq;

fn settings_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn later_layers_win_and_provenance_follows() {
    let file = settings_file(
        r#"
target-platform = "esp8266"
board = "nodemcuv2"
check-pin-use = false
"#,
    );
    let sources = SettingsSources {
        file: Some(file.path().to_path_buf()),
        env: Some(HashMap::from([
            ("FWCFG_BOARD".to_string(), "d1_mini".to_string()),
            ("FWCFG_FRAMEWORK".to_string(), "arduino".to_string()),
        ])),
        flags: vec![("check-pin-use".to_string(), "true".to_string())],
    };
    let resolved = load(&sources).unwrap();

    assert_eq!(resolved.settings.target_platform, TargetPlatform::Esp8266);
    assert_eq!(resolved.settings.board, "d1_mini");
    assert_eq!(resolved.settings.framework, Some(Framework::Arduino));
    assert!(resolved.settings.check_pin_use);

    assert_eq!(resolved.provenance.get("target-platform"), Some(&Scope::File));
    assert_eq!(resolved.provenance.get("board"), Some(&Scope::Env));
    assert_eq!(resolved.provenance.get("check-pin-use"), Some(&Scope::Flags));
    assert_eq!(resolved.provenance.get("build-path"), Some(&Scope::Defaults));

    let target = resolved.settings.target().unwrap();
    assert_eq!(target.platform, TargetPlatform::Esp8266);
    assert_eq!(target.variant, None);
}

#[test]
fn unknown_file_keys_are_rejected_with_the_file_name() {
    let file = settings_file("bord = \"esp32dev\"\n");
    let sources = SettingsSources {
        file: Some(file.path().to_path_buf()),
        env: Some(HashMap::new()),
        flags: Vec::new(),
    };
    let err = load(&sources).unwrap_err();
    let chain = format!("{err:#}");
    assert!(chain.contains("checking settings file"), "{chain}");
    assert!(chain.contains("Settings schema validation failed"), "{chain}");
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let sources = SettingsSources {
        file: Some(dir.path().join("absent.toml")),
        env: Some(HashMap::new()),
        flags: Vec::new(),
    };
    let err = load(&sources).unwrap_err();
    assert!(err.to_string().starts_with("reading settings file"), "{err}");
}
