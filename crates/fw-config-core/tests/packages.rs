// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use fw_config_core::{
    config_path, do_packages_pass, load_yaml_str, merge_config, ConfigValue, LocalCheckouts, TOP_LEVEL,
};
use pretty_assertions::assert_eq;

fn yaml(s: &str) -> ConfigValue {
    load_yaml_str(s).unwrap()
}

fn expand(s: &str) -> ConfigValue {
    do_packages_pass(yaml(s), &LocalCheckouts::new()).unwrap().0
}

#[test]
fn package_sections_are_included() {
    let out = expand(
        r#"
esphome: {name: x, platform: p}
packages:
  net:
    wifi: {ssid: A, password: B}
"#,
    );
    assert_eq!(
        out,
        yaml("esphome: {name: x, platform: p}\nwifi: {ssid: A, password: B}")
    );
}

#[test]
fn top_level_overrides_package_values() {
    let out = expand(
        r#"
packages:
  net:
    wifi: {ssid: A, password: B}
wifi: {ssid: C}
"#,
    );
    assert_eq!(out, yaml("wifi: {ssid: C, password: B}"));
}

#[test]
fn list_entries_merge_by_id() {
    let out = expand(
        r#"
packages:
  sensors:
    sensor:
      - {id: s1, platform: p1, name: n1}
      - {id: s2, platform: p1, name: n2}
sensor:
  - {id: !extend s1, update_interval: 10s}
  - {id: !extend s2, name: n1}
  - {platform: p2, name: n2}
"#,
    );
    assert_eq!(
        out,
        yaml(
            r#"
sensor:
  - {id: s1, platform: p1, name: n1, update_interval: 10s}
  - {id: s2, platform: p1, name: n1}
  - {platform: p2, name: n2}
"#
        )
    );
}

#[test]
fn list_entries_removed_by_id() {
    let out = expand(
        r#"
packages:
  sensors:
    sensor:
      - {id: s1, platform: p1, name: n1}
      - {id: s2, platform: p1, name: n2}
sensor:
  - id: !remove s1
"#,
    );
    assert_eq!(out, yaml("sensor: [{id: s2, platform: p1, name: n2}]"));
}

#[test]
fn remove_from_a_later_package() {
    let out = expand(
        r#"
packages:
  sensors:
    sensor:
      - {id: s1, platform: p1}
      - {id: s2, platform: p1}
  trim:
    sensor:
      - id: !remove s1
"#,
    );
    assert_eq!(out, yaml("sensor: [{id: s2, platform: p1}]"));
}

#[test]
fn expanding_an_expanded_config_changes_nothing() {
    let src = r#"
packages:
  a:
    logger: {level: DEBUG}
    sensor: [{id: s1, platform: p1}]
sensor:
  - {id: !extend s1, name: n1}
wifi: {ssid: A}
"#;
    let once = expand(src);
    let twice = do_packages_pass(once.clone(), &LocalCheckouts::new()).unwrap().0;
    assert_eq!(twice, once);

    // Mappings are idempotent under self-merge.
    let m = yaml("wifi: {ssid: A, ap: {ssid: B}}\nlogger: {level: DEBUG}");
    assert_eq!(merge_config(m.clone(), m.clone()), m);
}

#[test]
fn swapping_packages_only_changes_colliding_keys() {
    let forward = r#"
packages:
  a: {logger: {level: DEBUG}, wifi: {ssid: A}}
  b: {logger: {level: INFO}, api: {port: 6053}}
"#;
    let backward = r#"
packages:
  b: {logger: {level: INFO}, api: {port: 6053}}
  a: {logger: {level: DEBUG}, wifi: {ssid: A}}
"#;
    let (f, f_trace) = do_packages_pass(yaml(forward), &LocalCheckouts::new()).unwrap();
    let (b, b_trace) = do_packages_pass(yaml(backward), &LocalCheckouts::new()).unwrap();

    assert_eq!(f.get("wifi"), b.get("wifi"));
    assert_eq!(f.get("api"), b.get("api"));
    assert_ne!(f.get("logger"), b.get("logger"));

    let level = config_path!["logger", "level"];
    assert_eq!(f_trace.winner_of(&level), Some("packages->b"));
    assert_eq!(b_trace.winner_of(&level), Some("packages->a"));
    assert_eq!(f_trace.collisions.len(), 1);
    assert!(f_trace.winner_of(&config_path!["wifi", "ssid"]).is_none());
    assert!(f_trace.collisions.iter().all(|c| c.layer != TOP_LEVEL));
}

#[test]
fn removing_a_missing_nested_key_leaves_nothing_behind() {
    let out = expand(
        r#"
packages:
  base:
    logger: {level: DEBUG}
logger:
  baud_rate: !remove
  hardware:
    uart: !remove
sensor:
  - id: s1
    platform: p1
    filters:
      - !remove
      - multiply: 2.0
"#,
    );
    assert_eq!(
        out,
        yaml(
            r#"
logger: {level: DEBUG, hardware: {}}
sensor:
  - {id: s1, platform: p1, filters: [{multiply: 2.0}]}
"#
        )
    );
}

#[test]
fn extend_only_reaches_entries_from_earlier_layers() {
    let out = expand(
        r#"
packages:
  base:
    sensor:
      - {id: s1, platform: p1, name: base}
sensor:
  - {id: s2, platform: p2, name: local}
  - {id: !extend s2, name: changed}
  - {id: !extend s1, name: extended}
"#,
    );
    let sensors = out.get("sensor").and_then(ConfigValue::as_sequence).unwrap();
    assert_eq!(sensors.len(), 3);
    assert_eq!(sensors[0], yaml("{id: s1, platform: p1, name: extended}"));
    assert_eq!(sensors[1], yaml("{id: s2, platform: p2, name: local}"));
    assert_eq!(sensors[2].get("id"), Some(&ConfigValue::Extend("s2".into())));
}
