// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use fw_codegen::Statement;
use fw_config_core::{load_yaml_str, ConfigValue, Target, TargetPlatform};
use fw_core::{priority, Catalogue, Component, CoreError, Orchestrator};
use pretty_assertions::assert_eq;

const DEVICE: &str = r#"
esphome:
  name: living_room
  friendly_name: Living Room
logger:
  level: INFO
i2c:
  id: bus_a
mcp23017:
  - id: hub
switch:
  - platform: gpio
    id: relay
    name: Relay
    pin:
      mcp23017: hub
      number: 3
sensor:
  - platform: template
    id: temp
    name: Temperature
    lambda: 'return 21.5;'
    filters:
      - multiply: 2
interval:
  - interval: 10s
    then:
      - switch.toggle: relay
"#;

fn esp32() -> Target {
    Target::new(TargetPlatform::Esp32, "esp32dev")
}

fn compile(yaml: &str) -> Result<(Vec<String>, Vec<String>), CoreError> {
    let catalogue = Catalogue::builtin().unwrap();
    let (_, model) = Orchestrator::new(&catalogue, esp32()).compile(load_yaml_str(yaml).unwrap())?;
    Ok((model.render_globals(), model.render_main()))
}

fn position(lines: &[String], pred: impl Fn(&str) -> bool) -> usize {
    lines
        .iter()
        .position(|l| pred(l))
        .unwrap_or_else(|| panic!("no matching line in:\n{}", lines.join("\n")))
}

#[test]
fn device_compiles_with_hubs_before_their_users() {
    let (_, main) = compile(DEVICE).unwrap();
    let bus = position(&main, |l| l.starts_with("bus_a = new esphome::i2c::ArduinoI2CBus("));
    let hub = position(&main, |l| l.starts_with("hub = new esphome::mcp23017::MCP23017("));
    let hub_bus = position(&main, |l| l == "hub->set_i2c_bus(bus_a);");
    let pin_parent = position(&main, |l| l.ends_with("->set_parent(hub);"));
    let relay = position(&main, |l| l.starts_with("relay = new esphome::gpio::GPIOSwitch("));
    let interval = position(&main, |l| l.contains("new esphome::interval::IntervalTrigger("));
    assert!(bus < hub && hub < hub_bus && hub_bus < pin_parent);
    assert!(relay < interval, "the interval toggles the relay, so it is built later");
}

#[test]
fn higher_priorities_emit_first() {
    let (_, main) = compile(DEVICE).unwrap();
    let bus = position(&main, |l| l.starts_with("bus_a = new"));
    let core = position(&main, |l| l.starts_with("esphome::App.pre_setup("));
    let logger = position(&main, |l| l.ends_with("->pre_setup();"));
    let sensor = position(&main, |l| l.starts_with("temp = new"));
    assert!(bus < core && core < logger && logger < sensor);
}

#[test]
fn emission_is_deterministic() {
    assert_eq!(compile(DEVICE).unwrap(), compile(DEVICE).unwrap());
}

#[test]
fn generated_ids_and_defaults_are_filled_in() {
    let catalogue = Catalogue::builtin().unwrap();
    let validated = Orchestrator::new(&catalogue, esp32())
        .validate(load_yaml_str(DEVICE).unwrap())
        .unwrap();
    assert!(validated.ids.contains("logger_logger"));
    let hub = &validated.config.get("mcp23017").and_then(ConfigValue::as_sequence).unwrap()[0];
    assert_eq!(hub.get("address"), Some(&ConfigValue::HexInt(0x20)));
    assert_eq!(
        hub.get("i2c_id").and_then(ConfigValue::as_id).and_then(|id| id.name()),
        Some("bus_a")
    );
    assert_eq!(validated.codeowners.get("mcp23017"), Some(&vec!["@jesserockz".to_string()]));

    let printed = validated.printable(true);
    assert!(printed.get("logger").and_then(|l| l.get("id")).is_none());
}

#[test]
fn duplicate_ids_cite_the_first_declaration() {
    let err = compile(
        r#"
esphome:
  name: dup
uart:
  - id: bus
    baud_rate: 9600
    tx_pin: GPIO17
i2c:
  id: bus
"#,
    )
    .unwrap_err();
    let errors = err.invalid().unwrap().errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "ID 'bus' redefined! First declared at uart->0->id");
    assert_eq!(errors[0].path.to_string(), "i2c->0->id");
}

#[test]
fn references_must_resolve() {
    let err = compile(
        r#"
esphome:
  name: dangling
interval:
  - interval: 1s
    then:
      - switch.turn_on: missing
switch:
"#,
    )
    .unwrap_err();
    let errors = err.invalid().unwrap().errors();
    assert!(errors[0].message.starts_with("Couldn't find ID 'missing'"), "{}", errors[0].message);
}

#[test]
fn references_must_have_a_compatible_type() {
    let err = compile(
        r#"
esphome:
  name: mistyped
sensor:
  - platform: template
    id: temp
interval:
  - interval: 1s
    then:
      - switch.toggle: temp
"#,
    )
    .unwrap_err();
    let message = &err.invalid().unwrap().errors()[0].message;
    assert!(message.contains("doesn't inherit from esphome::switch_::Switch"), "{message}");
}

#[test]
fn pins_cannot_be_shared_without_allow_other_uses() {
    let shared = r#"
esphome:
  name: pins
switch:
  - platform: gpio
    id: a
    pin: GPIO4
  - platform: gpio
    id: b
    pin: GPIO4
"#;
    let err = compile(shared).unwrap_err();
    let errors = err.invalid().unwrap().errors();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.message == "Pin 4 is used in multiple places"));

    let allowed = shared.replace("pin: GPIO4", "pin: {number: GPIO4, allow_other_uses: true}");
    assert!(compile(&allowed).is_ok());

    let catalogue = Catalogue::builtin().unwrap();
    assert!(Orchestrator::new(&catalogue, esp32())
        .check_pin_use(false)
        .validate(load_yaml_str(shared).unwrap())
        .is_ok());
}

#[test]
fn expander_pins_are_counted_per_hub() {
    let yaml = r#"
esphome:
  name: expander
i2c:
mcp23017:
  - id: hub
switch:
  - platform: gpio
    id: a
    pin: {mcp23017: hub, number: 4}
  - platform: gpio
    id: b
    pin: GPIO4
"#;
    assert!(compile(yaml).is_ok());
}

#[test]
fn missing_esphome_section_is_reported() {
    let err = compile("logger:\n").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Validation failed:\n'esphome' section missing from configuration. Please make sure your configuration has an 'esphome:' line in it."
    );
}

#[test]
fn lambda_cycles_deadlock() {
    let mut catalogue = Catalogue::new();
    for name in ["ping", "pong"] {
        let schema = fw_config_core::Schema::new()
            .generate_id(fw_codegen::known::component())
            .required("lambda", fw_config_core::cv::lambda());
        catalogue
            .register(Component::new(name).with_schema(schema).with_to_code(priority::COMPONENT, |config, ctx| {
                let id = config.get("id").cloned().unwrap_or_default();
                ctx.new_pvariable(&id, Vec::new())?;
                Ok(())
            }))
            .unwrap();
    }
    let yaml = "ping:\n  id: ping_1\n  lambda: 'return id(pong_1);'\npong:\n  id: pong_1\n  lambda: 'return id(ping_1);'\n";
    let err = Orchestrator::new(&catalogue, esp32())
        .compile(load_yaml_str(yaml).unwrap())
        .unwrap_err();
    assert!(matches!(err, CoreError::Deadlock { .. }), "{err}");
}

#[test]
fn auto_loaded_sections_emit_before_their_loader() {
    let mut catalogue = Catalogue::new();
    for (name, loads) in [("display", &["spi"][..]), ("spi", &[][..])] {
        catalogue
            .register(Component::new(name).with_auto_load(loads).with_to_code(
                priority::COMPONENT,
                move |_, ctx| {
                    ctx.add(Statement::Comment(name.to_string()));
                    Ok(())
                },
            ))
            .unwrap();
    }
    let (validated, model) = Orchestrator::new(&catalogue, esp32())
        .compile(load_yaml_str("display:\n").unwrap())
        .unwrap();
    assert_eq!(validated.auto_loaded, vec!["spi".to_string()]);
    assert!(validated.config.get("spi").is_some());
    assert_eq!(model.render_main(), vec!["// spi".to_string(), "// display".to_string()]);
}
