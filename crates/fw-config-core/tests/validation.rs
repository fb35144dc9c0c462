// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use fw_config_core::{
    check_pin_uses, config_path, cv, load_yaml_str, ConfigValue, Schema, Target, TargetPlatform,
    ValidationContext, Validator,
};
use pretty_assertions::assert_eq;

fn esp32() -> ValidationContext {
    ValidationContext::new(Target::new(TargetPlatform::Esp32, "esp32dev"))
}

fn yaml(s: &str) -> ConfigValue {
    load_yaml_str(s).unwrap()
}

fn output_switch() -> Schema {
    cv::component_schema().required("pin", cv::gpio_output_pin_schema())
}

#[test]
fn strapping_pin_warns() {
    let mut ctx = esp32();
    output_switch().validate(&yaml("pin: 0"), &mut ctx).unwrap();
    let warnings = ctx.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("GPIO0"));
    assert_eq!(warnings[0].path, config_path!["pin"]);
}

#[test]
fn strapping_warning_can_be_silenced() {
    let mut ctx = esp32();
    output_switch()
        .validate(&yaml("pin: {number: 0, ignore_strapping_warning: true}"), &mut ctx)
        .unwrap();
    assert!(ctx.warnings().is_empty());
}

#[test]
fn silencing_a_non_strapping_pin_fails() {
    let err = output_switch()
        .validate(&yaml("pin: {number: 5, ignore_strapping_warning: true}"), &mut esp32())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "GPIO5 is not a strapping pin @ pin->ignore_strapping_warning"
    );
}

#[test]
fn shared_pins_need_allow_other_uses() {
    let schema = Schema::new().required("a", cv::gpio_output_pin_schema()).required("b", cv::gpio_input_pin_schema());
    let mut ctx = esp32();
    schema.validate(&yaml("a: 4\nb: GPIO4"), &mut ctx).unwrap();
    let errors = check_pin_uses(ctx.pin_uses());
    assert_eq!(errors.len(), 2);

    let mut ctx = esp32();
    schema
        .validate(
            &yaml("a: {number: 4, allow_other_uses: true}\nb: {number: 4, allow_other_uses: true}"),
            &mut ctx,
        )
        .unwrap();
    assert!(check_pin_uses(ctx.pin_uses()).is_empty());
}

#[test]
fn schema_extend_is_associative() {
    let s = Schema::new().required("x", Validator::Int).optional("y", Validator::String);
    let a = Schema::new().optional("y", Validator::Boolean).optional("z", Validator::Float);
    let b = Schema::new().required("z", Validator::Int).post(cv::has_at_most_one_key(&["x", "y"]));

    let left = s.clone().extend(a.clone()).extend(b.clone());
    let right = s.extend(a.extend(b));
    assert_eq!(left, right);
    assert_eq!(left.validator("y"), Some(&Validator::Boolean));
    assert_eq!(left.validator("z"), Some(&Validator::Int));
}

#[test]
fn maybe_simple_value_collapses_scalars() {
    let inner = Schema::new()
        .required("value", cv::templatable(cv::positive_int()))
        .optional_default("restore", false, cv::boolean());
    let wrapped = cv::maybe_simple_value(inner.clone(), "value");

    let via_shorthand = wrapped.validate(&ConfigValue::Int(3), &mut esp32()).unwrap();
    let via_mapping = inner.validate(&yaml("value: 3"), &mut esp32()).unwrap();
    assert_eq!(via_shorthand, via_mapping);
}

#[test]
fn errors_carry_full_paths() {
    let filter = Schema::new().required("multiply", cv::float());
    let sensor = cv::entity_base_schema()
        .required("platform", cv::string())
        .optional("accuracy_decimals", cv::int_())
        .optional("filters", cv::ensure_list(filter));
    let err = sensor
        .validate(
            &yaml("platform: adc\nname: x\nfilters:\n  - multiply: 2\n  - multiply: two\n"),
            &mut esp32(),
        )
        .unwrap_err();
    assert_eq!(err.errors().len(), 1);
    assert_eq!(err.errors()[0].path, config_path!["filters", 1usize, "multiply"]);

    let err = sensor.validate(&yaml("platform: adc\nname: x\nacuracy_decimals: 2\n"), &mut esp32()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "[acuracy_decimals] is an invalid option. Did you mean [accuracy_decimals]? @ acuracy_decimals"
    );
}
