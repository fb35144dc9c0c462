// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Short constructors for the validators component schemas use every day.
//!
//! ```
//! use fw_config_core::cv;
//!
//! let schema = cv::component_schema()
//!     .required("baud_rate", cv::positive_int())
//!     .optional_default("rx_buffer_size", 256, cv::int_range(Some(0), Some(4096)));
//! assert!(schema.validator("setup_priority").is_some());
//! ```

use fw_codegen::{esphome_ns, CppType};

use crate::context::{Esp32Variant, Framework, TargetPlatform};
use crate::error::Invalid;
use crate::pins::{PinMode, PinSchema};
use crate::primitives::Folding;
use crate::schema::{Schema, TypedSchema, CONF_ID};
use crate::time::TimeUnit;
use crate::units::Quantity;
use crate::validators::{CustomValidator, KeyRule, Validator};
use crate::value::ConfigValue;

pub const CONF_NAME: &str = "name";
pub const CONF_INTERNAL: &str = "internal";
pub const CONF_DISABLED_BY_DEFAULT: &str = "disabled_by_default";
pub const CONF_ICON: &str = "icon";
pub const CONF_ENTITY_CATEGORY: &str = "entity_category";
pub const CONF_SETUP_PRIORITY: &str = "setup_priority";
pub const CONF_UPDATE_INTERVAL: &str = "update_interval";

pub fn string() -> Validator {
    Validator::String
}

pub fn string_strict() -> Validator {
    Validator::StringStrict
}

pub fn boolean() -> Validator {
    Validator::Boolean
}

pub fn int_() -> Validator {
    Validator::Int
}

pub fn hex_int() -> Validator {
    Validator::HexInt
}

pub fn float() -> Validator {
    Validator::Float
}

pub fn int_range(min: Option<i64>, max: Option<i64>) -> Validator {
    Validator::IntRange {
        min,
        max,
        min_included: true,
        max_included: true,
        hex: false,
    }
}

pub fn hex_int_range(min: Option<i64>, max: Option<i64>) -> Validator {
    Validator::IntRange {
        min,
        max,
        min_included: true,
        max_included: true,
        hex: true,
    }
}

pub fn float_range(min: Option<f64>, max: Option<f64>) -> Validator {
    Validator::FloatRange {
        min,
        max,
        min_included: true,
        max_included: true,
    }
}

pub fn positive_int() -> Validator {
    int_range(Some(0), None)
}

pub fn positive_not_null_int() -> Validator {
    Validator::IntRange {
        min: Some(0),
        max: None,
        min_included: false,
        max_included: true,
        hex: false,
    }
}

pub fn uint8_t() -> Validator {
    int_range(Some(0), Some(u8::MAX as i64))
}

pub fn uint16_t() -> Validator {
    int_range(Some(0), Some(u16::MAX as i64))
}

pub fn uint32_t() -> Validator {
    int_range(Some(0), Some(u32::MAX as i64))
}

pub fn port() -> Validator {
    int_range(Some(1), Some(65535))
}

pub fn i2c_address() -> Validator {
    hex_int_range(Some(0), Some(0x7F))
}

pub fn positive_float() -> Validator {
    float_range(Some(0.0), None)
}

pub fn zero_to_one_float() -> Validator {
    float_range(Some(0.0), Some(1.0))
}

pub fn percentage() -> Validator {
    Validator::Percentage {
        allow_negative: false,
    }
}

pub fn possibly_negative_percentage() -> Validator {
    Validator::Percentage {
        allow_negative: true,
    }
}

pub fn frequency() -> Validator {
    Validator::Quantity(Quantity::Frequency)
}

pub fn distance() -> Validator {
    Validator::Quantity(Quantity::Distance)
}

pub fn resistance() -> Validator {
    Validator::Quantity(Quantity::Resistance)
}

pub fn current() -> Validator {
    Validator::Quantity(Quantity::Current)
}

pub fn voltage() -> Validator {
    Validator::Quantity(Quantity::Voltage)
}

pub fn capacitance() -> Validator {
    Validator::Quantity(Quantity::Capacitance)
}

pub fn temperature() -> Validator {
    Validator::Quantity(Quantity::Temperature)
}

pub fn time_period() -> Validator {
    Validator::TimePeriod {
        unit: TimeUnit::Milliseconds,
        positive: false,
    }
}

pub fn positive_time_period_microseconds() -> Validator {
    Validator::TimePeriod {
        unit: TimeUnit::Microseconds,
        positive: true,
    }
}

pub fn positive_time_period_milliseconds() -> Validator {
    Validator::TimePeriod {
        unit: TimeUnit::Milliseconds,
        positive: true,
    }
}

pub fn positive_time_period_seconds() -> Validator {
    Validator::TimePeriod {
        unit: TimeUnit::Seconds,
        positive: true,
    }
}

pub fn positive_time_period_minutes() -> Validator {
    Validator::TimePeriod {
        unit: TimeUnit::Minutes,
        positive: true,
    }
}

pub fn update_interval() -> Validator {
    Validator::UpdateInterval
}

/// Options compared exactly.
pub fn one_of<I, V>(options: I) -> Validator
where
    I: IntoIterator<Item = V>,
    V: Into<ConfigValue>,
{
    Validator::OneOf {
        options: options.into_iter().map(Into::into).collect(),
        folding: Folding::default(),
        int: false,
    }
}

/// String options compared after lowercasing, spaces folded to `_`.
pub fn one_of_lower<I, S>(options: I) -> Validator
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Validator::OneOf {
        options: options.into_iter().map(|s| ConfigValue::String(s.into())).collect(),
        folding: Folding {
            lower: true,
            upper: false,
            space: Some('_'),
        },
        int: false,
    }
}

pub fn one_of_int<I: IntoIterator<Item = i64>>(options: I) -> Validator {
    Validator::OneOf {
        options: options.into_iter().map(ConfigValue::Int).collect(),
        folding: Folding::default(),
        int: true,
    }
}

/// Keys folded to upper case, as C++ enum constants usually are.
pub fn enum_<'a, I>(mapping: I) -> Validator
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    enum_with(mapping, Folding {
        lower: false,
        upper: true,
        space: Some('_'),
    })
}

pub fn enum_lower<'a, I>(mapping: I) -> Validator
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    enum_with(mapping, Folding {
        lower: true,
        upper: false,
        space: Some('_'),
    })
}

fn enum_with<'a, I>(mapping: I, folding: Folding) -> Validator
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    Validator::Enum {
        mapping: mapping
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        folding,
    }
}

pub fn url() -> Validator {
    Validator::Url
}

pub fn git_ref() -> Validator {
    Validator::GitRef
}

pub fn version_number() -> Validator {
    Validator::VersionNumber
}

pub fn mac_address() -> Validator {
    Validator::MacAddress
}

pub fn hostname() -> Validator {
    Validator::Hostname
}

pub fn domain_name() -> Validator {
    Validator::DomainName
}

pub fn ssid() -> Validator {
    Validator::Ssid
}

pub fn valid_name() -> Validator {
    Validator::ValidName
}

pub fn icon() -> Validator {
    Validator::Icon
}

pub fn color_temperature() -> Validator {
    Validator::ColorTemperature
}

pub fn declare_id(ty: CppType) -> Validator {
    Validator::DeclareId(ty)
}

pub fn use_id(ty: CppType) -> Validator {
    Validator::UseId(ty)
}

pub fn lambda() -> Validator {
    Validator::Lambda
}

pub fn returning_lambda() -> Validator {
    Validator::ReturningLambda
}

pub fn templatable(inner: impl Into<Validator>) -> Validator {
    Validator::Templatable(Box::new(inner.into()))
}

pub fn all<I: IntoIterator<Item = Validator>>(validators: I) -> Validator {
    Validator::All(validators.into_iter().collect())
}

pub fn any<I: IntoIterator<Item = Validator>>(validators: I) -> Validator {
    Validator::Any(validators.into_iter().collect())
}

pub fn ensure_list(inner: impl Into<Validator>) -> Validator {
    Validator::EnsureList(Box::new(inner.into()))
}

pub fn length(min: Option<usize>, max: Option<usize>) -> Validator {
    Validator::Length { min, max }
}

pub fn range(min: Option<f64>, max: Option<f64>) -> Validator {
    Validator::Range { min, max }
}

/// Accept `key: value` shorthand for a mapping schema whose main option is `key`.
pub fn maybe_simple_value(schema: impl Into<Validator>, key: &str) -> Validator {
    Validator::MaybeSimpleValue {
        schema: Box::new(schema.into()),
        key: key.to_string(),
    }
}

pub fn typed_schema<I>(types: I) -> TypedSchema
where
    I: IntoIterator<Item = (&'static str, Schema)>,
{
    TypedSchema::new(types)
}

fn key_rule(rule: KeyRule, keys: &[&str]) -> Validator {
    Validator::KeyConstraint {
        rule,
        keys: keys.iter().map(|k| k.to_string()).collect(),
    }
}

pub fn has_at_most_one_key(keys: &[&str]) -> Validator {
    key_rule(KeyRule::AtMostOne, keys)
}

pub fn has_at_least_one_key(keys: &[&str]) -> Validator {
    key_rule(KeyRule::AtLeastOne, keys)
}

pub fn has_exactly_one_key(keys: &[&str]) -> Validator {
    key_rule(KeyRule::ExactlyOne, keys)
}

pub fn has_none_or_all_keys(keys: &[&str]) -> Validator {
    key_rule(KeyRule::NoneOrAll, keys)
}

pub fn only_on(platforms: &[TargetPlatform]) -> Validator {
    Validator::OnlyOn(platforms.to_vec())
}

pub fn only_on_variant(variants: &[Esp32Variant]) -> Validator {
    Validator::OnlyOnVariant(variants.to_vec())
}

pub fn only_with_framework(frameworks: &[Framework]) -> Validator {
    Validator::OnlyWithFramework(frameworks.to_vec())
}

pub fn only_with_arduino() -> Validator {
    only_with_framework(&[Framework::Arduino])
}

pub fn only_with_esp_idf() -> Validator {
    only_with_framework(&[Framework::EspIdf])
}

pub fn requires_component(name: &str) -> Validator {
    Validator::RequiresComponent(name.to_string())
}

pub fn invalid(message: &str) -> Validator {
    Validator::Invalid(message.to_string())
}

pub fn registry_entry(registry: &str) -> Validator {
    Validator::RegistryEntry {
        registry: registry.to_string(),
        declare_type_id: false,
    }
}

/// A list of registry items, each declaring the object it builds under `type_id`.
pub fn registry_list(registry: &str) -> Validator {
    ensure_list(Validator::RegistryEntry {
        registry: registry.to_string(),
        declare_type_id: true,
    })
}

pub fn id_declaration_match(inner: impl Into<Validator>) -> Validator {
    Validator::IdDeclarationMatch(Box::new(inner.into()))
}

/// Base for every component: an optional `setup_priority` override.
pub fn component_schema() -> Schema {
    Schema::new().optional(CONF_SETUP_PRIORITY, float())
}

pub fn polling_component_schema(default_update_interval: &str) -> Schema {
    component_schema().optional_default(
        CONF_UPDATE_INTERVAL,
        default_update_interval,
        update_interval(),
    )
}

fn entity_has_id_or_name(value: &ConfigValue) -> Result<(), Invalid> {
    let has_name = value.get(CONF_NAME).is_some_and(|v| !v.is_null());
    let manual_id = value
        .get(CONF_ID)
        .and_then(ConfigValue::as_id)
        .is_some_and(|id| id.is_manual());
    if has_name || manual_id {
        Ok(())
    } else {
        Err(Invalid::new("At least one of 'id:' or 'name:' is required!"))
    }
}

/// A string, or null for entities named after the device.
fn nullable_string() -> Validator {
    CustomValidator::new("nullable_string", |value, _ctx| match value {
        ConfigValue::Null => Ok(ConfigValue::Null),
        other => Ok(ConfigValue::String(crate::primitives::string(other)?)),
    })
    .into()
}

/// Keys shared by all entities (sensors, switches, ...).
pub fn entity_base_schema() -> Schema {
    Schema::new()
        .optional(CONF_NAME, nullable_string())
        .optional_default(CONF_INTERNAL, false, boolean())
        .optional_default(CONF_DISABLED_BY_DEFAULT, false, boolean())
        .optional(CONF_ICON, icon())
        .optional(
            CONF_ENTITY_CATEGORY,
            enum_lower([
                ("none", "ENTITY_CATEGORY_NONE"),
                ("config", "ENTITY_CATEGORY_CONFIG"),
                ("diagnostic", "ENTITY_CATEGORY_DIAGNOSTIC"),
            ]),
        )
        .post(CustomValidator::new("entity_id_or_name", |value, _ctx| {
            entity_has_id_or_name(value)?;
            Ok(value.clone())
        }))
}

pub fn gpio_pin_schema(mode: PinMode) -> Validator {
    Validator::Pin(PinSchema::new(mode))
}

pub fn gpio_input_pin_schema() -> Validator {
    gpio_pin_schema(PinMode::INPUT)
}

pub fn gpio_input_pullup_pin_schema() -> Validator {
    gpio_pin_schema(PinMode::INPUT_PULLUP)
}

pub fn gpio_output_pin_schema() -> Validator {
    gpio_pin_schema(PinMode::OUTPUT)
}

pub fn internal_gpio_input_pin_schema() -> Validator {
    Validator::Pin(PinSchema::new(PinMode::INPUT).internal())
}

pub fn internal_gpio_input_pullup_pin_schema() -> Validator {
    Validator::Pin(PinSchema::new(PinMode::INPUT_PULLUP).internal())
}

pub fn internal_gpio_output_pin_schema() -> Validator {
    Validator::Pin(PinSchema::new(PinMode::OUTPUT).internal())
}

/// `esphome::<name>` namespace handle, the usual first line of a component.
pub fn component_ns(name: &str) -> fw_codegen::Namespace {
    esphome_ns().namespace(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Target, ValidationContext};
    use crate::ids::Id;
    use crate::value::ConfigMap;

    fn ctx() -> ValidationContext {
        ValidationContext::new(Target::new(TargetPlatform::Esp8266, "d1_mini"))
    }

    #[test]
    fn entity_requires_id_or_name() {
        let ty = component_ns("sensor").class_("Sensor", &[]);
        let schema = entity_base_schema().generate_id(ty.clone());
        let err = schema
            .validate(&ConfigValue::Mapping(ConfigMap::new()), &mut ctx())
            .unwrap_err();
        assert_eq!(err.to_string(), "At least one of 'id:' or 'name:' is required!");

        let named: ConfigMap = [("name", ConfigValue::from("Living Room"))].into_iter().collect();
        let out = schema.validate(&named.into(), &mut ctx()).unwrap();
        assert_eq!(out.get(CONF_INTERNAL), Some(&ConfigValue::Bool(false)));

        let with_id: ConfigMap = [("id", ConfigValue::Id(Id::declaration(Some("t".into()), ty)))]
            .into_iter()
            .collect();
        assert!(schema.validate(&with_id.into(), &mut ctx()).is_ok());
    }

    #[test]
    fn polling_default_interval() {
        let out = polling_component_schema("60s")
            .validate(&ConfigValue::Mapping(ConfigMap::new()), &mut ctx())
            .unwrap();
        let period = out.get(CONF_UPDATE_INTERVAL).and_then(ConfigValue::as_time_period).unwrap();
        assert_eq!(period.total_milliseconds(), 60_000);
    }

    #[test]
    fn enum_and_i2c_address() {
        let v = enum_lower([("none", "N"), ("config", "C")]);
        assert_eq!(
            v.validate(&"Config".into(), &mut ctx()).unwrap(),
            ConfigValue::Enum {
                key: "config".into(),
                value: "C".into()
            }
        );
        assert_eq!(i2c_address().validate(&"0x76".into(), &mut ctx()).unwrap(), ConfigValue::HexInt(0x76));
        assert!(i2c_address().validate(&ConfigValue::Int(0x80), &mut ctx()).is_err());
    }

    #[test]
    fn framework_gate() {
        let mut c = ValidationContext::new(
            Target::new(TargetPlatform::Esp32, "esp32dev").with_framework(Framework::Arduino),
        );
        assert!(only_with_esp_idf().validate(&ConfigValue::Null, &mut c).is_err());
        assert!(only_with_arduino().validate(&ConfigValue::Null, &mut c).is_ok());
    }
}
