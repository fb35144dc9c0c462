// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Validators as data.
//!
//! A [`Validator`] is a tree of variants interpreted by [`Validator::validate`].
//! Leaves delegate to [`crate::primitives`]; combinators splice their path
//! segment into the errors of the values they descend into.

use std::fmt;
use std::sync::Arc;

use fw_codegen::CppType;

use crate::context::{Esp32Variant, Framework, TargetPlatform, ValidationContext};
use crate::error::{Invalid, MultipleInvalid};
use crate::ids::{validate_id_name, Id};
use crate::pins::PinSchema;
use crate::primitives::{self, Folding};
use crate::schema::{Schema, TypedSchema};
use crate::time::{parse_time_period, TimePeriod, TimeUnit};
use crate::units::{parse_quantity, Quantity};
use crate::value::{ConfigMap, ConfigValue, Lambda};
use crate::{config_path, final_validate, pins, registry};

pub type ValidationResult = Result<ConfigValue, MultipleInvalid>;

type CustomFn = dyn Fn(&ConfigValue, &mut ValidationContext) -> ValidationResult + Send + Sync;

/// A named validator implemented in Rust, for checks the data variants cannot express.
#[derive(Clone)]
pub struct CustomValidator {
    name: &'static str,
    func: Arc<CustomFn>,
}

impl CustomValidator {
    pub fn new<F>(name: &'static str, func: F) -> Self
    where
        F: Fn(&ConfigValue, &mut ValidationContext) -> ValidationResult + Send + Sync + 'static,
    {
        Self {
            name,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for CustomValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomValidator({})", self.name)
    }
}

impl PartialEq for CustomValidator {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.func, &other.func)
    }
}

/// Cross-key invariants over a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRule {
    AtMostOne,
    AtLeastOne,
    ExactlyOne,
    NoneOrAll,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    /// Accept anything unchanged.
    Valid,
    /// Always fail with this message.
    Invalid(String),
    String,
    StringStrict,
    Boolean,
    Int,
    Float,
    HexInt,
    IntRange {
        min: Option<i64>,
        max: Option<i64>,
        min_included: bool,
        max_included: bool,
        hex: bool,
    },
    FloatRange {
        min: Option<f64>,
        max: Option<f64>,
        min_included: bool,
        max_included: bool,
    },
    Percentage {
        allow_negative: bool,
    },
    Quantity(Quantity),
    TimePeriod {
        unit: TimeUnit,
        positive: bool,
    },
    /// A positive millisecond period, or `never`.
    UpdateInterval,
    OneOf {
        options: Vec<ConfigValue>,
        folding: Folding,
        int: bool,
    },
    Enum {
        mapping: Vec<(String, String)>,
        folding: Folding,
    },
    Url,
    GitRef,
    VersionNumber,
    MacAddress,
    Hostname,
    DomainName,
    Ssid,
    ValidName,
    ColorTemperature,
    Icon,
    IdName,
    DeclareId(CppType),
    UseId(CppType),
    Lambda,
    ReturningLambda,
    Templatable(Box<Validator>),
    All(Vec<Validator>),
    Any(Vec<Validator>),
    EnsureList(Box<Validator>),
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    Range {
        min: Option<f64>,
        max: Option<f64>,
    },
    Schema(Box<Schema>),
    TypedSchema(Box<TypedSchema>),
    MaybeSimpleValue {
        schema: Box<Validator>,
        key: String,
    },
    KeyConstraint {
        rule: KeyRule,
        keys: Vec<String>,
    },
    OnlyOn(Vec<TargetPlatform>),
    OnlyOnVariant(Vec<Esp32Variant>),
    OnlyWithFramework(Vec<Framework>),
    RequiresComponent(String),
    /// Pick one entry of the named registry; `declare_type_id` adds a `type_id` declaration.
    RegistryEntry {
        registry: String,
        declare_type_id: bool,
    },
    Pin(PinSchema),
    /// Final-validate only: apply the inner validator to the fragment that declared this ID.
    IdDeclarationMatch(Box<Validator>),
    Custom(CustomValidator),
}

impl From<Schema> for Validator {
    fn from(schema: Schema) -> Self {
        Validator::Schema(Box::new(schema))
    }
}

impl From<TypedSchema> for Validator {
    fn from(schema: TypedSchema) -> Self {
        Validator::TypedSchema(Box::new(schema))
    }
}

impl From<CustomValidator> for Validator {
    fn from(c: CustomValidator) -> Self {
        Validator::Custom(c)
    }
}

fn leaf<T>(r: Result<T, Invalid>, wrap: impl FnOnce(T) -> ConfigValue) -> ValidationResult {
    r.map(wrap).map_err(MultipleInvalid::from)
}

fn fail(message: impl Into<String>) -> ValidationResult {
    Err(Invalid::new(message).into())
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

/// Reject names that collide with integrations in this build.
fn check_integration_clash(name: &str, ctx: &ValidationContext) -> Result<(), Invalid> {
    if ctx.is_loaded(name) {
        return Err(Invalid::new(format!(
            "ID '{name}' conflicts with the name of an integration, please use another ID name."
        )));
    }
    Ok(())
}

fn declare_id(ty: &CppType, value: &ConfigValue, ctx: &ValidationContext) -> ValidationResult {
    match value {
        ConfigValue::Null => Ok(ConfigValue::Id(Id::declaration(None, ty.clone()))),
        ConfigValue::Id(id) if id.is_declaration() => Ok(value.clone()),
        ConfigValue::Id(id) => Ok(ConfigValue::Id(Id::declaration(
            id.name().map(str::to_string),
            ty.clone(),
        ))),
        ConfigValue::Extend(name) => fail(format!(
            "Source for extension of ID '{name}' was not found."
        )),
        ConfigValue::Remove(Some(name)) => fail(format!(
            "Source for Removal of ID '{name}' was not found."
        )),
        other => {
            let name = primitives::string_strict(other)?;
            validate_id_name(&name)?;
            check_integration_clash(&name, ctx)?;
            Ok(ConfigValue::Id(Id::declaration(Some(name), ty.clone())))
        }
    }
}

fn use_id(ty: &CppType, value: &ConfigValue) -> ValidationResult {
    match value {
        ConfigValue::Null => Ok(ConfigValue::Id(Id::reference(None, ty.clone()))),
        ConfigValue::Id(id) => Ok(ConfigValue::Id(Id::reference(
            id.name().map(str::to_string),
            ty.clone(),
        ))),
        other => {
            let name = primitives::string_strict(other)?;
            validate_id_name(&name)?;
            Ok(ConfigValue::Id(Id::reference(Some(name), ty.clone())))
        }
    }
}

fn lambda(value: &ConfigValue) -> Result<Lambda, Invalid> {
    match value {
        ConfigValue::Lambda(l) => Ok(l.clone()),
        ConfigValue::String(s) => Ok(Lambda::new(s.clone())),
        other => Err(Invalid::new(format!(
            "This value must be a lambda, got {}",
            other.kind()
        ))),
    }
}

fn time_period(value: &ConfigValue, unit: TimeUnit, positive: bool) -> ValidationResult {
    let period = parse_time_period(value)?;
    if positive && period.is_negative() {
        return fail("Negative time periods are not allowed");
    }
    Ok(ConfigValue::TimePeriod(period.with_unit(unit)?))
}

fn length_of(value: &ConfigValue) -> Result<usize, Invalid> {
    match value {
        ConfigValue::String(s) => Ok(s.chars().count()),
        ConfigValue::Sequence(s) => Ok(s.len()),
        ConfigValue::Mapping(m) => Ok(m.len()),
        other => Err(Invalid::new(format!("{} has no length", other.kind()))),
    }
}

fn key_constraint(rule: KeyRule, keys: &[String], value: &ConfigValue) -> ValidationResult {
    let map = value
        .as_mapping()
        .ok_or_else(|| Invalid::new("expected dictionary"))?;
    let count = keys.iter().filter(|k| map.contains_key(k)).count();
    let names = keys.join(", ");
    let message = match rule {
        KeyRule::AtMostOne if count > 1 => format!("Cannot specify more than one of {names}."),
        KeyRule::AtLeastOne if count == 0 => format!("Must contain at least one of {names}."),
        KeyRule::ExactlyOne if count != 1 => format!("Must contain exactly one of {names}."),
        KeyRule::NoneOrAll if count != 0 && count != keys.len() => {
            format!("Must specify either none or all of {names}.")
        }
        _ => return Ok(value.clone()),
    };
    fail(message)
}

/// Validate `alternatives` in order, keeping the first success.
///
/// Side effects of failed branches are rolled back. When every branch fails the
/// error with the deepest path wins, ties going to the earliest branch.
fn any(alternatives: &[Validator], value: &ConfigValue, ctx: &mut ValidationContext) -> ValidationResult {
    let mut best: Option<MultipleInvalid> = None;
    for alt in alternatives {
        let cp = ctx.checkpoint();
        match alt.validate(value, ctx) {
            Ok(v) => return Ok(v),
            Err(e) => {
                ctx.rollback(cp);
                if best.as_ref().map_or(true, |b| e.depth() > b.depth()) {
                    best = Some(e);
                }
            }
        }
    }
    Err(best.unwrap_or_else(|| Invalid::new("no valid value").into()))
}

fn ensure_list(inner: &Validator, value: &ConfigValue, ctx: &mut ValidationContext) -> ValidationResult {
    let items: Vec<ConfigValue> = match value {
        ConfigValue::Null => Vec::new(),
        ConfigValue::Mapping(m) if m.is_empty() => Vec::new(),
        ConfigValue::Sequence(s) => s.clone(),
        other => vec![other.clone()],
    };
    let mut out = Vec::with_capacity(items.len());
    let mut errors: Option<MultipleInvalid> = None;
    for (i, item) in items.iter().enumerate() {
        match ctx.descend(i, |ctx| inner.validate(item, ctx)) {
            Ok(v) => out.push(v),
            Err(e) => {
                let e = e.prepend(&config_path![i]);
                match errors.as_mut() {
                    Some(all) => all.extend(e),
                    None => errors = Some(e),
                }
            }
        }
    }
    match errors {
        Some(e) => Err(e),
        None => Ok(ConfigValue::Sequence(out)),
    }
}

impl Validator {
    pub fn validate(&self, value: &ConfigValue, ctx: &mut ValidationContext) -> ValidationResult {
        match self {
            Validator::Valid => Ok(value.clone()),
            Validator::Invalid(msg) => fail(msg.clone()),
            Validator::String => leaf(primitives::string(value), ConfigValue::String),
            Validator::StringStrict => leaf(primitives::string_strict(value), ConfigValue::String),
            Validator::Boolean => leaf(primitives::boolean(value), ConfigValue::Bool),
            Validator::Int => leaf(primitives::int_(value), ConfigValue::Int),
            Validator::Float => leaf(primitives::float_(value), ConfigValue::Float),
            Validator::HexInt => leaf(primitives::int_(value), ConfigValue::HexInt),
            Validator::IntRange {
                min,
                max,
                min_included,
                max_included,
                hex,
            } => {
                let n = primitives::int_(value)?;
                primitives::check_range(n, *min, *max, *min_included, *max_included)?;
                Ok(if *hex {
                    ConfigValue::HexInt(n)
                } else {
                    ConfigValue::Int(n)
                })
            }
            Validator::FloatRange {
                min,
                max,
                min_included,
                max_included,
            } => {
                let n = primitives::float_(value)?;
                primitives::check_range(n, *min, *max, *min_included, *max_included)?;
                Ok(ConfigValue::Float(n))
            }
            Validator::Percentage { allow_negative } => leaf(
                primitives::percentage(value, *allow_negative),
                ConfigValue::Float,
            ),
            Validator::Quantity(q) => leaf(parse_quantity(*q, value), ConfigValue::Float),
            Validator::TimePeriod { unit, positive } => time_period(value, *unit, *positive),
            Validator::UpdateInterval => match value {
                ConfigValue::String(s) if s.eq_ignore_ascii_case("never") => {
                    Ok(ConfigValue::TimePeriod(TimePeriod::never()))
                }
                other => time_period(other, TimeUnit::Milliseconds, true),
            },
            Validator::OneOf {
                options,
                folding,
                int,
            } => Ok(primitives::one_of(value, options, *folding, *int)?),
            Validator::Enum { mapping, folding } => Ok(primitives::enum_(value, mapping, *folding)?),
            Validator::Url => leaf(primitives::url(value), ConfigValue::String),
            Validator::GitRef => leaf(primitives::git_ref(value), ConfigValue::String),
            Validator::VersionNumber => leaf(primitives::version_number(value), ConfigValue::String),
            Validator::MacAddress => leaf(primitives::mac_address(value), ConfigValue::String),
            Validator::Hostname => leaf(primitives::hostname(value), ConfigValue::String),
            Validator::DomainName => leaf(primitives::domain_name(value), ConfigValue::String),
            Validator::Ssid => leaf(primitives::ssid(value), ConfigValue::String),
            Validator::ValidName => leaf(primitives::valid_name(value), ConfigValue::String),
            Validator::ColorTemperature => {
                leaf(primitives::color_temperature(value), ConfigValue::Float)
            }
            Validator::Icon => leaf(primitives::icon(value), ConfigValue::String),
            Validator::IdName => {
                let name = primitives::string_strict(value)?;
                validate_id_name(&name)?;
                check_integration_clash(&name, ctx)?;
                Ok(ConfigValue::String(name))
            }
            Validator::DeclareId(ty) => declare_id(ty, value, ctx),
            Validator::UseId(ty) => use_id(ty, value),
            Validator::Lambda => leaf(lambda(value), ConfigValue::Lambda),
            Validator::ReturningLambda => {
                let l = lambda(value)?;
                if !l.source().contains("return") {
                    return fail(
                        "Lambda doesn't contain a 'return' statement, but the lambda is expected to return a value. \
                         Please make sure the lambda contains at least one return statement.",
                    );
                }
                Ok(ConfigValue::Lambda(l))
            }
            Validator::Templatable(inner) => match value {
                ConfigValue::Lambda(_) => Validator::Lambda.validate(value, ctx),
                other => inner.validate(other, ctx),
            },
            Validator::All(steps) => {
                let mut current = value.clone();
                for step in steps {
                    current = step.validate(&current, ctx)?;
                }
                Ok(current)
            }
            Validator::Any(alternatives) => any(alternatives, value, ctx),
            Validator::EnsureList(inner) => ensure_list(inner, value, ctx),
            Validator::Length { min, max } => {
                let n = length_of(value)?;
                if let Some(min) = min {
                    if n < *min {
                        return fail(format!("length of value must be at least {min}"));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return fail(format!("length of value must be at most {max}"));
                    }
                }
                Ok(value.clone())
            }
            Validator::Range { min, max } => {
                let n = primitives::float_(value)?;
                primitives::check_range(n, *min, *max, true, true)?;
                Ok(value.clone())
            }
            Validator::Schema(schema) => schema.validate(value, ctx),
            Validator::TypedSchema(schema) => schema.validate(value, ctx),
            Validator::MaybeSimpleValue { schema, key } => match value {
                ConfigValue::Mapping(_) => schema.validate(value, ctx),
                other => {
                    let mut wrapped = ConfigMap::new();
                    wrapped.insert(key.clone(), other.clone());
                    schema.validate(&ConfigValue::Mapping(wrapped), ctx)
                }
            },
            Validator::KeyConstraint { rule, keys } => key_constraint(*rule, keys, value),
            Validator::OnlyOn(platforms) => {
                if !platforms.contains(&ctx.target().platform) {
                    return fail(format!(
                        "This feature is only available on {}",
                        join(platforms)
                    ));
                }
                Ok(value.clone())
            }
            Validator::OnlyOnVariant(variants) => match ctx.target().variant {
                Some(v) if variants.contains(&v) => Ok(value.clone()),
                _ => fail(format!(
                    "This feature is only available on {}",
                    join(variants)
                )),
            },
            Validator::OnlyWithFramework(frameworks) => match ctx.target().framework {
                Some(f) if frameworks.contains(&f) => Ok(value.clone()),
                _ => fail(format!(
                    "This feature is only available with frameworks {}",
                    join(frameworks)
                )),
            },
            Validator::RequiresComponent(name) => {
                if !ctx.is_loaded(name) {
                    return fail(format!("This option requires component {name}"));
                }
                Ok(value.clone())
            }
            Validator::RegistryEntry {
                registry,
                declare_type_id,
            } => registry::validate_registry_entry(registry, *declare_type_id, value, ctx),
            Validator::Pin(schema) => pins::validate_pin(schema, value, ctx),
            Validator::IdDeclarationMatch(inner) => {
                final_validate::id_declaration_match(inner, value, ctx)
            }
            Validator::Custom(c) => (c.func)(value, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Target;
    use fw_codegen::esphome_ns;

    fn ctx() -> ValidationContext {
        ValidationContext::new(Target::new(TargetPlatform::Esp32, "esp32dev"))
    }

    fn s(v: &str) -> ConfigValue {
        ConfigValue::from(v)
    }

    #[test]
    fn int_range_with_hex_output() {
        let v = Validator::IntRange {
            min: Some(0),
            max: Some(0x7F),
            min_included: true,
            max_included: true,
            hex: true,
        };
        assert_eq!(v.validate(&s("0x3C"), &mut ctx()).unwrap(), ConfigValue::HexInt(0x3C));
        let err = v.validate(&ConfigValue::Int(200), &mut ctx()).unwrap_err();
        assert_eq!(err.to_string(), "value must be at most 127");
    }

    #[test]
    fn int_range_bounds_are_exact_near_the_i64_limits() {
        let v = Validator::IntRange {
            min: None,
            max: Some(i64::MAX - 1),
            min_included: true,
            max_included: true,
            hex: false,
        };
        assert!(v.validate(&ConfigValue::Int(i64::MAX), &mut ctx()).is_err());
        assert_eq!(
            v.validate(&ConfigValue::Int(i64::MAX - 1), &mut ctx()).unwrap(),
            ConfigValue::Int(i64::MAX - 1)
        );
    }

    #[test]
    fn all_pipes_and_any_fuses_deepest() {
        let v = Validator::All(vec![Validator::Int, Validator::Range { min: Some(1.0), max: None }]);
        assert!(v.validate(&ConfigValue::Int(0), &mut ctx()).is_err());
        assert_eq!(v.validate(&s("5"), &mut ctx()).unwrap(), ConfigValue::Int(5));

        let nested = Schema::new().required("x", Validator::Int);
        let any = Validator::Any(vec![Validator::Boolean, nested.into()]);
        let input: ConfigMap = [("x", s("nope"))].into_iter().collect();
        let err = any.validate(&ConfigValue::Mapping(input), &mut ctx()).unwrap_err();
        assert_eq!(err.errors()[0].path, config_path!["x"]);
    }

    #[test]
    fn ensure_list_wraps_and_indexes_errors() {
        let v = Validator::EnsureList(Box::new(Validator::Int));
        assert_eq!(
            v.validate(&ConfigValue::Int(3), &mut ctx()).unwrap(),
            ConfigValue::Sequence(vec![ConfigValue::Int(3)])
        );
        assert_eq!(v.validate(&ConfigValue::Null, &mut ctx()).unwrap(), ConfigValue::Sequence(vec![]));
        let err = v
            .validate(&ConfigValue::Sequence(vec![ConfigValue::Int(1), s("x")]), &mut ctx())
            .unwrap_err();
        assert_eq!(err.errors()[0].path, config_path![1usize]);
    }

    #[test]
    fn templatable_accepts_lambdas() {
        let v = Validator::Templatable(Box::new(Validator::Float));
        let lam = ConfigValue::Lambda(Lambda::new("return 1.0;"));
        assert_eq!(v.validate(&lam, &mut ctx()).unwrap(), lam);
        assert_eq!(v.validate(&ConfigValue::Int(2), &mut ctx()).unwrap(), ConfigValue::Float(2.0));
        let err = Validator::ReturningLambda
            .validate(&ConfigValue::Lambda(Lambda::new("id(x).turn_on();")), &mut ctx())
            .unwrap_err();
        assert!(err.to_string().contains("'return'"));
    }

    #[test]
    fn update_interval_accepts_never() {
        let v = Validator::UpdateInterval;
        let never = v.validate(&s("never"), &mut ctx()).unwrap();
        assert_eq!(never.as_time_period().unwrap().emit_value(), crate::time::NEVER_MS);
        let p = v.validate(&s("10s"), &mut ctx()).unwrap();
        assert_eq!(p.as_time_period().unwrap().emit_value(), 10_000);
        assert!(v.validate(&s("-1s"), &mut ctx()).is_err());
    }

    #[test]
    fn declare_id_rejects_dangling_sentinels() {
        let ty = esphome_ns().class_("Thing", &[]);
        let v = Validator::DeclareId(ty);
        let err = v.validate(&ConfigValue::Extend("s1".into()), &mut ctx()).unwrap_err();
        assert_eq!(err.to_string(), "Source for extension of ID 's1' was not found.");
        let id = v.validate(&s("thing_1"), &mut ctx()).unwrap();
        assert!(id.as_id().unwrap().is_manual());
        let auto = v.validate(&ConfigValue::Null, &mut ctx()).unwrap();
        assert!(!auto.as_id().unwrap().is_manual());
    }

    #[test]
    fn id_names_cannot_shadow_integrations() {
        let mut c = ctx();
        c.set_loaded(["uart"]);
        let err = Validator::IdName.validate(&s("uart"), &mut c).unwrap_err();
        assert!(err.to_string().contains("conflicts with the name of an integration"));
    }

    #[test]
    fn key_constraints() {
        let v = Validator::KeyConstraint {
            rule: KeyRule::ExactlyOne,
            keys: vec!["a".into(), "b".into()],
        };
        let both: ConfigMap = [("a", ConfigValue::Int(1)), ("b", ConfigValue::Int(2))].into_iter().collect();
        assert_eq!(
            v.validate(&both.into(), &mut ctx()).unwrap_err().to_string(),
            "Must contain exactly one of a, b."
        );
    }

    #[test]
    fn target_gating() {
        let v = Validator::OnlyOn(vec![TargetPlatform::Esp8266]);
        let err = v.validate(&ConfigValue::Bool(true), &mut ctx()).unwrap_err();
        assert_eq!(err.to_string(), "This feature is only available on esp8266");
        let v = Validator::OnlyOnVariant(vec![Esp32Variant::Esp32]);
        assert!(v.validate(&ConfigValue::Bool(true), &mut ctx()).is_ok());
        let v = Validator::OnlyWithFramework(vec![Framework::EspIdf]);
        assert!(v.validate(&ConfigValue::Bool(true), &mut ctx()).is_err());
    }

    #[test]
    fn maybe_simple_value_equals_wrapped_schema() {
        let schema: Validator = Schema::new()
            .required("level", Validator::Percentage { allow_negative: false })
            .into();
        let simple = Validator::MaybeSimpleValue {
            schema: Box::new(schema.clone()),
            key: "level".into(),
        };
        let wrapped: ConfigMap = [("level", s("40%"))].into_iter().collect();
        assert_eq!(
            simple.validate(&s("40%"), &mut ctx()).unwrap(),
            schema.validate(&wrapped.into(), &mut ctx()).unwrap()
        );
    }
}
