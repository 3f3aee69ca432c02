//! Holders
//!
//! A `Holder` is the unit of work the verifiers mutate. It stages an
//! *expected* value per property (what was set), builds beans from that
//! state on demand and reads the *actual* values back. Expected values are
//! immutable `Value`s, so `copy()` yields a holder that shares no mutable
//! state with the original.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::TestContext;
use crate::errors::{BeanError, VerifyError, VerifyResult};
use crate::factory::Channel;
use crate::model::{BeanDescription, CreatorArgs, NullBehaviour, Observed};
use crate::value::{Value, ValueType};

/// How properties that are both creator parameters and writable are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    /// Pass them to the constructor or builder
    Creator,
    /// Construct with their initial value, then apply them through the setter
    Setters,
}

#[derive(Debug, Clone)]
pub struct Holder {
    description: Arc<BeanDescription>,
    expected: HashMap<String, Value>,
    initial: Option<HashMap<String, Value>>,
    preference: Preference,
}

impl Holder {
    pub fn new(description: Arc<BeanDescription>) -> Self {
        Self {
            description,
            expected: HashMap::new(),
            initial: None,
            preference: Preference::Creator,
        }
    }

    pub fn description(&self) -> &Arc<BeanDescription> {
        &self.description
    }

    pub fn bean_type(&self) -> ValueType {
        self.description.bean_type()
    }

    pub fn bean_name(&self) -> &str {
        self.description.name()
    }

    pub fn preference(&self) -> Preference {
        self.preference
    }

    pub fn set_preference(&mut self, preference: Preference) {
        self.preference = preference;
    }

    /// Independent clone of the staged state
    pub fn copy(&self) -> Holder {
        self.clone()
    }

    pub fn is_readable(&self, name: &str) -> bool {
        self.description.is_readable(name)
    }

    pub fn is_nullable(&self, name: &str) -> bool {
        self.description.property(name).map_or(false, |p| p.flags().nullable)
    }

    pub fn is_significant(&self, name: &str) -> bool {
        self.description.property(name).map_or(false, |p| p.flags().significant)
    }

    pub fn is_testable(&self, name: &str) -> bool {
        match self.description.property(name) {
            Some(property) => {
                !property.flags().ignored
                    && (self.description.is_creator_parameter(name) || self.description.is_writable(name))
            }
            None => false,
        }
    }

    /// Testable property names in model order
    pub fn testable_properties(&self) -> Vec<String> {
        self.description
            .property_names()
            .into_iter()
            .filter(|name| self.is_testable(name))
            .collect()
    }

    /// Properties that receive a value: every creator parameter, since the
    /// constructor may need even ignored ones, plus testable setters.
    fn staged_properties(&self) -> Vec<String> {
        self.description
            .property_names()
            .into_iter()
            .filter(|name| self.description.is_creator_parameter(name) || self.is_testable(name))
            .collect()
    }

    /// Restore every property to its PRIMARY value
    pub fn reset(&mut self, ctx: &mut TestContext) -> VerifyResult<()> {
        if self.initial.is_none() {
            let mut initial = HashMap::new();
            for name in self.staged_properties() {
                let value = self.draw(ctx, &name, Channel::Primary)?;
                initial.insert(name, value);
            }
            self.initial = Some(initial);
        }
        self.expected = self.initial.clone().unwrap_or_default();
        Ok(())
    }

    /// Stage a value from `channel` for every property.
    ///
    /// Nullable properties are left null once the context reaches its
    /// structural depth, which is what lets self-referential beans terminate.
    /// With `include_nulls`, nullable properties are also nulled at random.
    pub fn set_all_properties(
        &mut self,
        ctx: &mut TestContext,
        channel: Channel,
        include_nulls: bool,
    ) -> VerifyResult<()> {
        let null_probability = ctx.config().null_probability;
        for name in self.staged_properties() {
            let nullable = self.is_nullable(&name);
            let value = if nullable && ctx.is_at_structural_depth() {
                Value::null()
            } else if include_nulls && nullable && ctx.chance(null_probability) {
                Value::null()
            } else {
                self.draw(ctx, &name, channel)?
            };
            self.expected.insert(name, value);
        }
        Ok(())
    }

    /// Draw a value for one property
    pub fn draw(&self, ctx: &mut TestContext, name: &str, channel: Channel) -> VerifyResult<Value> {
        let value_type = self.property_type(name)?;
        ctx.create_for_property(self.bean_type(), name, value_type, channel)
    }

    /// PRIMARY, SECONDARY and distinct RANDOM values for a property.
    /// With `include_null`, the last slot is null.
    pub fn candidates(&self, ctx: &mut TestContext, name: &str, include_null: bool) -> VerifyResult<Vec<Value>> {
        let value_type = self.property_type(name)?;
        let factory = ctx.registry().for_property(self.bean_type(), name, value_type)?;
        let mut candidates = vec![
            ctx.create_with(&factory, Channel::Primary)?,
            ctx.create_with(&factory, Channel::Secondary)?,
        ];
        let random_candidates = ctx.config().random_candidates;
        for _ in 0..random_candidates {
            let value = ctx.create_distinct(&factory, &candidates)?;
            candidates.push(value);
        }
        if include_null {
            if random_candidates > 0 {
                if let Some(last) = candidates.last_mut() {
                    *last = Value::null();
                }
            } else {
                candidates.push(Value::null());
            }
        }
        Ok(candidates)
    }

    /// Stage a value and report whether the bean actually changed.
    ///
    /// For readable properties the bean is observed before and after; a
    /// setter that ignores or normalizes its input reports no change.
    pub fn set_property(&mut self, name: &str, value: Value) -> VerifyResult<bool> {
        if !self.is_readable(name) {
            let changed = self.expected.get(name) != Some(&value);
            self.put(name, value);
            return Ok(changed);
        }
        let before = self.read_actual(name)?;
        self.put(name, value);
        let after = self.read_actual(name)?;
        Ok(before != after)
    }

    /// Stage a value without observing the bean
    pub fn put(&mut self, name: &str, value: Value) {
        self.expected.insert(name.to_string(), value);
    }

    /// Leave the property out of construction entirely
    pub fn omit(&mut self, name: &str) {
        self.expected.remove(name);
    }

    /// Put back a value previously returned by `read_expected`
    pub fn restore(&mut self, name: &str, value: Option<Value>) {
        match value {
            Some(value) => self.put(name, value),
            None => self.omit(name),
        }
    }

    /// The staged value; `None` when omitted
    pub fn read_expected(&self, name: &str) -> Option<&Value> {
        self.expected.get(name)
    }

    /// Build a bean and read the property back; `None` when not readable
    pub fn read_actual(&self, name: &str) -> VerifyResult<Option<Value>> {
        if !self.is_readable(name) {
            return Ok(None);
        }
        let bean = self.new_bean()?;
        self.read_from(&bean, name).map(Some)
    }

    pub(crate) fn read_from(&self, bean: &Value, name: &str) -> VerifyResult<Value> {
        self.try_read_from(bean, name).map_err(|cause| {
            VerifyError::violation_caused_by(
                format!("{}.{}: could not read property of {:?}", self.bean_name(), name, bean),
                cause,
            )
        })
    }

    pub(crate) fn try_read_from(&self, bean: &Value, name: &str) -> Result<Value, BeanError> {
        let property = self
            .description
            .bean()
            .get(name)
            .ok_or_else(|| BeanError::NotReadable(name.to_string()))?;
        let instance = bean
            .as_dyn()
            .ok_or_else(|| BeanError::rejected(format!("cannot read `{}` from null", name)))?;
        property.read(instance)
    }

    /// Creator arguments for the current state
    pub(crate) fn creator_args(&self) -> CreatorArgs {
        let mut args = CreatorArgs::default();
        for property in self.description.creator().iter() {
            let name = property.name();
            let via_setter = self.preference == Preference::Setters && self.description.is_writable(name);
            let value = if via_setter {
                self.initial
                    .as_ref()
                    .and_then(|initial| initial.get(name))
                    .or_else(|| self.expected.get(name))
            } else {
                self.expected.get(name)
            };
            if let Some(value) = value {
                args.insert(name, value.clone());
            }
        }
        args
    }

    /// Build a bean from the staged state, reporting adapter failures as-is
    pub fn try_new_bean(&self) -> Result<Value, BeanError> {
        let mut bean = self.description.construct(&self.creator_args())?;
        for property in self.description.bean().iter() {
            let name = property.name();
            if !property.is_writable() || property.flags().ignored {
                continue;
            }
            if self.preference == Preference::Creator && self.description.is_creator_parameter(name) {
                continue;
            }
            if let Some(value) = self.expected.get(name) {
                property.write(&mut *bean, value)?;
            }
        }
        Ok(Value::from_boxed(bean))
    }

    pub fn new_bean(&self) -> VerifyResult<Value> {
        self.try_new_bean().map_err(|cause| {
            VerifyError::violation_caused_by(
                format!("{}: construction failed for {}", self.bean_name(), self.describe_state()),
                cause,
            )
        })
    }

    /// Check one property: the value read back must match what was staged,
    /// allowing for the property's declared or inferred null behaviour.
    pub fn verify(&self, name: &str) -> VerifyResult<()> {
        if !self.is_readable(name) {
            return Ok(());
        }
        let bean = self.new_bean()?;
        let actual = self.read_from(&bean, name)?;

        let staged = self.expected.get(name);
        if let Some(expected) = staged {
            if !expected.is_null() {
                if actual != *expected {
                    return Err(VerifyError::violation(format!(
                        "{}.{}: set to {:?} but read back {:?}",
                        self.bean_name(),
                        name,
                        expected,
                        actual
                    )));
                }
                return Ok(());
            }
        }

        let omitted = staged.is_none();
        let (behaviour, evidence, operation) = self.missing_behaviour(name, omitted);
        let consistent = match behaviour {
            Some(NullBehaviour::Null) | None => actual.is_null(),
            Some(NullBehaviour::Value) => match evidence {
                Some(Observed::Value(substitute)) => actual == *substitute,
                _ => !actual.is_null(),
            },
            Some(NullBehaviour::Variable) => !actual.is_null(),
            Some(NullBehaviour::VariableNullable)
            | Some(NullBehaviour::NotReadable)
            | Some(NullBehaviour::Error) => true,
        };
        if consistent {
            return Ok(());
        }

        let expected = match (behaviour, evidence) {
            (Some(NullBehaviour::Value), Some(Observed::Value(substitute))) => {
                format!("VALUE {:?}", substitute)
            }
            (Some(behaviour), _) => behaviour.to_string(),
            (None, _) => "null".to_string(),
        };
        Err(VerifyError::violation(format!(
            "{}.{}: {} should give {} but read back {:?}",
            self.bean_name(),
            name,
            operation,
            expected,
            actual
        )))
    }

    /// Verify every readable testable property
    pub fn verify_all(&self) -> VerifyResult<()> {
        for name in self.testable_properties() {
            self.verify(&name)?;
        }
        Ok(())
    }

    /// Behaviour that applies when `name` is staged as null
    pub fn null_behaviour(&self, name: &str) -> Option<NullBehaviour> {
        self.missing_behaviour(name, false).0
    }

    fn missing_behaviour(&self, name: &str, omitted: bool) -> (Option<NullBehaviour>, Option<&Observed>, &'static str) {
        let via_creator = self.description.is_creator_parameter(name)
            && (omitted || self.preference == Preference::Creator);
        if via_creator {
            if let Some(property) = self.description.creator().get(name) {
                return (property.omitted_behaviour(), property.omitted_value(), "omitted");
            }
        }
        match self.description.bean().get(name) {
            Some(property) => (property.null_behaviour(), property.null_value(), "set to null"),
            None => (None, None, "set to null"),
        }
    }

    fn property_type(&self, name: &str) -> VerifyResult<ValueType> {
        self.description
            .property(name)
            .map(|p| p.value_type())
            .ok_or_else(|| {
                VerifyError::configuration(format!("{} has no property `{}`", self.bean_name(), name))
            })
    }

    fn describe_state(&self) -> String {
        let mut parts: Vec<String> = self
            .description
            .property_names()
            .into_iter()
            .filter_map(|name| self.expected.get(&name).map(|v| format!("{}={:?}", name, v)))
            .collect();
        parts.sort();
        format!("{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifierConfig;

    #[derive(Debug, Clone, Default, PartialEq, Hash)]
    struct Temperature {
        unit: String,
        degrees: i32,
        note: Option<String>,
    }

    fn description() -> Arc<BeanDescription> {
        let description = BeanDescription::builder::<Temperature>("Temperature")
            .constructor(|args| {
                Ok(Temperature {
                    unit: args.require::<String>("unit")?,
                    ..Temperature::default()
                })
            })
            .creator_parameter::<String>("unit")
            .getter("unit", |t: &Temperature| Some(t.unit.clone()))
            .property(
                "degrees",
                |t: &Temperature| Some(t.degrees),
                |t: &mut Temperature, v: Option<i32>| {
                    // clamp to absolute zero
                    t.degrees = v.unwrap_or_default().max(-273);
                    Ok(())
                },
            )
            .property(
                "note",
                |t: &Temperature| t.note.clone(),
                |t: &mut Temperature, v: Option<String>| {
                    t.note = v;
                    Ok(())
                },
            )
            .build()
            .unwrap();
        Arc::new(description)
    }

    fn context() -> TestContext {
        TestContext::new(VerifierConfig::default().with_seed(3))
    }

    #[test]
    fn test_reset_stages_primary_values() {
        let mut ctx = context();
        let mut holder = description().create_holder();
        holder.reset(&mut ctx).unwrap();
        assert_eq!(holder.read_expected("unit"), Some(&Value::of("primary".to_string())));
        assert_eq!(holder.read_expected("degrees"), Some(&Value::of(1i32)));
        assert_eq!(holder.testable_properties(), vec!["unit", "degrees", "note"]);
        holder.verify_all().unwrap();
    }

    #[test]
    fn test_set_property_reports_normalized_writes_as_unchanged() {
        let mut ctx = context();
        let mut holder = description().create_holder();
        holder.reset(&mut ctx).unwrap();

        assert!(holder.set_property("degrees", Value::of(-400i32)).unwrap());
        assert!(!holder.set_property("degrees", Value::of(-500i32)).unwrap());
        assert!(holder.verify("degrees").is_err());
    }

    #[test]
    fn test_copy_is_independent() {
        let mut ctx = context();
        let mut holder = description().create_holder();
        holder.reset(&mut ctx).unwrap();
        let mut copy = holder.copy();
        copy.put("degrees", Value::of(20i32));
        assert_eq!(holder.read_expected("degrees"), Some(&Value::of(1i32)));
        assert_ne!(holder.new_bean().unwrap(), copy.new_bean().unwrap());
    }

    #[test]
    fn test_omitting_required_parameter_fails_construction() {
        let mut ctx = context();
        let mut holder = description().create_holder();
        holder.reset(&mut ctx).unwrap();
        let saved = holder.read_expected("unit").cloned();
        holder.omit("unit");
        assert_eq!(
            holder.try_new_bean().unwrap_err(),
            BeanError::MissingParameter("unit".to_string())
        );
        holder.restore("unit", saved);
        assert!(holder.try_new_bean().is_ok());
    }

    #[test]
    fn test_candidates() {
        let mut ctx = context();
        let holder = description().create_holder();
        let values = holder.candidates(&mut ctx, "note", true).unwrap();
        assert_eq!(values.len(), 5);
        assert_eq!(values[0], Value::of("primary".to_string()));
        assert_eq!(values[1], Value::of("secondary".to_string()));
        assert!(values[4].is_null());
        assert!(!values[2].is_null());
        assert_ne!(values[2], values[0]);
        assert_ne!(values[2], values[1]);
    }

    #[test]
    fn test_unknown_null_behaviour_expects_null() {
        let mut ctx = context();
        let mut holder = description().create_holder();
        holder.reset(&mut ctx).unwrap();
        holder.put("note", Value::null());
        holder.verify("note").unwrap();

        holder.put("degrees", Value::null());
        let error = holder.verify("degrees").unwrap_err();
        assert!(error.to_string().contains("Temperature.degrees: set to null"), "{}", error);
    }
}
