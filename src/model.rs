//! Bean models
//!
//! A `BeanDescription` is the normalized view of one bean type that the
//! verifiers work against: a Creator model (the parameters consumed by a
//! constructor or builder), a Bean model (getters and setters) and the bound
//! operations that construct and access instances.
//!
//! Descriptions are produced by an explicit adapter, `BeanDescriptionBuilder`,
//! rather than by inspecting the type. Properties that share a name across
//! the two models are logically the same property.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::customisation::{self, Customisation};
use crate::errors::{guarded, BeanError, VerifyError, VerifyResult};
use crate::factory::ValueFactory;
use crate::holder::Holder;
use crate::value::{DynValue, Value, ValueType};

/// What happens when a property is set to null or omitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullBehaviour {
    /// The property reads back as null
    Null,
    /// The property reads back as a substituted non-null value
    Value,
    /// Construction or the setter fails
    Error,
    /// The property cannot be read afterwards
    NotReadable,
    /// A non-null value that differs between instances, e.g. a generated id.
    /// Only ever declared, never inferred.
    Variable,
    /// Like `Variable`, but the generated value may itself be null
    VariableNullable,
}

impl NullBehaviour {
    pub fn is_variable(self) -> bool {
        matches!(self, NullBehaviour::Variable | NullBehaviour::VariableNullable)
    }

    /// Whether an observed classification is consistent with this declaration
    pub fn accepts(self, observed: NullBehaviour) -> bool {
        match (self, observed) {
            (declared, observed) if declared == observed => true,
            (NullBehaviour::Variable, NullBehaviour::Value) => true,
            (NullBehaviour::VariableNullable, NullBehaviour::Value)
            | (NullBehaviour::VariableNullable, NullBehaviour::Null) => true,
            _ => false,
        }
    }
}

impl fmt::Display for NullBehaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NullBehaviour::Null => "NULL",
            NullBehaviour::Value => "VALUE",
            NullBehaviour::Error => "ERROR",
            NullBehaviour::NotReadable => "NOT_READABLE",
            NullBehaviour::Variable => "VARIABLE",
            NullBehaviour::VariableNullable => "VARIABLE_NULLABLE",
        };
        write!(f, "{}", name)
    }
}

/// Evidence captured while classifying null/omitted behaviour
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Value(Value),
    Error(BeanError),
}

/// Per-property switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyFlags {
    pub ignored: bool,
    pub not_null: bool,
    pub significant: bool,
    pub nullable: bool,
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self {
            ignored: false,
            not_null: false,
            significant: true,
            nullable: false,
        }
    }
}

pub type Getter = Arc<dyn Fn(&dyn DynValue) -> Result<Value, BeanError> + Send + Sync>;
pub type Setter = Arc<dyn Fn(&mut dyn DynValue, &Value) -> Result<(), BeanError> + Send + Sync>;
pub type Constructor = Arc<dyn Fn(&CreatorArgs) -> Result<Box<dyn DynValue>, BeanError> + Send + Sync>;
pub type BuilderRenderer = Arc<dyn Fn(&CreatorArgs) -> Result<String, BeanError> + Send + Sync>;

/// One named property of a model
#[derive(Clone)]
pub struct Property {
    name: String,
    value_type: ValueType,
    pub(crate) flags: PropertyFlags,
    pub(crate) null_behaviour: Option<NullBehaviour>,
    pub(crate) omitted_behaviour: Option<NullBehaviour>,
    pub(crate) null_declared: bool,
    pub(crate) omitted_declared: bool,
    pub(crate) null_value: Option<Observed>,
    pub(crate) omitted_value: Option<Observed>,
    getter: Option<Getter>,
    setter: Option<Setter>,
}

impl Property {
    fn new(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            flags: PropertyFlags::default(),
            null_behaviour: None,
            omitted_behaviour: None,
            null_declared: false,
            omitted_declared: false,
            null_value: None,
            omitted_value: None,
            getter: None,
            setter: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    /// Declared or inferred behaviour when set to null; `None` while unknown
    pub fn null_behaviour(&self) -> Option<NullBehaviour> {
        self.null_behaviour
    }

    /// Declared or inferred behaviour when omitted; `None` while unknown
    pub fn omitted_behaviour(&self) -> Option<NullBehaviour> {
        self.omitted_behaviour
    }

    pub fn null_value(&self) -> Option<&Observed> {
        self.null_value.as_ref()
    }

    pub fn omitted_value(&self) -> Option<&Observed> {
        self.omitted_value.as_ref()
    }

    pub fn is_readable(&self) -> bool {
        self.getter.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    pub(crate) fn read(&self, bean: &dyn DynValue) -> Result<Value, BeanError> {
        match &self.getter {
            Some(getter) => guarded(|| getter(bean)),
            None => Err(BeanError::NotReadable(self.name.clone())),
        }
    }

    pub(crate) fn write(&self, bean: &mut dyn DynValue, value: &Value) -> Result<(), BeanError> {
        match &self.setter {
            Some(setter) => guarded(|| setter(bean, value)),
            None => Err(BeanError::rejected(format!("property `{}` has no setter", self.name))),
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("flags", &self.flags)
            .field("null_behaviour", &self.null_behaviour)
            .field("omitted_behaviour", &self.omitted_behaviour)
            .field("readable", &self.is_readable())
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// Ordered collection of properties with unique names
#[derive(Debug, Clone, Default)]
pub struct Model {
    properties: Vec<Property>,
}

impl Model {
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.properties.iter().map(|p| p.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Values passed to a constructor or builder. Absent entries were omitted.
#[derive(Debug, Clone, Default)]
pub struct CreatorArgs {
    values: HashMap<String, Value>,
}

impl CreatorArgs {
    pub(crate) fn insert(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// True when the parameter was supplied, even if as null
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// The parameter as `V`; null and omitted both map to `None`
    pub fn get<V: DynValue + Clone>(&self, name: &str) -> Result<Option<V>, BeanError> {
        match self.values.get(name) {
            Some(value) => value.cast::<V>(),
            None => Ok(None),
        }
    }

    /// The parameter as `V`, failing when it is null or omitted
    pub fn require<V: DynValue + Clone>(&self, name: &str) -> Result<V, BeanError> {
        self.get::<V>(name)?
            .ok_or_else(|| BeanError::MissingParameter(name.to_string()))
    }
}

/// Normalized description of one bean type
#[derive(Clone)]
pub struct BeanDescription {
    name: String,
    bean_type: ValueType,
    creator: Model,
    bean: Model,
    construct: Constructor,
    render_builder: Option<BuilderRenderer>,
    factory_overrides: Vec<(String, ValueFactory)>,
}

impl fmt::Debug for BeanDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDescription")
            .field("name", &self.name)
            .field("creator", &self.creator)
            .field("bean", &self.bean)
            .field("has_builder", &self.render_builder.is_some())
            .finish()
    }
}

impl BeanDescription {
    pub fn builder<B: DynValue>(name: &str) -> BeanDescriptionBuilder<B> {
        BeanDescriptionBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bean_type(&self) -> ValueType {
        self.bean_type
    }

    pub fn creator(&self) -> &Model {
        &self.creator
    }

    pub fn bean(&self) -> &Model {
        &self.bean
    }

    pub(crate) fn creator_mut(&mut self) -> &mut Model {
        &mut self.creator
    }

    pub(crate) fn bean_mut(&mut self) -> &mut Model {
        &mut self.bean
    }

    pub fn has_builder(&self) -> bool {
        self.render_builder.is_some()
    }

    pub fn factory_overrides(&self) -> &[(String, ValueFactory)] {
        &self.factory_overrides
    }

    pub(crate) fn add_factory_override(&mut self, property: &str, factory: ValueFactory) {
        self.factory_overrides.retain(|(name, _)| name != property);
        self.factory_overrides.push((property.to_string(), factory));
    }

    /// Property names in model order: creator parameters first, then the
    /// remaining bean properties.
    pub fn property_names(&self) -> Vec<String> {
        let mut names = self.creator.names();
        for property in self.bean.iter() {
            if !self.creator.contains(property.name()) {
                names.push(property.name().to_string());
            }
        }
        names
    }

    /// The property with this name, preferring the Bean model
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.bean.get(name).or_else(|| self.creator.get(name))
    }

    pub fn is_creator_parameter(&self, name: &str) -> bool {
        self.creator.contains(name)
    }

    pub fn is_readable(&self, name: &str) -> bool {
        self.bean.get(name).map_or(false, Property::is_readable)
    }

    pub fn is_writable(&self, name: &str) -> bool {
        self.bean.get(name).map_or(false, Property::is_writable)
    }

    pub(crate) fn construct(&self, args: &CreatorArgs) -> Result<Box<dyn DynValue>, BeanError> {
        let construct = &self.construct;
        guarded(|| construct(args))
    }

    pub(crate) fn render_builder(&self, args: &CreatorArgs) -> Option<Result<String, BeanError>> {
        self.render_builder
            .as_ref()
            .map(|render| guarded(|| render(args)))
    }

    /// A fresh holder over this description
    pub fn create_holder(self: &Arc<Self>) -> Holder {
        Holder::new(Arc::clone(self))
    }
}

/// Typed adapter that binds a bean type's constructor and accessors
pub struct BeanDescriptionBuilder<B> {
    name: String,
    construct: Option<Constructor>,
    render_builder: Option<BuilderRenderer>,
    creator: Vec<Property>,
    bean: Vec<Property>,
    customisations: Vec<Customisation>,
    errors: Vec<String>,
    _bean: PhantomData<fn() -> B>,
}

impl<B: DynValue> BeanDescriptionBuilder<B> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            construct: None,
            render_builder: None,
            creator: Vec::new(),
            bean: Vec::new(),
            customisations: Vec::new(),
            errors: Vec::new(),
            _bean: PhantomData,
        }
    }

    /// Construct instances from creator parameters
    pub fn constructor<F>(mut self, construct: F) -> Self
    where
        F: Fn(&CreatorArgs) -> Result<B, BeanError> + Send + Sync + 'static,
    {
        if self.construct.is_some() {
            self.errors.push("more than one constructor or builder".to_string());
        }
        self.construct = Some(Arc::new(move |args: &CreatorArgs| {
            construct(args).map(|bean| Box::new(bean) as Box<dyn DynValue>)
        }));
        self
    }

    /// Construct instances with `Default::default()`
    pub fn default_constructor(self) -> Self
    where
        B: Default,
    {
        self.constructor(|_args| Ok(B::default()))
    }

    /// Construct instances through a builder object: `make` stages the
    /// creator parameters on a builder and `build` finishes it.
    pub fn builder<D, M, F>(mut self, make: M, build: F) -> Self
    where
        D: fmt::Debug + 'static,
        M: Fn(&CreatorArgs) -> Result<D, BeanError> + Send + Sync + 'static,
        F: Fn(D) -> Result<B, BeanError> + Send + Sync + 'static,
    {
        let make = Arc::new(make);
        let render = Arc::clone(&make);
        self = self.constructor(move |args| build(make(args)?));
        self.render_builder = Some(Arc::new(move |args: &CreatorArgs| {
            render(args).map(|builder| format!("{:?}", builder))
        }));
        self
    }

    /// Declare a parameter consumed by the constructor or builder
    pub fn creator_parameter<V: DynValue + Clone>(mut self, name: &str) -> Self {
        if self.creator.iter().any(|p| p.name == name) {
            self.errors.push(format!("creator parameter `{}` declared twice", name));
        } else {
            self.creator.push(Property::new(name, ValueType::of::<V>()));
        }
        self
    }

    pub fn getter<V, G>(self, name: &str, getter: G) -> Self
    where
        V: DynValue + Clone,
        G: Fn(&B) -> Option<V> + Send + Sync + 'static,
    {
        self.fallible_getter(name, move |bean: &B| Ok(getter(bean)))
    }

    /// Getter that may report the property as unreadable for some instances
    pub fn fallible_getter<V, G>(mut self, name: &str, getter: G) -> Self
    where
        V: DynValue + Clone,
        G: Fn(&B) -> Result<Option<V>, BeanError> + Send + Sync + 'static,
    {
        let erased: Getter = Arc::new(move |bean: &dyn DynValue| {
            let bean = bean
                .as_any()
                .downcast_ref::<B>()
                .ok_or_else(|| mismatch::<B>(bean.value_type()))?;
            getter(bean).map(Value::from_option)
        });
        let duplicate = match self.bean_property::<V>(name) {
            Some(property) if property.getter.is_some() => true,
            Some(property) => {
                property.getter = Some(erased);
                false
            }
            None => false,
        };
        if duplicate {
            self.errors.push(format!("getter for `{}` declared twice", name));
        }
        self
    }

    pub fn setter<V, S>(mut self, name: &str, setter: S) -> Self
    where
        V: DynValue + Clone,
        S: Fn(&mut B, Option<V>) -> Result<(), BeanError> + Send + Sync + 'static,
    {
        let erased: Setter = Arc::new(move |bean: &mut dyn DynValue, value: &Value| {
            let actual = bean.value_type();
            let bean = bean
                .as_any_mut()
                .downcast_mut::<B>()
                .ok_or_else(|| mismatch::<B>(actual))?;
            setter(bean, value.cast::<V>()?)
        });
        let duplicate = match self.bean_property::<V>(name) {
            Some(property) if property.setter.is_some() => true,
            Some(property) => {
                property.setter = Some(erased);
                false
            }
            None => false,
        };
        if duplicate {
            self.errors.push(format!("setter for `{}` declared twice", name));
        }
        self
    }

    /// Getter and setter in one call
    pub fn property<V, G, S>(self, name: &str, getter: G, setter: S) -> Self
    where
        V: DynValue + Clone,
        G: Fn(&B) -> Option<V> + Send + Sync + 'static,
        S: Fn(&mut B, Option<V>) -> Result<(), BeanError> + Send + Sync + 'static,
    {
        self.getter(name, getter).setter(name, setter)
    }

    /// Attach a customisation that travels with the description
    pub fn customise(mut self, customisation: Customisation) -> Self {
        self.customisations.push(customisation);
        self
    }

    pub fn build(self) -> VerifyResult<BeanDescription> {
        let mut errors = self.errors;
        for property in &self.bean {
            if let Some(parameter) = self.creator.iter().find(|p| p.name == property.name) {
                if parameter.value_type != property.value_type {
                    errors.push(format!(
                        "`{}` is a {} parameter but a {} property",
                        property.name, parameter.value_type, property.value_type
                    ));
                }
            }
        }
        let construct = match self.construct {
            Some(construct) => construct,
            None => {
                errors.push("no constructor or builder".to_string());
                return Err(configuration_error(&self.name, &errors));
            }
        };
        if !errors.is_empty() {
            return Err(configuration_error(&self.name, &errors));
        }

        let mut description = BeanDescription {
            name: self.name,
            bean_type: ValueType::of::<B>(),
            creator: Model { properties: self.creator },
            bean: Model { properties: self.bean },
            construct,
            render_builder: self.render_builder,
            factory_overrides: Vec::new(),
        };
        customisation::apply(&mut description, &self.customisations)?;
        Ok(description)
    }

    fn bean_property<V: DynValue>(&mut self, name: &str) -> Option<&mut Property> {
        let value_type = ValueType::of::<V>();
        let index = match self.bean.iter().position(|p| p.name == name) {
            Some(index) => index,
            None => {
                self.bean.push(Property::new(name, value_type));
                self.bean.len() - 1
            }
        };
        if self.bean[index].value_type != value_type {
            let message = format!(
                "`{}` declared as both {} and {}",
                name, self.bean[index].value_type, value_type
            );
            self.errors.push(message);
            return None;
        }
        Some(&mut self.bean[index])
    }
}

fn mismatch<B: DynValue>(actual: ValueType) -> BeanError {
    BeanError::TypeMismatch {
        expected: ValueType::of::<B>().short_name(),
        actual: actual.short_name(),
    }
}

fn configuration_error(name: &str, errors: &[String]) -> VerifyError {
    VerifyError::configuration(format!("cannot describe {}: {}", name, errors.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq, Hash)]
    struct Account {
        owner: String,
        balance: i64,
    }

    fn account_description() -> BeanDescription {
        BeanDescription::builder::<Account>("Account")
            .constructor(|args| {
                Ok(Account {
                    owner: args.require::<String>("owner")?,
                    balance: 0,
                })
            })
            .creator_parameter::<String>("owner")
            .getter("owner", |a: &Account| Some(a.owner.clone()))
            .property(
                "balance",
                |a: &Account| Some(a.balance),
                |a: &mut Account, v: Option<i64>| {
                    a.balance = v.unwrap_or_default();
                    Ok(())
                },
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_models_and_property_order() {
        let description = account_description();
        assert_eq!(description.name(), "Account");
        assert_eq!(description.creator().names(), vec!["owner"]);
        assert_eq!(description.bean().names(), vec!["owner", "balance"]);
        assert_eq!(description.property_names(), vec!["owner", "balance"]);
        assert!(description.is_creator_parameter("owner"));
        assert!(description.is_readable("owner"));
        assert!(!description.is_writable("owner"));
        assert!(description.is_writable("balance"));
    }

    #[test]
    fn test_construct_and_access() {
        let description = account_description();
        let mut args = CreatorArgs::default();
        args.insert("owner", Value::of("ann".to_string()));
        let mut bean = description.construct(&args).unwrap();

        let balance = description.bean().get("balance").unwrap();
        balance.write(&mut *bean, &Value::of(25i64)).unwrap();
        assert_eq!(balance.read(&*bean).unwrap(), Value::of(25i64));

        let owner = description.bean().get("owner").unwrap();
        assert_eq!(owner.read(&*bean).unwrap(), Value::of("ann".to_string()));
    }

    #[test]
    fn test_missing_required_parameter() {
        let description = account_description();
        let error = description.construct(&CreatorArgs::default()).unwrap_err();
        assert_eq!(error, BeanError::MissingParameter("owner".to_string()));
    }

    #[test]
    fn test_setter_rejects_wrong_value_type() {
        let description = account_description();
        let mut args = CreatorArgs::default();
        args.insert("owner", Value::of("ann".to_string()));
        let mut bean = description.construct(&args).unwrap();
        let balance = description.bean().get("balance").unwrap();
        let error = balance.write(&mut *bean, &Value::of("lots")).unwrap_err();
        assert!(matches!(error, BeanError::TypeMismatch { .. }));
    }

    #[test]
    fn test_build_without_constructor_fails() {
        let result = BeanDescription::builder::<Account>("Account")
            .getter("owner", |a: &Account| Some(a.owner.clone()))
            .build();
        assert!(matches!(result, Err(VerifyError::Configuration(_))));
    }

    #[test]
    fn test_conflicting_property_types_fail() {
        let result = BeanDescription::builder::<Account>("Account")
            .default_constructor()
            .creator_parameter::<i32>("owner")
            .getter("owner", |a: &Account| Some(a.owner.clone()))
            .build();
        let message = result.unwrap_err().to_string();
        assert!(message.contains("owner"), "{}", message);
    }

    #[test]
    fn test_builder_renders_builder_state() {
        #[derive(Debug)]
        struct AccountBuilder {
            owner: Option<String>,
        }

        let description = BeanDescription::builder::<Account>("Account")
            .builder(
                |args| Ok(AccountBuilder { owner: args.get::<String>("owner")? }),
                |b: AccountBuilder| {
                    Ok(Account {
                        owner: b.owner.unwrap_or_default(),
                        balance: 0,
                    })
                },
            )
            .creator_parameter::<String>("owner")
            .build()
            .unwrap();

        assert!(description.has_builder());
        let mut args = CreatorArgs::default();
        args.insert("owner", Value::of("bo".to_string()));
        let rendered = description.render_builder(&args).unwrap().unwrap();
        assert!(rendered.contains("bo"));
    }

    #[test]
    fn test_null_behaviour_acceptance() {
        assert!(NullBehaviour::Variable.accepts(NullBehaviour::Value));
        assert!(!NullBehaviour::Variable.accepts(NullBehaviour::Null));
        assert!(NullBehaviour::VariableNullable.accepts(NullBehaviour::Null));
        assert!(NullBehaviour::VariableNullable.accepts(NullBehaviour::Value));
        assert!(!NullBehaviour::Null.accepts(NullBehaviour::Error));
        assert!(NullBehaviour::Error.accepts(NullBehaviour::Error));
        assert_eq!(NullBehaviour::VariableNullable.to_string(), "VARIABLE_NULLABLE");
    }
}
