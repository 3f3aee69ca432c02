//! Factory registry
//!
//! Maps value types to their `ValueFactory`, with optional per-property
//! overrides keyed by owning bean type and property name. Lookup order is:
//! property override, exact type, then the registered lookup functions.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use rand::Rng;

use crate::context::TestContext;
use crate::errors::{VerifyError, VerifyResult};
use crate::factory::{Channel, ChannelSource, ValueFactory};
use crate::model::BeanDescription;
use crate::primitives;
use crate::value::{Value, ValueType};

/// Fallback resolver consulted when no factory is registered for a type
pub type Lookup = Arc<dyn Fn(ValueType) -> Option<ValueFactory> + Send + Sync>;

/// Longest RANDOM collection
pub const MAX_COLLECTION_LEN: usize = 3;

#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: HashMap<ValueType, ValueFactory>,
    property_factories: HashMap<(ValueType, String), ValueFactory>,
    lookups: Vec<Lookup>,
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<String> = self.factories.keys().map(|t| t.short_name()).collect();
        types.sort();
        f.debug_struct("FactoryRegistry")
            .field("types", &types)
            .field("property_overrides", &self.property_factories.len())
            .field("lookups", &self.lookups.len())
            .finish()
    }
}

impl FactoryRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the primitive catalog
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        primitives::register_primitives(&mut registry);
        registry
    }

    /// Register a factory, replacing any previous one for its type
    /// Register a factory, returning the one it replaces
    pub fn register(&mut self, factory: ValueFactory) -> Option<ValueFactory> {
        self.factories.insert(factory.value_type(), factory)
    }

    /// Undo a `register`, putting back whatever it replaced
    pub fn restore(&mut self, value_type: ValueType, previous: Option<ValueFactory>) {
        match previous {
            Some(factory) => {
                self.factories.insert(value_type, factory);
            }
            None => {
                self.factories.remove(&value_type);
            }
        }
    }

    /// Register a factory for one property of one bean type, returning the
    /// one it replaces
    pub fn register_property(
        &mut self,
        owner: ValueType,
        property: &str,
        factory: ValueFactory,
    ) -> Option<ValueFactory> {
        self.property_factories.insert((owner, property.to_string()), factory)
    }

    /// Undo a `register_property`
    pub fn restore_property(&mut self, owner: ValueType, property: &str, previous: Option<ValueFactory>) {
        let key = (owner, property.to_string());
        match previous {
            Some(factory) => {
                self.property_factories.insert(key, factory);
            }
            None => {
                self.property_factories.remove(&key);
            }
        }
    }

    pub fn clear_property_overrides(&mut self, owner: ValueType) {
        self.property_factories.retain(|(ty, _), _| *ty != owner);
    }

    /// Add a resolver for types without an explicit registration
    pub fn add_lookup<F>(&mut self, lookup: F)
    where
        F: Fn(ValueType) -> Option<ValueFactory> + Send + Sync + 'static,
    {
        self.lookups.push(Arc::new(lookup));
    }

    pub fn try_get(&self, value_type: ValueType) -> Option<ValueFactory> {
        if let Some(factory) = self.factories.get(&value_type) {
            return Some(factory.clone());
        }
        self.lookups.iter().find_map(|lookup| lookup(value_type))
    }

    pub fn get(&self, value_type: ValueType) -> VerifyResult<ValueFactory> {
        self.try_get(value_type)
            .ok_or_else(|| VerifyError::configuration(format!("no value factory registered for {}", value_type)))
    }

    pub fn for_property(&self, owner: ValueType, property: &str, value_type: ValueType) -> VerifyResult<ValueFactory> {
        match self.property_factories.get(&(owner, property.to_string())) {
            Some(factory) => Ok(factory.clone()),
            None => self.get(value_type),
        }
    }

    pub fn contains(&self, value_type: ValueType) -> bool {
        self.factories.contains_key(&value_type)
    }

    /// Explicitly registered types
    pub fn value_types(&self) -> Vec<ValueType> {
        self.factories.keys().copied().collect()
    }

    pub fn factories(&self) -> impl Iterator<Item = &ValueFactory> {
        self.factories.values()
    }

    /// Register `Vec<T>` built from the factory for `T`.
    ///
    /// PRIMARY and SECONDARY hold one element from the matching channel,
    /// RANDOM holds up to `MAX_COLLECTION_LEN`. At the structural depth
    /// every channel yields an empty vector.
    pub fn register_vec<T>(&mut self)
    where
        T: Any + fmt::Debug + PartialEq + Hash + Clone + Send + Sync,
    {
        self.register(ValueFactory::from_fn(|ctx, channel| -> VerifyResult<Vec<T>> {
            if ctx.is_at_structural_depth() {
                return Ok(Vec::new());
            }
            let len = match channel {
                Channel::Primary | Channel::Secondary => 1,
                Channel::Random => ctx.rng().gen_range(0..=MAX_COLLECTION_LEN),
            };
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                if let Some(item) = create_element::<T>(ctx, channel)? {
                    items.push(item);
                }
            }
            Ok(items)
        }));
    }

    /// Register `Option<T>`. RANDOM is `None` a quarter of the time and
    /// every channel is `None` at the structural depth.
    pub fn register_option<T>(&mut self)
    where
        T: Any + fmt::Debug + PartialEq + Hash + Clone + Send + Sync,
    {
        self.register(ValueFactory::from_fn(|ctx, channel| -> VerifyResult<Option<T>> {
            if ctx.is_at_structural_depth() {
                return Ok(None);
            }
            if channel == Channel::Random && ctx.chance(0.25) {
                return Ok(None);
            }
            create_element::<T>(ctx, channel)
        }));
    }

    /// Register a factory that builds beans from a description.
    ///
    /// Each value is built by a pooled holder, so a bean that contains
    /// itself reuses holders instead of allocating one per node. The
    /// description's own factory overrides are registered alongside.
    pub fn register_bean(&mut self, description: Arc<BeanDescription>) {
        let source = |channel: Channel| -> ChannelSource {
            let description = Arc::clone(&description);
            Arc::new(move |ctx: &mut TestContext| {
                ctx.with_pooled_holder(&description, |ctx, holder| {
                    holder.set_all_properties(ctx, channel, false)?;
                    holder.new_bean()
                })
            })
        };
        let factory = ValueFactory::from_sources(
            description.bean_type(),
            source(Channel::Primary),
            source(Channel::Secondary),
            source(Channel::Random),
        );
        for (property, factory) in description.factory_overrides() {
            self.register_property(description.bean_type(), property, factory.clone());
        }
        self.register(factory);
    }
}

fn create_element<T: Any + Clone>(ctx: &mut TestContext, channel: Channel) -> VerifyResult<Option<T>> {
    let value_type = ValueType::of::<T>();
    let element: Value = ctx.create(value_type, channel)?;
    element
        .cast::<T>()
        .map_err(|e| VerifyError::configuration(format!("factory for {}: {}", value_type, e)))
}
