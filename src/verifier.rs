//! Verification orchestration
//!
//! `BeanVerifier` runs the phases of one verification in order:
//!
//! 1. apply customisations and register per-property factories
//! 2. register a factory for the bean itself, so self-referential beans can
//!    generate nested instances
//! 3. infer null/omitted behaviour, then validate it against the flags
//! 4. read/write round trips
//! 5. equality and hash code
//!
//! The first violation aborts the run. Each run gets a fresh `TestContext`,
//! and violations carry the seed that reproduces them.

use std::sync::Arc;

use log::{debug, info};

use crate::config::VerifierConfig;
use crate::context::TestContext;
use crate::customisation::{self, Customisation, Describe};
use crate::equals;
use crate::errors::VerifyResult;
use crate::factory::ValueFactory;
use crate::model::BeanDescription;
use crate::null_rules;
use crate::read_write;
use crate::registry::FactoryRegistry;

/// Counters from a successful verification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationStats {
    pub bean: String,
    pub seed: u64,
    /// Testable properties
    pub properties: usize,
    /// Beans round-tripped by the read/write checks
    pub round_trips: usize,
    /// Bean comparisons made by the equality checks
    pub comparisons: usize,
    /// Top-level structures generated
    pub structures: u64,
    /// Deepest value nesting reached
    pub max_depth: usize,
}

#[derive(Debug, Clone)]
pub struct BeanVerifier {
    config: VerifierConfig,
    registry: FactoryRegistry,
}

impl Default for BeanVerifier {
    fn default() -> Self {
        Self::new(VerifierConfig::default())
    }
}

impl BeanVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self::with_registry(config, FactoryRegistry::with_defaults())
    }

    pub fn with_registry(config: VerifierConfig, registry: FactoryRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn registry(&self) -> &FactoryRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FactoryRegistry {
        &mut self.registry
    }

    /// Register a value factory, self-testing it when configured to.
    ///
    /// The self-test runs with the factory already visible, so recursive
    /// factories can create values of their own type.
    pub fn register(&mut self, factory: ValueFactory) -> VerifyResult<()> {
        let mut ctx = self.context();
        ctx.register_factory(factory.clone())?;
        self.registry.register(factory);
        Ok(())
    }

    /// Make beans of this description available as property values
    pub fn register_bean(&mut self, description: BeanDescription) {
        self.registry.register_bean(Arc::new(description));
    }

    /// Verify a described bean
    pub fn verify(
        &self,
        description: &BeanDescription,
        customisations: &[Customisation],
    ) -> VerifyResult<VerificationStats> {
        let mut ctx = self.context();
        let seed = ctx.seed();
        info!("verifying {} (seed {})", description.name(), seed);
        self.run(&mut ctx, description, customisations).map_err(|error| {
            if error.is_violation() {
                error.annotate(&format!("reproduce with seed {}", seed))
            } else {
                error
            }
        })
    }

    /// Verify a type through its `Describe` implementation
    pub fn verify_type<T: Describe>(&self) -> VerifyResult<VerificationStats> {
        let description = T::describe()?;
        self.verify(&description, &T::customisations())
    }

    fn context(&self) -> TestContext {
        TestContext::with_registry(self.config.clone(), self.registry.clone())
    }

    fn run(
        &self,
        ctx: &mut TestContext,
        description: &BeanDescription,
        customisations: &[Customisation],
    ) -> VerifyResult<VerificationStats> {
        let mut customised = description.clone();
        customisation::apply(&mut customised, customisations)?;
        let customised = Arc::new(customised);
        let bean_type = customised.bean_type();

        for (property, factory) in customised.factory_overrides() {
            ctx.register_property_factory(bean_type, property, factory.clone())?;
        }
        if !ctx.registry().contains(bean_type) {
            ctx.registry_mut().register_bean(Arc::clone(&customised));
        }

        debug!("{}: inferring null behaviour", customised.name());
        let inferred = Arc::new(null_rules::infer(ctx, &customised)?);
        null_rules::validate(&inferred)?;

        let mut holder = inferred.create_holder();
        let properties = holder.testable_properties().len();

        debug!("{}: checking read/write round trips", inferred.name());
        let round_trips = read_write::verify(ctx, &mut holder)?;

        debug!("{}: checking equality", inferred.name());
        let comparisons = equals::verify(ctx, &mut holder)?;

        Ok(VerificationStats {
            bean: inferred.name().to_string(),
            seed: ctx.seed(),
            properties,
            round_trips,
            comparisons,
            structures: ctx.structures(),
            max_depth: ctx.max_depth_reached(),
        })
    }
}

/// Verify a described bean with the default configuration
pub fn verify(description: &BeanDescription, customisations: &[Customisation]) -> VerifyResult<VerificationStats> {
    BeanVerifier::default().verify(description, customisations)
}

/// Verify a type through its `Describe` implementation with the default configuration
pub fn verify_type<T: Describe>() -> VerifyResult<VerificationStats> {
    BeanVerifier::default().verify_type::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::VerifyError;
    use crate::model::NullBehaviour;
    use crate::value::ValueType;

    #[derive(Debug, Clone, Default, PartialEq, Hash)]
    struct Badge {
        holder: String,
        level: u32,
    }

    fn badge() -> BeanDescription {
        BeanDescription::builder::<Badge>("Badge")
            .constructor(|args| {
                Ok(Badge {
                    holder: args.require::<String>("holder")?,
                    level: args.get::<u32>("level")?.unwrap_or(1),
                })
            })
            .creator_parameter::<String>("holder")
            .creator_parameter::<u32>("level")
            .getter("holder", |b: &Badge| Some(b.holder.clone()))
            .getter("level", |b: &Badge| Some(b.level))
            .build()
            .unwrap()
    }

    fn verifier() -> BeanVerifier {
        BeanVerifier::new(VerifierConfig::default().with_seed(21).with_trials(25))
    }

    #[test]
    fn test_verify_reports_stats() {
        let stats = verifier().verify(&badge(), &[]).unwrap();
        assert_eq!(stats.bean, "Badge");
        assert_eq!(stats.seed, 21);
        assert_eq!(stats.properties, 2);
        assert!(stats.round_trips > 0);
        assert!(stats.comparisons > 0);
    }

    #[test]
    fn test_violation_names_seed() {
        let error = verifier()
            .verify(&badge(), &[Customisation::omitted_behaviour("level", NullBehaviour::Null)])
            .unwrap_err();
        assert!(error.is_violation());
        let message = error.to_string();
        assert!(message.starts_with("Badge.level omitted: expected NULL but observed VALUE"), "{}", message);
        assert!(message.ends_with("(reproduce with seed 21)"), "{}", message);
    }

    #[test]
    fn test_configuration_errors_are_not_annotated() {
        let error = verifier()
            .verify(&badge(), &[Customisation::ignore("colour")])
            .unwrap_err();
        assert!(matches!(error, VerifyError::Configuration(_)));
        assert!(!error.to_string().contains("seed"));
    }

    #[test]
    fn test_register_self_tests_factories() {
        let mut verifier = verifier();
        let broken = ValueFactory::new(3u32, 3u32, |_| 4u32);
        assert!(verifier.register(broken).is_err());
        assert!(verifier.registry().contains(ValueType::of::<u32>()));
    }

    #[derive(Debug, Clone, PartialEq, Hash)]
    struct Folder {
        name: String,
        parent: Option<Box<Folder>>,
    }

    #[test]
    fn test_register_accepts_recursive_factory() {
        let mut verifier = verifier();
        verifier
            .register(ValueFactory::from_fn(|ctx, channel| -> VerifyResult<Folder> {
                let name = ctx.create_typed::<String>(channel)?;
                let parent = if ctx.is_at_structural_depth() {
                    None
                } else {
                    Some(Box::new(ctx.create_typed::<Folder>(channel)?))
                };
                Ok(Folder { name, parent })
            }))
            .unwrap();
        assert!(verifier.registry().contains(ValueType::of::<Folder>()));
    }
}
