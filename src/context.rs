//! Execution context
//!
//! One `TestContext` exists per verification run and is passed explicitly to
//! every operation that generates values. It owns:
//!
//! - a ChaCha8 engine forked from a process-wide root generator, so
//!   concurrent runs never share a random stream
//! - the factory registry
//! - the recursion controller: a depth counter, a structure counter and the
//!   per-type holder pool used by self-referential beans
//!
//! Contexts are plain values. Nothing in here is thread-local, which makes
//! the engine reentrant: a nested verification simply uses its own context.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use log::{trace, warn};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::VerifierConfig;
use crate::errors::{VerifyError, VerifyResult};
use crate::factory::{Channel, ValueFactory};
use crate::holder::Holder;
use crate::model::BeanDescription;
use crate::pool::HolderPool;
use crate::registry::FactoryRegistry;
use crate::value::{DynValue, Value, ValueType};

/// Nesting allowed beyond the structural depth for leaf values of the
/// deepest structure. Anything deeper means the type graph never terminates.
pub const LEAF_HEADROOM: usize = 8;

lazy_static! {
    static ref ROOT_RNG: Mutex<ChaCha8Rng> = Mutex::new(ChaCha8Rng::from_entropy());
}

/// Fork a fresh seed from the process-wide root generator
fn fork_seed() -> u64 {
    let mut root = ROOT_RNG.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    root.next_u64()
}

/// Per-run mutable state for value generation
pub struct TestContext {
    config: VerifierConfig,
    registry: FactoryRegistry,
    rng: ChaCha8Rng,
    seed: u64,
    repeatable: bool,
    depth: usize,
    max_depth_reached: usize,
    structures: u64,
    sequence: u64,
    pool: HolderPool,
}

impl TestContext {
    /// Context with the default factory catalog
    pub fn new(config: VerifierConfig) -> Self {
        Self::with_registry(config, FactoryRegistry::with_defaults())
    }

    pub fn with_registry(config: VerifierConfig, registry: FactoryRegistry) -> Self {
        let seed = config.seed.unwrap_or_else(fork_seed);
        let repeatable = config.seed.is_some();
        Self {
            config,
            registry,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            repeatable,
            depth: 0,
            max_depth_reached: 0,
            structures: 0,
            sequence: 0,
            pool: HolderPool::new(),
        }
    }

    /// Replace this context's engine with one seeded from `seed`.
    ///
    /// The root generator and every other context are unaffected.
    pub fn set_repeatable(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.seed = seed;
        self.repeatable = true;
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn is_repeatable(&self) -> bool {
        self.repeatable
    }

    /// Derive an independent engine from this context's stream
    pub fn split_rng(&mut self) -> ChaCha8Rng {
        let mut child = ChaCha8Rng::seed_from_u64(self.rng.next_u64());
        child.set_stream(self.structures);
        child
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn trials(&self) -> usize {
        self.config.trials
    }

    pub fn structural_depth(&self) -> usize {
        self.config.structural_depth
    }

    pub fn set_structural_depth(&mut self, depth: usize) {
        self.config.structural_depth = depth;
    }

    pub fn registry(&self) -> &FactoryRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FactoryRegistry {
        &mut self.registry
    }

    /// Register a factory, self-testing it when configured to.
    ///
    /// The factory is registered before the self-test so that a recursive
    /// factory can create nested values of its own type. A factory that
    /// fails is withdrawn and the previous registration comes back.
    pub fn register_factory(&mut self, factory: ValueFactory) -> VerifyResult<()> {
        let value_type = factory.value_type();
        let previous = self.registry.register(factory.clone());
        if self.config.self_test_factories {
            if let Err(error) = factory.self_test(self) {
                self.registry.restore(value_type, previous);
                return Err(error);
            }
        }
        Ok(())
    }

    /// Register a factory for one property of `owner`, self-testing it the
    /// same way as `register_factory`
    pub fn register_property_factory(
        &mut self,
        owner: ValueType,
        property: &str,
        factory: ValueFactory,
    ) -> VerifyResult<()> {
        let previous = self.registry.register_property(owner, property, factory.clone());
        if self.config.self_test_factories {
            if let Err(error) = factory.self_test(self) {
                self.registry.restore_property(owner, property, previous);
                return Err(error);
            }
        }
        Ok(())
    }

    /// Current nesting depth of `create` calls
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Deepest nesting seen since the last reset
    pub fn max_depth_reached(&self) -> usize {
        self.max_depth_reached
    }

    /// True when depth-aware factories must stop recursing
    pub fn is_at_structural_depth(&self) -> bool {
        self.depth >= self.config.structural_depth
    }

    /// Number of top-level structures generated so far
    pub fn structures(&self) -> u64 {
        self.structures
    }

    /// Next value of a counter that restarts with every top-level structure
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub fn create(&mut self, value_type: ValueType, channel: Channel) -> VerifyResult<Value> {
        let factory = self.registry.get(value_type)?;
        self.create_with(&factory, channel)
    }

    /// Create a value and clone it out as `T`. Null is an error here.
    pub fn create_typed<T: DynValue + Clone>(&mut self, channel: Channel) -> VerifyResult<T> {
        let value_type = ValueType::of::<T>();
        let value = self.create(value_type, channel)?;
        value
            .cast::<T>()
            .map_err(|e| VerifyError::configuration(format!("factory for {}: {}", value_type, e)))?
            .ok_or_else(|| {
                VerifyError::configuration(format!(
                    "factory for {} produced null on the {} channel",
                    value_type, channel
                ))
            })
    }

    /// Create a value for a property, honouring per-property overrides
    pub fn create_for_property(
        &mut self,
        owner: ValueType,
        property: &str,
        value_type: ValueType,
        channel: Channel,
    ) -> VerifyResult<Value> {
        let factory = self.registry.for_property(owner, property, value_type)?;
        self.create_with(&factory, channel)
    }

    /// Run a factory under depth accounting.
    ///
    /// The transition from depth 0 to 1 begins a new structure. Depth is
    /// restored on every exit path, including a panicking factory, whose
    /// panic then continues.
    pub fn create_with(&mut self, factory: &ValueFactory, channel: Channel) -> VerifyResult<Value> {
        if self.depth >= self.config.structural_depth + LEAF_HEADROOM {
            return Err(VerifyError::configuration(format!(
                "generating {} exceeded depth {}; the type graph does not terminate \
                 (mark a recursive property nullable or make its factory depth-aware)",
                factory.value_type(),
                self.depth
            )));
        }

        self.depth += 1;
        if self.depth == 1 {
            self.begin_structure();
        }
        if self.depth > self.max_depth_reached {
            self.max_depth_reached = self.depth;
        }
        let result = panic::catch_unwind(AssertUnwindSafe(|| factory.generate(self, channel)));
        self.depth -= 1;
        match result {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Draw a RANDOM value that differs from every value in `avoid`.
    ///
    /// Gives up after `distinct_attempts` draws and returns the last one.
    /// Low-cardinality factories get a single draw.
    pub fn create_distinct(&mut self, factory: &ValueFactory, avoid: &[Value]) -> VerifyResult<Value> {
        let attempts = if factory.is_low_cardinality() {
            1
        } else {
            self.config.distinct_attempts.max(1)
        };

        let mut value = Value::null();
        for _ in 0..attempts {
            value = self.create_with(factory, Channel::Random)?;
            if !avoid.contains(&value) {
                return Ok(value);
            }
        }
        if !factory.is_low_cardinality() {
            warn!(
                "no RANDOM {} distinct from {:?} after {} attempts",
                factory.value_type(),
                avoid,
                attempts
            );
        }
        Ok(value)
    }

    /// Draw a boolean that is true with probability `p`
    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.gen::<f64>() < p
    }

    /// Run `f` with a holder for `description` taken from the pool.
    ///
    /// The holder goes back to the pool whether `f` succeeds, fails or panics.
    pub fn with_pooled_holder<R>(
        &mut self,
        description: &Arc<BeanDescription>,
        f: impl FnOnce(&mut TestContext, &mut Holder) -> VerifyResult<R>,
    ) -> VerifyResult<R> {
        let mut holder = self.pool.acquire(description);
        let result = panic::catch_unwind(AssertUnwindSafe(|| f(self, &mut holder)));
        self.pool.release(holder);
        match result {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Holders ever allocated by the pool for a type
    pub fn pooled_holders(&self, bean_type: ValueType) -> usize {
        self.pool.allocated(bean_type)
    }

    /// Clear recursion state so an unrelated run starts clean.
    ///
    /// The registry and random stream are kept.
    pub fn reset(&mut self) {
        self.depth = 0;
        self.max_depth_reached = 0;
        self.structures = 0;
        self.sequence = 0;
        self.pool.clear();
    }

    fn begin_structure(&mut self) {
        self.structures += 1;
        self.sequence = 0;
        trace!("beginning structure #{}", self.structures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_fork_independent_streams() {
        let mut a = TestContext::new(VerifierConfig::default());
        let mut b = TestContext::new(VerifierConfig::default());
        assert_ne!(a.seed(), b.seed());
        let drawn_a: Vec<u64> = (0..4).map(|_| a.rng().next_u64()).collect();
        let drawn_b: Vec<u64> = (0..4).map(|_| b.rng().next_u64()).collect();
        assert_ne!(drawn_a, drawn_b);
    }

    #[test]
    fn test_repeatable_contexts_agree() {
        let mut a = TestContext::new(VerifierConfig::default());
        let mut b = TestContext::new(VerifierConfig::default());
        a.set_repeatable(1234);
        b.set_repeatable(1234);
        assert!(a.is_repeatable());
        for _ in 0..8 {
            assert_eq!(a.rng().next_u64(), b.rng().next_u64());
        }
    }

    #[test]
    fn test_configured_seed_is_used() {
        let config = VerifierConfig::default().with_seed(77);
        let mut a = TestContext::new(config.clone());
        let mut b = TestContext::new(config);
        assert_eq!(a.seed(), 77);
        assert_eq!(a.create_typed::<i64>(Channel::Random).unwrap(), b.create_typed::<i64>(Channel::Random).unwrap());
    }

    #[test]
    fn test_depth_returns_to_zero_and_structures_count() {
        let mut ctx = TestContext::new(VerifierConfig::default());
        ctx.create_typed::<String>(Channel::Primary).unwrap();
        ctx.create_typed::<String>(Channel::Random).unwrap();
        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.structures(), 2);
        assert_eq!(ctx.max_depth_reached(), 1);
    }

    #[test]
    fn test_nested_creation_is_one_structure() {
        let mut ctx = TestContext::new(VerifierConfig::default());
        ctx.registry_mut().register_vec::<String>();
        let list = ctx.create_typed::<Vec<String>>(Channel::Primary).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(ctx.structures(), 1);
        assert_eq!(ctx.max_depth_reached(), 2);
    }

    #[test]
    fn test_sequence_restarts_per_structure() {
        let mut ctx = TestContext::new(VerifierConfig::default());
        ctx.registry_mut().register(ValueFactory::from_fn(|ctx, _channel| Ok(ctx.next_sequence())));

        assert_eq!(ctx.create_typed::<u64>(Channel::Random).unwrap(), 1);
        assert_eq!(ctx.create_typed::<u64>(Channel::Random).unwrap(), 1);
    }

    #[test]
    fn test_depth_restored_after_error() {
        let mut ctx = TestContext::new(VerifierConfig::default());
        ctx.registry_mut().register(ValueFactory::from_fn(|_ctx, _channel| -> VerifyResult<u8> {
            Err(VerifyError::configuration("broken"))
        }));
        assert!(ctx.create_typed::<u8>(Channel::Primary).is_err());
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_unregistered_type_is_a_configuration_error() {
        #[derive(Debug, Clone, PartialEq, Hash)]
        struct Unknown;
        let mut ctx = TestContext::new(VerifierConfig::default());
        assert!(matches!(ctx.create_typed::<Unknown>(Channel::Primary), Err(VerifyError::Configuration(_))));
    }

    #[derive(Debug, Clone, PartialEq, Hash)]
    struct Chain {
        tag: u32,
        link: Option<Box<Chain>>,
    }

    impl Chain {
        fn len(&self) -> usize {
            1 + self.link.as_ref().map_or(0, |link| link.len())
        }
    }

    #[test]
    fn test_recursive_factory_registers_through_self_test() {
        let mut ctx = TestContext::new(VerifierConfig::default().with_structural_depth(3));
        ctx.register_factory(ValueFactory::from_fn(|ctx, channel| -> VerifyResult<Chain> {
            let tag = ctx.create_typed::<u32>(channel)?;
            let link = if ctx.is_at_structural_depth() {
                None
            } else {
                Some(Box::new(ctx.create_typed::<Chain>(channel)?))
            };
            Ok(Chain { tag, link })
        }))
        .unwrap();
        assert!(ctx.registry().contains(ValueType::of::<Chain>()));
        assert_eq!(ctx.create_typed::<Chain>(Channel::Secondary).unwrap().len(), 3);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_failed_registration_restores_previous_factory() {
        let mut ctx = TestContext::new(VerifierConfig::default());
        let error = ctx
            .register_factory(ValueFactory::new(3u32, 3u32, |_| 4u32))
            .unwrap_err();
        assert!(matches!(error, VerifyError::Configuration(_)));
        assert_eq!(ctx.create_typed::<u32>(Channel::Primary).unwrap(), 1);

        struct Owner;
        let owner = ValueType::of::<Owner>();
        let string = ValueType::of::<String>();
        assert!(ctx
            .register_property_factory(owner, "code", ValueFactory::new("A".to_string(), "A".to_string(), |_| "B".to_string()))
            .is_err());
        assert_eq!(
            ctx.create_for_property(owner, "code", string, Channel::Primary).unwrap(),
            Value::of("primary".to_string())
        );
    }

    #[test]
    fn test_depth_restored_after_panicking_factory() {
        let mut ctx = TestContext::new(VerifierConfig::default());
        ctx.registry_mut().register(ValueFactory::from_fn(|_ctx, _channel| -> VerifyResult<u8> {
            panic!("factory blew up")
        }));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| ctx.create_typed::<u8>(Channel::Random)));
        assert!(outcome.is_err());
        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.create_typed::<String>(Channel::Primary).unwrap(), "primary");
    }

    #[test]
    fn test_pooled_holder_returned_after_panic() {
        #[derive(Debug, Clone, Default, PartialEq, Hash)]
        struct Cell {
            size: u32,
        }
        let description = Arc::new(
            BeanDescription::builder::<Cell>("Cell")
                .default_constructor()
                .getter("size", |c: &Cell| Some(c.size))
                .build()
                .unwrap(),
        );
        let mut ctx = TestContext::new(VerifierConfig::default());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            ctx.with_pooled_holder(&description, |_ctx, _holder| -> VerifyResult<()> { panic!("mid-generation") })
        }));
        assert!(outcome.is_err());
        ctx.with_pooled_holder(&description, |_ctx, _holder| Ok(())).unwrap();
        assert_eq!(ctx.pooled_holders(ValueType::of::<Cell>()), 1);
    }

    #[test]
    fn test_split_rng_diverges_from_parent() {
        let mut ctx = TestContext::new(VerifierConfig::default());
        ctx.set_repeatable(5);
        let mut child = ctx.split_rng();
        assert_ne!(child.next_u64(), ctx.rng().next_u64());
    }
}
