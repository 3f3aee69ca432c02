//! Statistical checks on the value channels of every registered factory

use std::collections::HashSet;

use beanverify::{Channel, TestContext, Value, ValueFactory, ValueType, VerifierConfig};
use rand::Rng;

const DRAWS: usize = 100;
const MIN_DISTINCT: usize = 11;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn context() -> TestContext {
    let mut ctx = TestContext::new(VerifierConfig::default());
    ctx.set_repeatable(42);
    ctx.registry_mut().register_vec::<i32>();
    ctx.registry_mut().register_vec::<String>();
    ctx.registry_mut().register_option::<String>();
    ctx
}

fn check_channels(ctx: &mut TestContext, value_type: ValueType) {
    let factory = ctx.registry().get(value_type).unwrap();
    let primary = factory.create(ctx, Channel::Primary).unwrap();
    let secondary = factory.create(ctx, Channel::Secondary).unwrap();
    assert_ne!(primary, secondary, "{}: PRIMARY equals SECONDARY", value_type);
    assert_eq!(primary.value_type(), Some(value_type));
    assert_eq!(secondary.value_type(), Some(value_type));

    if factory.is_low_cardinality() {
        return;
    }

    let draws: Vec<Value> = (0..DRAWS)
        .map(|_| factory.create(ctx, Channel::Random).unwrap())
        .collect();
    let distinct: HashSet<&Value> = draws.iter().collect();
    assert!(
        distinct.len() >= MIN_DISTINCT,
        "{}: only {} distinct RANDOM values in {} draws",
        value_type,
        distinct.len(),
        DRAWS
    );
    assert!(draws.iter().any(|v| *v != primary), "{}: RANDOM never differs from PRIMARY", value_type);
    assert!(draws.iter().any(|v| *v != secondary), "{}: RANDOM never differs from SECONDARY", value_type);
}

#[test]
fn test_every_registered_factory_has_distinct_channels() {
    init_logging();
    let mut ctx = context();
    let types = ctx.registry().value_types();
    assert!(types.len() >= 10);
    for value_type in types {
        check_channels(&mut ctx, value_type);
    }
}

#[test]
fn test_every_registered_factory_passes_self_test() {
    init_logging();
    let mut ctx = context();
    let factories: Vec<ValueFactory> = ctx.registry().factories().cloned().collect();
    for factory in factories {
        factory.self_test(&mut ctx).unwrap();
    }
}

#[test]
fn test_register_factory_rejects_malformed_factories() {
    init_logging();
    let mut ctx = context();

    let equal_channels = ValueFactory::new(5i64, 5i64, |rng| rng.gen());
    let error = ctx.register_factory(equal_channels).unwrap_err();
    assert!(error.to_string().contains("equal PRIMARY and SECONDARY"), "{}", error);

    let null_random = ValueFactory::from_fn(|_ctx, channel| -> beanverify::VerifyResult<Option<u8>> {
        Ok(match channel {
            Channel::Primary => Some(1),
            Channel::Secondary => Some(2),
            Channel::Random => None,
        })
    });
    // Option<u8> is a value in its own right, so None is not null here
    ctx.register_factory(null_random).unwrap();
}

#[test]
fn test_repeatable_contexts_draw_the_same_values() {
    init_logging();
    let mut a = context();
    let mut b = context();
    for _ in 0..20 {
        assert_eq!(
            a.create_typed::<String>(Channel::Random).unwrap(),
            b.create_typed::<String>(Channel::Random).unwrap()
        );
    }
}
