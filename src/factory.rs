//! Value channels
//!
//! A `ValueFactory` is the value source for exactly one type. It exposes three
//! channels: a fixed PRIMARY value, a fixed SECONDARY value that differs from
//! it, and RANDOM values drawn from the context's engine.

use std::fmt;
use std::sync::Arc;

use rand_chacha::ChaCha8Rng;

use crate::context::TestContext;
use crate::errors::{VerifyError, VerifyResult};
use crate::value::{DynValue, Value, ValueType};

/// The three value sources every factory provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Primary,
    Secondary,
    Random,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Primary => write!(f, "PRIMARY"),
            Channel::Secondary => write!(f, "SECONDARY"),
            Channel::Random => write!(f, "RANDOM"),
        }
    }
}

/// Generator behind one channel
pub type ChannelSource = Arc<dyn Fn(&mut TestContext) -> VerifyResult<Value> + Send + Sync>;

/// Immutable source of PRIMARY, SECONDARY and RANDOM values for one type
#[derive(Clone)]
pub struct ValueFactory {
    value_type: ValueType,
    primary: ChannelSource,
    secondary: ChannelSource,
    random: ChannelSource,
    low_cardinality: bool,
}

impl fmt::Debug for ValueFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueFactory")
            .field("value_type", &self.value_type)
            .field("low_cardinality", &self.low_cardinality)
            .finish()
    }
}

impl ValueFactory {
    pub fn from_sources(
        value_type: ValueType,
        primary: ChannelSource,
        secondary: ChannelSource,
        random: ChannelSource,
    ) -> Self {
        Self {
            value_type,
            primary,
            secondary,
            random,
            low_cardinality: false,
        }
    }

    /// Factory with fixed primary/secondary values and a random generator
    pub fn new<T, F>(primary: T, secondary: T, random: F) -> Self
    where
        T: DynValue + Clone,
        F: Fn(&mut ChaCha8Rng) -> T + Send + Sync + 'static,
    {
        Self::from_sources(
            ValueType::of::<T>(),
            fixed(primary),
            fixed(secondary),
            Arc::new(move |ctx: &mut TestContext| Ok(Value::of(random(ctx.rng())))),
        )
    }

    /// Factory driven by one generator that sees the requested channel.
    ///
    /// Recursive and collection factories use this form, since they need the
    /// context to create nested values and to consult the structural depth.
    pub fn from_fn<T, F>(generate: F) -> Self
    where
        T: DynValue,
        F: Fn(&mut TestContext, Channel) -> VerifyResult<T> + Send + Sync + 'static,
    {
        let generate = Arc::new(generate);
        let source = |channel: Channel| -> ChannelSource {
            let generate = Arc::clone(&generate);
            Arc::new(move |ctx: &mut TestContext| generate(ctx, channel).map(Value::of))
        };
        Self::from_sources(
            ValueType::of::<T>(),
            source(Channel::Primary),
            source(Channel::Secondary),
            source(Channel::Random),
        )
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Types with too few distinct values to expect RANDOM to vary much
    pub fn is_low_cardinality(&self) -> bool {
        self.low_cardinality
    }

    pub fn low_cardinality(mut self) -> Self {
        self.low_cardinality = true;
        self
    }

    pub fn with_primary<T: DynValue + Clone>(&self, primary: T) -> Self {
        let mut derived = self.clone();
        derived.primary = fixed(primary);
        derived
    }

    pub fn with_secondary<T: DynValue + Clone>(&self, secondary: T) -> Self {
        let mut derived = self.clone();
        derived.secondary = fixed(secondary);
        derived
    }

    pub fn with_random<T, F>(&self, random: F) -> Self
    where
        T: DynValue,
        F: Fn(&mut ChaCha8Rng) -> T + Send + Sync + 'static,
    {
        let mut derived = self.clone();
        derived.random = Arc::new(move |ctx: &mut TestContext| Ok(Value::of(random(ctx.rng()))));
        derived
    }

    /// Create a value, tracking recursion depth in the context
    pub fn create(&self, ctx: &mut TestContext, channel: Channel) -> VerifyResult<Value> {
        ctx.create_with(self, channel)
    }

    /// Invoke the channel source directly. Depth accounting is the caller's job.
    pub(crate) fn generate(&self, ctx: &mut TestContext, channel: Channel) -> VerifyResult<Value> {
        match channel {
            Channel::Primary => (self.primary)(ctx),
            Channel::Secondary => (self.secondary)(ctx),
            Channel::Random => (self.random)(ctx),
        }
    }

    /// Invoke all three channels once and reject a malformed factory:
    /// every channel must yield a non-null instance of the declared type,
    /// and PRIMARY must differ from SECONDARY.
    pub fn self_test(&self, ctx: &mut TestContext) -> VerifyResult<()> {
        let primary = self.create(ctx, Channel::Primary)?;
        let secondary = self.create(ctx, Channel::Secondary)?;
        let random = self.create(ctx, Channel::Random)?;

        for &(channel, value) in &[
            (Channel::Primary, &primary),
            (Channel::Secondary, &secondary),
            (Channel::Random, &random),
        ] {
            match Value::value_type(value) {
                None => {
                    return Err(VerifyError::configuration(format!(
                        "factory for {} produced null on the {} channel",
                        self.value_type, channel
                    )))
                }
                Some(actual) if actual != self.value_type => {
                    return Err(VerifyError::configuration(format!(
                        "factory for {} produced a {} on the {} channel",
                        self.value_type, actual, channel
                    )))
                }
                Some(_) => {}
            }
        }

        if primary == secondary {
            return Err(VerifyError::configuration(format!(
                "factory for {} has equal PRIMARY and SECONDARY values: {:?}",
                self.value_type, primary
            )));
        }
        Ok(())
    }
}

fn fixed<T: DynValue + Clone>(value: T) -> ChannelSource {
    Arc::new(move |_ctx: &mut TestContext| Ok(Value::of(value.clone())))
}
