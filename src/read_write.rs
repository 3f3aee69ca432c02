//! Read/write verification
//!
//! Round-trips values through the bean: whatever is set (through a
//! constructor, builder or setter) must read back unchanged, unless the
//! property's null behaviour says otherwise.

use std::collections::HashMap;

use log::debug;
use rand::Rng;

use crate::context::TestContext;
use crate::errors::{guarded, VerifyError, VerifyResult};
use crate::factory::Channel;
use crate::holder::Holder;
use crate::model::NullBehaviour;
use crate::value::Value;

/// Random mutations per property in each trial
pub const MUTATIONS_PER_PROPERTY: usize = 3;

/// Run every read/write check. Returns the number of beans verified.
pub fn verify(ctx: &mut TestContext, holder: &mut Holder) -> VerifyResult<usize> {
    holder.reset(ctx)?;
    test_to_string(holder)?;
    let combinations = test_all_combinations(ctx, holder)?;
    let trials = test_random(ctx, holder)?;
    debug!(
        "{}: {} combinations and {} random trials round-tripped",
        holder.bean_name(),
        combinations,
        trials
    );
    Ok(combinations + trials)
}

/// The bean, and its builder when it has one, must render as non-empty text
pub fn test_to_string(holder: &Holder) -> VerifyResult<()> {
    let bean = holder.new_bean()?;
    let rendered = guarded(|| Ok(format!("{:?}", bean))).map_err(|cause| {
        VerifyError::violation_caused_by(format!("{}: formatting failed", holder.bean_name()), cause)
    })?;
    if rendered.is_empty() {
        return Err(VerifyError::violation(format!("{}: formats as empty text", holder.bean_name())));
    }

    match holder.description().render_builder(&holder.creator_args()) {
        None => Ok(()),
        Some(Ok(rendered)) if !rendered.is_empty() => Ok(()),
        Some(Ok(_)) => Err(VerifyError::violation(format!(
            "{}: builder formats as empty text",
            holder.bean_name()
        ))),
        Some(Err(cause)) => Err(VerifyError::violation_caused_by(
            format!("{}: builder formatting failed", holder.bean_name()),
            cause,
        )),
    }
}

/// Set every ordered pair of properties to every combination of their
/// candidate values and verify both. A bean with a single testable property
/// is checked value by value.
pub fn test_all_combinations(ctx: &mut TestContext, holder: &mut Holder) -> VerifyResult<usize> {
    let names = holder.testable_properties();
    let mut candidates = HashMap::new();
    for name in &names {
        let values = holder.candidates(ctx, name, accepts_null(holder, name))?;
        candidates.insert(name.clone(), values);
    }

    let mut verified = 0;
    if names.len() == 1 {
        let name = &names[0];
        for value in &candidates[name] {
            holder.reset(ctx)?;
            holder.put(name, value.clone());
            holder.verify(name)?;
            verified += 1;
        }
        return Ok(verified);
    }

    for first in &names {
        for second in &names {
            if first == second {
                continue;
            }
            for a in &candidates[first] {
                for b in &candidates[second] {
                    holder.reset(ctx)?;
                    holder.put(first, a.clone());
                    holder.put(second, b.clone());
                    holder.verify(first)?;
                    holder.verify(second)?;
                    verified += 1;
                }
            }
        }
    }
    holder.reset(ctx)?;
    Ok(verified)
}

/// Apply random mutations, then verify every property
pub fn test_random(ctx: &mut TestContext, holder: &mut Holder) -> VerifyResult<usize> {
    let names = holder.testable_properties();
    if names.is_empty() {
        return Ok(0);
    }
    let null_probability = ctx.config().null_probability;
    let trials = ctx.trials();

    holder.reset(ctx)?;
    for _ in 0..trials {
        for _ in 0..MUTATIONS_PER_PROPERTY * names.len() {
            let name = &names[ctx.rng().gen_range(0..names.len())];
            let value = if accepts_null(holder, name) && ctx.chance(null_probability) {
                Value::null()
            } else {
                holder.draw(ctx, name, Channel::Random)?
            };
            holder.put(name, value);
        }
        holder.verify_all()?;
    }
    holder.reset(ctx)?;
    Ok(trials)
}

/// Null is a candidate when the bean has a known, non-failing response to it
fn accepts_null(holder: &Holder, name: &str) -> bool {
    if holder.is_nullable(name) {
        return true;
    }
    match holder.null_behaviour(name) {
        Some(NullBehaviour::Error) | None => false,
        Some(_) => true,
    }
}
