//! Equality and hash code verification
//!
//! Checks that a bean's `PartialEq` and `Hash` agree with its property
//! model: beans that differ in a significant property are unequal, beans that
//! differ only in non-significant properties are equal and hash alike.

use log::debug;
use rand::Rng;

use crate::context::TestContext;
use crate::errors::{VerifyError, VerifyResult};
use crate::factory::Channel;
use crate::holder::Holder;
use crate::value::{DynValue, Value};

/// Attempts per trial to find a mutation that changes the bean
pub const MAX_MUTATIONS: usize = 5;

/// A type no bean is ever equal to
#[derive(Debug, PartialEq, Hash)]
struct Unrelated;

/// Run the equality checks. Returns the number of comparisons made.
pub fn verify(ctx: &mut TestContext, holder: &mut Holder) -> VerifyResult<usize> {
    let test_hash_code = ctx.config().test_hash_code;
    let mut comparisons = 0;

    holder.reset(ctx)?;
    let names = holder.testable_properties();
    for name in &names {
        let candidates = holder.candidates(ctx, name, holder.is_nullable(name))?;
        let saved = holder.read_expected(name).cloned();

        for value in &candidates {
            holder.put(name, value.clone());
            check_bean(holder, test_hash_code)?;
            comparisons += 1;
        }

        for (i, first) in candidates.iter().enumerate() {
            for (j, second) in candidates.iter().enumerate() {
                if i == j {
                    continue;
                }
                let mut a = holder.copy();
                a.put(name, first.clone());
                let mut b = holder.copy();
                b.put(name, second.clone());
                check_pair(&a, &b, name, test_hash_code)?;
                comparisons += 1;
            }
        }

        holder.restore(name, saved);
    }

    if names.is_empty() {
        return Ok(comparisons);
    }

    let null_probability = ctx.config().null_probability;
    let mut previous = holder.new_bean()?;
    for _ in 0..ctx.trials() {
        let name = &names[ctx.rng().gen_range(0..names.len())];
        let mut changed = false;
        for _ in 0..MAX_MUTATIONS {
            let value = if holder.is_nullable(name) && ctx.chance(null_probability) {
                Value::null()
            } else {
                holder.draw(ctx, name, Channel::Random)?
            };
            if holder.set_property(name, value)? {
                changed = true;
                break;
            }
        }

        let current = holder.new_bean()?;
        compare(holder, name, changed, &previous, &current, test_hash_code)?;
        previous = current;
        comparisons += 1;
    }

    debug!("{}: {} equality comparisons", holder.bean_name(), comparisons);
    Ok(comparisons)
}

/// Checks on a single bean built from the holder's current state
fn check_bean(holder: &Holder, test_hash_code: bool) -> VerifyResult<()> {
    let bean = holder.new_bean()?;
    let instance = match bean.as_dyn() {
        Some(instance) => instance,
        None => {
            return Err(VerifyError::violation(format!("{}: construction produced null", holder.bean_name())));
        }
    };
    if instance.dyn_eq(&Unrelated as &dyn DynValue) {
        return Err(VerifyError::violation(format!(
            "{}: {:?} equals an unrelated object",
            holder.bean_name(),
            bean
        )));
    }
    if !instance.dyn_eq(instance) {
        return Err(VerifyError::violation(format!(
            "{}: {:?} is not equal to itself",
            holder.bean_name(),
            bean
        )));
    }

    let fresh = holder.new_bean()?;
    if bean != fresh {
        return Err(VerifyError::violation(format!(
            "{}: beans built from the same values are unequal: {:?} and {:?}",
            holder.bean_name(),
            bean,
            fresh
        )));
    }
    if test_hash_code {
        let hash = instance.dyn_hash();
        if hash != instance.dyn_hash() {
            return Err(VerifyError::violation(format!(
                "{}: hash code of {:?} is not stable",
                holder.bean_name(),
                bean
            )));
        }
        if hash != fresh.hash_code() {
            return Err(VerifyError::violation(format!(
                "{}: equal beans {:?} have different hash codes",
                holder.bean_name(),
                bean
            )));
        }
    }
    Ok(())
}

/// Compare beans from two holders that differ only in `name`
fn check_pair(a: &Holder, b: &Holder, name: &str, test_hash_code: bool) -> VerifyResult<()> {
    let first = a.new_bean()?;
    let second = b.new_bean()?;

    let changed = if a.is_readable(name) {
        a.read_from(&first, name)? != b.read_from(&second, name)?
    } else {
        a.read_expected(name) != b.read_expected(name)
    };
    compare(a, name, changed, &first, &second, test_hash_code)
}

/// Beans that differ in a significant property must be unequal. Any other
/// pair must be equal and, when hash codes are tested, hash alike.
fn compare(
    holder: &Holder,
    name: &str,
    changed: bool,
    first: &Value,
    second: &Value,
    test_hash_code: bool,
) -> VerifyResult<()> {
    if changed && holder.is_significant(name) {
        if first == second {
            return Err(VerifyError::violation(format!(
                "{}.{} is significant but {:?} equals {:?}",
                holder.bean_name(),
                name,
                first,
                second
            )));
        }
        return Ok(());
    }

    if first != second {
        let reason = if changed { "is not significant" } else { "did not change" };
        return Err(VerifyError::violation(format!(
            "{}.{} {} but {:?} does not equal {:?}",
            holder.bean_name(),
            name,
            reason,
            first,
            second
        )));
    }
    if test_hash_code && first.hash_code() != second.hash_code() {
        return Err(VerifyError::violation(format!(
            "{}: equal beans {:?} and {:?} have different hash codes",
            holder.bean_name(),
            first,
            second
        )));
    }
    Ok(())
}
