//! Null and omission inference
//!
//! For every property we find out what the bean actually does when the
//! property is set to null (through its setter) or omitted (left out of the
//! constructor or builder), and record the answer as the property's
//! `NullBehaviour`. Declared behaviours are checked against the observation
//! instead of being overwritten.

use std::sync::Arc;

use log::{debug, trace};

use crate::context::TestContext;
use crate::errors::{VerifyError, VerifyResult};
use crate::holder::{Holder, Preference};
use crate::model::{BeanDescription, NullBehaviour, Observed, Property};
use crate::value::Value;

/// What the bean did when a property was nulled or omitted
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub behaviour: NullBehaviour,
    pub evidence: Option<Observed>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Omitted,
    SetToNull,
}

impl Operation {
    fn describe(self) -> &'static str {
        match self {
            Operation::Omitted => "omitted",
            Operation::SetToNull => "set to null",
        }
    }
}

/// Infer null and omitted behaviour for every non-ignored property.
///
/// Returns a new description carrying the results. Runs a Creator pass,
/// omitting each constructor parameter in turn, then a Bean pass, setting
/// each writable property to null through its setter.
pub fn infer(ctx: &mut TestContext, description: &Arc<BeanDescription>) -> VerifyResult<BeanDescription> {
    let mut inferred = (**description).clone();
    let mut holder = description.create_holder();
    holder.reset(ctx)?;

    holder.set_preference(Preference::Creator);
    for property in description.creator().iter() {
        if property.flags().ignored {
            continue;
        }
        let name = property.name();
        let saved = holder.read_expected(name).cloned();
        holder.omit(name);
        let observed = classify(&holder, name);
        holder.restore(name, saved);

        let declared = if property.omitted_declared { property.omitted_behaviour() } else { None };
        let resolved = resolve(description, property, Operation::Omitted, declared, observed)?;
        trace!("{}.{} omitted: {:?}", description.name(), name, resolved);
        if let Some(target) = inferred.creator_mut().get_mut(name) {
            target.omitted_behaviour = Some(resolved.behaviour);
            target.omitted_value = resolved.evidence;
        }
    }

    holder.set_preference(Preference::Setters);
    for property in description.bean().iter() {
        if property.flags().ignored || !property.is_writable() {
            continue;
        }
        let name = property.name();
        let saved = holder.read_expected(name).cloned();
        holder.put(name, Value::null());
        let observed = classify(&holder, name);
        holder.restore(name, saved);

        let declared = if property.null_declared { property.null_behaviour() } else { None };
        let resolved = resolve(description, property, Operation::SetToNull, declared, observed)?;
        trace!("{}.{} set to null: {:?}", description.name(), name, resolved);
        if let Some(target) = inferred.bean_mut().get_mut(name) {
            target.null_behaviour = Some(resolved.behaviour);
            target.null_value = resolved.evidence;
        }
    }

    debug!("inferred null behaviour for {}", description.name());
    Ok(inferred)
}

/// Check the inferred behaviours against the not-null and nullable flags
pub fn validate(description: &BeanDescription) -> VerifyResult<()> {
    for property in description.creator().iter().chain(description.bean().iter()) {
        let flags = property.flags();
        if flags.ignored {
            continue;
        }
        for (operation, behaviour, evidence) in [
            (Operation::Omitted, property.omitted_behaviour(), property.omitted_value()),
            (Operation::SetToNull, property.null_behaviour(), property.null_value()),
        ]
        .iter()
        {
            if flags.not_null && *behaviour == Some(NullBehaviour::Null) {
                return Err(VerifyError::violation(format!(
                    "{}.{} is not-null but reads back null when {}",
                    description.name(),
                    property.name(),
                    operation.describe()
                )));
            }
            if flags.nullable && *behaviour == Some(NullBehaviour::Error) {
                let message = format!(
                    "{}.{} is nullable but fails when {}",
                    description.name(),
                    property.name(),
                    operation.describe()
                );
                return Err(match evidence {
                    Some(Observed::Error(cause)) => VerifyError::violation_caused_by(message, cause.clone()),
                    _ => VerifyError::violation(message),
                });
            }
        }
    }
    debug!("validated null behaviour for {}", description.name());
    Ok(())
}

/// Build a bean from the holder and classify what happened to `name`
pub fn classify(holder: &Holder, name: &str) -> Classification {
    let bean = match holder.try_new_bean() {
        Ok(bean) => bean,
        Err(error) => {
            return Classification {
                behaviour: NullBehaviour::Error,
                evidence: Some(Observed::Error(error)),
            }
        }
    };
    if !holder.is_readable(name) {
        return Classification {
            behaviour: NullBehaviour::NotReadable,
            evidence: None,
        };
    }
    match holder.try_read_from(&bean, name) {
        Err(error) => Classification {
            behaviour: NullBehaviour::NotReadable,
            evidence: Some(Observed::Error(error)),
        },
        Ok(value) if value.is_null() => Classification {
            behaviour: NullBehaviour::Null,
            evidence: None,
        },
        Ok(value) => Classification {
            behaviour: NullBehaviour::Value,
            evidence: Some(Observed::Value(value)),
        },
    }
}

fn resolve(
    description: &BeanDescription,
    property: &Property,
    operation: Operation,
    declared: Option<NullBehaviour>,
    observed: Classification,
) -> VerifyResult<Classification> {
    let declared = match declared {
        None => return Ok(observed),
        Some(declared) => declared,
    };
    if declared.accepts(observed.behaviour) {
        let evidence = if declared == NullBehaviour::Value || declared == NullBehaviour::Error {
            observed.evidence
        } else {
            None
        };
        return Ok(Classification {
            behaviour: declared,
            evidence,
        });
    }

    let message = format!(
        "{}.{} {}: expected {} but observed {}",
        description.name(),
        property.name(),
        operation.describe(),
        declared,
        observed.behaviour
    );
    Err(match observed.evidence {
        Some(Observed::Error(cause)) => VerifyError::violation_caused_by(message, cause),
        _ => VerifyError::violation(message),
    })
}
