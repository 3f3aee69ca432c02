//! Per-property customisations
//!
//! Customisations adjust what the adapter produced: which properties are
//! ignored, significant, nullable or not-null, the declared null/omitted
//! behaviour of a property, and per-property value factories. They are
//! registered explicitly, either on the description builder or at the
//! verify call site, and a type can publish its own through `Describe`.

use crate::errors::{VerifyError, VerifyResult};
use crate::factory::ValueFactory;
use crate::model::{BeanDescription, NullBehaviour, Property};

/// One adjustment to a bean description
#[derive(Debug, Clone)]
pub enum Customisation {
    /// Exclude the property from inference, validation and testing
    Ignore(String),
    /// The property must never read back as null
    NotNull(String),
    /// The property accepts null as a legitimate value
    Nullable(String),
    /// The property takes part in equality
    Significant(String),
    /// The property must not affect equality
    NotSignificant(String),
    /// Declared behaviour when the property is set to null
    NullBehaviour(String, NullBehaviour),
    /// Declared behaviour when the property is omitted from construction
    OmittedBehaviour(String, NullBehaviour),
    /// Draw values for this property from a dedicated factory
    Factory(String, ValueFactory),
}

impl Customisation {
    pub fn ignore(property: &str) -> Self {
        Customisation::Ignore(property.to_string())
    }

    pub fn not_null(property: &str) -> Self {
        Customisation::NotNull(property.to_string())
    }

    pub fn nullable(property: &str) -> Self {
        Customisation::Nullable(property.to_string())
    }

    pub fn significant(property: &str) -> Self {
        Customisation::Significant(property.to_string())
    }

    pub fn not_significant(property: &str) -> Self {
        Customisation::NotSignificant(property.to_string())
    }

    pub fn null_behaviour(property: &str, behaviour: NullBehaviour) -> Self {
        Customisation::NullBehaviour(property.to_string(), behaviour)
    }

    pub fn omitted_behaviour(property: &str, behaviour: NullBehaviour) -> Self {
        Customisation::OmittedBehaviour(property.to_string(), behaviour)
    }

    pub fn factory(property: &str, factory: ValueFactory) -> Self {
        Customisation::Factory(property.to_string(), factory)
    }

    pub fn property(&self) -> &str {
        match self {
            Customisation::Ignore(name)
            | Customisation::NotNull(name)
            | Customisation::Nullable(name)
            | Customisation::Significant(name)
            | Customisation::NotSignificant(name)
            | Customisation::NullBehaviour(name, _)
            | Customisation::OmittedBehaviour(name, _)
            | Customisation::Factory(name, _) => name,
        }
    }
}

/// Adapter hook: a type that can describe itself for verification
pub trait Describe {
    fn describe() -> VerifyResult<BeanDescription>;

    /// Customisations applied on every verification of this type
    fn customisations() -> Vec<Customisation> {
        Vec::new()
    }
}

/// Apply customisations to both models of a description.
///
/// Naming a property that exists in neither model is a configuration error.
pub(crate) fn apply(description: &mut BeanDescription, customisations: &[Customisation]) -> VerifyResult<()> {
    for customisation in customisations {
        let name = customisation.property();
        if description.property(name).is_none() {
            return Err(VerifyError::configuration(format!(
                "customisation {:?} names unknown property {}.{}",
                customisation,
                description.name(),
                name
            )));
        }

        if let Customisation::Factory(name, factory) = customisation {
            let declared = description.property(name).map(Property::value_type);
            if declared != Some(factory.value_type()) {
                return Err(VerifyError::configuration(format!(
                    "factory for {} cannot supply {}.{}",
                    factory.value_type(),
                    description.name(),
                    name
                )));
            }
            description.add_factory_override(name, factory.clone());
            continue;
        }

        if let Some(property) = description.creator_mut().get_mut(name) {
            apply_to_property(property, customisation);
        }
        if let Some(property) = description.bean_mut().get_mut(name) {
            apply_to_property(property, customisation);
        }
    }
    Ok(())
}

fn apply_to_property(property: &mut Property, customisation: &Customisation) {
    match customisation {
        Customisation::Ignore(_) => property.flags.ignored = true,
        Customisation::NotNull(_) => {
            property.flags.not_null = true;
            property.flags.nullable = false;
        }
        Customisation::Nullable(_) => {
            property.flags.nullable = true;
            property.flags.not_null = false;
        }
        Customisation::Significant(_) => property.flags.significant = true,
        Customisation::NotSignificant(_) => property.flags.significant = false,
        Customisation::NullBehaviour(_, behaviour) => {
            property.null_behaviour = Some(*behaviour);
            property.null_declared = true;
        }
        Customisation::OmittedBehaviour(_, behaviour) => {
            property.omitted_behaviour = Some(*behaviour);
            property.omitted_declared = true;
        }
        Customisation::Factory(..) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[derive(Debug, Clone, Default, PartialEq, Hash)]
    struct Label {
        text: String,
    }

    fn label_builder() -> crate::model::BeanDescriptionBuilder<Label> {
        BeanDescription::builder::<Label>("Label")
            .default_constructor()
            .property(
                "text",
                |l: &Label| Some(l.text.clone()),
                |l: &mut Label, v: Option<String>| {
                    l.text = v.unwrap_or_default();
                    Ok(())
                },
            )
    }

    #[test]
    fn test_flags_apply_to_property() {
        let description = label_builder()
            .customise(Customisation::nullable("text"))
            .customise(Customisation::not_significant("text"))
            .build()
            .unwrap();
        let flags = description.property("text").unwrap().flags();
        assert!(flags.nullable);
        assert!(!flags.significant);
        assert!(!flags.not_null);
    }

    #[test]
    fn test_declared_behaviour_is_marked() {
        let description = label_builder()
            .customise(Customisation::null_behaviour("text", NullBehaviour::Variable))
            .build()
            .unwrap();
        let property = description.property("text").unwrap();
        assert_eq!(property.null_behaviour(), Some(NullBehaviour::Variable));
        assert!(property.null_declared);
    }

    #[test]
    fn test_unknown_property_is_rejected() {
        let result = label_builder().customise(Customisation::ignore("colour")).build();
        let message = result.unwrap_err().to_string();
        assert!(message.contains("Label.colour"), "{}", message);
    }

    #[test]
    fn test_factory_must_match_property_type() {
        let wrong = ValueFactory::new(1i32, 2i32, |rng| rng.gen());
        let result = label_builder().customise(Customisation::factory("text", wrong)).build();
        assert!(matches!(result, Err(VerifyError::Configuration(_))));

        let right = ValueFactory::new("a".to_string(), "b".to_string(), |rng| {
            format!("c{}", rng.gen::<u16>())
        });
        let description = label_builder()
            .customise(Customisation::factory("text", right))
            .build()
            .unwrap();
        assert_eq!(description.factory_overrides().len(), 1);
    }
}
