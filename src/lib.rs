//! # beanverify
//!
//! Contract verification for structured value types ("beans"). Given an
//! explicit description of how a type is constructed and how its properties
//! are read and written, the engine synthesizes values, works out how the
//! type responds to null and omitted properties, and checks that values
//! round-trip through its accessors and that its equality and hash code
//! agree with its properties.
//!
//! ```ignore
//! let description = BeanDescription::builder::<Person>("Person")
//!     .default_constructor()
//!     .property("name", |p: &Person| Some(p.name.clone()), |p: &mut Person, v: Option<String>| {
//!         p.name = v.unwrap_or_default();
//!         Ok(())
//!     })
//!     .build()?;
//! beanverify::verify(&description, &[])?;
//! ```

pub mod config;
pub mod context;
pub mod customisation;
pub mod equals;
pub mod errors;
pub mod factory;
pub mod holder;
pub mod model;
pub mod null_rules;
pub mod pool;
pub mod primitives;
pub mod read_write;
pub mod registry;
pub mod value;
pub mod verifier;

pub use config::VerifierConfig;
pub use context::TestContext;
pub use customisation::{Customisation, Describe};
pub use errors::{BeanError, VerifyError, VerifyResult};
pub use factory::{Channel, ValueFactory};
pub use holder::{Holder, Preference};
pub use model::{
    BeanDescription, BeanDescriptionBuilder, CreatorArgs, Model, NullBehaviour, Observed, Property, PropertyFlags,
};
pub use registry::FactoryRegistry;
pub use value::{DynValue, Value, ValueType};
pub use verifier::{verify, verify_type, BeanVerifier, VerificationStats};
