//! Built-in leaf factories
//!
//! PRIMARY and SECONDARY are small fixed values that are easy to spot in
//! failure messages. RANDOM draws from the full range of the type, except for
//! strings and chars which draw from an alphanumeric alphabet.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::factory::ValueFactory;
use crate::registry::FactoryRegistry;

const ALPHANUMERIC: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Longest RANDOM string
pub const MAX_STRING_LEN: usize = 12;

/// Register the default catalog of primitive factories
pub fn register_primitives(registry: &mut FactoryRegistry) {
    registry.register(ValueFactory::new(true, false, |rng| rng.gen::<bool>()).low_cardinality());
    registry.register(ValueFactory::new('p', 's', random_char));
    registry.register(ValueFactory::new(1u8, 2u8, |rng| rng.gen::<u8>()));
    registry.register(ValueFactory::new(1i32, 2i32, |rng| rng.gen::<i32>()));
    registry.register(ValueFactory::new(1i64, 2i64, |rng| rng.gen::<i64>()));
    registry.register(ValueFactory::new(1u32, 2u32, |rng| rng.gen::<u32>()));
    registry.register(ValueFactory::new(1u64, 2u64, |rng| rng.gen::<u64>()));
    registry.register(ValueFactory::new(1usize, 2usize, |rng| rng.gen::<usize>()));
    registry.register(ValueFactory::new(
        "primary".to_string(),
        "secondary".to_string(),
        random_string,
    ));
}

fn random_char(rng: &mut ChaCha8Rng) -> char {
    let alphabet: Vec<char> = ALPHANUMERIC.chars().collect();
    alphabet[rng.gen_range(0..alphabet.len())]
}

fn random_string(rng: &mut ChaCha8Rng) -> String {
    let size = rng.gen_range(1..=MAX_STRING_LEN);
    (0..size).map(|_| random_char(rng)).collect()
}
