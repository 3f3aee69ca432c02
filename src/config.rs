//! Verification settings

/// Default structural depth for recursive type graphs
pub const DEFAULT_STRUCTURAL_DEPTH: usize = 3;

/// Default number of randomized trials per verifier
pub const DEFAULT_TRIALS: usize = 100;

/// Configuration for a verification run
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Nesting level at which depth-aware factories stop recursing
    pub structural_depth: usize,

    /// Number of randomized trials run by the equality and read/write verifiers
    pub trials: usize,

    /// Extra RANDOM candidates drawn per property after PRIMARY and SECONDARY
    pub random_candidates: usize,

    /// Attempts made to draw a RANDOM value distinct from PRIMARY and SECONDARY
    pub distinct_attempts: usize,

    /// Probability of staging null for a nullable property during random mutation
    pub null_probability: f64,

    /// Check hash codes alongside equality
    pub test_hash_code: bool,

    /// Invoke every channel of a factory when it is registered
    pub self_test_factories: bool,

    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            structural_depth: DEFAULT_STRUCTURAL_DEPTH,
            trials: DEFAULT_TRIALS,
            random_candidates: 3,
            distinct_attempts: 10,
            null_probability: 0.25,
            test_hash_code: true,
            self_test_factories: true,
            seed: None,
        }
    }
}

impl VerifierConfig {
    pub fn with_structural_depth(mut self, depth: usize) -> Self {
        self.structural_depth = depth;
        self
    }

    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn without_hash_code(mut self) -> Self {
        self.test_hash_code = false;
        self
    }
}
