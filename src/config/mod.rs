use std::env;

/// Default cap on concurrent non-terminated classrooms per user
pub const DEFAULT_MAX_CLASSROOM_JOIN_LIMIT: usize = 5;

/// Default lower bound on classroom capacity
pub const DEFAULT_MIN_PARTICIPANTS: u32 = 2;

/// Default upper bound on classroom capacity
pub const DEFAULT_MAX_PARTICIPANTS: u32 = 30;

pub struct Config {
    pub limits: LimitsConfig,
}

/// Tunable limits enforced by the classroom service
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// How many non-terminated classrooms a single user may belong to
    pub max_joined_classrooms: usize,
    /// Smallest allowed `max_participants` at creation
    pub min_participants: u32,
    /// Largest allowed `max_participants` at creation
    pub max_participants: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_joined_classrooms: DEFAULT_MAX_CLASSROOM_JOIN_LIMIT,
            min_participants: DEFAULT_MIN_PARTICIPANTS,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
        }
    }
}

impl Config {
    /// Reads configuration from environment variables, falling back to the
    /// compiled defaults for anything missing or unparseable.
    ///
    /// Recognized variables:
    /// - `MAX_CLASSROOM_JOIN_LIMIT`
    /// - `CLASSROOM_MIN_PARTICIPANTS`
    /// - `CLASSROOM_MAX_PARTICIPANTS`
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            limits: LimitsConfig {
                max_joined_classrooms: env_or("MAX_CLASSROOM_JOIN_LIMIT", DEFAULT_MAX_CLASSROOM_JOIN_LIMIT),
                min_participants: env_or("CLASSROOM_MIN_PARTICIPANTS", DEFAULT_MIN_PARTICIPANTS),
                max_participants: env_or("CLASSROOM_MAX_PARTICIPANTS", DEFAULT_MAX_PARTICIPANTS),
            },
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key = %key, value = %raw, "Unparseable limit, using default");
            default
        }),
        Err(_) => default,
    }
}
