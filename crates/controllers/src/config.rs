//! Manager tuning read from the environment.

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|s| s.parse::<u32>().ok()).filter(|v| *v > 0).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|s| s.parse::<usize>().ok()).filter(|v| *v > 0).unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Attempts per request before it is dropped (`ROSTER_MAX_ATTEMPTS`).
    pub max_attempts: u32,
    /// Upper bound on requests processed by one `run_until_idle` (`ROSTER_MAX_ROUNDS`).
    pub max_rounds: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { max_attempts: 5, max_rounds: 10_000 }
    }
}

impl ManagerConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_attempts: env_u32("ROSTER_MAX_ATTEMPTS", d.max_attempts),
            max_rounds: env_usize("ROSTER_MAX_ROUNDS", d.max_rounds),
        }
    }
}
