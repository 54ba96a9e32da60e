use std::env;
use std::time::Duration;

use quiz_core::proximity::SearchBudget;
use serde::Deserialize;

/// Limits for the alternate-tier search, read from the `[search]` table of
/// the config file and the `QUIZ_SEARCH_*` environment variables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub max_unchecked: usize,
    pub max_combinations: u64,
    /// Wall-clock limit in milliseconds; `0` disables it.
    pub max_millis: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        let budget = SearchBudget::default();
        Self {
            max_unchecked: budget.max_unchecked,
            max_combinations: budget.max_combinations,
            max_millis: budget
                .max_duration
                .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

impl SearchSettings {
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Environment values win over whatever `self` holds; unparsable values
    /// are ignored.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        Self {
            max_unchecked: env_parse("QUIZ_SEARCH_MAX_UNCHECKED").unwrap_or(self.max_unchecked),
            max_combinations: env_parse("QUIZ_SEARCH_MAX_COMBINATIONS")
                .unwrap_or(self.max_combinations),
            max_millis: env_parse("QUIZ_SEARCH_MAX_MILLIS").unwrap_or(self.max_millis),
        }
    }

    #[must_use]
    pub fn budget(&self) -> SearchBudget {
        SearchBudget {
            max_unchecked: self.max_unchecked,
            max_combinations: self.max_combinations,
            max_duration: (self.max_millis > 0).then(|| Duration::from_millis(self.max_millis)),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
