//! Engine tunables and their validation.

use thiserror::Error;

/// Tunable parameters of the search.
///
/// Budgets are per top-level run: `max_repairs` bounds the moves of one
/// `search` pass, `max_restarts` bounds how often the assignment is
/// reseeded. All randomness derives from `random_seed`, so two runs with
/// equal inputs and seed are identical.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SlsParams {
    pub max_repairs: u64,
    pub max_restarts: u64,
    pub random_seed: u64,
}

impl Default for SlsParams {
    fn default() -> Self {
        SlsParams {
            max_repairs: 1_000_000,
            max_restarts: 1_000_000,
            random_seed: 0,
        }
    }
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ParamError {
    #[error("max_repairs must be positive")]
    ZeroMaxRepairs,
    #[error("max_restarts must be positive")]
    ZeroMaxRestarts,
}

impl SlsParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.max_repairs == 0 {
            return Err(ParamError::ZeroMaxRepairs);
        }
        if self.max_restarts == 0 {
            return Err(ParamError::ZeroMaxRestarts);
        }
        Ok(())
    }
}
