//! Full configuration validation.
//!
//! Validates numeric ranges, identifiers, and URLs. Each section has its
//! own submodule; this orchestrator calls them all and collects errors
//! into a single `ConfigError`.

mod helpers;
mod presence;
mod realtime;
mod supabase;

#[cfg(test)]
mod tests;

use crate::schema::ParleyConfig;
use parley_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &ParleyConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    supabase::validate_supabase(&mut errors, config);
    realtime::validate_realtime(&mut errors, config);
    presence::validate_presence(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
