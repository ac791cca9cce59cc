use crate::schema::ParleyConfig;

use super::helpers::validate_identifier;

const SETTABLE_STATUSES: &[&str] = &["online", "idle", "dnd"];

/// Validate the presence table and initial status.
pub(crate) fn validate_presence(errors: &mut Vec<String>, config: &ParleyConfig) {
    validate_identifier(errors, "presence.table", &config.presence.table);

    if !SETTABLE_STATUSES.contains(&config.presence.initial_status.as_str()) {
        errors.push(format!(
            "presence.initial_status = {:?} must be one of {}",
            config.presence.initial_status,
            SETTABLE_STATUSES.join(", ")
        ));
    }
}
