//! Shared validation helpers used by the section validators.

use std::sync::OnceLock;

use regex::Regex;

/// Push an error if `value` is outside `[min, max]`.
pub(crate) fn validate_range(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error unless `value` is a plain SQL identifier.
pub(crate) fn validate_identifier(errors: &mut Vec<String>, name: &str, value: &str) {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    let re = IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));
    if !re.is_match(value) {
        errors.push(format!("{name} = {value:?} is not a valid identifier"));
    }
}
