use crate::schema::ParleyConfig;

/// Validate the project URL when one is set.
pub(crate) fn validate_supabase(errors: &mut Vec<String>, config: &ParleyConfig) {
    let url = &config.supabase.url;
    if url.is_empty() {
        return;
    }
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        errors.push(format!("supabase.url = {url:?} must start with http:// or https://"));
    }
    if config.supabase.anon_key.is_empty() {
        errors.push("supabase.anon_key is required when supabase.url is set".into());
    }
}
