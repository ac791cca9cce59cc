//! Environment variable overrides for secrets and session identity.

use crate::schema::ParleyConfig;

pub const ENV_SUPABASE_URL: &str = "PARLEY_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "PARLEY_SUPABASE_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "PARLEY_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "PARLEY_USER_ID";

/// Overlay `PARLEY_*` environment variables onto `config`.
pub fn apply_env_overrides(config: &mut ParleyConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides_from<F>(config: &mut ParleyConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get(ENV_SUPABASE_URL) {
        config.supabase.url = url;
    }
    if let Some(key) = get(ENV_SUPABASE_ANON_KEY) {
        config.supabase.anon_key = key;
    }
    if let Some(token) = get(ENV_ACCESS_TOKEN) {
        config.supabase.access_token = Some(token);
    }
    if let Some(user) = get(ENV_USER_ID) {
        config.supabase.user_id = Some(user);
    }
}
