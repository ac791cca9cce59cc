//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Parley Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.
# PARLEY_SUPABASE_URL, PARLEY_SUPABASE_ANON_KEY, PARLEY_ACCESS_TOKEN and
# PARLEY_USER_ID override the [supabase] values when set.
# PARLEY_CONFIG points parley at a different config file.

[supabase]
# url = "https://<project-ref>.supabase.co"
# anon_key = ""
# access_token = ""
# user_id = ""

[realtime]
# max_retries = 3                  # 0-10, resubscribes before a feed is dropped
# base_delay_ms = 1000             # 10-60000, doubled on every retry
# heartbeat_interval_secs = 25     # 5-120
# join_timeout_secs = 10           # 1-120
# reconnect_delay_secs = 1
# max_reconnect_delay_secs = 30

[presence]
# table = "user_presence"
# initial_status = "online"        # online, idle, dnd

[logging]
# level = "parley=info"
"##
    .to_string()
}
