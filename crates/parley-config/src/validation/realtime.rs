use crate::schema::ParleyConfig;

use super::helpers::validate_range;

/// Validate retry and transport timing.
pub(crate) fn validate_realtime(errors: &mut Vec<String>, config: &ParleyConfig) {
    let rt = &config.realtime;
    validate_range(errors, "realtime.max_retries", rt.max_retries.into(), 0, 10);
    validate_range(errors, "realtime.base_delay_ms", rt.base_delay_ms, 10, 60_000);
    validate_range(
        errors,
        "realtime.heartbeat_interval_secs",
        rt.heartbeat_interval_secs,
        5,
        120,
    );
    validate_range(
        errors,
        "realtime.join_timeout_secs",
        rt.join_timeout_secs,
        1,
        120,
    );
    validate_range(
        errors,
        "realtime.reconnect_delay_secs",
        rt.reconnect_delay_secs,
        1,
        rt.max_reconnect_delay_secs.max(1),
    );
}
