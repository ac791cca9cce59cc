use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("realtime error: {0}")]
    Realtime(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("not authenticated: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("realtime.max_retries = 50".into());
        assert_eq!(
            err.to_string(),
            "config validation error: realtime.max_retries = 50"
        );
    }

    #[test]
    fn parley_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: ParleyError = config_err.into();
        assert!(matches!(err, ParleyError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn parley_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: ParleyError = io_err.into();
        assert!(matches!(err, ParleyError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn parley_error_other_variants() {
        let err = ParleyError::Realtime("socket closed".into());
        assert_eq!(err.to_string(), "realtime error: socket closed");

        let err = ParleyError::Store("409 conflict".into());
        assert_eq!(err.to_string(), "store error: 409 conflict");

        let err = ParleyError::Auth("no session".into());
        assert_eq!(err.to_string(), "not authenticated: no session");

        let err = ParleyError::Other("something went wrong".into());
        assert_eq!(err.to_string(), "something went wrong");
    }
}
