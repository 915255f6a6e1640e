use thiserror::Error;

pub type Result<T, E = PingError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum PingError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("cannot resolve host {host}: {reason}")]
    UnresolvedHost { host: String, reason: String },
    #[error("invalid probe configuration: {0}")]
    InvalidConfig(String),
    #[error("prober failed to start: {0}")]
    Start(String),
    #[error("probe error: {0}")]
    Probe(String),
    #[error("supervisor error: {0}")]
    Supervisor(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PingError {
    /// Setup problems that a later retry may resolve without a settings change.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            PingError::Configuration(_)
                | PingError::UnresolvedHost { .. }
                | PingError::InvalidConfig(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_host_is_a_config_error() {
        let err = PingError::UnresolvedHost {
            host: "nowhere.invalid".into(),
            reason: "no addresses".into(),
        };
        assert!(err.is_config_error());
        assert_eq!(
            err.to_string(),
            "cannot resolve host nowhere.invalid: no addresses"
        );
        assert!(!PingError::Start("socket".into()).is_config_error());
    }
}
