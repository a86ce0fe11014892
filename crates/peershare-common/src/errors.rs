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

/// Failures of a peer session, as observed by the engine and the UI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShareError {
    #[error("transport capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("media acquisition denied: {0}")]
    MediaAcquisitionDenied(String),

    #[error("malformed signaling message: {0}")]
    SignalingMalformed(String),

    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("connectivity lost")]
    ConnectivityLost,

    #[error("ice restart exhausted after {attempts} attempt(s)")]
    RestartExhausted { attempts: u32 },

    #[error("screen share engine stopped")]
    EngineStopped,
}

/// Errors reported by a Transport Capability instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("session description error: {0}")]
    Description(String),

    #[error("ice candidate error: {0}")]
    Candidate(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("transport closed")]
    Closed,
}

/// Errors reported by the signaling channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalingError {
    #[error("signaling channel disconnected")]
    Disconnected,

    #[error("signaling encode error: {0}")]
    Encode(String),
}

/// Errors reported by the media capture collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("capture permission denied")]
    Denied,

    #[error("capture not supported: {0}")]
    Unsupported(String),

    #[error("capture failed: {0}")]
    Failed(String),
}

impl From<TransportError> for ShareError {
    fn from(err: TransportError) -> Self {
        ShareError::NegotiationFailed(err.to_string())
    }
}

impl From<SignalingError> for ShareError {
    fn from(err: SignalingError) -> Self {
        ShareError::NegotiationFailed(err.to_string())
    }
}

impl From<CaptureError> for ShareError {
    fn from(err: CaptureError) -> Self {
        ShareError::MediaAcquisitionDenied(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PeershareError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Share(#[from] ShareError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

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

        let err = ConfigError::ValidationError("restart.max_attempts".into());
        assert_eq!(
            err.to_string(),
            "config validation error: restart.max_attempts"
        );
    }

    #[test]
    fn share_error_display() {
        let err = ShareError::CapabilityUnavailable("no webrtc".into());
        assert_eq!(err.to_string(), "transport capability unavailable: no webrtc");

        let err = ShareError::RestartExhausted { attempts: 3 };
        assert_eq!(err.to_string(), "ice restart exhausted after 3 attempt(s)");

        let err = ShareError::ConnectivityLost;
        assert_eq!(err.to_string(), "connectivity lost");
    }

    #[test]
    fn transport_error_becomes_negotiation_failure() {
        let err: ShareError = TransportError::Description("bad sdp".into()).into();
        assert_eq!(
            err,
            ShareError::NegotiationFailed("session description error: bad sdp".into())
        );
    }

    #[test]
    fn signaling_error_becomes_negotiation_failure() {
        let err: ShareError = SignalingError::Disconnected.into();
        assert!(matches!(err, ShareError::NegotiationFailed(ref m) if m.contains("disconnected")));
    }

    #[test]
    fn capture_error_becomes_media_denied() {
        let err: ShareError = CaptureError::Denied.into();
        assert!(matches!(err, ShareError::MediaAcquisitionDenied(_)));

        let err: ShareError = CaptureError::Unsupported("wayland".into()).into();
        assert!(err.to_string().contains("wayland"));
    }

    #[test]
    fn peershare_error_from_share() {
        let err: PeershareError = ShareError::EngineStopped.into();
        assert!(matches!(err, PeershareError::Share(_)));
        assert_eq!(err.to_string(), "screen share engine stopped");
    }

    #[test]
    fn peershare_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: PeershareError = io_err.into();
        assert!(matches!(err, PeershareError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn peershare_error_other_variants() {
        let err = PeershareError::Network("timeout".into());
        assert_eq!(err.to_string(), "network error: timeout");

        let err = PeershareError::Other("something went wrong".into());
        assert_eq!(err.to_string(), "something went wrong");
    }
}
