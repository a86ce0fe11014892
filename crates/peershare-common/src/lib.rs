pub mod errors;
pub mod id;

pub use errors::{
    CaptureError, ConfigError, PeershareError, ShareError, SignalingError, TransportError,
};
pub use id::{new_id, SessionId};

pub type Result<T> = std::result::Result<T, PeershareError>;
