use thiserror::Error;

/// Errors surfaced by the host-side toolchain. Nothing is retried or
/// swallowed; every failure propagates to the caller.
#[derive(Debug, Error)]
pub enum UplinkError {
    #[error("invalid secrets format: {0}")]
    InvalidSecretsFormat(String),
    #[error("channel {0} is not part of this deployment")]
    UnknownChannel(u32),
    #[error("frame is {0} bytes, longer than the 64 byte maximum")]
    OversizedFrame(usize),
    #[error("subscription range requires {0} tree keys, more than fit in an update")]
    OversizedSubscriptionRange(usize),
    #[error("invalid timestamp range: start {start} is after end {end}")]
    InvalidRange { start: u64, end: u64 },
    #[error("crypto primitive failure")]
    CryptoFailure,
}
