use thiserror::Error;

/// Shared error kinds reused across the workspace's error enums.
///
/// Each process crate wraps its own domain-specific error enum around these
/// kinds (see `CallError`, `BridgeError`, `TelephonyError`, ...); this type
/// exists so call sites that only care about the coarse category (for HTTP
/// status mapping, for example) don't need to match every crate's variants.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("transient transport failure")]
    Transport,
    #[error("upstream provider unavailable")]
    ProviderUnavailable,
    #[error("client protocol violation")]
    Protocol,
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid state for requested operation")]
    InvalidState,
    #[error("not found")]
    NotFound,
}
