//! Error taxonomy for the gateway.
//!
//! Backend calls fail with a structured [`BackendError`] (errno-style code +
//! message). Everything the gateway itself decides is a [`GatewayError`]
//! variant. Conversion into `io::Error` is provided so hosts that speak
//! `io::Result` can use `?` directly.

use std::fmt;
use std::io::{self, ErrorKind};

/// POSIX errno values used by the backend filesystem interface.
pub mod errno {
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const EBADF: i32 = 9;
    pub const EEXIST: i32 = 17;
    pub const ENOTDIR: i32 = 20;
    pub const EISDIR: i32 = 21;
    pub const EINVAL: i32 = 22;
    pub const ENOTEMPTY: i32 = 39;
}

/// The backend has no distinct error kind for a wrong config password, so
/// the only signal is this fragment inside a generic I/O error.
const BAD_PASSWORD_FRAGMENT: &str = "not allowed to ask for password";

/// Structured failure returned by the backend filesystem interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub code: i32,
    pub message: String,
}

impl BackendError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(errno::ENOENT, message)
    }

    pub fn exists(message: impl Into<String>) -> Self {
        Self::new(errno::EEXIST, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.code == errno::ENOENT
    }

    pub fn is_exists(&self) -> bool {
        self.code == errno::EEXIST
    }

    pub fn is_type_conflict(&self) -> bool {
        self.code == errno::ENOTDIR || self.code == errno::EISDIR
    }

    /// Map an OS-level error onto the closest errno code. Well-known kinds are
    /// mapped by kind so the codes do not depend on the host platform.
    pub fn from_io(err: &io::Error) -> Self {
        let code = match err.kind() {
            ErrorKind::NotFound => errno::ENOENT,
            ErrorKind::AlreadyExists => errno::EEXIST,
            ErrorKind::InvalidInput => errno::EINVAL,
            ErrorKind::NotADirectory => errno::ENOTDIR,
            ErrorKind::IsADirectory => errno::EISDIR,
            ErrorKind::DirectoryNotEmpty => errno::ENOTEMPTY,
            _ => err.raw_os_error().unwrap_or(errno::EIO),
        };
        Self::new(code, err.to_string())
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (errno {})", self.message, self.code)
    }
}

impl std::error::Error for BackendError {}

impl From<io::Error> for BackendError {
    fn from(err: io::Error) -> Self {
        Self::from_io(&err)
    }
}

/// Why access to a remote was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Always hidden.
    Hard,
    /// Hidden while the app is locked.
    Soft,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid document identifier: {0}")]
    InvalidIdentifier(String),

    #[error("remote does not exist: {0}")]
    UnknownRemote(String),

    #[error("{}", access_denied_message(.remote, .kind))]
    AccessDenied { remote: String, kind: BlockKind },

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document already exists: {0}")]
    AlreadyExists(String),

    #[error("type mismatch between source and target: {0}")]
    TypeMismatch(String),

    #[error("failed to find unique name for {base} after {attempts} attempts")]
    NoUniqueNameFound { base: String, attempts: usize },

    #[error("{id} is not a child of {parent}")]
    NotAChild { id: String, parent: String },

    #[error("backend error: {0}")]
    Backend(BackendError),

    #[error("bad config password: {0}")]
    BadPassword(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("{method} call failed with status {status}")]
    Rpc { method: String, status: u16 },

    #[error("malformed {method} response: {message}")]
    RpcPayload { method: String, message: String },

    #[error("config error: {0}")]
    Config(String),
}

fn access_denied_message(remote: &str, kind: &BlockKind) -> String {
    match kind {
        BlockKind::Hard => format!("access to remote is hard blocked: {}", remote),
        BlockKind::Soft => format!("remote inaccessible while app is locked: {}", remote),
    }
}

impl GatewayError {
    /// The engine's "try the next candidate" condition.
    pub fn is_backend_exists(&self) -> bool {
        matches!(self, GatewayError::Backend(e) if e.is_exists())
    }

    pub fn is_backend_not_found(&self) -> bool {
        matches!(self, GatewayError::Backend(e) if e.is_not_found())
    }

    /// Whether a host should present this error as "no such document".
    ///
    /// Soft-blocked remotes count as missing so their existence does not leak.
    pub fn is_not_found(&self) -> bool {
        match self {
            GatewayError::NotFound(_) | GatewayError::UnknownRemote(_) => true,
            GatewayError::AccessDenied { kind, .. } => *kind == BlockKind::Soft,
            GatewayError::Backend(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        if err.code == errno::EIO && err.message.contains(BAD_PASSWORD_FRAGMENT) {
            GatewayError::BadPassword(err.message)
        } else {
            GatewayError::Backend(err)
        }
    }
}

impl From<GatewayError> for io::Error {
    fn from(err: GatewayError) -> Self {
        let kind = match &err {
            GatewayError::InvalidIdentifier(_)
            | GatewayError::InvalidMode(_)
            | GatewayError::NotAChild { .. } => ErrorKind::InvalidInput,
            GatewayError::UnknownRemote(_) | GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::AccessDenied { kind, .. } => match kind {
                BlockKind::Hard => ErrorKind::PermissionDenied,
                BlockKind::Soft => ErrorKind::NotFound,
            },
            GatewayError::AlreadyExists(_) | GatewayError::NoUniqueNameFound { .. } => {
                ErrorKind::AlreadyExists
            }
            GatewayError::TypeMismatch(_) => ErrorKind::InvalidInput,
            GatewayError::Backend(e) => match e.code {
                errno::ENOENT => ErrorKind::NotFound,
                errno::EEXIST => ErrorKind::AlreadyExists,
                errno::EINVAL => ErrorKind::InvalidInput,
                _ => ErrorKind::Other,
            },
            GatewayError::BadPassword(_) => ErrorKind::PermissionDenied,
            GatewayError::Cancelled => ErrorKind::Interrupted,
            GatewayError::Rpc { .. } | GatewayError::RpcPayload { .. } => ErrorKind::Other,
            GatewayError::Config(_) => ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_password_detected_from_eio_message() {
        let err = BackendError::new(
            errno::EIO,
            "couldn't decrypt config: not allowed to ask for password",
        );
        assert!(matches!(
            GatewayError::from(err),
            GatewayError::BadPassword(_)
        ));
    }

    #[test]
    fn test_bad_password_requires_eio() {
        let err = BackendError::new(errno::EINVAL, "not allowed to ask for password");
        assert!(matches!(GatewayError::from(err), GatewayError::Backend(_)));
    }

    #[test]
    fn test_backend_passthrough_keeps_code() {
        let err: GatewayError = BackendError::exists("x").into();
        assert!(err.is_backend_exists());
        assert!(!err.is_backend_not_found());
    }

    #[test]
    fn test_soft_block_maps_to_not_found() {
        let err = GatewayError::AccessDenied {
            remote: "r".to_string(),
            kind: BlockKind::Soft,
        };
        assert!(err.is_not_found());
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_hard_block_maps_to_permission_denied() {
        let err = GatewayError::AccessDenied {
            remote: "r".to_string(),
            kind: BlockKind::Hard,
        };
        assert!(!err.is_not_found());
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_from_io_uses_kind_without_os_code() {
        let err = BackendError::from_io(&io::Error::new(ErrorKind::NotFound, "gone"));
        assert_eq!(err.code, errno::ENOENT);
    }
}
