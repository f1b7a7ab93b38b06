//! Unique target naming.
//!
//! Android-like semantics never overwrite: when a target exists, a counter is
//! inserted before the extension (`file.txt`, `file(1).txt`, `file(2).txt`, ...)
//! until an unused name is found. POSIX-like call sites run the same engine
//! with an attempt limit of one.

use log::debug;

use crate::error::{GatewayError, Result};

/// Candidates tried before giving up with [`GatewayError::NoUniqueNameFound`].
pub const ATTEMPT_LIMIT: usize = 32;

/// How a call site learns that a candidate is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDetection {
    /// Probe existence first; the operation is not idempotent (e.g. mkdir).
    Stat,
    /// Attempt directly; a backend `EEXIST` means "try the next candidate"
    /// (e.g. exclusive file creation).
    ErrorCode,
}

/// `base`, `base(1)`, `base(2).ext`, ... Counter zero adds no suffix.
pub fn candidate(base: &str, ext: Option<&str>, counter: usize) -> String {
    let mut out = String::with_capacity(base.len() + 8);
    out.push_str(base);
    if counter != 0 {
        out.push('(');
        out.push_str(&counter.to_string());
        out.push(')');
    }
    if let Some(ext) = ext {
        out.push('.');
        out.push_str(ext);
    }
    out
}

/// Find a free target and run `operation` on it.
///
/// `exists` is only consulted in [`ConflictDetection::Stat`] mode. Returns the
/// candidate `operation` succeeded on. Any error other than a backend
/// `EEXIST` in `ErrorCode` mode propagates immediately.
pub fn retry_unique<E, O>(
    base: &str,
    ext: Option<&str>,
    mode: ConflictDetection,
    attempt_limit: usize,
    mut exists: E,
    mut operation: O,
) -> Result<String>
where
    E: FnMut(&str) -> bool,
    O: FnMut(&str) -> Result<()>,
{
    for counter in 0..attempt_limit {
        let id = candidate(base, ext, counter);

        if mode == ConflictDetection::Stat && exists(&id) {
            debug!("retry_unique: {} exists, skipping", id);
            continue;
        }

        match operation(&id) {
            Ok(()) => return Ok(id),
            Err(e) if mode == ConflictDetection::ErrorCode && e.is_backend_exists() => {
                debug!("retry_unique: {} already exists", id);
                continue;
            }
            Err(e) => return Err(e),
        }
    }

    Err(GatewayError::NoUniqueNameFound {
        base: candidate(base, ext, 0),
        attempts: attempt_limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;

    #[test]
    fn test_candidate_format() {
        assert_eq!(candidate("r:file", Some("txt"), 0), "r:file.txt");
        assert_eq!(candidate("r:file", Some("txt"), 3), "r:file(3).txt");
        assert_eq!(candidate("r:dir", None, 1), "r:dir(1)");
    }

    #[test]
    fn test_first_candidate_wins_when_free() {
        let mut calls = 0;
        let id = retry_unique(
            "r:a",
            Some("txt"),
            ConflictDetection::ErrorCode,
            ATTEMPT_LIMIT,
            |_| unreachable!(),
            |_| {
                calls += 1;
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(id, "r:a.txt");
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_error_code_mode_skips_eexist() {
        let taken = ["r:a.txt", "r:a(1).txt"];
        let id = retry_unique(
            "r:a",
            Some("txt"),
            ConflictDetection::ErrorCode,
            ATTEMPT_LIMIT,
            |_| false,
            |id| {
                if taken.contains(&id) {
                    Err(BackendError::exists(id).into())
                } else {
                    Ok(())
                }
            },
        )
        .unwrap();
        assert_eq!(id, "r:a(2).txt");
    }

    #[test]
    fn test_stat_mode_never_runs_operation_on_existing() {
        let mut seen = Vec::new();
        let id = retry_unique(
            "r:dir",
            None,
            ConflictDetection::Stat,
            ATTEMPT_LIMIT,
            |id| id == "r:dir",
            |id| {
                seen.push(id.to_string());
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(id, "r:dir(1)");
        assert_eq!(seen, vec!["r:dir(1)"]);
    }

    #[test]
    fn test_stat_mode_propagates_eexist() {
        let err = retry_unique(
            "r:dir",
            None,
            ConflictDetection::Stat,
            ATTEMPT_LIMIT,
            |_| false,
            |id| Err(BackendError::exists(id).into()),
        )
        .unwrap_err();
        assert!(err.is_backend_exists());
    }

    #[test]
    fn test_other_errors_propagate_immediately() {
        let mut calls = 0;
        let err = retry_unique(
            "r:a",
            None,
            ConflictDetection::ErrorCode,
            ATTEMPT_LIMIT,
            |_| false,
            |_| {
                calls += 1;
                Err(BackendError::not_found("gone").into())
            },
        )
        .unwrap_err();
        assert!(err.is_backend_not_found());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_exhaustion_when_every_name_exists() {
        for limit in [1, 2, 5, ATTEMPT_LIMIT] {
            let mut checks = 0;
            let err = retry_unique(
                "r:a",
                Some("txt"),
                ConflictDetection::Stat,
                limit,
                |_| {
                    checks += 1;
                    true
                },
                |_| panic!("operation must not run"),
            )
            .unwrap_err();
            assert_eq!(checks, limit);
            match err {
                GatewayError::NoUniqueNameFound { attempts, .. } => assert_eq!(attempts, limit),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_exhaustion_with_always_failing_operation() {
        let limit = 4;
        let mut calls = 0;
        let err = retry_unique(
            "r:a",
            None,
            ConflictDetection::ErrorCode,
            limit,
            |_| false,
            |id| {
                calls += 1;
                Err(BackendError::exists(id).into())
            },
        )
        .unwrap_err();
        assert_eq!(calls, limit);
        assert!(matches!(err, GatewayError::NoUniqueNameFound { .. }));
    }
}
