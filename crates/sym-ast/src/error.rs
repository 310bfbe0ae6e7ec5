//! Term construction and solver errors.

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Which stage of driving the external solver failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverFailure {
    /// The solver binary could not be spawned.
    Spawn,
    /// Piping the query in or reading the response back failed.
    Io,
    /// The response did not end in `sat`/`unsat`/`unknown`.
    MalformedResponse,
    /// A counterexample value used an encoding other than `0x…`/`0b…`.
    UnknownEncoding,
}

impl fmt::Display for SolverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Spawn => "spawn failure",
            Self::Io => "I/O failure",
            Self::MalformedResponse => "malformed response",
            Self::UnknownEncoding => "unknown value encoding",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Width mismatch or invalid extract bounds at term construction.
    #[error("ill-typed term: {0}")]
    IllTyped(String),

    /// The external solver could not be driven to a verdict.
    #[error("solver {kind}: {detail}")]
    Solver { kind: SolverFailure, detail: String },
}

impl Error {
    pub(crate) fn solver(kind: SolverFailure, detail: impl Into<String>) -> Self {
        Self::Solver {
            kind,
            detail: detail.into(),
        }
    }
}
