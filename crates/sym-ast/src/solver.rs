//! External SMT solver driver.
//!
//! Each call spawns a fresh solver process, pipes the SMT-LIB2 script onto
//! its stdin, and reads stdout to EOF. There is no persistent session. The
//! final non-empty output line must be `sat`, `unsat`, or `unknown`; on
//! `sat`, counterexample lines of the form `ASSERT( name = value );` are
//! decoded into a [`Model`].

use std::io::{Read, Write};
use std::process::{Command, Stdio};

use log::{debug, trace};

use crate::error::{Error, Result, SolverFailure};
use crate::manager::AstManager;
use crate::model::Model;
use crate::term::TermId;

/// Marker opening a counterexample assignment line.
const MODEL_LINE_PREFIX: &str = "ASSERT(";

/// Solver verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    Sat,
    Unsat,
    Unknown,
}

/// How to invoke the solver binary.
///
/// The default targets an STP-compatible solver: SMT-LIB2 input on stdin,
/// counterexample printing enabled.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub binary: String,
    pub args: Vec<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            binary: "stp".to_string(),
            args: vec!["--SMTLIB2".to_string(), "-p".to_string()],
        }
    }
}

impl AstManager {
    /// Discharge a set of boolean assertions to the external solver.
    ///
    /// Returns the verdict and, on `sat`, the decoded model.
    ///
    /// # Errors
    ///
    /// `Solver` on spawn/pipe failure, a response not terminated by a
    /// verdict line, or a counterexample value in an unknown encoding.
    pub fn call_solver(&self, assertions: &[TermId]) -> Result<(SolverStatus, Option<Model>)> {
        let script = self.smt2_script(assertions);
        let config = self.solver_config();
        debug!(
            "invoking solver {} with {} assertion(s)",
            config.binary,
            assertions.len()
        );
        trace!("solver query:\n{script}");

        let mut child = Command::new(&config.binary)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::solver(SolverFailure::Spawn, format!("{}: {e}", config.binary)))?;

        // Scope the handle so stdin closes and the solver sees EOF.
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| Error::solver(SolverFailure::Io, "no stdin pipe"))?;
            stdin
                .write_all(script.as_bytes())
                .map_err(|e| Error::solver(SolverFailure::Io, e.to_string()))?;
        }

        let mut output = String::new();
        child
            .stdout
            .take()
            .ok_or_else(|| Error::solver(SolverFailure::Io, "no stdout pipe"))?
            .read_to_string(&mut output)
            .map_err(|e| Error::solver(SolverFailure::Io, e.to_string()))?;
        child
            .wait()
            .map_err(|e| Error::solver(SolverFailure::Io, e.to_string()))?;

        trace!("solver response:\n{output}");
        parse_solver_output(&output)
    }
}

/// Parse a complete solver response.
pub(crate) fn parse_solver_output(output: &str) -> Result<(SolverStatus, Option<Model>)> {
    let verdict = output
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| Error::solver(SolverFailure::MalformedResponse, "empty response"))?;

    let status = match verdict {
        "sat" => SolverStatus::Sat,
        "unsat" => SolverStatus::Unsat,
        "unknown" => SolverStatus::Unknown,
        other => {
            return Err(Error::solver(
                SolverFailure::MalformedResponse,
                format!("unexpected verdict line {other:?}"),
            ))
        }
    };

    if status != SolverStatus::Sat {
        return Ok((status, None));
    }

    let mut model = Model::new();
    for line in output.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix(MODEL_LINE_PREFIX) {
            let (name, value, width) = parse_assignment(rest)?;
            model.add_variable(&name, value, width);
        }
    }
    Ok((status, Some(model)))
}

/// Decode the body of `ASSERT( name = value );` — the prefix is already
/// stripped by the caller.
fn parse_assignment(rest: &str) -> Result<(String, u32, u8)> {
    let body = rest
        .trim_end()
        .strip_suffix(';')
        .map(str::trim_end)
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| {
            Error::solver(
                SolverFailure::MalformedResponse,
                format!("unterminated assignment {rest:?}"),
            )
        })?;

    let (name, literal) = body.split_once('=').ok_or_else(|| {
        Error::solver(
            SolverFailure::MalformedResponse,
            format!("assignment without '=' in {body:?}"),
        )
    })?;
    let name = name.trim();
    let literal = literal.trim();

    let (value, width) = decode_value_literal(literal)?;
    Ok((name.to_string(), value, width))
}

/// Decode `0x…` (width = 4 × digits) or `0b…` (width = digits) literals.
fn decode_value_literal(literal: &str) -> Result<(u32, u8)> {
    let bad = |detail: String| Error::solver(SolverFailure::UnknownEncoding, detail);

    if let Some(hex) = literal.strip_prefix("0x").or_else(|| literal.strip_prefix("0X")) {
        if hex.is_empty() || hex.len() > 8 {
            return Err(bad(format!("hex literal {literal:?}")));
        }
        let value = u32::from_str_radix(hex, 16).map_err(|_| bad(format!("hex literal {literal:?}")))?;
        return Ok((value, (hex.len() * 4) as u8));
    }

    if let Some(bin) = literal.strip_prefix("0b").or_else(|| literal.strip_prefix("0B")) {
        if bin.is_empty() || bin.len() > 32 {
            return Err(bad(format!("binary literal {literal:?}")));
        }
        let value = u32::from_str_radix(bin, 2).map_err(|_| bad(format!("binary literal {literal:?}")))?;
        return Ok((value, bin.len() as u8));
    }

    Err(bad(format!("value literal {literal:?}")))
}
