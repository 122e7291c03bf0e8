// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Cross-check a primary solver's model with a secondary solver.
//!
//! A pass runs the primary solver on the instance. If it reports `sat`, the
//! reported values are asserted on top of the instance and the secondary
//! solver must find the result satisfiable too. Any other secondary verdict
//! is a disagreement between the two solvers.

use serde::Serialize;
use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

use smtlib::{
    conf::SolverCmd,
    instance::Instance,
    proc::{ProcessError, ProcessResult},
    response::{SolverResponse, Status},
    syntax::DocumentError,
};

use crate::verification::{model_assertions, rewrite};

/// An error that ends a cross-check pass without a report.
#[derive(Error, Debug)]
pub enum CrossCheckError {
    /// The instance could not be read
    #[error("could not read {}: {source}", path.display())]
    Read {
        #[allow(missing_docs)]
        path: PathBuf,
        #[allow(missing_docs)]
        source: io::Error,
    },
    /// The instance is not a well-formed script
    #[error("could not analyze instance: {0}")]
    Instance(#[source] DocumentError),
    /// The primary solver's output is not a well-formed response
    #[error("could not interpret output of {solver}: {source}")]
    Response {
        /// The solver's command line
        solver: String,
        #[allow(missing_docs)]
        source: DocumentError,
    },
    /// A solver could not be run
    #[error(transparent)]
    Process(#[from] ProcessError),
    /// The verification instance could not be written
    #[error("could not write verification instance: {0}")]
    Scratch(#[source] io::Error),
    /// The configuration is inconsistent
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// How to run both solvers.
#[derive(Debug, Clone)]
pub struct CrossCheckConf {
    /// The solver whose models are checked; the instance path is appended
    pub primary: SolverCmd,
    /// The solver checking the models; the scratch path is appended
    pub secondary: SolverCmd,
    /// Watchdog limit for each solver run
    pub timeout: Duration,
    /// Where scratch files go (the system temporary directory by default)
    pub scratch_dir: Option<PathBuf>,
}

impl CrossCheckConf {
    /// Create a configuration, checking that the watchdog limit is strictly
    /// above the time limit the solvers were given, so the solver's own
    /// limit is what normally ends a long run.
    pub fn new(
        primary: SolverCmd,
        secondary: SolverCmd,
        solver_limit: Duration,
        timeout: Duration,
    ) -> Result<Self, CrossCheckError> {
        if timeout <= solver_limit {
            return Err(CrossCheckError::Config(format!(
                "watchdog timeout {}s must exceed solver time limit {}s",
                timeout.as_secs_f64(),
                solver_limit.as_secs_f64()
            )));
        }
        Ok(Self {
            primary,
            secondary,
            timeout,
            scratch_dir: None,
        })
    }
}

/// What the secondary solver said, judged by scanning its output.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[allow(missing_docs)]
    Sat,
    #[allow(missing_docs)]
    Unsat,
    #[allow(missing_docs)]
    Unknown,
    /// No line mentioned any verdict.
    Unparsable,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Sat => "sat",
            Verdict::Unsat => "unsat",
            Verdict::Unknown => "unknown",
            Verdict::Unparsable => "unparsable",
        };
        write!(f, "{s}")
    }
}

impl Verdict {
    /// Find the verdict in unstructured output: the first line with a `SAT`,
    /// `UNSAT`, or `UNKNOWN` word decides, with the words checked in that
    /// order within a line.
    pub fn scan(output: &str) -> Self {
        for line in output.lines() {
            let words: Vec<&str> = line
                .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .collect();
            for (word, verdict) in [
                ("SAT", Verdict::Sat),
                ("UNSAT", Verdict::Unsat),
                ("UNKNOWN", Verdict::Unknown),
            ] {
                if words.contains(&word) {
                    return verdict;
                }
            }
        }
        Verdict::Unparsable
    }
}

/// The secondary solver's verdict and the output it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecondaryResult {
    #[allow(missing_docs)]
    pub verdict: Verdict,
    /// Raw standard output
    pub output: String,
}

/// Whether the two solvers agree.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Agreement {
    /// The secondary solver accepted the model.
    #[serde(rename = "OK")]
    Ok,
    /// The secondary solver did not accept the model.
    #[serde(rename = "FAIL")]
    Fail,
}

/// The result of one cross-check pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossCheckReport {
    /// The primary solver's status (`None` if it printed none)
    pub primary: Option<Status>,
    /// Errors the primary solver printed
    pub errors: Vec<String>,
    /// The primary solver's model
    pub model: Vec<(String, String)>,
    /// The secondary check, if the primary said `sat`
    pub secondary: Option<SecondaryResult>,
    /// `None` when there was nothing to verify or the secondary output could
    /// not be understood
    pub agreement: Option<Agreement>,
}

impl CrossCheckReport {
    fn new(primary: SolverResponse, secondary: Option<SecondaryResult>) -> Self {
        let agreement = match (&primary.status, &secondary) {
            (_, None) => None,
            (_, Some(s)) if s.verdict == Verdict::Unparsable => None,
            (Some(Status::Sat), Some(s)) if s.verdict == Verdict::Sat => Some(Agreement::Ok),
            (_, Some(_)) => Some(Agreement::Fail),
        };
        Self {
            primary: primary.status,
            errors: primary.errors,
            model: primary.model.into_iter().collect(),
            secondary,
            agreement,
        }
    }

    /// Whether the secondary solver's output had no recognizable verdict.
    pub fn unparsable(&self) -> bool {
        matches!(&self.secondary, Some(s) if s.verdict == Verdict::Unparsable)
    }
}

impl fmt::Display for CrossCheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.primary {
            Some(status) => writeln!(f, "status: {status}")?,
            None => writeln!(f, "status: none")?,
        }
        for err in &self.errors {
            writeln!(f, "error: {err}")?;
        }
        if !self.model.is_empty() {
            writeln!(f, "model:")?;
            for (var, value) in &self.model {
                writeln!(f, "  {var} = {value}")?;
            }
        }
        let Some(secondary) = &self.secondary else {
            return Ok(());
        };
        match self.agreement {
            Some(Agreement::Ok) => writeln!(f, "OK"),
            Some(Agreement::Fail) => writeln!(
                f,
                "FAIL: secondary solver reported {}",
                secondary.verdict
            ),
            None => {
                writeln!(f, "error: could not parse secondary solver output:")?;
                write!(f, "{}", secondary.output)
            }
        }
    }
}

/// Runs cross-check passes with a fixed configuration.
#[derive(Debug, Clone)]
pub struct CrossCheck {
    conf: CrossCheckConf,
}

impl CrossCheck {
    #[allow(missing_docs)]
    pub fn new(conf: CrossCheckConf) -> Self {
        Self { conf }
    }

    fn run_solver(&self, solver: &SolverCmd, file: &Path) -> Result<ProcessResult, ProcessError> {
        let result = solver.invocation(file, self.conf.timeout).run()?;
        if !result.stderr.is_empty() {
            log::warn!("{} stderr:\n{}", solver.cmd, result.stderr.trim_end());
        }
        Ok(result)
    }

    /// Run the primary solver on `path` and interpret what it printed.
    fn primary(&self, path: &Path) -> Result<SolverResponse, CrossCheckError> {
        let result = self.run_solver(&self.conf.primary, path)?;
        if result.timed_out {
            return Ok(SolverResponse::timeout());
        }
        SolverResponse::parse(&result.stdout).map_err(|source| CrossCheckError::Response {
            solver: self.conf.primary.cmdline(),
            source,
        })
    }

    /// Write the verification instance and run the secondary solver on it.
    /// The scratch file is removed whether or not this succeeds.
    fn secondary(&self, text: &str) -> Result<SecondaryResult, CrossCheckError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("crosscheck-").suffix(".smt2");
        let mut scratch = match &self.conf.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(CrossCheckError::Scratch)?;
        scratch
            .write_all(text.as_bytes())
            .and_then(|_| scratch.flush())
            .map_err(CrossCheckError::Scratch)?;
        log::debug!("verification instance in {}", scratch.path().display());

        let result = self.run_solver(&self.conf.secondary, scratch.path());
        if let Err(err) = scratch.close() {
            log::warn!("could not remove verification instance: {err}");
        }
        let result = result?;
        Ok(SecondaryResult {
            verdict: Verdict::scan(&result.stdout),
            output: result.stdout,
        })
    }

    /// Run one pass on the instance at `path`.
    pub fn run(&self, path: &Path) -> Result<CrossCheckReport, CrossCheckError> {
        let text = fs::read_to_string(path).map_err(|source| CrossCheckError::Read {
            path: path.to_owned(),
            source,
        })?;
        let instance = Instance::analyze(text).map_err(CrossCheckError::Instance)?;
        log::debug!("instance declares {:?}", instance.variables());

        let primary = self.primary(path)?;
        log::info!("primary solver: {}", primary.status_str());
        if !primary.is_sat() {
            return Ok(CrossCheckReport::new(primary, None));
        }

        let assertions = model_assertions(&instance, &primary);
        log::debug!("asserting {} model values", assertions.len());
        let secondary = self.secondary(&rewrite(instance.text(), &assertions))?;
        log::info!("secondary solver: {}", secondary.verdict);
        Ok(CrossCheckReport::new(primary, Some(secondary)))
    }
}
