// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Interpret a solver's output as a status, a model, and error messages.

use indexmap::IndexMap;
use serde::Serialize;
use std::{fmt, str::FromStr};

use crate::syntax::{Document, DocumentError, FormatError, FunDef, Response};

/// A solver's verdict on a query.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The query is satisfiable.
    Sat,
    /// The query is unsatisfiable.
    Unsat,
    /// The solver gave up.
    Unknown,
    /// The solver (or the watchdog around it) ran out of time.
    Timeout,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Sat => "sat",
            Status::Unsat => "unsat",
            Status::Unknown => "unknown",
            Status::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Status {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sat" => Ok(Status::Sat),
            "unsat" => Ok(Status::Unsat),
            "unknown" => Ok(Status::Unknown),
            "timeout" => Ok(Status::Timeout),
            _ => Err(FormatError::UnrecognizedStatus(s.to_string())),
        }
    }
}

/// Everything a solver reported in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SolverResponse {
    /// The check-sat verdict, if the solver printed one.
    pub status: Option<Status>,
    /// Reported values by variable name, in the order the variables were
    /// first reported.
    pub model: IndexMap<String, String>,
    /// Error messages, verbatim and in order.
    pub errors: Vec<String>,
}

impl SolverResponse {
    /// A response for a solver run that was killed by the watchdog.
    pub fn timeout() -> Self {
        Self {
            status: Some(Status::Timeout),
            ..Self::default()
        }
    }

    /// Interpret a parsed response document.
    ///
    /// Fails if `doc` is a script, if it has more than one check-sat
    /// response, or if a check-sat response is not a known status.
    pub fn interpret(doc: &Document) -> Result<Self, FormatError> {
        let Document::Responses(responses) = doc else {
            return Err(FormatError::ExpectedResponse);
        };
        let mut resp = Self::default();
        for r in responses {
            match r {
                Response::CheckSat(text) => resp.record_status(text)?,
                Response::Error(msg) => resp.errors.push(msg.clone()),
                Response::Model(defs) => resp.record_model(defs),
                Response::Success | Response::Unsupported | Response::Echo(_) => {}
                Response::Other(sexp) => {
                    log::debug!("ignoring response {sexp}");
                }
            }
        }
        Ok(resp)
    }

    /// Parse and interpret a solver's textual output.
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let doc = Document::parse(text)?;
        Ok(Self::interpret(&doc)?)
    }

    fn record_status(&mut self, text: &str) -> Result<(), FormatError> {
        if let Some(first) = self.status {
            return Err(FormatError::MultipleStatus {
                first,
                second: text.to_string(),
            });
        }
        self.status = Some(text.parse()?);
        Ok(())
    }

    fn record_model(&mut self, defs: &[FunDef]) {
        for def in defs {
            // IndexMap::insert keeps the original position of an existing key
            self.model.insert(def.name.clone(), def.body.to_string());
        }
    }

    /// Whether the solver reported a satisfying assignment.
    pub fn is_sat(&self) -> bool {
        self.status == Some(Status::Sat)
    }

    /// The status as printed in reports, `none` if there was no status.
    pub fn status_str(&self) -> String {
        match self.status {
            Some(status) => status.to_string(),
            None => "none".to_string(),
        }
    }
}
