// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Typed SMT-LIB documents.
//!
//! A [`Document`] is either a script (a sequence of commands sent to a
//! solver) or a sequence of responses (what a solver prints back). The two
//! shapes are lowered from s-expressions into closed enums so that every
//! consumer matches on them exhaustively.

use peg::str::LineCol;
use thiserror::Error;

use crate::response::Status;
use crate::sexp::{self, Atom, Sexp};

/// Keywords of the SMT-LIB commands. A document whose first entry is a list
/// headed by one of these is a script.
const COMMANDS: &[&str] = &[
    "assert",
    "check-sat",
    "check-sat-assuming",
    "declare-const",
    "declare-datatype",
    "declare-datatypes",
    "declare-fun",
    "declare-sort",
    "define-fun",
    "define-fun-rec",
    "define-funs-rec",
    "define-sort",
    "echo",
    "exit",
    "get-assertions",
    "get-assignment",
    "get-info",
    "get-model",
    "get-option",
    "get-proof",
    "get-unsat-assumptions",
    "get-unsat-core",
    "get-value",
    "pop",
    "push",
    "reset",
    "reset-assertions",
    "set-info",
    "set-logic",
    "set-option",
];

/// Heads of the entries that may appear inside a model response.
const MODEL_ENTRIES: &[&str] = &[
    "define-fun",
    "define-fun-rec",
    "declare-fun",
    "declare-sort",
    "declare-datatypes",
    "forall",
];

/// A parsed SMT-LIB document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Document {
    /// A query script.
    Script(Vec<Command>),
    /// The output of a solver.
    Responses(Vec<Response>),
}

/// A sorted variable `(name sort)` in a function definition header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedVar {
    /// The bound name
    pub name: String,
    /// Its sort
    pub sort: Sexp,
}

/// A `define-fun` body, shared between scripts and models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunDef {
    /// The defined symbol
    pub name: String,
    /// Parameters, empty for constants
    pub params: Vec<SortedVar>,
    /// Result sort
    pub sort: Sexp,
    /// The definition's value term
    pub body: Sexp,
}

/// A command in a script.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetLogic(String),
    DeclareConst {
        name: String,
        sort: Sexp,
    },
    DeclareFun {
        name: String,
        params: Vec<Sexp>,
        sort: Sexp,
    },
    DefineFun(FunDef),
    Assert(Sexp),
    /// `(check-sat)`, or `(check-sat-assuming ...)` with its assumptions.
    CheckSat {
        assumptions: Vec<Sexp>,
    },
    /// Any other command, which nothing in this crate needs to look into.
    Other {
        keyword: String,
        args: Vec<Sexp>,
    },
}

/// A single response printed by a solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `success`, printed with `:print-success`
    Success,
    /// `unsupported`
    Unsupported,
    /// A bare token in status position, kept as its literal text. Whether it
    /// is actually a valid status is up to the interpreter.
    CheckSat(String),
    /// `(error "msg")`, with the message's token text (quotes included).
    Error(String),
    /// A model, holding only its function definitions.
    Model(Vec<FunDef>),
    /// A string printed by `echo`.
    Echo(String),
    /// Any other response (`get-value`, `get-info`, ...).
    Other(Sexp),
}

/// Problems turning text into a [`Document`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The text is not a sequence of s-expressions.
    #[error("could not parse s-expressions: {0}")]
    Syntax(#[from] peg::error::ParseError<LineCol>),
    /// An s-expression does not have the shape its head requires.
    #[error("malformed {what}: {sexp}")]
    Malformed {
        /// What was being lowered
        what: &'static str,
        /// The offending s-expression
        sexp: String,
    },
}

/// A document that parsed but violates what the consumer expects of it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// A script was handed to the response interpreter.
    #[error("attempted to interpret a response, got a script")]
    ExpectedResponse,
    /// A response was handed to the instance analyzer.
    #[error("attempted to analyze a script, got a response")]
    ExpectedScript,
    /// More than one check-sat response.
    #[error("multiple status entries unsupported (got {second} after {first})")]
    MultipleStatus {
        /// The status already recorded
        first: Status,
        /// The literal text of the second entry
        second: String,
    },
    /// A check-sat response that is not a known status.
    #[error("unrecognized check-sat response {0:?}")]
    UnrecognizedStatus(String),
}

/// Either way of failing to get from text to a result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[allow(missing_docs)]
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[allow(missing_docs)]
    #[error(transparent)]
    Format(#[from] FormatError),
}

fn malformed<T>(what: &'static str, sexp: &Sexp) -> Result<T, ParseError> {
    Err(ParseError::Malformed {
        what,
        sexp: sexp.to_string(),
    })
}

fn symbol(what: &'static str, sexp: &Sexp) -> Result<String, ParseError> {
    match sexp.atom_s() {
        Some(s) => Ok(s.to_string()),
        None => malformed(what, sexp),
    }
}

fn sorted_var(sexp: &Sexp) -> Result<SortedVar, ParseError> {
    match sexp.list() {
        Some([name, sort]) => Ok(SortedVar {
            name: symbol("sorted variable", name)?,
            sort: sort.clone(),
        }),
        _ => malformed("sorted variable", sexp),
    }
}

impl FunDef {
    /// Lower the arguments of a `define-fun`, `(name (params) sort body)`.
    fn from_args(whole: &Sexp, args: &[Sexp]) -> Result<Self, ParseError> {
        let [name, params, sort, body] = args else {
            return malformed("define-fun", whole);
        };
        let Some(params) = params.list() else {
            return malformed("define-fun", whole);
        };
        Ok(FunDef {
            name: symbol("define-fun", name)?,
            params: params.iter().map(sorted_var).collect::<Result<_, _>>()?,
            sort: sort.clone(),
            body: body.clone(),
        })
    }
}

impl Command {
    fn lower(sexp: &Sexp) -> Result<Self, ParseError> {
        let Some((head, args)) = sexp.app() else {
            return malformed("command", sexp);
        };
        let cmd = match (head, args) {
            ("set-logic", [logic]) => Command::SetLogic(symbol("set-logic", logic)?),
            ("declare-const", [name, sort]) => Command::DeclareConst {
                name: symbol("declare-const", name)?,
                sort: sort.clone(),
            },
            ("declare-fun", [name, params, sort]) => Command::DeclareFun {
                name: symbol("declare-fun", name)?,
                params: match params.list() {
                    Some(params) => params.to_vec(),
                    None => return malformed("declare-fun", sexp),
                },
                sort: sort.clone(),
            },
            ("define-fun", args) => Command::DefineFun(FunDef::from_args(sexp, args)?),
            ("assert", [term]) => Command::Assert(term.clone()),
            ("check-sat", []) => Command::CheckSat {
                assumptions: vec![],
            },
            ("check-sat-assuming", [assumptions]) => Command::CheckSat {
                assumptions: match assumptions.list() {
                    Some(assumptions) => assumptions.to_vec(),
                    None => return malformed("check-sat-assuming", sexp),
                },
            },
            (
                "set-logic" | "declare-const" | "declare-fun" | "assert" | "check-sat"
                | "check-sat-assuming",
                _,
            ) => return malformed("command", sexp),
            (keyword, args) => Command::Other {
                keyword: keyword.to_string(),
                args: args.to_vec(),
            },
        };
        Ok(cmd)
    }
}

fn is_model_entry(sexp: &Sexp) -> bool {
    matches!(sexp.app(), Some((head, _)) if MODEL_ENTRIES.contains(&head))
}

fn model(entries: &[Sexp]) -> Result<Response, ParseError> {
    let mut defs = vec![];
    for entry in entries {
        match entry.app() {
            Some(("define-fun" | "define-fun-rec", args)) => {
                defs.push(FunDef::from_args(entry, args)?);
            }
            // sort universes and cardinality constraints carry no assignment
            Some((head, _)) if MODEL_ENTRIES.contains(&head) => {}
            _ => return malformed("model entry", entry),
        }
    }
    Ok(Response::Model(defs))
}

impl Response {
    fn lower(sexp: &Sexp) -> Result<Self, ParseError> {
        match sexp {
            Sexp::Atom(Atom::String(s)) => Ok(Response::Echo(s.clone())),
            Sexp::Atom(Atom::Symbol(s)) if s == "success" => Ok(Response::Success),
            Sexp::Atom(Atom::Symbol(s)) if s == "unsupported" => Ok(Response::Unsupported),
            Sexp::Atom(a) => Ok(Response::CheckSat(a.text().to_string())),
            Sexp::Comment(_) => malformed("response", sexp),
            Sexp::List(ss) => match sexp.app() {
                Some(("error", [Sexp::Atom(Atom::String(msg))])) => {
                    Ok(Response::Error(msg.clone()))
                }
                Some(("error", _)) => malformed("error response", sexp),
                Some(("model", entries)) => model(entries),
                _ if ss.is_empty() => Ok(Response::Model(vec![])),
                _ if ss.iter().all(is_model_entry) => model(ss),
                _ => Ok(Response::Other(sexp.clone())),
            },
        }
    }
}

fn is_command(sexp: &Sexp) -> bool {
    matches!(sexp.app(), Some((head, _)) if COMMANDS.contains(&head))
}

impl Document {
    /// Parse a script or a sequence of solver responses.
    ///
    /// The kind of document is decided by its first entry: a list headed by
    /// a command keyword makes a script, anything else a response. Every
    /// other entry must then fit the same kind.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let sexps: Vec<Sexp> = sexp::parse_many(text)?
            .iter()
            .filter_map(Sexp::without_comments)
            .collect();
        let doc = match sexps.first() {
            Some(first) if is_command(first) => Document::Script(
                sexps
                    .iter()
                    .map(Command::lower)
                    .collect::<Result<_, _>>()?,
            ),
            _ => Document::Responses(
                sexps
                    .iter()
                    .map(Response::lower)
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(doc)
    }

    /// Whether this is a script rather than a response.
    pub fn is_script(&self) -> bool {
        matches!(self, Document::Script(_))
    }
}
