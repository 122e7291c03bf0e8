// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! SMT-LIB documents and solver processes, as needed to cross-check solvers.
//!
//! Scripts and solver responses are parsed into a typed [`syntax::Document`].
//! A response document is interpreted into a [`response::SolverResponse`]
//! (status, model, and errors), and a script into an [`instance::Instance`]
//! (the variables it declares). Solvers themselves are black boxes run to
//! completion by [`proc::Invocation::run`] under a wall-clock limit.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::upper_case_acronyms)]
#![deny(clippy::uninlined_format_args)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod conf;
pub mod instance;
pub mod path;
pub mod proc;
pub mod response;
pub mod sexp;
pub mod syntax;
