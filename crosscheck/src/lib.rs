// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Differential testing of SMT solvers.
//!
//! A primary solver's model is re-checked by a secondary solver: the model's
//! values are asserted on top of the original query, and the secondary solver
//! has to agree that the result is satisfiable.

#![deny(missing_docs)]
// configure clippy
#![allow(clippy::needless_return)]
#![deny(clippy::uninlined_format_args)]
// documentation-related lints (only checked when running rustdoc)
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod check;
pub mod command;
pub mod verification;

#[doc(hidden)]
pub use command::App;
