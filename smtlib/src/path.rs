// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Utilities for finding solver binaries in the filesystem.

use std::{env, path::Path};

#[allow(non_snake_case)]
fn REPO_ROOT_PATH() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("could not get parent directory of smtlib package")
}

/// Get the right invocation of the solver with binary name bin.
///
/// First checks if the solver environment variable is set (eg, Z3_BIN, or
/// YICES_SMT2_BIN for yices-smt2), which takes first priority. Then checks
/// if the solver binary is in the `solvers` directory of the workspace.
/// Finally falls back to just using bin as-is (that is, relying on $PATH).
pub fn solver_path(bin: &str) -> String {
    let var = bin.to_uppercase().replace('-', "_") + "_BIN";
    if let Some(val) = env::var_os(var) {
        return val.to_string_lossy().into();
    }
    let src_bin_path = REPO_ROOT_PATH().join("solvers").join(bin);
    if src_bin_path.exists() {
        return src_bin_path.to_string_lossy().into();
    }
    bin.to_owned()
}
