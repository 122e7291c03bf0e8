// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Construct launch configurations for the solvers being compared.

use std::{path::Path, time::Duration};

use crate::proc::Invocation;

/// The full invocation of a solver binary, minus the query file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverCmd {
    /// Binary to launch
    pub cmd: String,
    /// Arguments to pass before the query file
    pub args: Vec<String>,
}

impl SolverCmd {
    /// A solver launched as `cmd <file>` with no extra arguments.
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            args: vec![],
        }
    }

    /// Append arguments.
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    /// Build the command line string, for printing purposes.
    pub fn cmdline(&self) -> String {
        let mut inv = Invocation::new(&self.cmd);
        inv.args(&self.args);
        inv.cmdline()
    }

    /// The process to run for checking `file`, killed after `timeout`.
    pub fn invocation(&self, file: &Path, timeout: Duration) -> Invocation {
        let mut inv = Invocation::new(&self.cmd);
        inv.args(&self.args).arg(file).timeout(timeout);
        inv
    }
}

/// Builder for running Z3 on a script file, printing a model after every
/// satisfiable check.
#[derive(Debug, Clone)]
pub struct Z3Conf(SolverCmd);

impl Z3Conf {
    /// Create a Z3Conf with some default options. Uses `cmd` as the path to Z3.
    pub fn new(cmd: &str) -> Self {
        let mut cmd = SolverCmd::new(cmd);
        cmd.args(["-smt2", "dump_models=true"]);
        Self(cmd)
    }

    /// Set Z3's own hard time limit, rounded up to whole seconds.
    pub fn timeout(&mut self, limit: Duration) -> &mut Self {
        let secs = limit.as_secs() + u64::from(limit.subsec_nanos() > 0);
        self.0.args([format!("-T:{secs}")]);
        self
    }

    /// Get the final command to run the solver.
    pub fn done(self) -> SolverCmd {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::{SolverCmd, Z3Conf};
    use std::{path::Path, time::Duration};

    #[test]
    fn test_z3_cmdline() {
        let mut z3 = Z3Conf::new("z3");
        z3.timeout(Duration::from_millis(59_500));
        assert_eq!(z3.done().cmdline(), "z3 -smt2 dump_models=true -T:60");
    }

    #[test]
    fn test_invocation() {
        let mut cmd = SolverCmd::new("checker");
        cmd.args(["--smt2"]);
        let inv = cmd.invocation(Path::new("/tmp/q.smt2"), Duration::from_secs(5));
        assert_eq!(inv.cmdline(), "checker --smt2 /tmp/q.smt2");
        assert_eq!(inv.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_cmdline_quoting() {
        let mut cmd = SolverCmd::new("checker");
        assert_eq!(cmd.cmdline(), "checker");
        cmd.args(["--out", "my file.smt2", "say \"hi\""]);
        assert_eq!(
            cmd.cmdline(),
            cmd.invocation(Path::new("q.smt2"), Duration::from_secs(1))
                .cmdline()
                .trim_end_matches(" q.smt2")
        );
        assert_eq!(
            cmd.cmdline(),
            r#"checker --out "my file.smt2" "say \"hi\"""#
        );
    }
}
