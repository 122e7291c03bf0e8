// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The crosscheck binary's command-line interface.

use std::{path::PathBuf, process, time::Duration};

use clap::Parser;
use smtlib::{
    conf::{SolverCmd, Z3Conf},
    path::solver_path,
};

use crate::check::{CrossCheck, CrossCheckConf, CrossCheckError};

/// Exit status when the secondary solver's output had no verdict.
const UNPARSABLE_EXIT: i32 = 2;

#[derive(Parser, Clone, Debug, PartialEq, Eq)]
#[command(about = "Check an SMT solver's model with a second solver", long_about = None)]
/// Command line of the `crosscheck` binary.
pub struct App {
    #[arg(long)]
    /// Primary solver binary (defaults to Z3, found through $Z3_BIN or $PATH)
    primary: Option<String>,

    #[arg(long = "primary-arg", allow_hyphen_values = true)]
    /// Arguments for the primary solver, replacing the Z3 defaults
    primary_args: Vec<String>,

    #[arg(long)]
    /// Secondary solver binary, run on the verification instance
    secondary: String,

    #[arg(long = "secondary-arg", allow_hyphen_values = true)]
    /// Arguments for the secondary solver
    secondary_args: Vec<String>,

    #[arg(long, default_value = "60s")]
    /// Time limit given to the solvers themselves
    solver_timeout: humantime::Duration,

    #[arg(long, default_value = "65s")]
    /// Time after which a solver process is killed
    timeout: humantime::Duration,

    #[arg(long)]
    /// Print the report as JSON
    json: bool,

    /// SMT-LIB instance to check
    file: PathBuf,
}

impl App {
    /// Build the cross-check configuration from the command line.
    pub fn conf(&self) -> Result<CrossCheckConf, CrossCheckError> {
        let solver_limit: Duration = self.solver_timeout.into();
        let primary_bin = match &self.primary {
            Some(bin) => bin.clone(),
            None => solver_path("z3"),
        };
        let primary = if self.primary_args.is_empty() {
            let mut z3 = Z3Conf::new(&primary_bin);
            z3.timeout(solver_limit);
            z3.done()
        } else {
            let mut cmd = SolverCmd::new(&primary_bin);
            cmd.args(&self.primary_args);
            cmd
        };
        let mut secondary = SolverCmd::new(&self.secondary);
        secondary.args(&self.secondary_args);
        CrossCheckConf::new(primary, secondary, solver_limit, self.timeout.into())
    }

    /// Run the application.
    pub fn exec(self) {
        let conf = match self.conf() {
            Ok(conf) => conf,
            Err(err) => {
                eprintln!("{err}");
                process::exit(1);
            }
        };
        log::debug!("primary: {}", conf.primary.cmdline());
        log::debug!("secondary: {}", conf.secondary.cmdline());
        let report = match CrossCheck::new(conf).run(&self.file) {
            Ok(report) => report,
            Err(err) => {
                eprintln!("{err}");
                process::exit(1);
            }
        };
        if self.json {
            println!(
                "{}",
                serde_json::to_string(&report).expect("could not serialize report")
            );
        } else {
            print!("{report}");
        }
        if report.unparsable() {
            process::exit(UNPARSABLE_EXIT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::App;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let app = App::try_parse_from(["crosscheck", "--secondary", "checker", "q.smt2"]).unwrap();
        let conf = app.conf().unwrap();
        assert_eq!(conf.timeout, Duration::from_secs(65));
        assert_eq!(
            conf.primary.args,
            vec!["-smt2", "dump_models=true", "-T:60"]
        );
        assert_eq!(conf.secondary.cmd, "checker");
        assert!(conf.secondary.args.is_empty());
    }

    #[test]
    fn test_custom_solvers() {
        let app = App::try_parse_from([
            "crosscheck",
            "--primary",
            "cvc5",
            "--primary-arg",
            "--produce-models",
            "--secondary",
            "checker",
            "--secondary-arg",
            "-smt2",
            "--solver-timeout",
            "5s",
            "--timeout",
            "10s",
            "q.smt2",
        ])
        .unwrap();
        let conf = app.conf().unwrap();
        assert_eq!(conf.primary.cmdline(), "cvc5 --produce-models");
        assert_eq!(conf.secondary.cmdline(), "checker -smt2");
        assert_eq!(conf.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_watchdog_must_exceed_solver_limit() {
        let app = App::try_parse_from([
            "crosscheck",
            "--secondary",
            "checker",
            "--timeout",
            "30s",
            "q.smt2",
        ])
        .unwrap();
        assert!(app.conf().is_err());
    }

    #[test]
    fn test_file_required() {
        assert!(App::try_parse_from(["crosscheck", "--secondary", "checker"]).is_err());
    }
}
