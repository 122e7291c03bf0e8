// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Print the status, model, and errors in a saved solver response.

use std::{fs, path::PathBuf, process};

use clap::Parser;
use smtlib::response::SolverResponse;

#[derive(Parser, Debug)]
#[command(about = "Interpret a saved SMT solver response", long_about = None)]
struct Args {
    #[arg(long)]
    /// Print the response as JSON
    json: bool,

    /// File with the solver's output
    file: PathBuf,
}

fn main() {
    pretty_env_logger::init();
    let args = Args::parse();
    let text = match fs::read_to_string(&args.file) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("could not read {}: {err}", args.file.display());
            process::exit(1);
        }
    };
    let resp = match SolverResponse::parse(&text) {
        Ok(resp) => resp,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };
    if args.json {
        println!(
            "{}",
            serde_json::to_string(&resp).expect("could not serialize response")
        );
        return;
    }
    println!("{}", resp.status_str());
    for (var, value) in &resp.model {
        println!("{var} = {value}");
    }
    for err in &resp.errors {
        println!("error: {err}");
    }
}
