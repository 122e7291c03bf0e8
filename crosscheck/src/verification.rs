// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Build the verification instance: the original query with the primary
//! solver's model asserted on top of it.

use serde::Serialize;
use std::{collections::HashSet, fmt};

use smtlib::{instance::Instance, response::SolverResponse};

/// An equality fixing one variable to its reported value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelAssertion {
    /// The variable, as written in the instance
    pub variable: String,
    /// The value term, as reported by the solver
    pub value: String,
}

impl fmt::Display for ModelAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(assert (= {} {}))", self.variable, self.value)
    }
}

/// Assertions for the variables declared in `instance` that also have a value
/// in `response`, in declaration order. A variable declared twice gets one
/// assertion.
pub fn model_assertions(instance: &Instance, response: &SolverResponse) -> Vec<ModelAssertion> {
    let mut seen = HashSet::new();
    instance
        .variables()
        .iter()
        .filter(|var| seen.insert(var.as_str()))
        .filter_map(|var| {
            response.model.get(var).map(|value| ModelAssertion {
                variable: var.clone(),
                value: value.clone(),
            })
        })
        .collect()
}

/// The part of a line that is code: string literals and quoted symbols are
/// blanked out and a trailing comment is dropped. Literals spanning lines are
/// not tracked.
fn code_part(line: &str) -> String {
    let mut code = String::with_capacity(line.len());
    let mut quote = None;
    for c in line.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                    code.push(c);
                } else {
                    code.push(' ');
                }
            }
            None => match c {
                ';' => break,
                '"' | '|' => {
                    quote = Some(c);
                    code.push(c);
                }
                _ => code.push(c),
            },
        }
    }
    code
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/'".contains(c)
}

/// Whether the code in `code` applies the command `keyword`, as in
/// `(keyword ...`.
fn issues(code: &str, keyword: &str) -> bool {
    code.match_indices('(').any(|(i, _)| {
        let rest = code[i + 1..].trim_start();
        rest.strip_prefix(keyword)
            .is_some_and(|after| !after.starts_with(is_symbol_char))
    })
}

fn is_check_sat(code: &str) -> bool {
    issues(code, "check-sat") || issues(code, "check-sat-assuming")
}

/// Rewrite the instance text line by line: lines setting the logic are
/// dropped (the model's equalities may fall outside it), and the assertions
/// go immediately before the first line that checks satisfiability. Without
/// such a line they are appended at the end.
pub fn rewrite(text: &str, assertions: &[ModelAssertion]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending = Some(assertions);
    for line in text.lines() {
        let code = code_part(line);
        if issues(&code, "set-logic") {
            continue;
        }
        if is_check_sat(&code) {
            if let Some(assertions) = pending.take() {
                for a in assertions {
                    out.push_str(&format!("{a}\n"));
                }
            }
        }
        out.push_str(line);
        out.push('\n');
    }
    if let Some(assertions) = pending {
        for a in assertions {
            out.push_str(&format!("{a}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{code_part, issues, model_assertions, rewrite, ModelAssertion};
    use smtlib::{instance::Instance, response::SolverResponse};

    fn assertion(variable: &str, value: &str) -> ModelAssertion {
        ModelAssertion {
            variable: variable.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_assertion_display() {
        insta::assert_snapshot!(assertion("x", "(- 5)"), @"(assert (= x (- 5)))");
    }

    #[test]
    fn test_only_shared_variables() {
        let instance = Instance::analyze(
            "(declare-const a Int)
(declare-const b Int)
(declare-const a Int)
(declare-const c Int)
(check-sat)",
        )
        .unwrap();
        let response = SolverResponse::parse(
            "sat
((define-fun c () Int 3)
 (define-fun a () Int 1)
 (define-fun extra () Int 9))",
        )
        .unwrap();
        assert_eq!(
            model_assertions(&instance, &response),
            vec![assertion("a", "1"), assertion("c", "3")]
        );
    }

    #[test]
    fn test_rewrite() {
        let text = "(set-logic QF_LIA)
(declare-const x Int)
(assert (> x 4))
(check-sat)
(get-model)";
        insta::assert_snapshot!(rewrite(text, &[assertion("x", "5")]), @r###"
        (declare-const x Int)
        (assert (> x 4))
        (assert (= x 5))
        (check-sat)
        (get-model)
        "###);
    }

    #[test]
    fn test_rewrite_first_check_only() {
        let text = "(declare-const b Bool)\n(check-sat)\n(check-sat-assuming (b))\n";
        assert_eq!(
            rewrite(text, &[assertion("b", "true")]),
            "(declare-const b Bool)\n(assert (= b true))\n(check-sat)\n(check-sat-assuming (b))\n"
        );
    }

    #[test]
    fn test_rewrite_without_check() {
        let text = "(declare-const b Bool)\n";
        assert_eq!(
            rewrite(text, &[assertion("b", "false")]),
            "(declare-const b Bool)\n(assert (= b false))\n"
        );
    }

    #[test]
    fn test_directives_in_comments_and_strings() {
        let text = "; (set-logic ALL) is not needed
(declare-const s String) ; no (check-sat) here
(assert (= s \"(check-sat)\"))
(set-info :source |(set-logic QF_S)|)
(check-sat)";
        insta::assert_snapshot!(rewrite(text, &[assertion("s", "\"(check-sat)\"")]), @r###"
        ; (set-logic ALL) is not needed
        (declare-const s String) ; no (check-sat) here
        (assert (= s "(check-sat)"))
        (set-info :source |(set-logic QF_S)|)
        (assert (= s "(check-sat)"))
        (check-sat)
        "###);
    }

    #[test]
    fn test_issues() {
        assert!(issues("(check-sat)", "check-sat"));
        assert!(issues("  ( check-sat )", "check-sat"));
        assert!(!issues("(check-sat-assuming (a))", "check-sat"));
        assert!(issues("(check-sat-assuming (a))", "check-sat-assuming"));
        assert!(!issues("(assert check-sat)", "check-sat"));
        assert_eq!(code_part("(echo \"a;b\") ; c"), "(echo \"   \") ");
    }
}
