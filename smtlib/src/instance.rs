// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Find the variables a query script introduces.

use crate::syntax::{Command, Document, DocumentError, FormatError};

/// A query script together with the names it declares or defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    text: String,
    variables: Vec<String>,
}

impl Instance {
    /// Parse `text` as a script and collect its variables.
    pub fn analyze<S: Into<String>>(text: S) -> Result<Self, DocumentError> {
        let text = text.into();
        let doc = Document::parse(&text)?;
        let variables = declared_variables(&doc)?;
        Ok(Self { text, variables })
    }

    /// The original script text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Declared and defined names, in script order (duplicates included).
    pub fn variables(&self) -> &[String] {
        &self.variables
    }
}

/// Names introduced by `declare-const`, `declare-fun`, and `define-fun`, in
/// order. A name declared twice is listed twice.
pub fn declared_variables(doc: &Document) -> Result<Vec<String>, FormatError> {
    let Document::Script(cmds) = doc else {
        return Err(FormatError::ExpectedScript);
    };
    Ok(cmds
        .iter()
        .filter_map(|cmd| match cmd {
            Command::DeclareConst { name, .. } | Command::DeclareFun { name, .. } => Some(name),
            Command::DefineFun(def) => Some(&def.name),
            Command::SetLogic(_)
            | Command::Assert(_)
            | Command::CheckSat { .. }
            | Command::Other { .. } => None,
        })
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{declared_variables, Instance};
    use crate::syntax::{Document, DocumentError, FormatError};

    #[test]
    fn test_declarations_in_order() {
        let inst = Instance::analyze(
            "(set-logic QF_UFLIA)
(declare-const x Int)
(declare-fun f (Int) Int)
(define-fun y () Int (+ x 1))
(declare-sort U 0)
(assert (= (f x) y))
(push 1)
(declare-const x Int)
(check-sat)
",
        )
        .unwrap();
        assert_eq!(inst.variables(), ["x", "f", "y", "x"]);
        assert!(inst.text().starts_with("(set-logic QF_UFLIA)"));
    }

    #[test]
    fn test_no_declarations() {
        let inst = Instance::analyze("(set-logic QF_LIA)\n(check-sat)\n").unwrap();
        assert!(inst.variables().is_empty());
    }

    #[test]
    fn test_response_rejected() {
        let doc = Document::parse("sat\n").unwrap();
        assert_eq!(
            declared_variables(&doc).unwrap_err(),
            FormatError::ExpectedScript
        );
        assert_eq!(
            Instance::analyze("(model (define-fun x () Int 1))").unwrap_err(),
            DocumentError::Format(FormatError::ExpectedScript)
        );
    }
}
