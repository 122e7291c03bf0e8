// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A custom s-expression data type and parsing.
//!
//! Atoms keep the exact text they were parsed from, so that values reported
//! by a solver can be echoed back into a new query without any
//! normalization. Comments are part of the grammar since some solvers
//! interleave them with their models.

use peg::str::LineCol;
use std::fmt;

/// An SMT-LIB token. Every variant holds the token's source text verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Atom {
    /// A numeral such as `42`.
    Numeral(String),
    /// A decimal such as `4.2`.
    Decimal(String),
    /// A `#x` or `#b` bit-vector literal.
    Bits(String),
    /// A string literal, including its quotes (escapes are left as `""`).
    String(String),
    /// A simple symbol, or a `|quoted symbol|` including the pipes.
    Symbol(String),
    /// A keyword such as `:named`.
    Keyword(String),
}

impl Atom {
    /// The source text of this token.
    pub fn text(&self) -> &str {
        match self {
            Atom::Numeral(s)
            | Atom::Decimal(s)
            | Atom::Bits(s)
            | Atom::String(s)
            | Atom::Symbol(s)
            | Atom::Keyword(s) => s,
        }
    }

    /// Return the symbol text of self, if it is a symbol.
    pub fn symbol(&self) -> Option<&str> {
        if let Self::Symbol(s) = self {
            Some(s)
        } else {
            None
        }
    }
}

/// An s-expression which also tracks comments.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Sexp {
    Atom(Atom),
    Comment(String),
    List(Vec<Sexp>),
}

/// Construct a symbol atom from a string.
pub fn atom_s<S: AsRef<str>>(s: S) -> Sexp {
    Sexp::Atom(Atom::Symbol(s.as_ref().to_string()))
}

/// Construct a numeral atom.
pub fn atom_i(i: usize) -> Sexp {
    Sexp::Atom(Atom::Numeral(i.to_string()))
}

/// Construct an sexp list from an iteratable.
pub fn sexp_l<I>(i: I) -> Sexp
where
    I: IntoIterator,
    I::IntoIter: Iterator<Item = Sexp>,
{
    Sexp::List(i.into_iter().collect())
}

/// Construct an sexp list with a symbol as its "head" element, followed by
/// an iterable of remaining arguments.
pub fn app<I>(head: &str, args: I) -> Sexp
where
    I: IntoIterator,
    I::IntoIter: Iterator<Item = Sexp>,
{
    let mut ss = vec![atom_s(head)];
    #[allow(clippy::useless_conversion)]
    ss.extend(args.into_iter());
    Sexp::List(ss)
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(s) => write!(f, "{s}"),
            Sexp::Comment(s) => write!(f, ";{s}"),
            Sexp::List(ss) => {
                write!(f, "(")?;
                for (i, s) in ss.iter().enumerate() {
                    let last = i == ss.len() - 1;
                    let this_comment = matches!(s, Sexp::Comment(_));
                    let next_comment = !last && matches!(ss[i + 1], Sexp::Comment(_));
                    let space = if last || this_comment || next_comment {
                        ""
                    } else {
                        " "
                    };
                    if this_comment {
                        write!(f, "\n{s}\n{space}")?;
                    } else {
                        write!(f, "{s}{space}")?;
                    }
                }
                write!(f, ")")?;
                Ok(())
            }
        }
    }
}

impl Sexp {
    /// Return the inner elements if self is a Sexp::List
    pub fn list(&self) -> Option<&[Sexp]> {
        if let Sexp::List(ss) = self {
            Some(ss)
        } else {
            None
        }
    }

    /// Return the inner atom if self is an atom.
    pub fn atom(&self) -> Option<&Atom> {
        if let Sexp::Atom(a) = self {
            Some(a)
        } else {
            None
        }
    }

    /// Return the symbol text if self is a symbol atom.
    pub fn atom_s(&self) -> Option<&str> {
        self.atom().and_then(Atom::symbol)
    }

    /// Return the head and tail if self is of the form `(head rest..)`.
    pub fn app(&self) -> Option<(&str, &[Sexp])> {
        self.list().and_then(|ss| {
            if !ss.is_empty() {
                if let Some(head) = ss[0].atom_s() {
                    return Some((head, &ss[1..]));
                }
            }
            None
        })
    }

    /// Return a copy of self with all comments removed, or `None` if self is
    /// itself a comment.
    pub fn without_comments(&self) -> Option<Sexp> {
        match self {
            Sexp::Atom(_) => Some(self.clone()),
            Sexp::Comment(_) => None,
            Sexp::List(ss) => Some(Sexp::List(
                ss.iter().filter_map(Sexp::without_comments).collect(),
            )),
        }
    }
}

peg::parser! {
grammar parser() for str {
  rule symbol_char() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '~' | '!' | '@' | '$' | '%' | '^' | '&' | '*' | '_' | '-' | '+' | '=' | '<' | '>' | '.' | '?' | '/' | '\'']
  rule simple_symbol() = quiet! { !['0'..='9'] symbol_char()+ } / expected!("symbol")

  rule whitespace() = [' ' | '\t' | '\n' | '\r']
  rule _ = whitespace()*

  // an atom must be followed by something that cannot continue it
  rule delimiter() = &(whitespace() / ['(' | ')' | ';']) / ![_]

  rule decimal() -> Atom
  = s:$(['0'..='9']+ "." ['0'..='9']+) { Atom::Decimal(s.to_string()) }

  rule numeral() -> Atom
  = s:$(['0'..='9']+) { Atom::Numeral(s.to_string()) }

  rule bits() -> Atom
  = s:$("#x" ['0'..='9' | 'a'..='f' | 'A'..='F']+ / "#b" ['0' | '1']+) { Atom::Bits(s.to_string()) }

  rule string() -> Atom
  = s:$("\"" ([^'"'] / "\"\"")* "\"") { Atom::String(s.to_string()) }

  rule quoted_symbol() -> Atom
  = s:$("|" [^'|']* "|") { Atom::Symbol(s.to_string()) }

  rule keyword() -> Atom
  = s:$(":" symbol_char()+) { Atom::Keyword(s.to_string()) }

  rule symbol() -> Atom
  = s:$(simple_symbol()) { Atom::Symbol(s.to_string()) }

  rule atom() -> Sexp
  = a:(decimal() /
       numeral() /
       bits() /
       string() /
       quoted_symbol() /
       keyword() /
       symbol()) delimiter() { Sexp::Atom(a) }

  rule comment() -> Sexp
  = ";" s:$([^'\n']*) ("\n" / ![_]) { Sexp::Comment(s.to_string()) }

  rule list() -> Sexp
  = "(" _ ss:(sexp() ** _) _ ")" { Sexp::List(ss) }

  rule sexp() -> Sexp
  = atom() / comment() / list()

  /// Parse an sexp but be tolerant to whitespace around it.
  pub(super) rule sexp_whitespace() -> Sexp
  = _ s:sexp() _ { s }

  /// Parse a sequence of sexps.
  pub(super) rule sexps() -> Vec<Sexp>
  = _ ss:(sexp() ** _) _ { ss }
}
}

/// Parse an sexp.
///
/// Allows whitespace before or after.
pub fn parse(s: &str) -> Result<Sexp, peg::error::ParseError<LineCol>> {
    parser::sexp_whitespace(s)
}

/// Parse a sequence of sexps, separated by whitespace.
pub fn parse_many(s: &str) -> Result<Vec<Sexp>, peg::error::ParseError<LineCol>> {
    parser::sexps(s)
}

#[cfg(test)]
mod tests {
    use super::{app, atom_i, atom_s, parse, parse_many, sexp_l, Atom, Sexp};

    #[test]
    fn test_parsing() {
        assert_eq!(
            parse("(foo  a (bar () 1))"),
            Ok(app(
                "foo",
                [atom_s("a"), app("bar", [sexp_l([]), atom_i(1)])]
            ))
        );
    }

    #[test]
    fn test_printing() {
        let e = parse(
            r#"(hello a b c (there
            ; here's a comment
            (friend)))
            "#,
        )
        .unwrap();
        insta::assert_snapshot!(e, @r#"
        (hello a b c (there
        ; here's a comment
        (friend)))
        "#);
    }

    #[test]
    fn test_atoms_keep_source_text() {
        let printed: Vec<String> = [
            "007",
            "3.250",
            "#x0F",
            "#b0101",
            r#""say ""hi""""#,
            "|a b|",
            ":named",
            "A!val!0",
            "foo.thread@0",
        ]
        .into_iter()
        .map(|s| parse(s).unwrap().to_string())
        .collect();
        insta::assert_snapshot!(printed.join("\n"), @r###"
        007
        3.250
        #x0F
        #b0101
        "say ""hi"""
        |a b|
        :named
        A!val!0
        foo.thread@0
        "###);
    }

    #[test]
    fn test_atom_kinds() {
        assert_eq!(
            parse("12").unwrap(),
            Sexp::Atom(Atom::Numeral("12".to_string()))
        );
        assert_eq!(
            parse("1.5").unwrap(),
            Sexp::Atom(Atom::Decimal("1.5".to_string()))
        );
        assert_eq!(
            parse("\"x\"").unwrap(),
            Sexp::Atom(Atom::String("\"x\"".to_string()))
        );
        assert_eq!(parse("|x y|").unwrap().atom_s(), Some("|x y|"));
    }

    #[test]
    fn test_parse_many_with_comments() {
        let es = parse_many("; leading\nsat\n(model) ; trailing").unwrap();
        assert_eq!(es.len(), 4);
        assert!(matches!(es[0], Sexp::Comment(_)));
        assert_eq!(es[1], atom_s("sat"));
        assert_eq!(es[2], app("model", []));
        assert_eq!(es[3], Sexp::Comment(" trailing".to_string()));
    }

    #[test]
    fn test_without_comments() {
        let e = parse("(a ; note\n b)").unwrap();
        assert_eq!(e.without_comments(), Some(app("a", [atom_s("b")])));
        assert_eq!(Sexp::Comment("x".to_string()).without_comments(), None);
    }

    #[test]
    fn test_app_from_iterators() {
        let args: Vec<Sexp> = vec![atom_s("x"), atom_i(5)];
        assert_eq!(app("=", args.clone()).to_string(), "(= x 5)");
        assert_eq!(
            app("and", args.into_iter().map(|a| app("not", [a]))).to_string(),
            "(and (not x) (not 5))"
        );
    }

    #[test]
    fn test_adjacent_atoms_need_a_delimiter() {
        assert!(parse_many("12abc").is_err());
        assert!(parse_many("#x0Fg").is_err());
        assert!(parse_many("(x 1.5y)").is_err());
        assert!(parse_many("\"s\"|q|").is_err());
        assert_eq!(
            parse_many("(f(g)x);c\n\"s\" |q|").unwrap(),
            vec![
                app("f", [app("g", []), atom_s("x")]),
                Sexp::Comment("c".to_string()),
                Sexp::Atom(Atom::String("\"s\"".to_string())),
                atom_s("|q|"),
            ]
        );
    }

    #[test]
    fn test_unbalanced() {
        assert!(parse_many("(assert (= x 1)").is_err());
        assert!(parse_many("x)").is_err());
    }
}
