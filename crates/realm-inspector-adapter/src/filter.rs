//! Predicate grammar for the in-memory backend.
//!
//! Supports the subset of query predicates the inspector UI emits:
//! `TRUEPREDICATE`, `FALSEPREDICATE`, comparisons
//! (`== != < <= > >= BEGINSWITH ENDSWITH CONTAINS`) over dotted key
//! paths, and `AND`/`&&` conjunctions. Literals are quoted strings,
//! numbers, booleans and `nil`.

use std::sync::LazyLock;

use regex::Regex;

use realm_inspector_protocol::Value;

use crate::{Error, Result};

static TERM_RE: LazyLock<Regex> = LazyLock::new(|| {
   Regex::new(r"^([A-Za-z_][A-Za-z0-9_.]*)\s*(==|!=|<=|>=|<|>|BEGINSWITH|ENDSWITH|CONTAINS)\s*(.+)$")
      .expect("term regex is valid")
});

static SPLIT_RE: LazyLock<Regex> =
   LazyLock::new(|| Regex::new(r"\s+AND\s+|\s*&&\s*").expect("split regex is valid"));

/// A parsed, evaluatable predicate.
#[derive(Debug, Clone)]
pub struct Filter {
   terms: Vec<Term>,
}

#[derive(Debug, Clone)]
enum Term {
   True,
   False,
   Compare {
      key_path: String,
      op: Op,
      literal: Literal,
   },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
   Eq,
   Ne,
   Lt,
   Le,
   Gt,
   Ge,
   BeginsWith,
   EndsWith,
   Contains,
}

#[derive(Debug, Clone)]
enum Literal {
   Null,
   Bool(bool),
   Number(f64),
   String(String),
}

impl Filter {
   /// Parses a predicate string. Empty and whitespace-only input matches
   /// everything.
   pub fn parse(input: &str) -> Result<Filter> {
      let trimmed = input.trim();
      if trimmed.is_empty() {
         return Ok(Filter { terms: Vec::new() });
      }

      let mut terms = Vec::new();
      for part in SPLIT_RE.split(trimmed) {
         terms.push(parse_term(input, part.trim())?);
      }
      Ok(Filter { terms })
   }

   /// Evaluates the predicate against a serialized document.
   pub fn matches(&self, document: &Value) -> bool {
      self.terms.iter().all(|term| term.matches(document))
   }
}

fn parse_term(whole: &str, part: &str) -> Result<Term> {
   match part {
      "TRUEPREDICATE" => return Ok(Term::True),
      "FALSEPREDICATE" => return Ok(Term::False),
      _ => {}
   }

   let captures = TERM_RE.captures(part).ok_or_else(|| invalid(whole, part))?;
   let key_path = captures[1].to_string();
   let op = match &captures[2] {
      "==" => Op::Eq,
      "!=" => Op::Ne,
      "<" => Op::Lt,
      "<=" => Op::Le,
      ">" => Op::Gt,
      ">=" => Op::Ge,
      "BEGINSWITH" => Op::BeginsWith,
      "ENDSWITH" => Op::EndsWith,
      "CONTAINS" => Op::Contains,
      _ => return Err(invalid(whole, part)),
   };
   let literal = parse_literal(whole, captures[3].trim())?;
   Ok(Term::Compare {
      key_path,
      op,
      literal,
   })
}

fn parse_literal(whole: &str, raw: &str) -> Result<Literal> {
   if raw.eq_ignore_ascii_case("nil") || raw.eq_ignore_ascii_case("null") {
      return Ok(Literal::Null);
   }
   if raw == "true" {
      return Ok(Literal::Bool(true));
   }
   if raw == "false" {
      return Ok(Literal::Bool(false));
   }
   if (raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2)
      || (raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2)
   {
      return Ok(Literal::String(raw[1..raw.len() - 1].to_string()));
   }
   raw.parse::<f64>()
      .map(Literal::Number)
      .map_err(|_| invalid(whole, raw))
}

fn invalid(filter: &str, detail: &str) -> Error {
   Error::InvalidPredicate {
      filter: filter.to_string(),
      reason: format!("cannot parse '{}'", detail),
   }
}

impl Term {
   fn matches(&self, document: &Value) -> bool {
      match self {
         Term::True => true,
         Term::False => false,
         Term::Compare {
            key_path,
            op,
            literal,
         } => {
            let value = lookup(document, key_path);
            compare(value, *op, literal)
         }
      }
   }
}

/// Resolves a dotted key path against a document. Missing segments and
/// non-object intermediates resolve to absent.
fn lookup<'a>(document: &'a Value, key_path: &str) -> Option<&'a Value> {
   let mut current = document;
   for segment in key_path.split('.') {
      current = current.get(segment)?;
   }
   Some(current)
}

fn compare(value: Option<&Value>, op: Op, literal: &Literal) -> bool {
   match literal {
      Literal::Null => {
         let is_null = value.is_none_or(Value::is_null);
         match op {
            Op::Eq => is_null,
            Op::Ne => !is_null,
            _ => false,
         }
      }
      Literal::Bool(expected) => match (value.and_then(Value::as_bool), op) {
         (Some(actual), Op::Eq) => actual == *expected,
         (Some(actual), Op::Ne) => actual != *expected,
         (None, Op::Ne) => true,
         _ => false,
      },
      Literal::Number(expected) => {
         let Some(actual) = value.and_then(Value::as_f64) else {
            return op == Op::Ne;
         };
         match op {
            Op::Eq => actual == *expected,
            Op::Ne => actual != *expected,
            Op::Lt => actual < *expected,
            Op::Le => actual <= *expected,
            Op::Gt => actual > *expected,
            Op::Ge => actual >= *expected,
            _ => false,
         }
      }
      Literal::String(expected) => {
         let actual = match value {
            Some(Value::String(s)) => s.as_str(),
            Some(Value::ObjectId(s)) => s.as_str(),
            Some(Value::Uuid(s)) => s.as_str(),
            Some(Value::Decimal(s)) => s.as_str(),
            _ => return op == Op::Ne,
         };
         match op {
            Op::Eq => actual == expected,
            Op::Ne => actual != expected,
            Op::Lt => actual < expected.as_str(),
            Op::Le => actual <= expected.as_str(),
            Op::Gt => actual > expected.as_str(),
            Op::Ge => actual >= expected.as_str(),
            Op::BeginsWith => actual.starts_with(expected.as_str()),
            Op::EndsWith => actual.ends_with(expected.as_str()),
            Op::Contains => actual.contains(expected.as_str()),
         }
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use indexmap::IndexMap;

   fn doc(pairs: &[(&str, Value)]) -> Value {
      let mut map = IndexMap::new();
      for (key, value) in pairs {
         map.insert(key.to_string(), value.clone());
      }
      Value::Object(map)
   }

   #[test]
   fn test_empty_filter_matches_everything() {
      let filter = Filter::parse("").unwrap();
      assert!(filter.matches(&doc(&[("age", Value::Int(1))])));
   }

   #[test]
   fn test_truepredicate_and_falsepredicate() {
      assert!(Filter::parse("TRUEPREDICATE").unwrap().matches(&Value::Null));
      assert!(!Filter::parse("FALSEPREDICATE").unwrap().matches(&Value::Null));
   }

   #[test]
   fn test_string_equality() {
      let filter = Filter::parse("name == 'Alice'").unwrap();
      assert!(filter.matches(&doc(&[("name", Value::String("Alice".into()))])));
      assert!(!filter.matches(&doc(&[("name", Value::String("Bob".into()))])));
   }

   #[test]
   fn test_numeric_comparisons_coerce_int_and_double() {
      let filter = Filter::parse("age >= 21").unwrap();
      assert!(filter.matches(&doc(&[("age", Value::Int(30))])));
      assert!(filter.matches(&doc(&[("age", Value::Double(21.0))])));
      assert!(!filter.matches(&doc(&[("age", Value::Int(20))])));
   }

   #[test]
   fn test_string_prefix_suffix_contains() {
      let document = doc(&[("email", Value::String("alice@example.com".into()))]);
      assert!(Filter::parse("email BEGINSWITH 'alice'").unwrap().matches(&document));
      assert!(Filter::parse("email ENDSWITH '.com'").unwrap().matches(&document));
      assert!(Filter::parse("email CONTAINS '@example'").unwrap().matches(&document));
      assert!(!Filter::parse("email BEGINSWITH 'bob'").unwrap().matches(&document));
   }

   #[test]
   fn test_conjunction() {
      let filter = Filter::parse("age > 18 AND name == 'Alice'").unwrap();
      assert!(filter.matches(&doc(&[
         ("age", Value::Int(30)),
         ("name", Value::String("Alice".into())),
      ])));
      assert!(!filter.matches(&doc(&[
         ("age", Value::Int(10)),
         ("name", Value::String("Alice".into())),
      ])));

      let filter = Filter::parse("age > 18 && age < 65").unwrap();
      assert!(filter.matches(&doc(&[("age", Value::Int(30))])));
   }

   #[test]
   fn test_nil_matches_missing_and_null() {
      let filter = Filter::parse("nickname == nil").unwrap();
      assert!(filter.matches(&doc(&[("name", Value::String("Alice".into()))])));
      assert!(filter.matches(&doc(&[("nickname", Value::Null)])));
      assert!(!filter.matches(&doc(&[("nickname", Value::String("Al".into()))])));
   }

   #[test]
   fn test_dotted_key_path() {
      let address = doc(&[("city", Value::String("Oslo".into()))]);
      let filter = Filter::parse("address.city == 'Oslo'").unwrap();
      assert!(filter.matches(&doc(&[("address", address)])));
   }

   #[test]
   fn test_object_id_compares_as_string() {
      let filter = Filter::parse("id == '6500a1b2c3d4e5f6a7b8c9d0'").unwrap();
      assert!(filter.matches(&doc(&[(
         "id",
         Value::ObjectId("6500a1b2c3d4e5f6a7b8c9d0".into())
      )])));
   }

   #[test]
   fn test_unparseable_input_is_invalid_predicate() {
      for input in ["???", "name ===", "age >", "age ~ 3", "name == Alice Bob"] {
         let error = Filter::parse(input).unwrap_err();
         assert!(
            matches!(error, Error::InvalidPredicate { .. }),
            "{} should be invalid",
            input
         );
      }
   }
}
