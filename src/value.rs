// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! [`Primary`], the tagged union of SQL values this engine operates on, and
//! its SQL three-valued comparison/coercion rules.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;

/// Ternary logic value: SQL's `TRUE` / `FALSE` / `UNKNOWN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ternary {
    True,
    False,
    Unknown,
}

impl Ternary {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Ternary::True
        } else {
            Ternary::False
        }
    }

    pub fn and(self, other: Ternary) -> Ternary {
        use Ternary::*;
        match (self, other) {
            (False, _) | (_, False) => False,
            (True, True) => True,
            _ => Unknown,
        }
    }

    pub fn or(self, other: Ternary) -> Ternary {
        use Ternary::*;
        match (self, other) {
            (True, _) | (_, True) => True,
            (False, False) => False,
            _ => Unknown,
        }
    }

    pub fn not(self) -> Ternary {
        match self {
            Ternary::True => Ternary::False,
            Ternary::False => Ternary::True,
            Ternary::Unknown => Ternary::Unknown,
        }
    }

    pub fn is_true(self) -> bool {
        matches!(self, Ternary::True)
    }
}

/// A single SQL scalar value, including `NULL`.
///
/// Comparisons between `Primary` values follow SQL three-valued logic: any
/// operand of `Null` makes the comparison `Unknown`. Implicit coercion order
/// is `Integer ⊂ Float`; strings are parsed to `Integer`/`Float`/`Datetime`
/// on demand by [`Primary::coerce_like`].
#[derive(Debug, Clone)]
pub enum Primary {
    Null,
    Boolean(bool),
    Ternary(Ternary),
    Integer(i64),
    Float(f64),
    String(String),
    Datetime(DateTime<Utc>),
}

impl Primary {
    pub fn is_null(&self) -> bool {
        matches!(self, Primary::Null)
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Primary::Null => "NULL",
            Primary::Boolean(_) => "BOOLEAN",
            Primary::Ternary(_) => "TERNARY",
            Primary::Integer(_) => "INTEGER",
            Primary::Float(_) => "FLOAT",
            Primary::String(_) => "STRING",
            Primary::Datetime(_) => "DATETIME",
        }
    }

    /// Best-effort parse of a string cell into the numeric/temporal type it
    /// looks like; used when reading raw delimited-text fields and when
    /// comparing a string against a numeric/datetime operand.
    pub fn parse_string(s: &str) -> Primary {
        if let Ok(i) = s.parse::<i64>() {
            return Primary::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return Primary::Float(f);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Primary::Datetime(dt.with_timezone(&Utc));
        }
        Primary::String(s.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Primary::Integer(i) => Some(*i as f64),
            Primary::Float(f) => Some(*f),
            Primary::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Primary::Integer(i) => Some(*i),
            Primary::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Primary::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn as_bool_ternary(&self) -> Ternary {
        match self {
            Primary::Null => Ternary::Unknown,
            Primary::Boolean(b) => Ternary::from_bool(*b),
            Primary::Ternary(t) => *t,
            Primary::Integer(i) => Ternary::from_bool(*i != 0),
            Primary::Float(f) => Ternary::from_bool(*f != 0.0),
            Primary::String(s) => match s.to_ascii_uppercase().as_str() {
                "TRUE" => Ternary::True,
                "FALSE" => Ternary::False,
                _ => Ternary::Unknown,
            },
            Primary::Datetime(_) => Ternary::Unknown,
        }
    }

    pub fn as_str_lossy(&self) -> String {
        match self {
            Primary::Null => String::new(),
            Primary::Boolean(b) => b.to_string(),
            Primary::Ternary(Ternary::True) => "TRUE".to_string(),
            Primary::Ternary(Ternary::False) => "FALSE".to_string(),
            Primary::Ternary(Ternary::Unknown) => "UNKNOWN".to_string(),
            Primary::Integer(i) => i.to_string(),
            Primary::Float(f) => f.to_string(),
            Primary::String(s) => s.clone(),
            Primary::Datetime(dt) => dt.to_rfc3339(),
        }
    }

    /// SQL three-valued equality: `NULL = anything` is `Unknown`.
    pub fn sql_eq(&self, other: &Primary) -> Ternary {
        if self.is_null() || other.is_null() {
            return Ternary::Unknown;
        }
        match self.partial_cmp_coerced(other) {
            Some(Ordering::Equal) => Ternary::True,
            Some(_) => Ternary::False,
            None => Ternary::Unknown,
        }
    }

    pub fn sql_cmp(&self, other: &Primary) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        self.partial_cmp_coerced(other)
    }

    /// Compares after coercing mixed numeric/string/datetime pairs onto a
    /// common representation (Integer ⊂ Float; strings parse on demand).
    fn partial_cmp_coerced(&self, other: &Primary) -> Option<Ordering> {
        use Primary::*;
        match (self, other) {
            (Integer(a), Integer(b)) => a.partial_cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Integer(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
            (String(a), String(b)) => a.partial_cmp(b),
            (Boolean(a), Boolean(b)) => a.partial_cmp(b),
            (Datetime(a), Datetime(b)) => a.partial_cmp(b),
            (String(s), rhs) => Primary::parse_string(s).partial_cmp_coerced(rhs),
            (lhs, String(s)) => lhs.partial_cmp_coerced(&Primary::parse_string(s)),
            _ => None,
        }
    }

    /// The canonical textual form used both for file persistence and for
    /// the serialized comparison key (spec §4.1 "tie-breaking & determinism"
    /// / §3 "serialized comparison key").
    pub fn serialize_key(&self) -> String {
        match self {
            Primary::Null => "\u{0}NULL".to_string(),
            other => format!("{}\u{1}{}", other.type_tag(), other.as_str_lossy()),
        }
    }
}

impl fmt::Display for Primary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Primary::Null => write!(f, "NULL"),
            other => write!(f, "{}", other.as_str_lossy()),
        }
    }
}

impl PartialEq for Primary {
    fn eq(&self, other: &Self) -> bool {
        self.serialize_key() == other.serialize_key()
    }
}
impl Eq for Primary {}

impl std::hash::Hash for Primary {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.serialize_key().hash(state)
    }
}

/// A tuple's serialized comparison key, used as the map key for partitioning
/// (spec §3, §4.1) and for set-operation row equality (spec §4.4 UNION).
pub fn serialize_tuple(values: &[Primary]) -> String {
    values
        .iter()
        .map(Primary::serialize_key)
        .collect::<Vec<_>>()
        .join("\u{2}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_comparison_is_unknown() {
        assert_eq!(Primary::Null.sql_eq(&Primary::Integer(1)), Ternary::Unknown);
    }

    #[test]
    fn integer_float_coercion_compares_equal() {
        assert_eq!(
            Primary::Integer(2).sql_eq(&Primary::Float(2.0)),
            Ternary::True
        );
    }

    #[test]
    fn string_parses_for_numeric_comparison() {
        assert_eq!(
            Primary::String("10".into()).sql_eq(&Primary::Integer(10)),
            Ternary::True
        );
    }

    #[test]
    fn null_serializes_to_distinct_sentinel() {
        assert_ne!(Primary::Null.serialize_key(), Primary::String(String::new()).serialize_key());
        assert_eq!(Primary::Null.serialize_key(), Primary::Null.serialize_key());
    }

    #[test]
    fn serialize_tuple_distinguishes_null_from_empty_string() {
        let a = serialize_tuple(&[Primary::Null, Primary::Integer(1)]);
        let b = serialize_tuple(&[Primary::String(String::new()), Primary::Integer(1)]);
        assert_ne!(a, b);
    }
}
