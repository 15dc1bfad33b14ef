//! Composable predicate value objects.
//!
//! Callers build a boolean tree of [`Filter`]s instead of query strings. The
//! translator validates the tree against a resolved resource; storage
//! backends walk it to produce their native conditions.
//!
//! ## Semantics
//!
//! - `And` of nothing is `true`, `Or` of nothing is `false`
//! - a missing field reads as `Null`
//! - range comparisons against `Null` never match

use contentkit_schema::{Record, Value};
use serde::{Deserialize, Serialize};

/// Comparison operator for [`Comparison`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    /// Whether the operator needs an ordering (not just equality).
    #[must_use]
    pub fn is_range(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// `field <op> value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

/// `field [NOT] IN (values)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub field: String,
    pub values: Vec<Value>,
    #[serde(default)]
    pub negated: bool,
}

/// `field LIKE pattern` with `%` (any run) and `_` (any single char).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub field: String,
    pub pattern: String,
}

/// `field IS [NOT] NULL`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NullCheck {
    pub field: String,
    pub is_null: bool,
}

/// A predicate tree over one resource's fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Compare(Comparison),
    In(Membership),
    Like(Pattern),
    Null(NullCheck),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare(Comparison {
            field: field.into(),
            op,
            value: value.into(),
        })
    }

    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    #[must_use]
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    #[must_use]
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    #[must_use]
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gte, value)
    }

    #[must_use]
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    #[must_use]
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lte, value)
    }

    /// Set membership (`field IN (values)`).
    #[must_use]
    pub fn r#in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(Membership {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        })
    }

    #[must_use]
    pub fn not_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In(Membership {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        })
    }

    #[must_use]
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Like(Pattern {
            field: field.into(),
            pattern: pattern.into(),
        })
    }

    #[must_use]
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::Null(NullCheck {
            field: field.into(),
            is_null: true,
        })
    }

    #[must_use]
    pub fn not_null(field: impl Into<String>) -> Self {
        Self::Null(NullCheck {
            field: field.into(),
            is_null: false,
        })
    }

    /// Conjunction of all filters. A single filter is returned unwrapped.
    #[must_use]
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<Filter> = filters.into_iter().collect();
        if filters.len() == 1 {
            return filters.remove(0);
        }
        Self::And(filters)
    }

    /// Disjunction of all filters. A single filter is returned unwrapped.
    #[must_use]
    pub fn any(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<Filter> = filters.into_iter().collect();
        if filters.len() == 1 {
            return filters.remove(0);
        }
        Self::Or(filters)
    }

    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            first => Self::And(vec![first, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Filter) -> Self {
        match self {
            Self::Or(mut filters) => {
                filters.push(other);
                Self::Or(filters)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// AND two optional filters.
    #[must_use]
    pub fn conjoin(left: Option<Filter>, right: Option<Filter>) -> Option<Filter> {
        match (left, right) {
            (Some(l), Some(r)) => Some(l.and(r)),
            (l, r) => l.or(r),
        }
    }

    /// Whether the tree constrains anything.
    ///
    /// A tree without leaf predicates (`And`/`Or` groups with no children, at
    /// any depth) or one that folds to constant `true` selects no particular
    /// rows and does not count as a target.
    #[must_use]
    pub fn is_vacuous(&self) -> bool {
        !self.has_predicates() || self.constant() == Some(true)
    }

    fn has_predicates(&self) -> bool {
        match self {
            Self::Compare(_) | Self::In(_) | Self::Like(_) | Self::Null(_) => true,
            Self::And(fs) | Self::Or(fs) => fs.iter().any(Self::has_predicates),
            Self::Not(f) => f.has_predicates(),
        }
    }

    /// The tree's value when it does not depend on any record.
    fn constant(&self) -> Option<bool> {
        match self {
            Self::Compare(_) | Self::In(_) | Self::Like(_) | Self::Null(_) => None,
            Self::And(fs) => fold(fs, false),
            Self::Or(fs) => fold(fs, true),
            Self::Not(f) => f.constant().map(|v| !v),
        }
    }

    /// Evaluate the tree against one record.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Compare(c) => {
                let actual = record.get(&c.field).unwrap_or(&Value::Null);
                match c.op {
                    CompareOp::Eq => actual.loose_eq(&c.value),
                    CompareOp::Ne => !actual.loose_eq(&c.value),
                    op => actual.compare(&c.value).is_some_and(|ord| match op {
                        CompareOp::Gt => ord.is_gt(),
                        CompareOp::Gte => ord.is_ge(),
                        CompareOp::Lt => ord.is_lt(),
                        _ => ord.is_le(),
                    }),
                }
            }
            Self::In(m) => {
                let actual = record.get(&m.field).unwrap_or(&Value::Null);
                m.values.iter().any(|v| actual.loose_eq(v)) != m.negated
            }
            Self::Like(p) => record
                .get(&p.field)
                .and_then(Value::as_str)
                .is_some_and(|text| like_match(&p.pattern, text)),
            Self::Null(n) => record.get(&n.field).is_none_or(Value::is_null) == n.is_null,
            Self::And(fs) => fs.iter().all(|f| f.matches(record)),
            Self::Or(fs) => fs.iter().any(|f| f.matches(record)),
            Self::Not(f) => !f.matches(record),
        }
    }
}

/// Constant-fold a group: `absorbing` is the value that decides the group
/// (`false` for `And`, `true` for `Or`); an empty group is its opposite.
fn fold(filters: &[Filter], absorbing: bool) -> Option<bool> {
    let mut all_constant = true;
    for f in filters {
        match f.constant() {
            Some(v) if v == absorbing => return Some(absorbing),
            Some(_) => {}
            None => all_constant = false,
        }
    }
    all_constant.then_some(!absorbing)
}

/// SQL `LIKE` matching: `%` matches any run, `_` any single character.
fn like_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    // dp[j]: pattern prefix of current length matches text prefix of length j
    let mut dp = vec![false; t.len() + 1];
    dp[0] = true;
    for &pc in &p {
        let mut next = vec![false; t.len() + 1];
        if pc == '%' {
            let mut seen = false;
            for j in 0..=t.len() {
                seen |= dp[j];
                next[j] = seen;
            }
        } else {
            for j in 1..=t.len() {
                next[j] = dp[j - 1] && (pc == '_' || pc == t[j - 1]);
            }
        }
        dp = next;
    }
    dp[t.len()]
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn comparisons_match_numeric_rows() {
        let r = row(&[("id", Value::Uint(5)), ("score", Value::Float(2.5))]);
        assert!(Filter::eq("id", 5u64).matches(&r));
        assert!(Filter::eq("id", 5i64).matches(&r));
        assert!(Filter::gt("score", 2u64).matches(&r));
        assert!(!Filter::lte("score", 2u64).matches(&r));
        assert!(Filter::ne("id", 6u64).matches(&r));
    }

    #[test]
    fn missing_field_reads_as_null() {
        let r = row(&[("id", Value::Uint(1))]);
        assert!(Filter::is_null("subtitle").matches(&r));
        assert!(!Filter::not_null("subtitle").matches(&r));
        assert!(!Filter::gt("subtitle", 0u64).matches(&r));
    }

    #[test]
    fn membership_and_negation() {
        let r = row(&[("status", Value::from("draft"))]);
        assert!(Filter::r#in("status", ["draft", "review"]).matches(&r));
        assert!(!Filter::not_in("status", ["draft"]).matches(&r));
        assert!(Filter::eq("status", "published").negate().matches(&r));
    }

    #[test]
    fn boolean_combinators() {
        let r = row(&[("a", Value::Uint(1)), ("b", Value::Uint(2))]);
        let both = Filter::eq("a", 1u64).and(Filter::eq("b", 2u64));
        assert!(both.matches(&r));
        let either = Filter::eq("a", 9u64).or(Filter::eq("b", 2u64));
        assert!(either.matches(&r));
        assert!(Filter::And(vec![]).matches(&r));
        assert!(!Filter::Or(vec![]).matches(&r));
    }

    #[test]
    fn empty_groups_are_vacuous() {
        let a = Filter::eq("a", 1u64);
        assert!(Filter::all(Vec::<Filter>::new()).is_vacuous());
        assert!(Filter::Or(vec![]).is_vacuous());
        assert!(Filter::And(vec![Filter::Or(vec![]), Filter::And(vec![])]).is_vacuous());
        assert!(Filter::Or(vec![a.clone(), Filter::And(vec![])]).is_vacuous());
        assert!(Filter::Or(vec![]).negate().is_vacuous());

        assert!(!a.is_vacuous());
        assert!(!Filter::And(vec![a.clone(), Filter::And(vec![])]).is_vacuous());
        assert!(!Filter::Or(vec![a.clone(), Filter::Or(vec![])]).is_vacuous());
        assert!(!a.negate().is_vacuous());
    }

    #[test]
    fn conjoin_keeps_whichever_side_exists() {
        let a = Filter::eq("a", 1u64);
        assert_eq!(Filter::conjoin(Some(a.clone()), None), Some(a.clone()));
        assert_eq!(Filter::conjoin(None, Some(a.clone())), Some(a.clone()));
        assert_eq!(Filter::conjoin(None, None), None);
        assert!(matches!(
            Filter::conjoin(Some(a.clone()), Some(a)),
            Some(Filter::And(ref fs)) if fs.len() == 2
        ));
    }

    #[test]
    fn like_wildcards() {
        assert!(like_match("hel%", "hello"));
        assert!(like_match("%llo", "hello"));
        assert!(like_match("h_llo", "hello"));
        assert!(like_match("%", ""));
        assert!(!like_match("h_", "hello"));
        assert!(!like_match("", "x"));
    }
}
