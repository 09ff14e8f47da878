//! Tag filtering and command argument parsing.
//!
//! A filter is a set of terms, at most one per tag key. A record matches only when every
//! term's key is present among its tags and the tag value satisfies the term.
use crate::{
    error::{LpscanError, Result},
    source::{for_each_tag, RecordContext, RecordSource},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};
use tracing::trace;

/// One tag constraint.
///
/// Written on the command line as `key=value` (exact match), `key=` (key must be present)
/// or `key~prefix` (value starts with prefix). Presence is stored as an empty prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilterTerm {
    pub key: String,
    pub value: String,
    pub prefix: bool,
}

impl FilterTerm {
    pub fn exact(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            prefix: false,
        }
    }

    pub fn prefix(key: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: prefix.into(),
            prefix: true,
        }
    }

    pub fn present(key: impl Into<String>) -> Self {
        Self::prefix(key, "")
    }

    /// Parses one command argument. Returns `Ok(None)` for arguments that are not filter
    /// terms (bare column names).
    ///
    /// `=` is looked for before `~`, so `a~b=c` constrains the tag `a~b`.
    pub fn parse(arg: &str) -> Result<Option<Self>> {
        let term = if let Some((key, value)) = arg.split_once('=') {
            if value.is_empty() {
                Self::present(key)
            } else {
                Self::exact(key, value)
            }
        } else if let Some((key, prefix)) = arg.split_once('~') {
            if prefix.is_empty() {
                return Err(LpscanError::EmptyPrefix(arg.to_string()));
            }
            Self::prefix(key, prefix)
        } else {
            return Ok(None);
        };

        if term.key.is_empty() {
            return Err(LpscanError::EmptyFilterKey(arg.to_string()));
        }
        Ok(Some(term))
    }

    /// Tests a tag value against this term.
    pub fn matches(&self, value: &[u8]) -> bool {
        if self.prefix {
            value.starts_with(self.value.as_bytes())
        } else {
            value == self.value.as_bytes()
        }
    }
}

impl fmt::Display for FilterTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix && !self.value.is_empty() {
            write!(f, "{}~{}", self.key, self.value)
        } else {
            write!(f, "{}={}", self.key, self.value)
        }
    }
}

impl From<FilterTerm> for String {
    fn from(term: FilterTerm) -> Self {
        term.to_string()
    }
}

impl TryFrom<String> for FilterTerm {
    type Error = LpscanError;

    fn try_from(arg: String) -> Result<Self> {
        FilterTerm::parse(&arg)?.ok_or(LpscanError::InvalidFilterTerm(arg))
    }
}

/// Splits command arguments into the leading filter terms and the column names after them.
///
/// Terms are only recognized until the first bare word; everything from there on is a
/// column name.
pub fn parse_arguments<S: AsRef<str>>(args: &[S]) -> Result<(Vec<FilterTerm>, Vec<String>)> {
    let mut terms = Vec::new();
    let mut rest = args;
    while let Some((arg, tail)) = rest.split_first() {
        match FilterTerm::parse(arg.as_ref())? {
            Some(term) => terms.push(term),
            None => break,
        }
        rest = tail;
    }
    let columns = rest.iter().map(|c| c.as_ref().to_string()).collect();
    Ok((terms, columns))
}

/// An immutable set of tag constraints keyed by tag name.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    terms: HashMap<String, FilterTerm>,
}

impl TagFilter {
    /// Builds a filter, rejecting two terms for the same key.
    pub fn from_terms<I: IntoIterator<Item = FilterTerm>>(terms: I) -> Result<Self> {
        let mut map: HashMap<String, FilterTerm> = HashMap::new();
        for term in terms {
            if map.contains_key(&term.key) {
                let mut existing: Vec<String> = map.values().map(ToString::to_string).collect();
                existing.sort();
                return Err(LpscanError::DuplicateFilterKey {
                    key: term.key,
                    existing,
                });
            }
            map.insert(term.key.clone(), term);
        }
        Ok(Self { terms: map })
    }

    /// Number of constraints, i.e. how many tags a record has to satisfy.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn term(&self, key: &str) -> Option<&FilterTerm> {
        self.terms.get(key)
    }

    /// `None` when the key is unconstrained, otherwise whether the value passes.
    pub fn check(&self, key: &str, value: &[u8]) -> Option<bool> {
        self.terms.get(key).map(|term| term.matches(value))
    }

    /// Consumes the current record's tag stream in a single pass and decides whether the
    /// record matches.
    ///
    /// Every tag that does not fail its constraint is handed to `on_tag`, which lets the
    /// caller pick up column values or facets in the same pass. Each term is counted once,
    /// so a repeated tag key can not stand in for a missing one. A repeated key with a
    /// value failing its term rejects the record even if another occurrence passes.
    pub fn matches<S, F>(&self, source: &mut S, ctx: &mut RecordContext, mut on_tag: F) -> bool
    where
        S: RecordSource + ?Sized,
        F: FnMut(&str, &[u8]),
    {
        let mut satisfied: Vec<&str> = Vec::new();
        let mut rejected = false;
        for_each_tag(source, ctx, |key, value| {
            if let Some((term_key, term)) = self.terms.get_key_value(key) {
                if !term.matches(value) {
                    rejected = true;
                    return;
                }
                if !satisfied.contains(&term_key.as_str()) {
                    satisfied.push(term_key);
                }
            }
            on_tag(key, value);
        });
        let matched = !rejected && satisfied.len() == self.terms.len();
        trace!(
            record = ctx.number,
            satisfied = satisfied.len(),
            required = self.terms.len(),
            rejected,
            matched,
            "tag filter"
        );
        matched
    }
}
