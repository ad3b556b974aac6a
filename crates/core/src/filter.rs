//! Filters and query plan selection (§4.5).

use crate::note::Note;
use crate::{Error, Id32};

/// The index-walk strategy chosen for a [`Filter`] by the query planner,
/// in the priority order specified by §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Ids,
    Tags,
    Authors,
    Kinds,
    Created,
}

/// A single `tags` constraint: a one-character label (`'e'`, `'p'`, `'t'`,
/// `'q'`, ...) plus the set of second-element values that satisfy it.
#[derive(Debug, Clone)]
pub struct TagFilter {
    pub label: char,
    pub values: Vec<Vec<u8>>,
}

/// A structured predicate over note fields (§4.5). Build with
/// [`FilterBuilder`]; once closed, `ids`/`authors`/`kinds` are sorted so
/// membership can be tested with binary search.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub ids: Option<Vec<Id32>>,
    pub authors: Option<Vec<Id32>>,
    pub kinds: Option<Vec<u64>>,
    pub tags: Vec<TagFilter>,
    pub since: Option<u64>,
    pub until: Option<u64>,
    pub limit: Option<u64>,
    closed: bool,
}

impl Filter {
    pub fn plan(&self) -> Plan {
        if self.ids.as_ref().is_some_and(|v| !v.is_empty()) {
            Plan::Ids
        } else if !self.tags.is_empty() {
            Plan::Tags
        } else if self.authors.as_ref().is_some_and(|v| !v.is_empty()) {
            Plan::Authors
        } else if self.kinds.as_ref().is_some_and(|v| !v.is_empty()) {
            Plan::Kinds
        } else {
            Plan::Created
        }
    }

    /// True iff every field present in this filter is satisfied by `note`
    /// (§4.5, property 9 in §8.1). Every field with multiple elements is a
    /// disjunction; fields present are conjoined.
    pub fn matches(&self, note: &Note<'_>) -> bool {
        if let Some(ids) = &self.ids {
            if ids.binary_search(note.id()).is_err() {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if authors.binary_search(note.pubkey()).is_err() {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if kinds.binary_search(&(note.kind() as u64)).is_err() {
                return false;
            }
        }
        if let Some(since) = self.since {
            if note.created_at() < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if note.created_at() >= until {
                return false;
            }
        }
        for tag_filter in &self.tags {
            let found = note.tags().iter().any(|tag| {
                tag.count() >= 2
                    && tag.matches_label(note, tag_filter.label)
                    && tag_filter.values.iter().any(|v| {
                        tag.get(1)
                            .map(|p| value_matches(note, p, v))
                            .unwrap_or(false)
                    })
            });
            if !found {
                return false;
            }
        }
        true
    }
}

fn value_matches(note: &Note<'_>, packed: crate::PackedStr, want: &[u8]) -> bool {
    if want.len() == 32 {
        if let Some(id) = note.packed_str_as_id(packed) {
            if id.as_slice() == want {
                return true;
            }
        }
    }
    note.render_packed(packed).as_bytes() == want
}

/// Builds a [`Filter`] field by field, rejecting misuse (a field reopened,
/// or closed empty) per the error table in §7.
#[derive(Debug, Default)]
pub struct FilterBuilder {
    filter: Filter,
    ids_set: bool,
    authors_set: bool,
    kinds_set: bool,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&mut self, ids: Vec<Id32>) -> Result<&mut Self, Error> {
        if self.ids_set {
            return Err(Error::FilterReopened("ids"));
        }
        if ids.is_empty() {
            return Err(Error::FilterFieldEmpty("ids"));
        }
        self.ids_set = true;
        self.filter.ids = Some(ids);
        Ok(self)
    }

    pub fn authors(&mut self, authors: Vec<Id32>) -> Result<&mut Self, Error> {
        if self.authors_set {
            return Err(Error::FilterReopened("authors"));
        }
        if authors.is_empty() {
            return Err(Error::FilterFieldEmpty("authors"));
        }
        self.authors_set = true;
        self.filter.authors = Some(authors);
        Ok(self)
    }

    pub fn kinds(&mut self, kinds: Vec<u64>) -> Result<&mut Self, Error> {
        if self.kinds_set {
            return Err(Error::FilterReopened("kinds"));
        }
        if kinds.is_empty() {
            return Err(Error::FilterFieldEmpty("kinds"));
        }
        self.kinds_set = true;
        self.filter.kinds = Some(kinds);
        Ok(self)
    }

    pub fn tag(&mut self, label: char, values: Vec<Vec<u8>>) -> Result<&mut Self, Error> {
        if values.is_empty() {
            return Err(Error::FilterFieldEmpty("tags"));
        }
        self.filter.tags.push(TagFilter { label, values });
        Ok(self)
    }

    pub fn since(&mut self, since: u64) -> &mut Self {
        self.filter.since = Some(since);
        self
    }

    pub fn until(&mut self, until: u64) -> &mut Self {
        self.filter.until = Some(until);
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.filter.limit = Some(limit);
        self
    }

    /// Sort `ids`/`authors`/`kinds` so membership can be tested with binary
    /// search, and return the closed filter.
    pub fn close(mut self) -> Filter {
        if let Some(ids) = self.filter.ids.as_mut() {
            ids.sort_unstable();
        }
        if let Some(authors) = self.filter.authors.as_mut() {
            authors.sort_unstable();
        }
        if let Some(kinds) = self.filter.kinds.as_mut() {
            kinds.sort_unstable();
        }
        self.filter.closed = true;
        self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_priority_follows_spec_order() {
        let mut b = FilterBuilder::new();
        b.kinds(vec![1]).unwrap();
        assert_eq!(b.filter.plan(), Plan::Kinds);

        let mut b = FilterBuilder::new();
        b.authors(vec![[0u8; 32]]).unwrap();
        b.kinds(vec![1]).unwrap();
        assert_eq!(b.filter.plan(), Plan::Authors);

        let mut b = FilterBuilder::new();
        b.tag('e', vec![vec![1]]).unwrap();
        b.authors(vec![[0u8; 32]]).unwrap();
        assert_eq!(b.filter.plan(), Plan::Tags);

        let mut b = FilterBuilder::new();
        b.ids(vec![[0u8; 32]]).unwrap();
        b.tag('e', vec![vec![1]]).unwrap();
        assert_eq!(b.filter.plan(), Plan::Ids);

        assert_eq!(FilterBuilder::new().filter.plan(), Plan::Created);
    }

    #[test]
    fn reopening_a_field_fails() {
        let mut b = FilterBuilder::new();
        b.kinds(vec![1]).unwrap();
        assert_eq!(b.kinds(vec![2]).unwrap_err(), Error::FilterReopened("kinds"));
    }

    #[test]
    fn empty_field_fails() {
        let mut b = FilterBuilder::new();
        assert_eq!(b.ids(vec![]).unwrap_err(), Error::FilterFieldEmpty("ids"));
    }
}
