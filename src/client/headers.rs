//! Ordered header list with case-insensitive unique names and optional values.
//!
//! A `None` value marks an entry the caller supplied without a value; such
//! entries are dropped before anything reaches the wire.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<(String, Option<String>)>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`; a replaced entry keeps its original position.
    pub fn set(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, Some(value.into()));
        self
    }

    /// Value of a present, non-null header.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|idx| self.entries[idx].1.as_deref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.position(name)?;
        self.entries.remove(idx).1
    }

    /// `overrides` applied on top of `self`; names compare case-insensitively.
    pub fn merged_with(&self, overrides: &HeaderList) -> HeaderList {
        let mut merged = self.clone();
        for (name, value) in &overrides.entries {
            merged.set(name.clone(), value.clone());
        }
        merged
    }

    pub fn without_nulls(&self) -> HeaderList {
        HeaderList {
            entries: self
                .entries
                .iter()
                .filter(|(_, v)| v.is_some())
                .cloned()
                .collect(),
        }
    }

    /// Non-null entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }

    /// Number of entries, including null-valued ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = HeaderList::new();
        for (k, v) in iter {
            list.set(k, Some(v.into()));
        }
        list
    }
}
