use std::collections::HashMap;

use crate::types::RowValues;

/// One set of named parameters, keyed without the leading `:`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedParams {
    values: HashMap<String, RowValues>,
}

impl NamedParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value; `"id"` and `":id"` name the same placeholder.
    #[must_use]
    pub fn bind(mut self, name: &str, value: impl Into<RowValues>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<RowValues>) {
        self.values.insert(normalize(name).to_string(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RowValues> {
        self.values.get(normalize(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn normalize(name: &str) -> &str {
    name.trim().trim_start_matches(':')
}

impl<K: AsRef<str>, V: Into<RowValues>> FromIterator<(K, V)> for NamedParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = NamedParams::new();
        for (key, value) in iter {
            params.insert(key.as_ref(), value);
        }
        params
    }
}

impl<V: Into<RowValues>> From<HashMap<String, V>> for NamedParams {
    fn from(map: HashMap<String, V>) -> Self {
        map.into_iter().collect()
    }
}

/// Parameters for one statement: a single set, or a batch of sets where the
/// statement runs once per element (insert only).
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Single(NamedParams),
    Batch(Vec<NamedParams>),
}

impl Params {
    #[must_use]
    pub fn none() -> Self {
        Params::Single(NamedParams::new())
    }

    #[must_use]
    pub fn is_batch(&self) -> bool {
        matches!(self, Params::Batch(_))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Params::Single(params) => params.is_empty(),
            Params::Batch(sets) => sets.is_empty(),
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::none()
    }
}

impl From<NamedParams> for Params {
    fn from(params: NamedParams) -> Self {
        Params::Single(params)
    }
}

impl From<Vec<NamedParams>> for Params {
    fn from(sets: Vec<NamedParams>) -> Self {
        Params::Batch(sets)
    }
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Params::none()
    }
}
