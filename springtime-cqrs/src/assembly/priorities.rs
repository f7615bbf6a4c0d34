//! Priority ordering of middleware. Higher priorities run earlier; entries with equal priority keep
//! their registration order.

use crate::declaration::ROOT_PATH;
use indexmap::IndexMap;
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Priority bands of built-in HTTP middleware.
pub struct Priorities;

impl Priorities {
    /// Content negotiation wraps everything else.
    pub const CONTENT_NEGOTIATION: i32 = 110;
    /// Errors are converted right inside content negotiation.
    pub const ERROR_CONVERSION: i32 = 105;
    /// Route matching and body parsing.
    pub const BEFORE_CUSTOM: i32 = 100;
    /// Route dispatching and not-found handling.
    pub const AFTER_CUSTOM: i32 = -100;
}

/// Values grouped by priority, iterated from the highest priority.
#[derive(Clone, Debug)]
pub struct Prioritized<T> {
    entries: BTreeMap<Reverse<i32>, Vec<T>>,
}

impl<T> Default for Prioritized<T> {
    fn default() -> Self {
        Self {
            entries: Default::default(),
        }
    }
}

impl<T> Prioritized<T> {
    pub fn push(&mut self, priority: i32, value: T) {
        self.entries.entry(Reverse(priority)).or_default().push(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &T)> {
        self.entries
            .iter()
            .flat_map(|(priority, values)| values.iter().map(move |value| (priority.0, value)))
    }

    pub fn into_sorted(self) -> Vec<T> {
        self.entries.into_values().flatten().collect()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> FromIterator<(i32, T)> for Prioritized<T> {
    fn from_iter<I: IntoIterator<Item = (i32, T)>>(iter: I) -> Self {
        let mut prioritized = Self::default();
        for (priority, value) in iter {
            prioritized.push(priority, value);
        }

        prioritized
    }
}

/// HTTP middleware placed in the application pipeline.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MiddlewareRef {
    pub service_id: String,
    /// Path prefix gating invocation - [ROOT_PATH] for middleware applied to all requests.
    pub path: String,
}

impl MiddlewareRef {
    pub fn new(service_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            path: path.into(),
        }
    }

    /// Middleware applied to every request.
    pub fn global(service_id: impl Into<String>) -> Self {
        Self::new(service_id, ROOT_PATH)
    }

    #[inline]
    pub fn is_path_scoped(&self) -> bool {
        self.path != ROOT_PATH
    }
}

/// Flattens prioritized middleware into the pipeline order (all paths interleaved by priority) and
/// the per-path view (path prefixes in order of first appearance).
pub fn flatten_middleware(
    middleware: Prioritized<MiddlewareRef>,
) -> (Vec<MiddlewareRef>, IndexMap<String, Vec<String>>) {
    let pipeline = middleware.into_sorted();

    let mut by_path: IndexMap<String, Vec<String>> = IndexMap::new();
    for entry in &pipeline {
        by_path
            .entry(entry.path.clone())
            .or_default()
            .push(entry.service_id.clone());
    }

    (pipeline, by_path)
}
