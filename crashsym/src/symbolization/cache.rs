//! Per-library address cache

use std::collections::HashMap;

use crate::domain::Address;

/// Results keyed by library name, then by the caller's address text.
///
/// Entries live for the whole session and are never invalidated.
#[derive(Debug)]
pub struct LibraryCache<T> {
    libraries: HashMap<String, HashMap<String, T>>,
}

impl<T: Clone> LibraryCache<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { libraries: HashMap::new() }
    }

    /// Split `addrs` into cached results and the addresses still to resolve.
    ///
    /// Misses keep the order they were given in.
    pub fn split(&self, library: &str, addrs: &[Address]) -> (HashMap<String, T>, Vec<Address>) {
        let Some(cached) = self.libraries.get(library) else {
            return (HashMap::new(), addrs.to_vec());
        };

        let mut hits = HashMap::new();
        let mut misses = Vec::new();
        for addr in addrs {
            match cached.get(addr.text()) {
                Some(value) => {
                    hits.insert(addr.text().to_string(), value.clone());
                }
                None => misses.push(addr.clone()),
            }
        }
        (hits, misses)
    }

    pub fn insert(&mut self, library: &str, addr: &Address, value: T) {
        self.libraries
            .entry(library.to_string())
            .or_default()
            .insert(addr.text().to_string(), value);
    }
}

impl<T: Clone> Default for LibraryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
