//! Category lists
//!
//! Bidirectional mapping between canonical value strings and stable small
//! integer indices.

use std::collections::HashMap;

use serde::Serialize;

/// Synthetic trailing entry for records whose values span several categories
pub const MULTIPLE_CATEGORIES: &str = "<multiple categories>";

/// How the entries of a list are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryOrder {
    /// Sorted by normalized value
    Sorted,
    /// User-defined order, then remaining values sorted
    Custom,
    /// Generated ordered bins of a numeric or date range
    Range,
}

/// Category list of one column
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryList {
    entries: Vec<String>,
    lookup: HashMap<String, usize>,
    order: CategoryOrder,
    multiple_index: Option<usize>,
}

impl CategoryList {
    /// Build from ordered entries; appends [`MULTIPLE_CATEGORIES`] if requested
    pub fn new(entries: Vec<String>, order: CategoryOrder, with_multiple: bool) -> Self {
        let mut list = Self {
            lookup: HashMap::with_capacity(entries.len() + 1),
            entries: Vec::with_capacity(entries.len() + 1),
            order,
            multiple_index: None,
        };
        for entry in entries {
            list.insert(entry);
        }
        if with_multiple {
            list.multiple_index = Some(list.insert(MULTIPLE_CATEGORIES.to_string()));
        }
        list
    }

    fn insert(&mut self, entry: String) -> usize {
        if let Some(&index) = self.lookup.get(&entry) {
            return index;
        }
        let index = self.entries.len();
        self.lookup.insert(entry.clone(), index);
        self.entries.push(entry);
        index
    }

    /// Map another spelling onto an existing entry without listing it
    pub fn add_alias(&mut self, value: String, index: usize) {
        if index < self.entries.len() {
            self.lookup.entry(value).or_insert(index);
        }
    }

    /// Index of a value
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.lookup.get(value).copied()
    }

    /// Canonical value at `index`
    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn order(&self) -> CategoryOrder {
        self.order
    }

    /// Index of the synthetic multiple-categories entry, if present
    pub fn multiple_index(&self) -> Option<usize> {
        self.multiple_index
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bidirectional_lookup() {
        let list = CategoryList::new(
            vec!["a".into(), "b".into(), "c".into()],
            CategoryOrder::Sorted,
            false,
        );
        assert_eq!(list.index_of("b"), Some(1));
        assert_eq!(list.get(2), Some("c"));
        assert_eq!(list.index_of("z"), None);
        assert_eq!(list.multiple_index(), None);
    }

    #[test]
    fn test_multiple_entry_trails() {
        let list = CategoryList::new(vec!["x".into(), "y".into()], CategoryOrder::Sorted, true);
        assert_eq!(list.len(), 3);
        assert_eq!(list.multiple_index(), Some(2));
        assert_eq!(list.get(2), Some(MULTIPLE_CATEGORIES));
    }

    #[test]
    fn test_alias_resolves_to_entry() {
        let mut list = CategoryList::new(vec!["0-10".into(), "10-20".into()], CategoryOrder::Range, false);
        list.add_alias("0.0-10.0".into(), 0);
        list.add_alias("10-20".into(), 0);
        list.add_alias("20-30".into(), 5);

        assert_eq!(list.index_of("0.0-10.0"), Some(0));
        assert_eq!(list.index_of("10-20"), Some(1));
        assert_eq!(list.index_of("20-30"), None);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_duplicates_collapse() {
        let list = CategoryList::new(
            vec!["x".into(), "x".into(), "y".into()],
            CategoryOrder::Custom,
            false,
        );
        assert_eq!(list.len(), 2);
        assert_eq!(list.order(), CategoryOrder::Custom);
    }
}
