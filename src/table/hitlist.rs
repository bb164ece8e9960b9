//! Named hitlists
//!
//! A hitlist is a saved row subset backed by one allocated, non-exclusion
//! flag bit. Membership lives in the records' flag masks; this registry only
//! maps names to flags.

use serde::{Deserialize, Serialize};

use super::errors::{TableError, TableResult};
use super::flags::FlagId;

/// Boolean combination of two hitlists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitlistOperation {
    And,
    Or,
    Xor,
    AndNot,
}

impl HitlistOperation {
    /// Membership of a record given its membership in both operands
    pub fn apply(self, first: bool, second: bool) -> bool {
        match self {
            HitlistOperation::And => first && second,
            HitlistOperation::Or => first || second,
            HitlistOperation::Xor => first != second,
            HitlistOperation::AndNot => first && !second,
        }
    }
}

/// Rows a new hitlist is created from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitlistSource {
    /// Currently selected rows
    Selection,
    /// Explicit physical row indices
    Rows(Vec<usize>),
    /// Combination of two existing hitlists
    Combine {
        operation: HitlistOperation,
        first: String,
        second: String,
    },
}

/// A named row subset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hitlist {
    name: String,
    flag: FlagId,
}

impl Hitlist {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flag(&self) -> FlagId {
        self.flag
    }
}

/// Name→flag registry of all hitlists of one table
#[derive(Debug, Default)]
pub struct HitlistRegistry {
    lists: Vec<Hitlist>,
}

impl HitlistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `base` if unused, else the first free `base (n)` with n >= 2
    pub fn unique_name(&self, base: &str) -> String {
        if self.get(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|suffix| format!("{} ({})", base, suffix))
            .find(|candidate| self.get(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    pub(crate) fn insert(&mut self, name: String, flag: FlagId) -> &Hitlist {
        self.lists.push(Hitlist { name, flag });
        &self.lists[self.lists.len() - 1]
    }

    pub fn get(&self, name: &str) -> Option<&Hitlist> {
        self.lists.iter().find(|list| list.name == name)
    }

    /// Hitlist called `name` or [`TableError::HitlistNotFound`]
    pub fn require(&self, name: &str) -> TableResult<&Hitlist> {
        self.get(name)
            .ok_or_else(|| TableError::HitlistNotFound(name.to_string()))
    }

    pub(crate) fn remove(&mut self, name: &str) -> TableResult<Hitlist> {
        let position = self
            .lists
            .iter()
            .position(|list| list.name == name)
            .ok_or_else(|| TableError::HitlistNotFound(name.to_string()))?;
        Ok(self.lists.remove(position))
    }

    pub(crate) fn rename(&mut self, name: &str, new_name: &str) -> TableResult<FlagId> {
        if name != new_name && self.get(new_name).is_some() {
            return Err(TableError::HitlistExists(new_name.to_string()));
        }
        let list = self
            .lists
            .iter_mut()
            .find(|list| list.name == name)
            .ok_or_else(|| TableError::HitlistNotFound(name.to_string()))?;
        list.name = new_name.to_string();
        Ok(list.flag)
    }

    pub(crate) fn clear(&mut self) -> Vec<Hitlist> {
        std::mem::take(&mut self.lists)
    }

    /// True if `flag` backs one of the hitlists
    pub fn owns(&self, flag: FlagId) -> bool {
        self.lists.iter().any(|list| list.flag == flag)
    }

    /// Names in creation order
    pub fn names(&self) -> Vec<&str> {
        self.lists.iter().map(|list| list.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}
