//! Column metadata and the column registry
//!
//! A column carries its type tag, completeness and uniqueness flags,
//! numeric range, category list, optional descriptor binding and a set of
//! named properties. Columns are re-derived by the type analyzer after every
//! structural change.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::analysis::CategoryList;
use crate::descriptor::SharedHandler;

/// Special type of structure columns (compact encoded chemical structures)
pub const SPECIAL_TYPE_STRUCTURE: &str = "idcode";

/// Prefix of special types carrying atom coordinates of a parent structure
pub const SPECIAL_TYPE_COORDINATES_PREFIX: &str = "idcoordinates";

/// Stable identity of a column across insertions and removals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ColumnId(u32);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bit-combinable column type tag
///
/// Exactly one of `STRING`, `DOUBLE` and `DATE` is set; `CATEGORY` and
/// `RANGE_CATEGORY` are added by the category indexer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ColumnType(u8);

impl ColumnType {
    pub const STRING: ColumnType = ColumnType(0x01);
    pub const DOUBLE: ColumnType = ColumnType(0x02);
    pub const DATE: ColumnType = ColumnType(0x04);
    pub const CATEGORY: ColumnType = ColumnType(0x08);
    pub const RANGE_CATEGORY: ColumnType = ColumnType(0x10);

    const BASE_MASK: u8 = 0x07;

    /// True if every bit of `other` is set
    pub fn contains(self, other: ColumnType) -> bool {
        self.0 & other.0 == other.0
    }

    /// The value-kind part (`STRING`, `DOUBLE` or `DATE`)
    pub fn base(self) -> ColumnType {
        ColumnType(self.0 & Self::BASE_MASK)
    }

    /// Same tag with `other` bits cleared
    pub fn without(self, other: ColumnType) -> ColumnType {
        ColumnType(self.0 & !other.0)
    }

    /// Double or date: the numeric projection is the value itself
    pub fn is_numeric(self) -> bool {
        self.contains(Self::DOUBLE) || self.contains(Self::DATE)
    }

    /// Has a category list
    pub fn is_category(self) -> bool {
        self.contains(Self::CATEGORY)
    }

    /// Raw bits
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for ColumnType {
    type Output = ColumnType;

    fn bitor(self, rhs: ColumnType) -> ColumnType {
        ColumnType(self.0 | rhs.0)
    }
}

impl BitOrAssign for ColumnType {
    fn bitor_assign(&mut self, rhs: ColumnType) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ColumnType {
    type Output = ColumnType;

    fn bitand(self, rhs: ColumnType) -> ColumnType {
        ColumnType(self.0 & rhs.0)
    }
}

impl fmt::Debug for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Self::STRING) {
            parts.push("string");
        }
        if self.contains(Self::DOUBLE) {
            parts.push("double");
        }
        if self.contains(Self::DATE) {
            parts.push("date");
        }
        if self.contains(Self::CATEGORY) {
            parts.push("category");
        }
        if self.contains(Self::RANGE_CATEGORY) {
            parts.push("range");
        }
        if parts.is_empty() {
            parts.push("none");
        }
        write!(f, "{}", parts.join("|"))
    }
}

impl Serialize for ColumnType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// How the numeric projection of a multi-valued cell is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    #[default]
    Mean,
    Median,
    Min,
    Max,
    Sum,
    First,
}

impl SummaryMode {
    /// Reduce `values` to one number; NaN when empty
    pub fn summarize(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        match self {
            SummaryMode::Mean => values.iter().sum::<f64>() / values.len() as f64,
            SummaryMode::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            SummaryMode::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            SummaryMode::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            SummaryMode::Sum => values.iter().sum(),
            SummaryMode::First => values[0],
        }
    }
}

/// Named column properties
///
/// Known keys are explicit fields; `extra` holds external metadata the
/// engine does not interpret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnProperties {
    /// Name of the column this one is derived from or attached to
    pub parent_column: Option<String>,
    /// Special payload type, e.g. `idcode` for structures
    pub special_type: Option<String>,
    /// Version tag of the stored descriptors
    pub descriptor_version: Option<String>,
    /// User-defined category order
    pub custom_order: Option<Vec<String>>,
    /// Range categories use logarithmic bin boundaries
    pub log_binning: bool,
    /// Projection of multi-valued numeric cells
    pub summary_mode: SummaryMode,
    /// Uninterpreted external metadata
    pub extra: BTreeMap<String, String>,
}

/// Link between a derived column and the handler computing it
#[derive(Clone)]
pub struct DescriptorBinding {
    pub(crate) handler: SharedHandler,
    pub(crate) incomplete: bool,
    pub(crate) epoch: u64,
    pub(crate) error_message: Option<String>,
    pub(crate) failed_records: usize,
}

impl DescriptorBinding {
    pub(crate) fn new(handler: SharedHandler) -> Self {
        Self {
            handler,
            incomplete: true,
            epoch: 0,
            error_message: None,
            failed_records: 0,
        }
    }

    /// Handler computing this column
    pub fn handler(&self) -> &SharedHandler {
        &self.handler
    }

    /// True while values are pending computation
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    /// Aggregate message of the last generation that failed on some records
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Records whose descriptor could not be created in the last generation
    pub fn failed_records(&self) -> usize {
        self.failed_records
    }

    /// Mark pending; invalidates results of a generation already in flight
    pub(crate) fn invalidate(&mut self) {
        self.incomplete = true;
        self.epoch += 1;
    }
}

impl fmt::Debug for DescriptorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorBinding")
            .field("handler", &self.handler.short_name())
            .field("version", &self.handler.version())
            .field("incomplete", &self.incomplete)
            .field("epoch", &self.epoch)
            .field("failed_records", &self.failed_records)
            .finish()
    }
}

/// Incremental classification state kept between analyzer runs
#[derive(Debug, Clone, Default)]
pub(crate) struct TypeEvidence {
    pub(crate) scanned_rows: usize,
    pub(crate) non_null_values: usize,
    pub(crate) all_numeric: bool,
    pub(crate) all_date: bool,
    pub(crate) seen_values: Option<HashSet<String>>,
}

impl TypeEvidence {
    pub(crate) fn fresh() -> Self {
        Self {
            scanned_rows: 0,
            non_null_values: 0,
            all_numeric: true,
            all_date: true,
            seen_values: Some(HashSet::new()),
        }
    }
}

/// Metadata of one column
#[derive(Debug, Clone)]
pub struct Column {
    pub(crate) id: ColumnId,
    pub(crate) name: String,
    pub(crate) alias: Option<String>,
    pub(crate) column_type: ColumnType,
    pub(crate) complete: bool,
    pub(crate) complete_as_child: bool,
    pub(crate) unique: bool,
    pub(crate) min: f64,
    pub(crate) max: f64,
    pub(crate) categories: Option<CategoryList>,
    pub(crate) descriptor: Option<DescriptorBinding>,
    pub(crate) properties: ColumnProperties,
    pub(crate) evidence: TypeEvidence,
}

impl Column {
    fn new(id: ColumnId, name: String) -> Self {
        Self {
            id,
            name,
            alias: None,
            column_type: ColumnType::STRING,
            complete: true,
            complete_as_child: true,
            unique: true,
            min: f64::NAN,
            max: f64::NAN,
            categories: None,
            descriptor: None,
            properties: ColumnProperties::default(),
            evidence: TypeEvidence::fresh(),
        }
    }

    pub fn id(&self) -> ColumnId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Alias if set, otherwise the name
    pub fn title(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// No record has a null value
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Nulls only where the parent column is null as well
    pub fn is_complete_as_child(&self) -> bool {
        self.complete_as_child
    }

    /// Single values are pairwise distinct
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn categories(&self) -> Option<&CategoryList> {
        self.categories.as_ref()
    }

    pub fn descriptor(&self) -> Option<&DescriptorBinding> {
        self.descriptor.as_ref()
    }

    /// True for derived descriptor columns
    pub fn is_descriptor(&self) -> bool {
        self.descriptor.is_some()
    }

    pub fn properties(&self) -> &ColumnProperties {
        &self.properties
    }

    /// Stored descriptor version differs from the handler's version
    pub fn is_descriptor_outdated(&self) -> bool {
        match &self.descriptor {
            Some(binding) => {
                self.properties.descriptor_version.as_deref() != Some(binding.handler.version())
            }
            None => false,
        }
    }

    /// Serializable summary of this column
    pub fn summary(&self) -> ColumnSummary {
        ColumnSummary {
            name: self.name.clone(),
            alias: self.alias.clone(),
            column_type: self.column_type,
            complete: self.complete,
            complete_as_child: self.complete_as_child,
            unique: self.unique,
            min: finite(self.min),
            max: finite(self.max),
            category_count: self.categories.as_ref().map(CategoryList::len),
            descriptor: self.descriptor.as_ref().map(|binding| DescriptorSummary {
                handler: binding.handler.short_name().to_string(),
                version: self.properties.descriptor_version.clone(),
                available: !binding.incomplete,
                failed_records: binding.failed_records,
            }),
            parent_column: self.properties.parent_column.clone(),
        }
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Serializable column summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub complete: bool,
    pub complete_as_child: bool,
    pub unique: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub category_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<DescriptorSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_column: Option<String>,
}

/// Descriptor part of a [`ColumnSummary`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptorSummary {
    pub handler: String,
    pub version: Option<String>,
    pub available: bool,
    pub failed_records: usize,
}

/// Owner of all column metadata in display order
#[derive(Debug, Default)]
pub struct ColumnRegistry {
    columns: Vec<Column>,
    next_id: u32,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all columns with `count` default-named columns
    pub fn reset(&mut self, count: usize) {
        self.columns.clear();
        for index in 0..count {
            self.push(format!("Column {}", index + 1));
        }
    }

    /// Append a column; returns its index
    pub fn push(&mut self, name: String) -> usize {
        let id = ColumnId(self.next_id);
        self.next_id += 1;
        self.columns.push(Column::new(id, name));
        self.columns.len() - 1
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, column: usize) -> Option<&Column> {
        self.columns.get(column)
    }

    pub(crate) fn get_mut(&mut self, column: usize) -> Option<&mut Column> {
        self.columns.get_mut(column)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Column> {
        self.columns.iter_mut()
    }

    /// Index of the column whose name, or else alias, equals `name`
    pub fn find(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.name == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|column| column.alias.as_deref() == Some(name))
            })
    }

    /// Index of the column with identity `id`
    pub fn index_of(&self, id: ColumnId) -> Option<usize> {
        self.columns.iter().position(|column| column.id == id)
    }

    /// Index of the parent column of `column`, if linked
    pub fn parent_of(&self, column: usize) -> Option<usize> {
        let parent = self.columns.get(column)?.properties.parent_column.as_deref()?;
        self.find(parent)
    }

    /// Indices of the columns whose parent link names `column`
    pub fn children_of(&self, column: usize) -> Vec<usize> {
        let Some(name) = self.columns.get(column).map(|c| c.name.clone()) else {
            return Vec::new();
        };
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.properties.parent_column.as_deref() == Some(name.as_str()))
            .map(|(index, _)| index)
            .collect()
    }

    /// Close `columns` over the parent→child relation
    pub fn with_dependents(&self, columns: &[usize]) -> Vec<bool> {
        let mut remove = vec![false; self.columns.len()];
        let mut pending: Vec<usize> = columns.to_vec();
        while let Some(column) = pending.pop() {
            if column >= remove.len() || remove[column] {
                continue;
            }
            remove[column] = true;
            pending.extend(self.children_of(column));
        }
        remove
    }

    /// Remove every column flagged in `remove`; returns the old→new mapping
    pub fn remove(&mut self, remove: &[bool]) -> Vec<i64> {
        let mut mapping = Vec::with_capacity(self.columns.len());
        let mut next = 0i64;
        for flagged in remove {
            if *flagged {
                mapping.push(-1);
            } else {
                mapping.push(next);
                next += 1;
            }
        }
        let mut index = 0;
        self.columns.retain(|_| {
            index += 1;
            !remove[index - 1]
        });
        mapping
    }

    /// Rename a column and follow the parent links of its children
    pub(crate) fn rename(&mut self, column: usize, name: String) {
        let old = std::mem::replace(&mut self.columns[column].name, name.clone());
        for child in self.columns.iter_mut() {
            if child.properties.parent_column.as_deref() == Some(old.as_str()) {
                child.properties.parent_column = Some(name.clone());
            }
        }
    }
}
