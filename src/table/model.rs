//! The compound table
//!
//! Facade over row storage, column metadata, the flag space and the
//! descriptor scheduler. All structural mutation goes through `&mut self`,
//! so one owner context applies every change; see [`super::owner`] for
//! handing the table to a dedicated thread.
//!
//! After every structural change the affected columns run through:
//! 1. TypeAnalyzer
//! 2. CategoryIndexer
//! 3. DescriptorScheduler
//! 4. VisibilityCompiler

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::analysis::{CategoryIndexer, CategoryList, TypeAnalyzer};
use crate::config::TableConfig;
use crate::descriptor::{
    encode_descriptor, CancellationToken, Descriptor, DescriptorJob, DescriptorScheduler,
    DrainNotifier, GenerationOutcome, JobSnapshot, SharedHandler, SimilarityPool,
};
use crate::observability::{
    log_event_with_fields, Event, MetricsSnapshot, ObservationScope, TableMetrics,
};
use crate::sort::{EncodedLengthSizer, SortEngine, SortRequest, StructureSizer};

use super::column::{
    Column, ColumnProperties, ColumnRegistry, ColumnSummary, DescriptorBinding,
    SPECIAL_TYPE_COORDINATES_PREFIX,
};
use super::errors::{TableError, TableResult};
use super::events::{ChangeKind, EventBus, EventReceiver, TableEvent};
use super::flags::{FlagId, FlagSpace, FLAG_COUNT};
use super::hitlist::{HitlistRegistry, HitlistSource};
use super::record::{CellValue, Record, RecordStore};
use super::visibility::{VisibilityCompiler, VisibleRows};

/// In-memory columnar table of compound records
pub struct CompoundTable {
    config: TableConfig,
    records: RecordStore,
    columns: ColumnRegistry,
    flags: FlagSpace,
    selection: FlagId,
    visible: VisibleRows,
    hitlists: HitlistRegistry,
    events: EventBus,
    scheduler: DescriptorScheduler,
    similarity: SimilarityPool,
    metrics: Arc<TableMetrics>,
    sizer: Arc<dyn StructureSizer>,
    active_row: Option<usize>,
    extension_data: BTreeMap<String, serde_json::Value>,
    finalized: bool,
}

impl Default for CompoundTable {
    fn default() -> Self {
        Self::new(TableConfig::default())
    }
}

impl CompoundTable {
    /// Create an empty table; the selection flag is allocated here
    pub fn new(config: TableConfig) -> Self {
        let metrics = Arc::new(TableMetrics::new());
        let workers = config.worker_count();
        let (flags, selection) = FlagSpace::with_reserved_marker();

        Self {
            scheduler: DescriptorScheduler::new(workers, Arc::clone(&metrics)),
            similarity: SimilarityPool::new(workers),
            config,
            records: RecordStore::new(),
            columns: ColumnRegistry::new(),
            flags,
            selection,
            visible: VisibleRows::default(),
            hitlists: HitlistRegistry::new(),
            events: EventBus::new(),
            metrics,
            sizer: Arc::new(EncodedLengthSizer),
            active_row: None,
            extension_data: BTreeMap::new(),
            finalized: false,
        }
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Register a change listener
    pub fn subscribe(&mut self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Size metric used when sorting structure columns
    pub fn set_structure_sizer(&mut self, sizer: Arc<dyn StructureSizer>) {
        self.sizer = sizer;
    }

    // ==================
    // Loader boundary
    // ==================

    /// Discard all content and create `rows` x `columns` empty cells
    ///
    /// Hitlists are dropped. Flags owned by other features stay allocated.
    pub fn initialize_table(&mut self, rows: usize, columns: usize) {
        self.scheduler.stop();
        for hitlist in self.hitlists.clear() {
            self.flags.free(hitlist.flag(), &mut []).ok();
        }
        self.records.reset(rows, columns);
        self.columns.reset(columns);
        self.active_row = None;
        self.finalized = false;
        self.recompile_visibility();
    }

    pub fn set_column_name(&mut self, column: usize, name: &str) -> TableResult<()> {
        self.check_column(column)?;
        self.columns.rename(column, name.to_string());
        if self.finalized {
            self.publish(TableEvent::with_specifier(ChangeKind::ChangeColumnName, column as i64));
        }
        Ok(())
    }

    /// Display alias; lookups by name fall back to aliases
    pub fn set_column_alias(&mut self, column: usize, alias: Option<String>) -> TableResult<()> {
        self.check_column(column)?;
        if let Some(meta) = self.columns.get_mut(column) {
            meta.alias = alias;
        }
        if self.finalized {
            self.publish(TableEvent::with_specifier(ChangeKind::ChangeColumnName, column as i64));
        }
        Ok(())
    }

    /// Replace the properties of `column`
    ///
    /// On a finalized table the column is re-analysed and pending
    /// descriptors are scheduled.
    pub fn set_column_properties(
        &mut self,
        column: usize,
        properties: ColumnProperties,
    ) -> TableResult<()> {
        self.check_column(column)?;
        if let Some(meta) = self.columns.get_mut(column) {
            meta.properties = properties;
        }
        if self.finalized {
            self.prepare_descriptor_column(column, 0);
            self.analyze_column(column, 0);
            self.publish(TableEvent::with_specifier(ChangeKind::ChangeColumnData, column as i64));
            self.update_descriptors()?;
        }
        Ok(())
    }

    /// Store a loader value; no analysis runs until the next finalize call
    pub fn set_total_data_at(
        &mut self,
        value: impl Into<CellValue>,
        row: usize,
        column: usize,
    ) -> TableResult<()> {
        self.check_row(row)?;
        self.check_column(column)?;
        if let Some(record) = self.records.get_mut(row) {
            record.set_cell(column, value.into());
        }
        Ok(())
    }

    /// Append `count` empty rows; returns the index of the first
    pub fn add_new_rows(&mut self, count: usize) -> usize {
        self.records.append(count, self.columns.len())
    }

    /// Append empty columns; returns the index of the first
    pub fn add_new_columns(&mut self, names: &[&str]) -> usize {
        let first = self.columns.len();
        for name in names {
            self.columns.push(name.to_string());
        }
        self.records.append_columns(names.len());
        first
    }

    /// Let a handler compute the values of a loaded column
    ///
    /// Stored cells are decoded with the handler. The column's parent link
    /// must name a plain column.
    pub fn bind_descriptor_handler(
        &mut self,
        column: usize,
        handler: SharedHandler,
    ) -> TableResult<()> {
        self.check_column(column)?;
        self.check_descriptor_parent(column)?;
        if let Some(meta) = self.columns.get_mut(column) {
            meta.descriptor = Some(DescriptorBinding::new(handler));
        }
        if self.finalized {
            self.prepare_descriptor_column(column, 0);
            self.analyze_column(column, 0);
            self.update_descriptors()?;
        }
        Ok(())
    }

    /// Analyse every column and start descriptor computation
    pub fn finalize_table(&mut self) -> TableResult<()> {
        let scope = ObservationScope::with_fields(
            "FINALIZE_TABLE",
            &[
                ("rows", &self.records.len().to_string()),
                ("columns", &self.columns.len().to_string()),
            ],
        );

        self.scheduler.stop();
        for column in 0..self.columns.len() {
            self.prepare_descriptor_column(column, 0);
        }
        self.analyze_all(0);
        self.finalized = true;
        self.update_descriptors()?;
        self.recompile_visibility();

        self.publish(TableEvent::new(ChangeKind::NewTable));
        log_event_with_fields(
            Event::TableFinalized,
            &[
                ("rows", &self.records.len().to_string()),
                ("columns", &self.columns.len().to_string()),
            ],
        );
        scope.complete();
        Ok(())
    }

    /// Analyse rows appended since `first_row`
    pub fn finalize_new_rows(&mut self, first_row: usize) -> TableResult<()> {
        let total = self.records.len();
        if first_row > total {
            return Err(TableError::RowOutOfRange {
                row: first_row,
                count: total,
            });
        }
        if first_row == total {
            return Ok(());
        }

        for column in 0..self.columns.len() {
            self.prepare_descriptor_column(column, first_row);
        }
        self.analyze_all(first_row);
        self.update_descriptors()?;
        self.recompile_visibility();

        self.publish(TableEvent::with_specifier(ChangeKind::AddRows, first_row as i64));
        log_event_with_fields(
            Event::RowsAdded,
            &[
                ("first_row", &first_row.to_string()),
                ("rows", &(total - first_row).to_string()),
            ],
        );
        Ok(())
    }

    /// Analyse columns appended since `first_column`
    pub fn finalize_new_columns(&mut self, first_column: usize) -> TableResult<()> {
        let total = self.columns.len();
        if first_column > total {
            return Err(TableError::ColumnOutOfRange {
                column: first_column,
                count: total,
            });
        }
        if first_column == total {
            return Ok(());
        }

        for column in first_column..total {
            self.prepare_descriptor_column(column, 0);
            self.analyze_column(column, 0);
        }
        self.update_descriptors()?;

        self.publish(TableEvent::with_specifier(ChangeKind::AddColumns, first_column as i64));
        log_event_with_fields(
            Event::ColumnsAdded,
            &[
                ("first_column", &first_column.to_string()),
                ("columns", &(total - first_column).to_string()),
            ],
        );
        Ok(())
    }

    // ==================
    // Structural edits
    // ==================

    /// Replace one cell after finalize
    ///
    /// Descriptors derived from the edited cell are invalidated and
    /// rescheduled.
    pub fn edit_cell(
        &mut self,
        row: usize,
        column: usize,
        value: impl Into<CellValue>,
    ) -> TableResult<()> {
        self.check_row(row)?;
        self.check_column(column)?;
        if self.columns.get(column).map(Column::is_descriptor).unwrap_or(false) {
            return Err(TableError::DerivedColumn(column));
        }

        if let Some(record) = self.records.get_mut(row) {
            record.set_cell(column, value.into());
        }
        for child in self.columns.children_of(column) {
            let Some(binding) = self
                .columns
                .get_mut(child)
                .and_then(|meta| meta.descriptor.as_mut())
            else {
                continue;
            };
            binding.invalidate();
            if let Some(record) = self.records.get_mut(row) {
                record.set_cell(child, CellValue::Empty);
            }
            self.analyze_column(child, 0);
        }

        self.analyze_column(column, 0);
        self.recompile_visibility();
        self.publish(TableEvent::with_specifier(ChangeKind::ChangeColumnData, column as i64));
        self.update_descriptors()
    }

    /// Delete physical rows; returns the old→new mapping (-1 deleted)
    ///
    /// A running descriptor generation is stopped and restarted.
    pub fn delete_rows(&mut self, rows: &[usize]) -> TableResult<Vec<i64>> {
        for &row in rows {
            self.check_row(row)?;
        }
        if rows.is_empty() {
            return Ok((0..self.records.len() as i64).collect());
        }

        let resume = self.scheduler.stop();
        let mut remove = vec![false; self.records.len()];
        for &row in rows {
            remove[row] = true;
        }
        let mapping = self.records.compact_rows(&remove);

        let active_cleared = match self.active_row {
            Some(active) => {
                self.active_row = usize::try_from(mapping[active]).ok();
                self.active_row.is_none()
            }
            None => false,
        };

        self.analyze_all(0);
        self.recompile_visibility();

        let deleted = mapping.iter().filter(|target| **target < 0).count();
        self.publish(TableEvent::with_mapping(ChangeKind::DeleteRows, mapping.clone()));
        if active_cleared {
            self.publish(TableEvent::with_specifier(ChangeKind::ChangeActiveRow, -1));
        }
        log_event_with_fields(
            Event::RowsDeleted,
            &[
                ("deleted", &deleted.to_string()),
                ("remaining", &self.records.len().to_string()),
            ],
        );

        if resume {
            self.update_descriptors()?;
        }
        Ok(mapping)
    }

    /// Delete every selected row
    pub fn delete_selected_rows(&mut self) -> TableResult<Vec<i64>> {
        let rows = self.selected_rows();
        self.delete_rows(&rows)
    }

    /// Remove columns and every column whose parent link names one of them
    ///
    /// Returns the old→new column mapping (-1 removed).
    pub fn remove_columns(&mut self, columns: &[usize]) -> TableResult<Vec<i64>> {
        for &column in columns {
            self.check_column(column)?;
        }
        if columns.is_empty() {
            return Ok((0..self.columns.len() as i64).collect());
        }

        let remove = self.columns.with_dependents(columns);
        let resume = self.scheduler.stop();
        let keep: Vec<bool> = remove.iter().map(|flagged| !flagged).collect();
        self.records.retain_columns(&keep);
        let mapping = self.columns.remove(&remove);

        let removed = mapping.iter().filter(|target| **target < 0).count();
        self.publish(TableEvent::with_mapping(ChangeKind::RemoveColumns, mapping.clone()));
        log_event_with_fields(Event::ColumnsRemoved, &[("removed", &removed.to_string())]);

        if resume {
            self.update_descriptors()?;
        }
        Ok(mapping)
    }

    // ==================
    // Reads
    // ==================

    /// Visible row count
    pub fn row_count(&self) -> usize {
        self.visible.len()
    }

    /// Physical row count
    pub fn total_row_count(&self) -> usize {
        self.records.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, column: usize) -> Option<&Column> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> &ColumnRegistry {
        &self.columns
    }

    /// Column index by name, or else by alias
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.find(name)
    }

    pub fn column_summaries(&self) -> Vec<ColumnSummary> {
        self.columns.iter().map(Column::summary).collect()
    }

    pub fn visible_rows(&self) -> &VisibleRows {
        &self.visible
    }

    /// Physical index of visible row `row`
    ///
    /// # Panics
    ///
    /// If `row` is not below [`CompoundTable::row_count`].
    pub fn total_index(&self, row: usize) -> usize {
        self.visible.total_index(row).unwrap_or_else(|| {
            panic!("visible row {} out of range (row count {})", row, self.visible.len())
        })
    }

    /// Record at physical `row`; panics if out of range
    pub fn get_total_record(&self, row: usize) -> &Record {
        &self.records.as_slice()[row]
    }

    /// Record at visible `row`; panics if out of range
    pub fn get_record(&self, row: usize) -> &Record {
        self.get_total_record(self.total_index(row))
    }

    /// Cell at physical `row` formatted as text
    pub fn get_total_value_at(&self, row: usize, column: usize) -> String {
        let cell = self.get_total_record(row).cell(column);
        match cell {
            CellValue::Empty => String::new(),
            CellValue::Data(_) => cell.as_text().into_owned(),
            CellValue::Descriptor(descriptor) => {
                match self.columns.get(column).and_then(Column::descriptor) {
                    Some(binding) => binding.handler().encode(descriptor),
                    None => encode_descriptor(descriptor),
                }
            }
        }
    }

    /// Cell at visible `row` formatted as text
    pub fn get_value(&self, row: usize, column: usize) -> String {
        self.get_total_value_at(self.total_index(row), column)
    }

    /// Numeric projection at physical `row`
    pub fn get_total_double_at(&self, row: usize, column: usize) -> f64 {
        self.get_total_record(row).double(column)
    }

    /// Numeric projection at visible `row`
    pub fn get_double_at(&self, row: usize, column: usize) -> f64 {
        self.get_total_double_at(self.total_index(row), column)
    }

    pub fn get_category_list(&self, column: usize) -> Option<&CategoryList> {
        self.columns.get(column)?.categories()
    }

    /// Category of physical `row`, if the column has categories
    pub fn category_index(&self, row: usize, column: usize) -> Option<usize> {
        let meta = self.columns.get(column)?;
        let record = self.records.get(row)?;
        CategoryIndexer::new(&self.config).category_index(record, column, meta)
    }

    /// Visibility of physical `row`
    pub fn is_visible(&self, row: usize) -> bool {
        self.records
            .get(row)
            .map(|record| VisibilityCompiler::is_visible(record, self.flags.exclusion_mask()))
            .unwrap_or(false)
    }

    // ==================
    // Flags
    // ==================

    pub fn flag_space(&self) -> &FlagSpace {
        &self.flags
    }

    /// Allocate a flag for an external feature
    pub fn allocate_flag(&mut self, use_for_exclusion: bool) -> TableResult<FlagId> {
        self.flags.allocate(use_for_exclusion).map_err(|err| {
            log_event_with_fields(Event::FlagSpaceExhausted, &[("flags", &FLAG_COUNT.to_string())]);
            err
        })
    }

    /// Release a flag obtained from [`CompoundTable::allocate_flag`]
    pub fn free_flag(&mut self, flag: FlagId) -> TableResult<()> {
        self.check_reserved(flag)?;
        let exclusion = self.flags.is_exclusion(flag);
        self.flags.free(flag, self.records.as_mut_slice())?;
        if exclusion {
            self.exclusion_changed();
        }
        Ok(())
    }

    /// Set or clear `flag` on physical `row`
    pub fn set_flag(&mut self, row: usize, flag: FlagId, value: bool) -> TableResult<()> {
        self.check_row(row)?;
        self.check_flag(flag)?;
        self.check_reserved(flag)?;
        if let Some(record) = self.records.get_mut(row) {
            record.set_flag(flag, value);
        }
        if self.flags.is_exclusion(flag) {
            self.exclusion_changed();
        }
        Ok(())
    }

    pub fn is_flag_set(&self, row: usize, flag: FlagId) -> bool {
        self.records
            .get(row)
            .map(|record| record.is_flag_set(flag))
            .unwrap_or(false)
    }

    /// Set `flag` on exactly the records matching `predicate`
    ///
    /// Returns the number of flagged records.
    pub fn apply_exclusion<F>(&mut self, flag: FlagId, mut predicate: F) -> TableResult<usize>
    where
        F: FnMut(&Record) -> bool,
    {
        self.check_flag(flag)?;
        self.check_reserved(flag)?;

        let mut flagged = 0;
        for record in self.records.as_mut_slice() {
            let hit = predicate(record);
            record.set_flag(flag, hit);
            flagged += usize::from(hit);
        }
        if self.flags.is_exclusion(flag) {
            self.exclusion_changed();
        }
        Ok(flagged)
    }

    // ==================
    // Selection
    // ==================

    pub fn selection_flag(&self) -> FlagId {
        self.selection
    }

    pub fn is_selected(&self, row: usize) -> bool {
        self.is_flag_set(row, self.selection)
    }

    pub fn set_selected(&mut self, row: usize, selected: bool) -> TableResult<()> {
        self.select_rows(&[row], selected)
    }

    /// Set the selection state of several physical rows
    pub fn select_rows(&mut self, rows: &[usize], selected: bool) -> TableResult<()> {
        for &row in rows {
            self.check_row(row)?;
        }
        for &row in rows {
            if let Some(record) = self.records.get_mut(row) {
                record.set_flag(self.selection, selected);
            }
        }
        self.selection_changed();
        Ok(())
    }

    pub fn select_all_visible(&mut self) {
        for &row in self.visible.as_slice() {
            if let Some(record) = self.records.get_mut(row) {
                record.set_flag(self.selection, true);
            }
        }
        self.selection_changed();
    }

    pub fn clear_selection(&mut self) {
        for record in self.records.as_mut_slice() {
            record.set_flag(self.selection, false);
        }
        self.selection_changed();
    }

    /// Invert the selection of visible rows; hidden rows end up unselected
    pub fn invert_selection(&mut self) {
        let mask = self.flags.exclusion_mask();
        for record in self.records.as_mut_slice() {
            let selected = VisibilityCompiler::is_visible(record, mask) && !record.is_flag_set(self.selection);
            record.set_flag(self.selection, selected);
        }
        self.selection_changed();
    }

    pub fn selected_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.is_flag_set(self.selection))
            .count()
    }

    /// Physical indices of selected rows
    pub fn selected_rows(&self) -> Vec<usize> {
        self.rows_with_flag(self.selection)
    }

    // ==================
    // Hitlists
    // ==================

    pub fn hitlists(&self) -> &HitlistRegistry {
        &self.hitlists
    }

    /// Create a hitlist; returns its name, made unique if `name` is taken
    pub fn create_hitlist(&mut self, name: &str, source: HitlistSource) -> TableResult<String> {
        let members: Vec<bool> = match &source {
            HitlistSource::Selection => self
                .records
                .iter()
                .map(|record| record.is_flag_set(self.selection))
                .collect(),
            HitlistSource::Rows(rows) => {
                let mut members = vec![false; self.records.len()];
                for &row in rows {
                    self.check_row(row)?;
                    members[row] = true;
                }
                members
            }
            HitlistSource::Combine {
                operation,
                first,
                second,
            } => {
                let first = self.hitlists.require(first)?.flag();
                let second = self.hitlists.require(second)?.flag();
                self.records
                    .iter()
                    .map(|record| {
                        operation.apply(record.is_flag_set(first), record.is_flag_set(second))
                    })
                    .collect()
            }
        };

        let flag = self.allocate_flag(false)?;
        for (record, member) in self.records.as_mut_slice().iter_mut().zip(members) {
            record.set_flag(flag, member);
        }
        let name = self.hitlists.unique_name(name);
        self.hitlists.insert(name.clone(), flag);
        self.hitlist_changed(flag);
        Ok(name)
    }

    /// Delete a hitlist and free its flag
    pub fn delete_hitlist(&mut self, name: &str) -> TableResult<()> {
        let hitlist = self.hitlists.remove(name)?;
        self.flags.free(hitlist.flag(), self.records.as_mut_slice())?;
        self.hitlist_changed(hitlist.flag());
        Ok(())
    }

    pub fn rename_hitlist(&mut self, name: &str, new_name: &str) -> TableResult<()> {
        let flag = self.hitlists.rename(name, new_name)?;
        self.hitlist_changed(flag);
        Ok(())
    }

    /// Physical indices of the members of a hitlist
    pub fn hitlist_rows(&self, name: &str) -> TableResult<Vec<usize>> {
        let flag = self.hitlists.require(name)?.flag();
        Ok(self.rows_with_flag(flag))
    }

    /// Replace the selection with the members of a hitlist
    pub fn select_hitlist(&mut self, name: &str) -> TableResult<()> {
        let flag = self.hitlists.require(name)?.flag();
        for record in self.records.as_mut_slice() {
            let member = record.is_flag_set(flag);
            record.set_flag(self.selection, member);
        }
        self.selection_changed();
        Ok(())
    }

    pub fn add_to_hitlist(&mut self, name: &str, rows: &[usize]) -> TableResult<()> {
        self.set_hitlist_membership(name, rows, true)
    }

    pub fn remove_from_hitlist(&mut self, name: &str, rows: &[usize]) -> TableResult<()> {
        self.set_hitlist_membership(name, rows, false)
    }

    fn set_hitlist_membership(&mut self, name: &str, rows: &[usize], member: bool) -> TableResult<()> {
        let flag = self.hitlists.require(name)?.flag();
        for &row in rows {
            self.check_row(row)?;
        }
        for &row in rows {
            if let Some(record) = self.records.get_mut(row) {
                record.set_flag(flag, member);
            }
        }
        self.hitlist_changed(flag);
        Ok(())
    }

    // ==================
    // Active row and extension data
    // ==================

    pub fn active_row(&self) -> Option<usize> {
        self.active_row
    }

    /// Set the physical active row, or clear it with `None`
    pub fn set_active_row(&mut self, row: Option<usize>) -> TableResult<()> {
        if let Some(row) = row {
            self.check_row(row)?;
        }
        if self.active_row != row {
            self.active_row = row;
            let specifier = row.map(|row| row as i64).unwrap_or(-1);
            self.publish(TableEvent::with_specifier(ChangeKind::ChangeActiveRow, specifier));
        }
        Ok(())
    }

    pub fn extension_data(&self, name: &str) -> Option<&serde_json::Value> {
        self.extension_data.get(name)
    }

    pub fn set_extension_data(&mut self, name: &str, value: serde_json::Value) {
        self.extension_data.insert(name.to_string(), value);
        self.publish(TableEvent::new(ChangeKind::ChangeExtensionData));
    }

    pub fn remove_extension_data(&mut self, name: &str) -> Option<serde_json::Value> {
        let removed = self.extension_data.remove(name);
        if removed.is_some() {
            self.publish(TableEvent::new(ChangeKind::ChangeExtensionData));
        }
        removed
    }

    // ==================
    // Descriptors
    // ==================

    /// Append a column computed by `handler` from `parent`
    pub fn add_descriptor_column(
        &mut self,
        parent: usize,
        handler: SharedHandler,
    ) -> TableResult<usize> {
        self.check_column(parent)?;
        let parent_name = match self.columns.get(parent) {
            Some(meta) if !meta.is_descriptor() => meta.name().to_string(),
            Some(meta) => return Err(TableError::InvalidParentColumn(meta.name().to_string())),
            None => return Err(TableError::InvalidParentColumn(parent.to_string())),
        };

        let name = self.unique_column_name(handler.short_name());
        let column = self.columns.push(name);
        self.records.append_columns(1);
        if let Some(meta) = self.columns.get_mut(column) {
            meta.properties.parent_column = Some(parent_name);
            meta.descriptor = Some(DescriptorBinding::new(handler));
        }
        self.finalize_new_columns(column)?;
        Ok(column)
    }

    /// Schedule computation of every incomplete or outdated descriptor column
    ///
    /// Coalesces with a generation already running: it reruns once after
    /// the running one is integrated.
    pub fn update_descriptors(&mut self) -> TableResult<()> {
        if self.scheduler.is_running() {
            self.scheduler.request_rerun();
            return Ok(());
        }
        self.start_generation().map(|_| ())
    }

    /// Integrate a finished generation without blocking
    ///
    /// Returns true if a generation was integrated.
    pub fn poll_descriptors(&mut self) -> TableResult<bool> {
        let Some(outcome) = self.scheduler.try_collect() else {
            return Ok(false);
        };
        self.integrate(outcome);
        if self.scheduler.take_rerun_request() {
            self.start_generation()?;
        }
        Ok(true)
    }

    /// Block until no descriptor computation is pending
    pub fn wait_for_descriptors(&mut self) -> TableResult<()> {
        loop {
            if let Some(outcome) = self.scheduler.wait() {
                self.integrate(outcome);
            }
            self.scheduler.take_rerun_request();
            if !self.start_generation()? {
                return Ok(());
            }
        }
    }

    /// Cancel and discard the running generation
    ///
    /// Columns it was computing stay incomplete. Returns true if anything
    /// was running or pending.
    pub fn stop_descriptor_calculation(&mut self) -> bool {
        self.scheduler.stop()
    }

    /// Install or clear the hook run when a descriptor generation completes
    ///
    /// The hook runs on a worker thread; it should only schedule a later
    /// [`CompoundTable::poll_descriptors`] on the owner.
    pub fn set_drain_notifier(&mut self, notifier: Option<DrainNotifier>) {
        self.scheduler.set_drain_notifier(notifier);
    }

    pub fn is_descriptor_calculation_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// True once every value of a descriptor column is computed and current
    pub fn is_descriptor_available(&self, column: usize) -> bool {
        match self.columns.get(column) {
            Some(meta) => {
                meta.descriptor()
                    .map(|binding| !binding.is_incomplete())
                    .unwrap_or(false)
                    && !meta.is_descriptor_outdated()
            }
            None => false,
        }
    }

    /// Aggregate failure message of the last generation for `column`
    pub fn descriptor_error(&self, column: usize) -> Option<&str> {
        self.columns.get(column)?.descriptor()?.error_message()
    }

    /// Similarity of the descriptors of two physical rows; 0 if either is missing
    pub fn get_descriptor_similarity(
        &self,
        column: usize,
        first: usize,
        second: usize,
    ) -> TableResult<f32> {
        self.check_row(first)?;
        self.check_row(second)?;
        let handler = self.descriptor_handler(column)?;
        let a = self.records.get(first).and_then(|record| record.cell(column).as_descriptor());
        let b = self.records.get(second).and_then(|record| record.cell(column).as_descriptor());
        Ok(match (a, b) {
            (Some(a), Some(b)) => handler.similarity(a, b),
            _ => 0.0,
        })
    }

    /// Similarity of every physical row to `query`; NaN where no descriptor exists
    pub fn similarity_to(&self, column: usize, query: &Descriptor) -> TableResult<Vec<f32>> {
        self.similarity_to_with(column, query, &CancellationToken::new())
    }

    /// [`CompoundTable::similarity_to`] with an external cancellation token
    pub fn similarity_to_with(
        &self,
        column: usize,
        query: &Descriptor,
        cancel: &CancellationToken,
    ) -> TableResult<Vec<f32>> {
        let handler = self.descriptor_handler(column)?;
        let descriptors: Vec<Option<Arc<Descriptor>>> = self
            .records
            .iter()
            .map(|record| record.cell(column).as_descriptor().cloned())
            .collect();
        self.metrics.increment_similarity_searches();
        Ok(self.similarity.run(handler.as_ref(), query, &descriptors, cancel)?)
    }

    // ==================
    // Sorting
    // ==================

    /// Reorder the full row storage by `column`
    pub fn sort(
        &mut self,
        column: usize,
        descending: bool,
        selected_first: bool,
    ) -> TableResult<Vec<i64>> {
        self.sort_by(SortRequest {
            column,
            descending,
            selected_first,
        })
    }

    /// Reorder the full row storage; returns the old→new row mapping
    ///
    /// Descriptor columns have no sortable text and are refused.
    pub fn sort_by(&mut self, request: SortRequest) -> TableResult<Vec<i64>> {
        self.check_column(request.column)?;
        if self.columns.get(request.column).map(Column::is_descriptor).unwrap_or(false) {
            return Err(TableError::DerivedColumn(request.column));
        }

        let resume = self.scheduler.stop();
        let order = SortEngine::order(
            self.records.as_slice(),
            &self.columns,
            &request,
            self.selection,
            self.sizer.as_ref(),
        );
        let mapping = self.records.permute(&order);
        if let Some(active) = self.active_row {
            self.active_row = usize::try_from(mapping[active]).ok();
        }
        self.recompile_visibility();
        self.metrics.increment_sorts();

        self.publish(TableEvent::with_mapping(ChangeKind::ChangeSortOrder, mapping.clone()));
        log_event_with_fields(
            Event::SortComplete,
            &[
                ("column", &request.column.to_string()),
                ("descending", &request.descending.to_string()),
                ("rows", &self.records.len().to_string()),
            ],
        );

        if resume {
            self.update_descriptors()?;
        }
        Ok(mapping)
    }

    // ==================
    // Internals
    // ==================

    fn check_row(&self, row: usize) -> TableResult<()> {
        if row < self.records.len() {
            Ok(())
        } else {
            Err(TableError::RowOutOfRange {
                row,
                count: self.records.len(),
            })
        }
    }

    fn check_column(&self, column: usize) -> TableResult<()> {
        if column < self.columns.len() {
            Ok(())
        } else {
            Err(TableError::ColumnOutOfRange {
                column,
                count: self.columns.len(),
            })
        }
    }

    fn check_flag(&self, flag: FlagId) -> TableResult<()> {
        if self.flags.is_allocated(flag) {
            Ok(())
        } else {
            Err(TableError::FlagNotAllocated(flag))
        }
    }

    fn check_reserved(&self, flag: FlagId) -> TableResult<()> {
        if flag == self.selection || self.hitlists.owns(flag) {
            Err(TableError::ReservedFlag(flag))
        } else {
            Ok(())
        }
    }

    fn check_descriptor_parent(&self, column: usize) -> TableResult<()> {
        let link = self
            .columns
            .get(column)
            .and_then(|meta| meta.properties().parent_column.clone())
            .unwrap_or_default();
        match self.columns.parent_of(column) {
            Some(parent) if parent != column => match self.columns.get(parent) {
                Some(meta) if !meta.is_descriptor() => Ok(()),
                _ => Err(TableError::InvalidParentColumn(link)),
            },
            _ => Err(TableError::InvalidParentColumn(link)),
        }
    }

    fn descriptor_handler(&self, column: usize) -> TableResult<SharedHandler> {
        self.check_column(column)?;
        self.columns
            .get(column)
            .and_then(Column::descriptor)
            .map(|binding| Arc::clone(binding.handler()))
            .ok_or(TableError::NotDescriptorColumn(column))
    }

    fn unique_column_name(&self, base: &str) -> String {
        if self.columns.find(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|suffix| format!("{} ({})", base, suffix))
            .find(|candidate| self.columns.find(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    fn rows_with_flag(&self, flag: FlagId) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_flag_set(flag))
            .map(|(row, _)| row)
            .collect()
    }

    fn publish(&mut self, event: TableEvent) {
        self.events.publish(event);
    }

    fn recompile_visibility(&mut self) {
        self.visible = VisibilityCompiler::compile(self.records.as_slice(), self.flags.exclusion_mask());
    }

    fn exclusion_changed(&mut self) {
        self.recompile_visibility();
        self.publish(TableEvent::new(ChangeKind::ChangeExcluded));
    }

    fn selection_changed(&mut self) {
        self.publish(TableEvent::with_specifier(
            ChangeKind::ChangeSelection,
            self.selection.position() as i64,
        ));
    }

    fn hitlist_changed(&mut self, flag: FlagId) {
        self.publish(TableEvent::with_specifier(
            ChangeKind::ChangeExtensionData,
            flag.position() as i64,
        ));
    }

    fn analyze_column(&mut self, column: usize, first_row: usize) {
        TypeAnalyzer::new(&self.config).analyze(&mut self.records, &mut self.columns, column, first_row);
        let indexer = CategoryIndexer::new(&self.config);
        indexer.build_category_list(&self.records, &mut self.columns, column);
        indexer.assign_records_to_categories(&mut self.records, &self.columns, column);
    }

    fn analyze_all(&mut self, first_row: usize) {
        for column in 0..self.columns.len() {
            self.analyze_column(column, first_row);
        }
    }

    /// Decode stored descriptor cells from `first_row` on and derive completeness
    fn prepare_descriptor_column(&mut self, column: usize, first_row: usize) {
        let parent = self.columns.parent_of(column);
        let Some(meta) = self.columns.get_mut(column) else {
            return;
        };
        let outdated = meta.is_descriptor_outdated();
        let Some(binding) = meta.descriptor.as_mut() else {
            return;
        };

        let handler = Arc::clone(&binding.handler);
        let mut missing = false;
        let first_row = first_row.min(self.records.len());
        for record in &mut self.records.as_mut_slice()[first_row..] {
            let decoded = match record.cell(column) {
                CellValue::Data(bytes) => Some(handler.decode(&String::from_utf8_lossy(bytes)).ok()),
                _ => None,
            };
            if let Some(decoded) = decoded {
                record.set_cell(column, decoded.map(CellValue::from).unwrap_or_default());
            }

            let has_parent = parent.map(|p| !record.cell(p).is_empty()).unwrap_or(false);
            if has_parent && record.cell(column).as_descriptor().is_none() {
                missing = true;
            }
        }

        if outdated || missing {
            binding.invalidate();
        } else if first_row == 0 {
            binding.incomplete = false;
        }
    }

    /// Coordinate column attached to structure column `parent`
    fn coordinates_column(&self, parent: usize) -> Option<usize> {
        self.columns.children_of(parent).into_iter().find(|&child| {
            self.columns
                .get(child)
                .and_then(|meta| meta.properties().special_type.as_deref())
                .map(|special| special.starts_with(SPECIAL_TYPE_COORDINATES_PREFIX))
                .unwrap_or(false)
        })
    }

    /// Snapshot every incomplete or outdated descriptor column into jobs
    fn snapshot_jobs(&mut self) -> Vec<DescriptorJob> {
        let mut jobs = Vec::new();
        for column in 0..self.columns.len() {
            let Some(meta) = self.columns.get(column) else {
                continue;
            };
            let Some(binding) = meta.descriptor() else {
                continue;
            };
            let outdated = meta.is_descriptor_outdated();
            if !outdated && !binding.is_incomplete() {
                continue;
            }

            let handler = Arc::clone(binding.handler());
            let column_id = meta.id();
            let column_name = meta.name().to_string();
            let epoch = binding.epoch;

            let Some(parent) = self.columns.parent_of(column) else {
                if let Some(binding) = self.columns.get_mut(column).and_then(|m| m.descriptor.as_mut()) {
                    binding.incomplete = true;
                    binding.error_message = Some(format!("parent column of '{}' not found", column_name));
                }
                continue;
            };

            let coordinates = if handler.needs_coordinates() {
                self.coordinates_column(parent).map(|source| {
                    self.records
                        .iter()
                        .map(|record| record.cell(source).shared_bytes())
                        .collect()
                })
            } else {
                None
            };

            jobs.push(DescriptorJob::new(JobSnapshot {
                column_id,
                column_name,
                handler,
                outdated,
                epoch,
                parents: self
                    .records
                    .iter()
                    .map(|record| record.cell(parent).shared_bytes())
                    .collect(),
                coordinates,
                existing: self
                    .records
                    .iter()
                    .map(|record| record.cell(column).as_descriptor().is_some())
                    .collect(),
            }));

            if let Some(binding) = self.columns.get_mut(column).and_then(|m| m.descriptor.as_mut()) {
                binding.incomplete = true;
            }
        }
        jobs
    }

    /// Start a generation if any descriptor column is pending
    fn start_generation(&mut self) -> TableResult<bool> {
        let jobs = self.snapshot_jobs();
        if jobs.is_empty() {
            return Ok(false);
        }
        let original_indices = self.records.iter().map(Record::original_index).collect();
        self.scheduler.start(jobs, original_indices)?;
        Ok(true)
    }

    /// Apply a drained generation to the table
    ///
    /// Jobs whose column was invalidated after the snapshot are dropped; the
    /// column stays incomplete for the next generation.
    fn integrate(&mut self, outcome: GenerationOutcome) {
        let report = match outcome {
            GenerationOutcome::Completed(report) => report,
            GenerationOutcome::Cancelled { .. } => return,
        };

        let row_of: HashMap<usize, usize> = self
            .records
            .iter()
            .enumerate()
            .map(|(row, record)| (record.original_index(), row))
            .collect();

        let mut integrated = 0usize;
        for job in report.jobs {
            let Some(column) = self.columns.index_of(job.column_id) else {
                continue;
            };
            let epoch = self
                .columns
                .get(column)
                .and_then(Column::descriptor)
                .map(|binding| binding.epoch);
            if epoch != Some(job.epoch) {
                continue;
            }

            for (original, value) in job.results {
                if let Some(record) = row_of.get(&original).and_then(|&row| self.records.get_mut(row)) {
                    record.set_cell(column, value.map(CellValue::Descriptor).unwrap_or_default());
                }
            }
            if let Some(meta) = self.columns.get_mut(column) {
                meta.properties.descriptor_version = Some(job.version.clone());
                if let Some(binding) = meta.descriptor.as_mut() {
                    binding.incomplete = false;
                    binding.failed_records = job.errors;
                    binding.error_message = job.error_message.clone();
                }
            }
            if let Some(message) = &job.error_message {
                log_event_with_fields(
                    Event::DescriptorJobFailed,
                    &[
                        ("column", &job.column_name),
                        ("errors", &job.errors.to_string()),
                        ("message", message),
                    ],
                );
            }

            self.analyze_column(column, 0);
            integrated += 1;
            if job.updates > 0 {
                self.publish(TableEvent::with_specifier(ChangeKind::ChangeColumnData, column as i64));
            }
        }

        log_event_with_fields(
            Event::DescriptorGenerationComplete,
            &[
                ("generation", &report.id.to_string()),
                ("integrated", &integrated.to_string()),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnType;

    fn loaded(values: &[&str]) -> CompoundTable {
        let mut table = CompoundTable::new(TableConfig::default().with_descriptor_workers(2));
        table.initialize_table(values.len(), 1);
        table.set_column_name(0, "value").unwrap();
        for (row, value) in values.iter().enumerate() {
            table.set_total_data_at(*value, row, 0).unwrap();
        }
        table.finalize_table().unwrap();
        table
    }

    #[test]
    fn test_finalize_analyses_columns() {
        let table = loaded(&["1", "2", "", "4"]);
        let column = table.column(0).unwrap();
        assert_eq!(column.column_type().base(), ColumnType::DOUBLE);
        assert!(!column.is_complete());
        assert_eq!(table.row_count(), 4);
    }

    #[test]
    fn test_selection_flag_is_reserved() {
        let mut table = loaded(&["a"]);
        let selection = table.selection_flag();
        assert_eq!(table.free_flag(selection), Err(TableError::ReservedFlag(selection)));
        assert_eq!(table.flag_space().free_count(), FLAG_COUNT - 1);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut table = loaded(&["a"]);
        assert_eq!(
            table.edit_cell(3, 0, "b"),
            Err(TableError::RowOutOfRange { row: 3, count: 1 })
        );
        assert!(matches!(table.sort(5, false, false), Err(TableError::ColumnOutOfRange { .. })));
    }

    #[test]
    fn test_invert_selection_skips_hidden_rows() {
        let mut table = loaded(&["a", "b", "c"]);
        let filter = table.allocate_flag(true).unwrap();
        table.apply_exclusion(filter, |record| record.data(0) == Some(&b"b"[..])).unwrap();

        table.invert_selection();

        assert_eq!(table.selected_rows(), vec![0, 2]);
    }

    #[test]
    #[should_panic(expected = "visible row 5 out of range")]
    fn test_visible_index_panics() {
        let table = loaded(&["a"]);
        table.get_value(5, 0);
    }
}
