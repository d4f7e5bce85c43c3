//! Ordered store of fitted results.
//!
//! Entries are addressed by a 1-based ordinal that always equals their
//! position in the store, so after any public call the ordinals are exactly
//! `1..=count` and the display keys `"{ordinal}. {name}"` are distinct.

use std::collections::BTreeSet;

use crate::domain::FittingResult;
use crate::error::AppError;

/// One stored result.
#[derive(Debug, Clone)]
pub struct ResultEntry {
    ordinal: usize,
    source: String,
    name: String,
    checked: bool,
    result: FittingResult,
}

impl ResultEntry {
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Dataset name the entry was added under (before de-duplication).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// De-duplicated base name, e.g. `site_a_1`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Composite key shown in the result list, e.g. `3. site_a_1`.
    pub fn display_name(&self) -> String {
        format!("{}. {}", self.ordinal, self.name)
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    pub fn result(&self) -> &FittingResult {
        &self.result
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<ResultEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result.
    ///
    /// The stored name gets a `_k` suffix when `k >= 1` entries added under
    /// the same `base_name` are still present.
    pub fn add(&mut self, base_name: &str, result: FittingResult) -> &ResultEntry {
        let prior = self.entries.iter().filter(|e| e.source == base_name).count();
        let name = if prior >= 1 {
            format!("{base_name}_{prior}")
        } else {
            base_name.to_string()
        };

        let ordinal = self.entries.len() + 1;
        tracing::debug!(ordinal, name = %name, model = result.model_type.code(), "registry add");
        self.entries.push(ResultEntry {
            ordinal,
            source: base_name.to_string(),
            name,
            checked: false,
            result,
        });
        debug_assert!(self.check_invariants().is_ok());
        &self.entries[ordinal - 1]
    }

    /// Remove the given entries and renumber the survivors.
    ///
    /// Every ordinal is validated before anything is removed; on error the
    /// registry is unchanged. Returns the number of removed entries.
    pub fn delete(&mut self, ordinals: &BTreeSet<usize>) -> Result<usize, AppError> {
        if let Some(bad) = ordinals.iter().find(|&&o| o == 0 || o > self.entries.len()) {
            return Err(AppError::config(format!(
                "No result with number {bad} (registry holds {}).",
                self.entries.len()
            )));
        }

        // Highest first so the remaining indices stay valid.
        for &ordinal in ordinals.iter().rev() {
            self.entries.remove(ordinal - 1);
        }
        self.renumber();

        tracing::debug!(removed = ordinals.len(), remaining = self.entries.len(), "registry delete");
        debug_assert!(self.check_invariants().is_ok());
        Ok(ordinals.len())
    }

    /// Remove every checked entry.
    pub fn delete_checked(&mut self) -> Result<usize, AppError> {
        let checked = self.checked_ordinals();
        self.delete(&checked)
    }

    fn renumber(&mut self) {
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            entry.ordinal = idx + 1;
        }
    }

    pub fn set_checked(&mut self, ordinal: usize, checked: bool) -> Result<(), AppError> {
        let count = self.entries.len();
        let entry = ordinal
            .checked_sub(1)
            .and_then(|idx| self.entries.get_mut(idx))
            .ok_or_else(|| AppError::config(format!("No result with number {ordinal} (registry holds {count}).")))?;
        entry.checked = checked;
        Ok(())
    }

    pub fn toggle_checked(&mut self, ordinal: usize) -> Result<bool, AppError> {
        let now = !self.get(ordinal).is_some_and(ResultEntry::is_checked);
        self.set_checked(ordinal, now)?;
        Ok(now)
    }

    pub fn check_all(&mut self) {
        self.entries.iter_mut().for_each(|e| e.checked = true);
    }

    pub fn uncheck_all(&mut self) {
        self.entries.iter_mut().for_each(|e| e.checked = false);
    }

    pub fn checked_ordinals(&self) -> BTreeSet<usize> {
        self.entries
            .iter()
            .filter(|e| e.checked)
            .map(|e| e.ordinal)
            .collect()
    }

    pub fn any_checked(&self) -> bool {
        self.entries.iter().any(|e| e.checked)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> Option<&ResultEntry> {
        ordinal.checked_sub(1).and_then(|idx| self.entries.get(idx))
    }

    /// Look an entry up by its composite display key.
    pub fn find(&self, display_name: &str) -> Option<&ResultEntry> {
        self.entries.iter().find(|e| e.display_name() == display_name)
    }

    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    pub fn checked(&self) -> impl Iterator<Item = &ResultEntry> {
        self.entries.iter().filter(|e| e.checked)
    }

    /// Verify the ordinal and key invariants.
    pub fn check_invariants(&self) -> Result<(), AppError> {
        let mut keys = BTreeSet::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.ordinal != idx + 1 {
                return Err(AppError::registry(format!(
                    "Entry '{}' at position {} carries ordinal {}.",
                    entry.name,
                    idx + 1,
                    entry.ordinal
                )));
            }
            if !keys.insert(entry.display_name()) {
                return Err(AppError::registry(format!(
                    "Duplicate result key '{}'.",
                    entry.display_name()
                )));
            }
        }
        Ok(())
    }
}
