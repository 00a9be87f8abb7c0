//! Symbol tables.
//!
//! Entries are scoped by owner: a variable `x` of method `App.Point:Scale`
//! is stored as `App.Point:Scale:x`, an instance variable as
//! `App.Point:x`. Each class and each method gets its own table; method
//! tables additionally keep a stack of block scopes so inner declarations
//! shadow outer ones.

use crate::ast::EntryId;
use rustc_hash::FxHashMap;
use vela_core::{SourceLoc, Type};

/// A declared symbol.
#[derive(Debug, Clone)]
pub struct SymbolEntry {
    /// Declaration site.
    pub loc: SourceLoc,
    /// Fully scoped name, `Owner:var`.
    pub name: String,
    /// Declared or inferred type.
    pub ty: Type,
    /// Class-level static entry.
    pub is_static: bool,
    /// Local (method-scoped) entry.
    pub is_local: bool,
}

impl SymbolEntry {
    /// The unscoped variable name.
    pub fn short_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }
}

/// One owner's table: scoped name → entry id, with block scoping.
#[derive(Debug, Default)]
pub struct SymbolTable {
    /// Innermost scope last.
    scopes: Vec<FxHashMap<String, EntryId>>,
}

impl SymbolTable {
    /// Create a table with its outermost scope open.
    pub fn new() -> Self {
        Self {
            scopes: vec![FxHashMap::default()],
        }
    }

    /// Open a block scope.
    pub fn new_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    /// Close the innermost block scope.
    pub fn previous_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Add an entry to the innermost scope.
    pub fn add(&mut self, name: impl Into<String>, id: EntryId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), id);
        }
    }

    /// Look up a scoped name, innermost scope first.
    pub fn get(&self, name: &str) -> Option<EntryId> {
        self.scopes.iter().rev().find_map(|s| s.get(name)).copied()
    }

    /// Every entry currently visible, unordered.
    pub fn all(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.scopes.iter().flat_map(|s| s.values()).copied()
    }
}

/// Owns every symbol entry and the per-owner tables.
#[derive(Debug, Default)]
pub struct SymbolTableManager {
    entries: Vec<SymbolEntry>,
    tables: FxHashMap<String, SymbolTable>,
}

impl SymbolTableManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an entry and register it in its owner's table.
    ///
    /// The owner is everything before the final `:` of the scoped name.
    pub fn add_entry(&mut self, entry: SymbolEntry) -> EntryId {
        let id = EntryId(self.entries.len());
        let owner = entry
            .name
            .rsplit_once(':')
            .map(|(owner, _)| owner.to_string())
            .unwrap_or_default();
        let name = entry.name.clone();
        self.entries.push(entry);
        self.tables.entry(owner).or_insert_with(SymbolTable::new).add(name, id);
        id
    }

    /// Intern an entry into an explicit owner table.
    pub fn add_entry_for(&mut self, owner: &str, entry: SymbolEntry) -> EntryId {
        let id = EntryId(self.entries.len());
        let name = entry.name.clone();
        self.entries.push(entry);
        self.tables
            .entry(owner.to_string())
            .or_insert_with(SymbolTable::new)
            .add(name, id);
        id
    }

    /// Number of interned entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries were interned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow an entry.
    #[inline]
    pub fn entry(&self, id: EntryId) -> &SymbolEntry {
        &self.entries[id.0]
    }

    /// Mutably borrow an entry.
    #[inline]
    pub fn entry_mut(&mut self, id: EntryId) -> &mut SymbolEntry {
        &mut self.entries[id.0]
    }

    /// Borrow an owner's table, if it has one.
    pub fn table(&self, owner: &str) -> Option<&SymbolTable> {
        self.tables.get(owner)
    }

    /// Mutably borrow an owner's table, creating it on first use.
    pub fn table_mut(&mut self, owner: &str) -> &mut SymbolTable {
        self.tables
            .entry(owner.to_string())
            .or_insert_with(SymbolTable::new)
    }

    /// Look up `owner:name` directly.
    pub fn get(&self, owner: &str, scoped_name: &str) -> Option<EntryId> {
        self.tables.get(owner)?.get(scoped_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, ty: Type) -> SymbolEntry {
        SymbolEntry {
            loc: SourceLoc::synthetic(),
            name: name.to_string(),
            ty,
            is_static: false,
            is_local: true,
        }
    }

    #[test]
    fn test_scoped_lookup() {
        let mut mgr = SymbolTableManager::new();
        let id = mgr.add_entry(entry("App.Point:Scale:x", Type::int()));

        assert_eq!(mgr.get("App.Point:Scale", "App.Point:Scale:x"), Some(id));
        assert_eq!(mgr.get("App.Point", "App.Point:Scale:x"), None);
        assert_eq!(mgr.entry(id).short_name(), "x");
    }

    #[test]
    fn test_block_scopes_shadow() {
        let mut table = SymbolTable::new();
        table.add("m:x", EntryId(0));
        table.new_scope();
        table.add("m:x", EntryId(1));

        assert_eq!(table.get("m:x"), Some(EntryId(1)));
        table.previous_scope();
        assert_eq!(table.get("m:x"), Some(EntryId(0)));
    }
}
