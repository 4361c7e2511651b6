// Phone symbol table in the OpenFst text format.
//
// One `name id` pair per line, whitespace separated. The table is loaded once
// and never mutated afterwards.

use hashbrown::HashMap;

use crate::PhoneId;

/// Error raised while building or parsing a symbol table.
#[derive(Debug, thiserror::Error)]
pub enum SymbolTableError {
    #[error("line {line}: expected `<symbol> <id>`, got {content:?}")]
    Malformed { line: usize, content: String },
    #[error("line {line}: invalid symbol id {id:?}")]
    InvalidId { line: usize, id: String },
    #[error("negative id {id} for symbol {name:?}")]
    NegativeId { name: String, id: PhoneId },
    #[error("duplicate symbol {0:?}")]
    DuplicateSymbol(String),
    #[error("duplicate id {id} (symbols {first:?} and {second:?})")]
    DuplicateId {
        id: PhoneId,
        first: String,
        second: String,
    },
}

/// Bijection between phone names and small non-negative integer ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTable {
    names: HashMap<PhoneId, String>,
    ids: HashMap<String, PhoneId>,
    /// Largest id in use, `-1` while empty.
    max_id: PhoneId,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            names: HashMap::new(),
            ids: HashMap::new(),
            max_id: -1,
        }
    }

    /// Parse a symbol table from its text form.
    ///
    /// Blank lines are skipped. Every other line must hold exactly two
    /// whitespace-separated fields, the second being a non-negative integer.
    pub fn parse(text: &str) -> Result<Self, SymbolTableError> {
        let mut table = Self::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let mut fields = raw.split_whitespace();
            let (Some(name), Some(id), None) = (fields.next(), fields.next(), fields.next())
            else {
                if raw.trim().is_empty() {
                    continue;
                }
                return Err(SymbolTableError::Malformed {
                    line,
                    content: raw.to_string(),
                });
            };
            let id: PhoneId = match id.parse() {
                Ok(v) if v >= 0 => v,
                _ => {
                    return Err(SymbolTableError::InvalidId {
                        line,
                        id: id.to_string(),
                    });
                }
            };
            table.add_symbol(name, id)?;
        }
        Ok(table)
    }

    /// Register `name` under `id`. Both must be unused.
    pub fn add_symbol(&mut self, name: &str, id: PhoneId) -> Result<(), SymbolTableError> {
        if id < 0 {
            return Err(SymbolTableError::NegativeId {
                name: name.to_string(),
                id,
            });
        }
        if self.ids.contains_key(name) {
            return Err(SymbolTableError::DuplicateSymbol(name.to_string()));
        }
        if let Some(first) = self.names.get(&id) {
            return Err(SymbolTableError::DuplicateId {
                id,
                first: first.clone(),
                second: name.to_string(),
            });
        }
        self.names.insert(id, name.to_string());
        self.ids.insert(name.to_string(), id);
        self.max_id = self.max_id.max(id);
        Ok(())
    }

    /// Number of symbols in the table, epsilon included.
    ///
    /// Enumerations run over ids `0..num_symbols()`, which assumes the ids
    /// are dense as they are in phone tables.
    pub fn num_symbols(&self) -> usize {
        self.ids.len()
    }

    /// Name of the symbol with the given id.
    pub fn find(&self, id: PhoneId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Name of the symbol with the given id, or `""` if there is none.
    #[inline]
    pub fn name(&self, id: PhoneId) -> &str {
        self.find(id).unwrap_or("")
    }

    /// Whether the ids in use form the contiguous range `0..num_symbols()`.
    pub fn is_dense(&self) -> bool {
        i64::from(self.max_id) + 1 == self.ids.len() as i64
    }
}
