//! User-supplied enum, alias and subtype tables.
//!
//! These are plain text files loaded next to a bank. They only affect how
//! integers are printed (symbolic names instead of raw values); decompilation
//! works without them.
//!
//! ```text
//! enum COLOUR
//!     0 RED
//!     1 BLUE
//! end
//!
//! alias ON = 1
//!
//! subtype OBJECT_TYPE 3 CREATURE_ACTION
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::BankError;

/// Loaded symbol tables, read-only once loading is done.
#[derive(Debug, Clone, Default)]
pub struct GameTables {
    enums: HashMap<String, BTreeMap<i32, String>>,
    aliases: Vec<(String, i32)>,
    /// (base enum, discriminating value) -> enum used for the subtype slot
    subtypes: HashMap<(String, i32), String>,
}

impl GameTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one table file, merging into the already loaded tables.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), BankError> {
        let text = std::fs::read_to_string(path)?;
        self.load_str(&text)
    }

    /// Parse table text. Line-oriented; `#` starts a comment.
    pub fn load_str(&mut self, text: &str) -> Result<(), BankError> {
        let mut current_enum: Option<String> = None;
        for (index, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let bad = || BankError::BadTableLine {
                line: index + 1,
                text: raw.to_string(),
            };
            let mut words = line.split_whitespace();
            let head = words.next().unwrap_or("");

            if let Some(name) = &current_enum {
                if head == "end" {
                    current_enum = None;
                    continue;
                }
                let value: i32 = head.parse().map_err(|_| bad())?;
                let symbol = words.next().ok_or_else(bad)?;
                self.enums
                    .entry(name.clone())
                    .or_default()
                    .insert(value, symbol.to_string());
                continue;
            }

            match head {
                "enum" => {
                    let name = words.next().ok_or_else(bad)?;
                    current_enum = Some(name.to_string());
                }
                "alias" => {
                    // alias NAME = VALUE
                    let name = words.next().ok_or_else(bad)?;
                    let eq = words.next().ok_or_else(bad)?;
                    let value = words.next().ok_or_else(bad)?;
                    if eq != "=" {
                        return Err(bad());
                    }
                    let value: i32 = value.parse().map_err(|_| bad())?;
                    self.aliases.push((name.to_string(), value));
                }
                "subtype" => {
                    // subtype BASE VALUE TARGET_ENUM
                    let base = words.next().ok_or_else(bad)?;
                    let value: i32 = words.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
                    let target = words.next().ok_or_else(bad)?;
                    self.subtypes
                        .insert((base.to_string(), value), target.to_string());
                }
                _ => return Err(bad()),
            }
        }
        Ok(())
    }

    /// Symbolic name of `value` inside `enum_name`, when known.
    pub fn enum_symbol(&self, enum_name: &str, value: i32) -> Option<&str> {
        self.enums
            .get(enum_name)
            .and_then(|m| m.get(&value))
            .map(String::as_str)
    }

    pub fn has_enum(&self, enum_name: &str) -> bool {
        self.enums.contains_key(enum_name)
    }

    /// The enum a subtype slot should be rendered through, given the value of
    /// the discriminating "type" argument.
    pub fn subtype_enum(&self, base: &str, key: i32) -> Option<&str> {
        self.subtypes
            .get(&(base.to_string(), key))
            .map(String::as_str)
    }

    /// First alias declared for `value`, if any. Aliases are consulted only
    /// for plain integer argument slots.
    pub fn alias_for(&self, value: i32) -> Option<&str> {
        self.aliases
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }
}
