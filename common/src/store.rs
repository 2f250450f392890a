use std::collections::HashMap;

use crate::error::StoreError;

pub const KEY_HEAD_POS: &str = "headPos";
pub const KEY_FOOT_POS: &str = "footPos";
pub const KEY_HEAD_MAX: &str = "head_max_ms";
pub const KEY_FOOT_MAX: &str = "foot_max_ms";

/// Key-value persistence for positions, limits and presets.
///
/// Reads never fail: a missing or unreadable key yields the caller's default.
pub trait PositionStore: Send {
    fn get_i32(&self, key: &str, default: i32) -> i32;
    fn set_i32(&mut self, key: &str, value: i32) -> Result<(), StoreError>;
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    fn contains(&self, key: &str) -> bool {
        self.get_string(key).is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum StoredValue {
    Int(i32),
    Text(String),
}

/// Volatile store used by tests and as a fallback when flash is unavailable.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, StoredValue>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes since construction.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl PositionStore for MemoryStore {
    fn get_i32(&self, key: &str, default: i32) -> i32 {
        match self.values.get(key) {
            Some(StoredValue::Int(value)) => *value,
            _ => default,
        }
    }

    fn set_i32(&mut self, key: &str, value: i32) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), StoredValue::Int(value));
        self.writes += 1;
        Ok(())
    }

    fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key) {
            Some(StoredValue::Text(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .insert(key.to_string(), StoredValue::Text(value.to_string()));
        self.writes += 1;
        Ok(())
    }
}
