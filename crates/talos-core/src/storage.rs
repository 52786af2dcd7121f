//! Keyed storage for values of arbitrary type.
//!
//! Contexts and services each own a [`StorageMap`]. Values go in under a
//! string key and come back out by asking for the concrete type they were
//! stored as.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

type Slot = Box<dyn Any + Send + Sync>;

/// A map from string keys to values of any `Send + Sync` type.
///
/// # Example
///
/// ```
/// use talos_core::StorageMap;
///
/// let mut storage = StorageMap::new();
/// storage.insert("attempts", 3_u32);
///
/// assert_eq!(storage.get::<u32>("attempts"), Some(&3));
/// assert_eq!(storage.get::<String>("attempts"), None);
/// ```
#[derive(Default)]
pub struct StorageMap {
    slots: HashMap<String, Slot>,
}

impl StorageMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, returning `true` if an earlier value was replaced.
    pub fn insert<T>(&mut self, key: impl Into<String>, value: T) -> bool
    where
        T: Any + Send + Sync,
    {
        self.slots.insert(key.into(), Box::new(value)).is_some()
    }

    /// Returns the value under `key` if it exists and has type `T`.
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.slots
            .get(key)
            .and_then(|slot| (**slot).downcast_ref::<T>())
    }

    /// Returns a mutable reference to the value under `key` if it has type `T`.
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.slots
            .get_mut(key)
            .and_then(|slot| (**slot).downcast_mut::<T>())
    }

    /// Returns the value under `key`, inserting one built by `init` if absent.
    ///
    /// Yields `None` when the key already holds a value of another type.
    pub fn get_or_insert_with<T, F>(&mut self, key: impl Into<String>, init: F) -> Option<&mut T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let slot = self
            .slots
            .entry(key.into())
            .or_insert_with(|| Box::new(init()));
        (**slot).downcast_mut::<T>()
    }

    /// Removes the value under `key` and returns it if it has type `T`.
    ///
    /// A value of a different type is left in place.
    pub fn take<T: Any>(&mut self, key: &str) -> Option<T> {
        let slot = self.slots.remove(key)?;
        match slot.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(slot) => {
                self.slots.insert(key.to_string(), slot);
                None
            }
        }
    }

    /// Removes whatever is stored under `key`, returning `true` if something was there.
    pub fn remove(&mut self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    /// Returns `true` if anything is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Iterates over the stored keys in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drops every stored value.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

impl fmt::Debug for StorageMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("StorageMap").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut storage = StorageMap::new();
        assert!(!storage.insert("user", String::from("ada")));
        assert_eq!(storage.get::<String>("user").map(String::as_str), Some("ada"));
        assert!(storage.insert("user", String::from("grace")));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_wrong_type_is_none() {
        let mut storage = StorageMap::new();
        storage.insert("count", 7_u64);
        assert!(storage.get::<u32>("count").is_none());
        assert!(storage.contains_key("count"));
    }

    #[test]
    fn test_get_mut() {
        let mut storage = StorageMap::new();
        storage.insert("hits", 1_u32);
        if let Some(hits) = storage.get_mut::<u32>("hits") {
            *hits += 1;
        }
        assert_eq!(storage.get::<u32>("hits"), Some(&2));
    }

    #[test]
    fn test_get_or_insert_with() {
        let mut storage = StorageMap::new();
        storage
            .get_or_insert_with("trail", Vec::<&str>::new)
            .expect("fresh slot")
            .push("a");
        storage
            .get_or_insert_with("trail", Vec::<&str>::new)
            .expect("existing slot")
            .push("b");
        assert_eq!(storage.get::<Vec<&str>>("trail"), Some(&vec!["a", "b"]));
        assert!(storage.get_or_insert_with("trail", || 0_u8).is_none());
    }

    #[test]
    fn test_take_leaves_mismatched_type() {
        let mut storage = StorageMap::new();
        storage.insert("token", String::from("abc"));
        assert_eq!(storage.take::<u32>("token"), None);
        assert!(storage.contains_key("token"));
        assert_eq!(storage.take::<String>("token").as_deref(), Some("abc"));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut storage = StorageMap::new();
        storage.insert("a", 1_i32);
        storage.insert("b", 2_i32);
        assert!(storage.remove("a"));
        assert!(!storage.remove("a"));
        storage.clear();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_debug_lists_sorted_keys() {
        let mut storage = StorageMap::new();
        storage.insert("zeta", 1_i32);
        storage.insert("alpha", 2_i32);
        assert_eq!(
            format!("{storage:?}"),
            r#"StorageMap { keys: ["alpha", "zeta"] }"#
        );
    }
}
