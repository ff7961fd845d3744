//! Provider results.

use serde_json::Value as External;

/// A provider's answer for a key: the external payload plus the change
/// tokens used to resume a watch.
///
/// Providers without ordered change detection (environment, static
/// tables) leave both indexes empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    value: External,
    change_index: Option<u64>,
    next_index: Option<u64>,
}

impl Property {
    /// Builds an unindexed property.
    pub fn new(value: impl Into<External>) -> Self {
        Self {
            value: value.into(),
            change_index: None,
            next_index: None,
        }
    }

    /// Builds a property observed at `change_index`; the next watch waits
    /// for `change_index + 1`.
    pub fn indexed(value: impl Into<External>, change_index: u64) -> Self {
        Self {
            value: value.into(),
            change_index: Some(change_index),
            next_index: Some(change_index.saturating_add(1)),
        }
    }

    /// Builds a tombstone: the key was removed at `change_index`.
    pub fn removed(change_index: u64) -> Self {
        Self::indexed(External::Null, change_index)
    }

    /// Opaque external payload.
    pub fn value(&self) -> &External {
        &self.value
    }

    /// Ordering token of the change that produced this property.
    pub fn change_index(&self) -> Option<u64> {
        self.change_index
    }

    /// Token to send with the next watch request.
    pub fn next_index(&self) -> Option<u64> {
        self.next_index
    }

    /// True when the property reports a removed key.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_null()
    }
}
