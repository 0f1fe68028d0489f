//! Which note-on currently holds each (channel, pitch).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{EngineError, Result};

/// Identity of one scheduled note-on and its matching off.
pub type NoteId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteKey {
    /// 0-based wire channel.
    pub channel: u8,
    pub note: u8,
}

impl NoteKey {
    pub fn new(channel: u8, note: u8) -> Self {
        Self { channel, note }
    }
}

/// Shared map of sounding notes. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct NoteRegistry {
    held: Arc<Mutex<HashMap<NoteKey, NoteId>>>,
}

impl NoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NoteKey, NoteId>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `id` as the holder of `key`. A key that is already held is a
    /// scheduling bug: callers must clear it with [`remove`](Self::remove) first.
    pub fn add(&self, key: NoteKey, id: NoteId) -> Result<()> {
        let mut held = self.lock();
        if let Some(existing) = held.get(&key) {
            log::error!(
                target: "registry",
                "note {} ch {} already held by {}, refusing {}",
                key.note,
                key.channel,
                existing,
                id
            );
            return Err(EngineError::DuplicateNote {
                channel: key.channel,
                note: key.note,
            });
        }
        held.insert(key, id);
        Ok(())
    }

    /// Clear `key`, returning whoever held it.
    pub fn remove(&self, key: NoteKey) -> Option<NoteId> {
        self.lock().remove(&key)
    }

    /// Clear `key` only if `id` still holds it.
    pub fn remove_if_current(&self, key: NoteKey, id: NoteId) -> bool {
        let mut held = self.lock();
        if held.get(&key) == Some(&id) {
            held.remove(&key);
            true
        } else {
            false
        }
    }

    pub fn current(&self, key: NoteKey) -> Option<NoteId> {
        self.lock().get(&key).copied()
    }

    /// A later note-on took over `key`, or it was already released.
    pub fn is_superseded(&self, key: NoteKey, id: NoteId) -> bool {
        self.current(key) != Some(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
