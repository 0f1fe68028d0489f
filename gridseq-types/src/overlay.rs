//! Layered patterns. A part's notes live in a stack of overlays ordered from
//! most specific (top) to ROOT (bottom); the layers active for a key-cycle are
//! merged top-down, the first writer of a cell winning.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::grid::{Action, GridKey, Note, Pattern};
use crate::overlay_key::{OverlayKey, ROOT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub key: OverlayKey,
    pub notes: Pattern,
    /// Participate whenever the key matches, even below another matching layer.
    pub press_up: bool,
    /// Pull the next layer down into the merge regardless of its key.
    pub press_down: bool,
}

impl Overlay {
    pub fn new(key: OverlayKey) -> Self {
        Self {
            key,
            notes: Pattern::new(),
            press_up: key == ROOT,
            press_down: false,
        }
    }

    pub fn set_note(&mut self, key: GridKey, note: Note) {
        self.notes.insert(key, note);
    }
}

/// A note resolved through the stack, tagged with the layer it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedNote {
    pub note: Note,
    pub overlay_key: OverlayKey,
    /// Came from the topmost participating layer.
    pub highest_overlay: bool,
}

/// Specificity-ordered layers. Index 0 is the top; the last entry is ROOT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayStack {
    layers: Vec<Overlay>,
}

impl Default for OverlayStack {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayStack {
    pub fn new() -> Self {
        Self {
            layers: vec![Overlay::new(ROOT)],
        }
    }

    pub fn layers(&self) -> &[Overlay] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn root(&self) -> &Overlay {
        &self.layers[self.layers.len() - 1]
    }

    pub fn root_mut(&mut self) -> &mut Overlay {
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    /// Insert an empty layer for `key`. Returns false if the key already has one.
    pub fn add(&mut self, key: OverlayKey) -> bool {
        if self.find(key).is_some() {
            return false;
        }
        let at = self
            .layers
            .iter()
            .position(|layer| layer.key.is_root() || key < layer.key)
            .unwrap_or(self.layers.len());
        self.layers.insert(at, Overlay::new(key));
        true
    }

    /// Unlink the layer for `key`. ROOT terminates every stack and cannot go.
    pub fn remove(&mut self, key: OverlayKey) -> Result<Overlay, String> {
        if key.is_root() {
            return Err("cannot remove the root overlay".to_string());
        }
        let index = self
            .layers
            .iter()
            .position(|layer| layer.key == key)
            .ok_or_else(|| format!("no overlay for key {}", key))?;
        Ok(self.layers.remove(index))
    }

    pub fn find(&self, key: OverlayKey) -> Option<&Overlay> {
        self.layers.iter().find(|layer| layer.key == key)
    }

    pub fn find_mut(&mut self, key: OverlayKey) -> Option<&mut Overlay> {
        self.layers.iter_mut().find(|layer| layer.key == key)
    }

    /// Add the layer if missing, then hand it out for editing.
    pub fn ensure(&mut self, key: OverlayKey) -> &mut Overlay {
        self.add(key);
        let index = self
            .layers
            .iter()
            .position(|layer| layer.key == key)
            .unwrap_or(self.layers.len() - 1);
        &mut self.layers[index]
    }

    /// Topmost layer whose key matches `cycle`. ROOT catches every cycle.
    pub fn highest_matching(&self, cycle: i32) -> &Overlay {
        self.layers
            .iter()
            .find(|layer| layer.key.does_match(cycle))
            .unwrap_or_else(|| self.root())
    }

    /// Walk the participating layers top-down until `visit` returns false.
    ///
    /// A layer participates when it is the first match, when it matches with
    /// `press_up`, or when the previous participant had `press_down` set.
    pub fn combine<'a, F>(&'a self, key_cycle: i32, mut visit: F)
    where
        F: FnMut(&'a Overlay) -> bool,
    {
        let mut previous_press_down = false;
        let mut first_match = false;

        for layer in &self.layers {
            let matches = layer.key.does_match(key_cycle);
            if previous_press_down || (!first_match && matches) || (layer.press_up && matches) {
                first_match = true;
                if !visit(layer) {
                    break;
                }
                previous_press_down = layer.press_down;
            }
        }
    }

    /// Union of every participating layer, upper layers shadowing lower ones.
    pub fn combined_pattern(&self, key_cycle: i32) -> Pattern {
        let mut pattern = Pattern::new();
        self.combine(key_cycle, |layer| {
            for (key, note) in &layer.notes {
                pattern.entry(*key).or_insert(*note);
            }
            true
        });
        pattern
    }

    /// The union restricted to cells the line-state machine reacts to.
    ///
    /// An explicitly empty cell is kept so it can shadow an action below it.
    pub fn combined_action_pattern(&self, key_cycle: i32) -> Pattern {
        let mut pattern = Pattern::new();
        self.combine(key_cycle, |layer| {
            for (key, note) in &layer.notes {
                if note.action != Action::Nothing || note.is_empty() {
                    pattern.entry(*key).or_insert(*note);
                }
            }
            true
        });
        pattern.retain(|_, note| note.action != Action::Nothing);
        pattern
    }

    /// Resolve only `keys`, stopping as soon as each has been found.
    pub fn current_beat_pattern(&self, key_cycle: i32, keys: &BTreeSet<GridKey>) -> Pattern {
        let mut pattern = Pattern::new();
        if keys.is_empty() {
            return pattern;
        }
        self.combine(key_cycle, |layer| {
            for key in keys {
                if let Some(note) = layer.notes.get(key) {
                    pattern.entry(*key).or_insert(*note);
                }
            }
            pattern.len() < keys.len()
        });
        pattern
    }

    pub fn annotated_pattern(&self, key_cycle: i32) -> BTreeMap<GridKey, ResolvedNote> {
        let mut pattern = BTreeMap::new();
        let mut highest = None;
        self.combine(key_cycle, |layer| {
            let top = *highest.get_or_insert(layer.key);
            for (key, note) in &layer.notes {
                pattern.entry(*key).or_insert(ResolvedNote {
                    note: *note,
                    overlay_key: layer.key,
                    highest_overlay: layer.key == top,
                });
            }
            true
        });
        pattern
    }

    pub fn matching_keys(&self, key_cycle: i32) -> Vec<OverlayKey> {
        let mut keys = Vec::new();
        self.combine(key_cycle, |layer| {
            keys.push(layer.key);
            true
        });
        keys
    }

    /// The note heard at `key` on `key_cycle`, if any layer provides one.
    pub fn note_at(&self, key_cycle: i32, key: GridKey) -> Option<Note> {
        let mut found = None;
        self.combine(key_cycle, |layer| {
            found = layer.notes.get(&key).copied();
            found.is_none()
        });
        found
    }
}
