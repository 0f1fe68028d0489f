//! Song structure: a tree of repeating groups whose leaves are sections, and
//! the cursor that walks it during playback.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One playable stretch of a part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Index into the definition's parts.
    pub part: usize,
    /// Key-cycles to play before moving on. Zero plays forever.
    pub cycles: u32,
    pub start_beat: u8,
    /// Key-cycle count the section starts from.
    pub start_cycles: u32,
    /// Resume from the key-cycle count reached when the section was last left.
    pub keep_cycles: bool,
}

impl Section {
    pub fn new(part: usize) -> Self {
        Self {
            part,
            cycles: 1,
            start_beat: 0,
            start_cycles: 1,
            keep_cycles: false,
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.cycles == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub children: Vec<Node>,
    /// Passes over the children before the group is finished.
    pub iterations: u32,
}

impl Group {
    pub fn new(children: Vec<Node>, iterations: u32) -> Self {
        Self {
            children,
            iterations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Group(Group),
    Section(Section),
}

impl Node {
    pub fn is_group(&self) -> bool {
        matches!(self, Node::Group(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arrangement {
    pub root: Group,
}

impl Arrangement {
    pub fn new(root: Group) -> Self {
        Self { root }
    }

    /// A root playing one section of `part` once.
    pub fn single(part: usize) -> Self {
        Self::new(Group::new(vec![Node::Section(Section::new(part))], 1))
    }

    /// The node reached by following child indices from the root.
    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let (last, parents) = path.split_last()?;
        self.group_at(parents)?.children.get(*last)
    }

    /// The group reached by `path`; an empty path is the root.
    pub fn group_at(&self, path: &[usize]) -> Option<&Group> {
        let mut group = &self.root;
        for index in path {
            match group.children.get(*index)? {
                Node::Group(child) => group = child,
                Node::Section(_) => return None,
            }
        }
        Some(group)
    }
}

impl Default for Arrangement {
    fn default() -> Self {
        Self::single(0)
    }
}

/// Root-to-leaf position in an [`Arrangement`] plus playback progress.
///
/// `path[d]` is the child index taken below the group at depth `d`, and
/// `passes[d]` counts completed passes over that group's children. An empty
/// path means the cursor has walked off the top of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArrCursor {
    path: Vec<usize>,
    passes: Vec<u32>,
    key_cycles: u32,
    played_cycles: u32,
    kept_cycles: HashMap<Vec<usize>, u32>,
    loop_group: Option<Vec<usize>>,
}

impl ArrCursor {
    /// Cursor on the first section of `arrangement`.
    pub fn new(arrangement: &Arrangement) -> Self {
        let mut cursor = Self::default();
        cursor.reset(arrangement);
        cursor
    }

    /// Back to the first section with all pass counters cleared.
    pub fn reset(&mut self, arrangement: &Arrangement) {
        self.path.clear();
        self.passes.clear();
        self.kept_cycles.clear();
        self.passes.push(0);
        self.path.push(0);
        self.descend(arrangement);
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn key_cycles(&self) -> u32 {
        self.key_cycles
    }

    pub fn played_cycles(&self) -> u32 {
        self.played_cycles
    }

    /// Passes completed by the group at `depth` along the current path.
    pub fn passes(&self, depth: usize) -> u32 {
        self.passes.get(depth).copied().unwrap_or(0)
    }

    /// Repeat the group at `path` forever instead of drawing it down.
    pub fn set_loop_group(&mut self, path: Option<Vec<usize>>) {
        self.loop_group = path;
    }

    pub fn node<'a>(&self, arrangement: &'a Arrangement) -> Option<&'a Node> {
        arrangement.node_at(&self.path)
    }

    pub fn section<'a>(&self, arrangement: &'a Arrangement) -> Option<&'a Section> {
        match self.node(arrangement)? {
            Node::Section(section) => Some(section),
            Node::Group(_) => None,
        }
    }

    pub fn parent<'a>(&self, arrangement: &'a Arrangement) -> Option<&'a Group> {
        let (_, parents) = self.path.split_last()?;
        arrangement.group_at(parents)
    }

    pub fn is_last_sibling(&self, arrangement: &Arrangement) -> bool {
        match (self.path.last(), self.parent(arrangement)) {
            (Some(index), Some(parent)) => index + 1 >= parent.children.len(),
            _ => true,
        }
    }

    /// Count one completed pass of the keyline.
    pub fn increment_cycles(&mut self) {
        self.key_cycles += 1;
        self.played_cycles += 1;
    }

    /// Whether the current section has played all of its key-cycles.
    pub fn section_done(&self, arrangement: &Arrangement) -> bool {
        match self.section(arrangement) {
            Some(section) => !section.is_infinite() && self.played_cycles >= section.cycles,
            None => false,
        }
    }

    /// Restart the current section's key-cycle count.
    pub fn reset_cycles(&mut self, arrangement: &Arrangement) {
        self.played_cycles = 0;
        self.key_cycles = self
            .section(arrangement)
            .map(|section| section.start_cycles)
            .unwrap_or(1);
    }

    /// Advance to the next section. Returns false once the whole tree is done.
    pub fn play_move(&mut self, arrangement: &Arrangement) -> bool {
        self.stash_cycles(arrangement);
        loop {
            let Some(depth) = self.path.len().checked_sub(1) else {
                return false;
            };
            let Some(parent) = arrangement.group_at(&self.path[..depth]) else {
                return false;
            };

            if self.path[depth] + 1 >= parent.children.len() {
                self.passes[depth] += 1;
                let looping = self.loop_group.as_deref() == Some(&self.path[..depth]);
                if self.passes[depth] < parent.iterations || looping {
                    self.path[depth] = 0;
                    self.descend(arrangement);
                    return true;
                }
                self.passes.pop();
                self.path.pop();
            } else {
                self.path[depth] += 1;
                self.descend(arrangement);
                return true;
            }
        }
    }

    /// Walk first children down to a section, with fresh pass counters.
    fn descend(&mut self, arrangement: &Arrangement) {
        while let Some(Node::Group(_)) = arrangement.node_at(&self.path) {
            self.passes.push(0);
            self.path.push(0);
        }
        self.played_cycles = 0;
        self.key_cycles = match self.section(arrangement) {
            Some(section) if section.keep_cycles => self
                .kept_cycles
                .get(&self.path)
                .copied()
                .unwrap_or(section.start_cycles),
            Some(section) => section.start_cycles,
            None => 1,
        };
    }

    fn stash_cycles(&mut self, arrangement: &Arrangement) {
        if let Some(section) = self.section(arrangement) {
            if section.keep_cycles {
                self.kept_cycles.insert(self.path.clone(), self.key_cycles);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(part: usize) -> Node {
        Node::Section(Section::new(part))
    }

    fn walk(arrangement: &Arrangement, cursor: &mut ArrCursor) -> Vec<usize> {
        let mut visited = vec![cursor.section(arrangement).map(|s| s.part).unwrap_or(99)];
        while cursor.play_move(arrangement) {
            visited.push(cursor.section(arrangement).map(|s| s.part).unwrap_or(99));
            assert!(visited.len() < 100, "runaway traversal");
        }
        visited
    }

    #[test]
    fn repeated_group_visits_children_twice() {
        let arrangement = Arrangement::new(Group::new(vec![section(0), section(1)], 2));
        let mut cursor = ArrCursor::new(&arrangement);
        assert_eq!(walk(&arrangement, &mut cursor), vec![0, 1, 0, 1]);
        assert!(cursor.is_root());
    }

    #[test]
    fn nested_groups_draw_down_independently() {
        let inner = Node::Group(Group::new(vec![section(1), section(2)], 2));
        let arrangement = Arrangement::new(Group::new(vec![section(0), inner, section(3)], 1));
        let mut cursor = ArrCursor::new(&arrangement);
        assert_eq!(walk(&arrangement, &mut cursor), vec![0, 1, 2, 1, 2, 3]);
    }

    #[test]
    fn re_entered_group_starts_with_fresh_passes() {
        let inner = Node::Group(Group::new(vec![section(1)], 2));
        let arrangement = Arrangement::new(Group::new(vec![inner, section(0)], 2));
        let mut cursor = ArrCursor::new(&arrangement);
        assert_eq!(walk(&arrangement, &mut cursor), vec![1, 1, 0, 1, 1, 0]);
    }

    #[test]
    fn first_child_group_is_descended() {
        let inner = Node::Group(Group::new(vec![section(4)], 1));
        let arrangement = Arrangement::new(Group::new(vec![inner], 1));
        let cursor = ArrCursor::new(&arrangement);
        assert_eq!(cursor.path(), &[0, 0]);
        assert_eq!(cursor.section(&arrangement).map(|s| s.part), Some(4));
    }

    #[test]
    fn loop_group_never_draws_down() {
        let arrangement = Arrangement::new(Group::new(vec![section(0), section(1)], 1));
        let mut cursor = ArrCursor::new(&arrangement);
        cursor.set_loop_group(Some(vec![]));
        for expected in [1, 0, 1, 0, 1] {
            assert!(cursor.play_move(&arrangement));
            assert_eq!(cursor.section(&arrangement).map(|s| s.part), Some(expected));
        }
    }

    #[test]
    fn section_completion_counts_played_cycles() {
        let arrangement = Arrangement::new(Group::new(
            vec![Node::Section(Section {
                cycles: 2,
                ..Section::new(0)
            })],
            1,
        ));
        let mut cursor = ArrCursor::new(&arrangement);
        assert_eq!(cursor.key_cycles(), 1);
        cursor.increment_cycles();
        assert!(!cursor.section_done(&arrangement));
        cursor.increment_cycles();
        assert!(cursor.section_done(&arrangement));
        assert_eq!(cursor.key_cycles(), 3);
    }

    #[test]
    fn infinite_section_never_done() {
        let arrangement = Arrangement::new(Group::new(
            vec![Node::Section(Section {
                cycles: 0,
                ..Section::new(0)
            })],
            1,
        ));
        let mut cursor = ArrCursor::new(&arrangement);
        for _ in 0..50 {
            cursor.increment_cycles();
        }
        assert!(!cursor.section_done(&arrangement));
    }

    #[test]
    fn keep_cycles_resumes_count() {
        let kept = Node::Section(Section {
            keep_cycles: true,
            ..Section::new(0)
        });
        let arrangement = Arrangement::new(Group::new(vec![kept, section(1)], 3));
        let mut cursor = ArrCursor::new(&arrangement);
        cursor.increment_cycles();
        assert_eq!(cursor.key_cycles(), 2);
        assert!(cursor.play_move(&arrangement));
        assert_eq!(cursor.key_cycles(), 1);
        assert!(cursor.play_move(&arrangement));
        assert_eq!(cursor.section(&arrangement).map(|s| s.part), Some(0));
        assert_eq!(cursor.key_cycles(), 2);
        assert_eq!(cursor.played_cycles(), 0);
    }

    #[test]
    fn start_cycles_seed_key_cycles() {
        let arrangement = Arrangement::new(Group::new(
            vec![Node::Section(Section {
                start_cycles: 4,
                ..Section::new(0)
            })],
            1,
        ));
        let cursor = ArrCursor::new(&arrangement);
        assert_eq!(cursor.key_cycles(), 4);
    }

    #[test]
    fn reset_returns_to_first_section() {
        let arrangement = Arrangement::new(Group::new(vec![section(0), section(1)], 1));
        let mut cursor = ArrCursor::new(&arrangement);
        assert!(cursor.play_move(&arrangement));
        assert!(!cursor.play_move(&arrangement));
        cursor.reset(&arrangement);
        assert_eq!(cursor.path(), &[0]);
        assert_eq!(cursor.section(&arrangement).map(|s| s.part), Some(0));
    }
}
