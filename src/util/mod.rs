//! Small shared utilities: fresh name generation and a de-duplicating worklist.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

/// Generates names that are guaranteed not to clash with a set of existing
/// names, nor with each other.
///
/// Used by the specialization pass to name monomorphized function copies and
/// by the constraint solvers to name fresh variables.
#[derive(Debug, Default)]
pub struct FreshNameGenerator {
    /// Next suffix to try for each base name. A base name that was never
    /// requested or reserved is handed out unchanged.
    counters: HashMap<String, usize>,
    taken: HashSet<String>,
}

impl FreshNameGenerator {
    /// Creates a generator with no reserved names.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator that will never produce any of `reserved`.
    pub fn with_reserved<I: IntoIterator<Item = String>>(reserved: I) -> Self {
        Self {
            counters: HashMap::new(),
            taken: reserved.into_iter().collect(),
        }
    }

    /// Returns a name based on `base` that has not been handed out before.
    pub fn fresh(&mut self, base: &str) -> String {
        if !self.taken.contains(base) && !self.counters.contains_key(base) {
            self.taken.insert(base.to_string());
            self.counters.insert(base.to_string(), 1);
            return base.to_string();
        }

        let counter = self.counters.entry(base.to_string()).or_insert(1);
        loop {
            let candidate = format!("{base}_{counter}");
            *counter += 1;
            if !self.taken.contains(&candidate) {
                self.taken.insert(candidate.clone());
                return candidate;
            }
        }
    }
}

/// A FIFO queue that silently drops elements already enqueued.
///
/// Worklist solvers use this to keep iteration counts proportional to the
/// number of distinct dirty nodes rather than the number of enqueue calls.
#[derive(Debug)]
pub struct UniqueQueue<T: Eq + Hash + Clone> {
    queue: VecDeque<T>,
    members: HashSet<T>,
}

impl<T: Eq + Hash + Clone> Default for UniqueQueue<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            members: HashSet::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> UniqueQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `element` unless it is already waiting.
    pub fn push(&mut self, element: T) {
        if self.members.insert(element.clone()) {
            self.queue.push_back(element);
        }
    }

    /// Removes and returns the oldest element, if any.
    pub fn pop(&mut self) -> Option<T> {
        let element = self.queue.pop_front()?;
        self.members.remove(&element);
        Some(element)
    }

    /// Returns `true` if no elements are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of elements waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_names_never_repeat() {
        let mut generator = FreshNameGenerator::new();
        let a = generator.fresh("f");
        let b = generator.fresh("f");
        let c = generator.fresh("f");
        assert_eq!(a, "f");
        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn fresh_names_avoid_reserved() {
        let mut generator = FreshNameGenerator::with_reserved(["main".to_string()]);
        assert_ne!(generator.fresh("main"), "main");
    }

    #[test]
    fn unique_queue_deduplicates() {
        let mut queue = UniqueQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(1));
        queue.push(1);
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(1));
        assert!(queue.is_empty());
    }
}
