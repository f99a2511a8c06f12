//! Pairing heap ordered by a comparator closure

use std::cmp::Ordering;

struct Node<T> {
    elem: T,
    children: Vec<Node<T>>,
}

/// Min-heap with O(1) push and amortized O(log n) pop
pub struct PairingHeap<T, C> {
    root: Option<Node<T>>,
    cmp: C,
    len: usize,
}

impl<T, C> PairingHeap<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    pub fn new(cmp: C) -> Self {
        Self { root: None, cmp, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn clear(&mut self) {
        dismantle(self.root.take());
        self.len = 0;
    }

    pub fn peek_min(&self) -> Option<&T> {
        self.root.as_ref().map(|node| &node.elem)
    }

    pub fn push(&mut self, elem: T) {
        let node = Node { elem, children: Vec::new() };
        let root = match self.root.take() {
            Some(root) => self.meld(root, node),
            None => node,
        };
        self.root = Some(root);
        self.len += 1;
    }

    pub fn pop_min(&mut self) -> Option<T> {
        let Node { elem, children } = self.root.take()?;
        self.root = self.merge_pairs(children);
        self.len -= 1;
        Some(elem)
    }

    fn meld(&self, mut a: Node<T>, mut b: Node<T>) -> Node<T> {
        if (self.cmp)(&a.elem, &b.elem) != Ordering::Greater {
            a.children.push(b);
            a
        } else {
            b.children.push(a);
            b
        }
    }

    /// Meld children pairwise left to right, then fold the pairs right to left
    fn merge_pairs(&self, children: Vec<Node<T>>) -> Option<Node<T>> {
        let mut paired = Vec::with_capacity(children.len() / 2 + 1);
        let mut iter = children.into_iter();
        while let Some(first) = iter.next() {
            match iter.next() {
                Some(second) => paired.push(self.meld(first, second)),
                None => paired.push(first),
            }
        }
        let mut merged = paired.pop()?;
        while let Some(next) = paired.pop() {
            merged = self.meld(next, merged);
        }
        Some(merged)
    }
}

/// Drop a tree without recursion; a heap filled in descending order is one long chain
fn dismantle<T>(root: Option<Node<T>>) {
    let mut stack: Vec<Node<T>> = root.into_iter().collect();
    while let Some(mut node) = stack.pop() {
        stack.append(&mut node.children);
    }
}

impl<T, C> Drop for PairingHeap<T, C> {
    fn drop(&mut self) {
        dismantle(self.root.take());
    }
}

impl<T, C> Extend<T> for PairingHeap<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for elem in iter {
            self.push(elem);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_pops_in_order() {
        let mut heap = PairingHeap::new(|a: &i32, b: &i32| a.cmp(b));
        heap.extend([5, 1, 4, 1, 3, 9, 2]);
        assert_eq!(heap.len(), 7);
        assert_eq!(heap.peek_min(), Some(&1));

        let mut popped = Vec::new();
        while let Some(v) = heap.pop_min() {
            popped.push(v);
        }
        assert_eq!(popped, vec![1, 1, 2, 3, 4, 5, 9]);
        assert!(heap.is_empty());
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn test_custom_order() {
        let mut heap = PairingHeap::new(|a: &&str, b: &&str| b.len().cmp(&a.len()));
        heap.extend(["a", "ccc", "bb"]);
        assert_eq!(heap.pop_min(), Some("ccc"));
        heap.push("dddd");
        assert_eq!(heap.pop_min(), Some("dddd"));
        heap.clear();
        assert_eq!(heap.pop_min(), None);
    }

    #[test]
    fn test_random_interleaving() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut heap = PairingHeap::new(|a: &u32, b: &u32| a.cmp(b));
        let mut reference = Vec::new();
        for _ in 0..2000 {
            if rng.gen_bool(0.6) || reference.is_empty() {
                let v = rng.gen_range(0..500);
                heap.push(v);
                reference.push(v);
                reference.sort_unstable_by(|a, b| b.cmp(a));
            } else {
                assert_eq!(heap.pop_min(), reference.pop());
            }
        }
        assert_eq!(heap.len(), reference.len());
    }

    #[test]
    fn test_deep_chain_clears_and_drops() {
        let mut heap = PairingHeap::new(|a: &u32, b: &u32| a.cmp(b));
        heap.extend((0..1_000_000).rev());
        assert_eq!(heap.peek_min(), Some(&0));
        heap.clear();
        assert!(heap.is_empty());

        heap.extend((0..1_000_000).rev());
        assert_eq!(heap.len(), 1_000_000);
        drop(heap);
    }
}
