// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::InternalValue;
use interval_heap::IntervalHeap;

/// A fallible key/value iterator, boxed for trait-object use
pub type BoxedIterator<'a> = Box<dyn DoubleEndedIterator<Item = crate::Result<InternalValue>> + 'a>;

/// One source cursor's current head, keyed for the heap.
///
/// `source` points back at the iterator the item came from, so that
/// exactly that iterator is advanced after the item is yielded.
struct Head {
    item: InternalValue,
    source: usize,
}

impl Eq for Head {}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.item.key == other.item.key
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.item.key.cmp(&other.item.key)
    }
}

/// Merges multiple KV iterators into one globally sorted stream
///
/// Items come out in ascending internal-key order: ascending user key,
/// ties broken by descending sequence number, so the newest record of a
/// user key is emitted first.
///
/// A double-ended heap holds one head item per non-exhausted source; each
/// direction pulls its initial heads lazily on first use, so building a
/// merger does no reads.
pub struct Merger<'a> {
    sources: Vec<BoxedIterator<'a>>,
    heap: IntervalHeap<Head>,

    primed_front: bool,
    primed_back: bool,
}

impl<'a> Merger<'a> {
    /// Creates a merger over the given sources.
    #[must_use]
    pub fn new(sources: Vec<BoxedIterator<'a>>) -> Self {
        let heap = IntervalHeap::with_capacity(sources.len());

        Self {
            sources,
            heap,
            primed_front: false,
            primed_back: false,
        }
    }

    /// Pulls one head per source from the given end into the heap.
    fn prime(&mut self, from_back: bool) -> crate::Result<()> {
        for (source, iter) in self.sources.iter_mut().enumerate() {
            let head = if from_back {
                iter.next_back()
            } else {
                iter.next()
            };

            if let Some(item) = head.transpose()? {
                self.heap.push(Head { item, source });
            }
        }

        Ok(())
    }

    /// Advances the source a head came from and re-feeds the heap.
    fn refill(&mut self, source: usize, from_back: bool) -> crate::Result<()> {
        let Some(iter) = self.sources.get_mut(source) else {
            return Ok(());
        };

        let next = if from_back {
            iter.next_back()
        } else {
            iter.next()
        };

        if let Some(item) = next.transpose()? {
            self.heap.push(Head { item, source });
        }

        Ok(())
    }
}

impl<'a> Iterator for Merger<'a> {
    type Item = crate::Result<InternalValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.primed_front {
            self.primed_front = true;

            if let Err(e) = self.prime(false) {
                return Some(Err(e));
            }
        }

        let head = self.heap.pop_min()?;

        if let Err(e) = self.refill(head.source, false) {
            return Some(Err(e));
        }

        Some(Ok(head.item))
    }
}

impl<'a> DoubleEndedIterator for Merger<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if !self.primed_back {
            self.primed_back = true;

            if let Err(e) = self.prime(true) {
                return Some(Err(e));
            }
        }

        let head = self.heap.pop_max()?;

        if let Err(e) = self.refill(head.source, true) {
            return Some(Err(e));
        }

        Some(Ok(head.item))
    }
}
