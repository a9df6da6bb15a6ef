//! Arena storage for loop-nest IR entities.
//!
//! Every node and value of a [`Function`](crate::Function) lives in a
//! per-function arena and is addressed by a typed [`Id`]. Structural links
//! (parent blocks, induction-variable owners, operand uses) are ids, never
//! references, so a function can be cloned, mutated and analysed without
//! fighting the borrow checker. Erasing a node only detaches it from its
//! block; its id stays valid.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Index of a `T` in its function's arena.
///
/// The marker keeps a `NodeId` from being passed where a `ValueId` is
/// expected; the trait impls below do not depend on `T`.
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// No node or value.
    pub const INVALID: Self = Id::new(u32::MAX);

    #[inline]
    pub const fn new(index: u32) -> Self {
        Id {
            index,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.index != u32::MAX
    }

    #[inline]
    fn slot(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Id<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "%{}", self.index)
        } else {
            f.write_str("%invalid")
        }
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Append-only storage; an item's id is its allocation order.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Self {
        Arena { items: Vec::new() }
    }

    pub(crate) fn alloc(&mut self, item: T) -> Id<T> {
        let id = Id::new(self.items.len() as u32);
        self.items.push(item);
        id
    }

    /// Items ever allocated, including detached ones.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: Id<T>) -> &T {
        &self.items[id.slot()]
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    #[inline]
    fn index_mut(&mut self, id: Id<T>) -> &mut T {
        &mut self.items[id.slot()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Loop {
        depth: u32,
    }

    #[test]
    fn test_alloc_order_and_index() {
        let mut arena: Arena<Loop> = Arena::new();
        let outer = arena.alloc(Loop { depth: 0 });
        let inner = arena.alloc(Loop { depth: 1 });

        assert_eq!(arena.len(), 2);
        assert_eq!(outer, Id::new(0));
        assert_eq!(arena[inner].depth, 1);

        arena[inner].depth = 7;
        assert_eq!(arena[inner].depth, 7);
    }

    #[test]
    fn test_invalid_id_formatting() {
        let id: Id<Loop> = Id::INVALID;
        assert!(!id.is_valid());
        assert!(Id::<Loop>::new(0).is_valid());
        assert_eq!(format!("{:?}", id), "%invalid");
        assert_eq!(format!("{}", Id::<Loop>::new(3)), "%3");
    }
}
