//! Collection aliases and small helpers used throughout the kernel.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// Hash map with a fast non-cryptographic hasher; all keys are internal.
pub type FastHashMap<K, V> = FxHashMap<K, V>;

/// Hash set with a fast non-cryptographic hasher.
pub type FastHashSet<T> = FxHashSet<T>;

/// Vec with inline storage for the first `N` elements.
///
/// Incidence lists (edges per node, tetrahedra per edge) and the scratch
/// buffers of the restoration loop are almost always small; inline storage
/// keeps them off the heap.
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

/// Removes the first occurrence of `value` from `buf`, if present.
pub fn remove_first<A>(buf: &mut SmallVec<A>, value: &A::Item)
where
    A: smallvec::Array,
    A::Item: PartialEq,
{
    if let Some(position) = buf.iter().position(|item| item == value) {
        buf.remove(position);
    }
}

/// Pushes `value` unless the buffer already contains it.
pub fn push_unique<A>(buf: &mut SmallVec<A>, value: A::Item)
where
    A: smallvec::Array,
    A::Item: PartialEq,
{
    if !buf.iter().any(|item| *item == value) {
        buf.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_first_only_removes_one() {
        let mut buf: SmallBuffer<i32, 4> = SmallBuffer::from_slice(&[1, 2, 1, 3]);
        remove_first(&mut buf, &1);
        assert_eq!(buf.as_slice(), &[2, 1, 3]);
        remove_first(&mut buf, &9);
        assert_eq!(buf.as_slice(), &[2, 1, 3]);
    }

    #[test]
    fn push_unique_deduplicates() {
        let mut buf: SmallBuffer<i32, 4> = SmallBuffer::new();
        push_unique(&mut buf, 5);
        push_unique(&mut buf, 5);
        push_unique(&mut buf, 6);
        assert_eq!(buf.as_slice(), &[5, 6]);
    }
}
