//! Move-only ownership wrapper for GPU objects.
//!
//! Every device object in this crate (texture, shader module, pipeline) is
//! held through a [`GpuHandle`]. The handle binds the object to a
//! process-unique non-zero identity; identity `0` means "empty" and is always
//! a legal no-op release target. Handles cannot be copied or cloned, so at
//! most one live handle owns a given identity at any time. Ownership moves
//! with the handle, and [`GpuHandle::take`] transfers it explicitly, leaving
//! an empty handle behind.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Owner of a single GPU object with a unique identity.
///
/// Dropping the handle releases the object; releasing an empty handle is a
/// no-op. `T` is the native object (e.g. `wgpu::Texture`), dropped to free
/// device memory immediately rather than in a deferred batch.
#[derive(Debug)]
pub struct GpuHandle<T> {
    id: u64,
    raw: Option<T>,
}

impl<T> GpuHandle<T> {
    /// Wrap a freshly created GPU object, assigning it a new identity.
    pub fn new(raw: T) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            raw: Some(raw),
        }
    }

    /// An empty handle owning nothing. Identity is `0`.
    pub const fn empty() -> Self {
        Self { id: 0, raw: None }
    }

    /// The identity of the owned object, or `0` if empty.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.id == 0
    }

    /// Access the owned object.
    ///
    /// Using an empty handle is a caller contract violation.
    #[inline]
    pub fn get(&self) -> &T {
        match &self.raw {
            Some(raw) => raw,
            None => panic!("used an empty GpuHandle"),
        }
    }

    /// Release the owned object now. Safe to call any number of times.
    pub fn release(&mut self) {
        if self.id != 0 {
            self.raw = None;
            self.id = 0;
        }
    }

    /// Transfer ownership out, leaving this handle empty.
    pub fn take(&mut self) -> GpuHandle<T> {
        std::mem::replace(self, Self::empty())
    }
}

impl<T> Drop for GpuHandle<T> {
    fn drop(&mut self) {
        // Releasing an empty (moved-from) handle is a guaranteed no-op.
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    /// Test object whose clones share a strong count, so we can observe
    /// exactly when the handle drops it.
    fn tracked() -> (Rc<()>, GpuHandle<Rc<()>>) {
        let probe = Rc::new(());
        let handle = GpuHandle::new(Rc::clone(&probe));
        (probe, handle)
    }

    #[test]
    fn test_new_handle_has_nonzero_identity() {
        let (_probe, handle) = tracked();
        assert!(!handle.is_empty());
        assert_ne!(handle.id(), 0);
    }

    #[test]
    fn test_identities_are_unique() {
        let (_p1, a) = tracked();
        let (_p2, b) = tracked();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_release_drops_object() {
        let (probe, mut handle) = tracked();
        assert_eq!(Rc::strong_count(&probe), 2);
        handle.release();
        assert_eq!(Rc::strong_count(&probe), 1);
        assert!(handle.is_empty());
    }

    #[test]
    fn test_double_release_is_noop() {
        let (probe, mut handle) = tracked();
        handle.release();
        handle.release();
        assert_eq!(Rc::strong_count(&probe), 1);
    }

    #[test]
    fn test_drop_releases_once() {
        let (probe, handle) = tracked();
        drop(handle);
        assert_eq!(Rc::strong_count(&probe), 1);
    }

    #[test]
    fn test_take_transfers_ownership() {
        let (probe, mut handle) = tracked();
        let id = handle.id();

        let moved = handle.take();
        assert!(handle.is_empty());
        assert_eq!(moved.id(), id);
        assert_eq!(Rc::strong_count(&probe), 2);

        // Dropping the emptied source must not release the object.
        drop(handle);
        assert_eq!(Rc::strong_count(&probe), 2);

        drop(moved);
        assert_eq!(Rc::strong_count(&probe), 1);
    }

    #[test]
    fn test_take_twice_leaves_one_owner() {
        let (probe, mut handle) = tracked();
        let mut first = handle.take();
        let second = first.take();

        assert!(handle.is_empty());
        assert!(first.is_empty());
        assert!(!second.is_empty());

        drop(handle);
        drop(first);
        assert_eq!(Rc::strong_count(&probe), 2);
        drop(second);
        assert_eq!(Rc::strong_count(&probe), 1);
    }

    #[test]
    fn test_swap_exchanges_identities() {
        let (_p1, mut a) = tracked();
        let (_p2, mut b) = tracked();
        let (id_a, id_b) = (a.id(), b.id());

        std::mem::swap(&mut a, &mut b);

        assert_eq!(a.id(), id_b);
        assert_eq!(b.id(), id_a);
    }

    #[test]
    #[should_panic(expected = "empty GpuHandle")]
    fn test_get_on_empty_handle_panics() {
        let handle: GpuHandle<u32> = GpuHandle::empty();
        let _ = handle.get();
    }
}
