//! RAII marshalling scope over an arena
//!
//! Every buffer that crosses into the native module goes through an
//! [`ArenaScope`]: host slices are copied in, output blocks are allocated,
//! results are copied out, and when the scope is dropped every block it
//! allocated is unpinned. That holds on early returns and `?` too, so a
//! failed call never leaks pinned memory.

use std::ops::{Deref, DerefMut};

use smallvec::SmallVec;

use super::arena::{Arena, ArenaElement, Ptr, TypeTag};
use crate::error::{Error, Result};

/// Anything that owns an [`Arena`] a scope can marshal into
pub trait ArenaHost {
    /// The owned arena
    fn arena(&self) -> &Arena;

    /// The owned arena, mutably
    fn arena_mut(&mut self) -> &mut Arena;
}

impl ArenaHost for Arena {
    fn arena(&self) -> &Arena {
        self
    }

    fn arena_mut(&mut self) -> &mut Arena {
        self
    }
}

/// Scoped set of arena allocations, unpinned together on drop
///
/// The scope dereferences to its host, so exports on a module can be called
/// through it while the marshalled pointers are alive.
pub struct ArenaScope<'a, H: ArenaHost + ?Sized = Arena> {
    host: &'a mut H,
    owned: SmallVec<[Ptr; 8]>,
}

impl<'a, H: ArenaHost + ?Sized> ArenaScope<'a, H> {
    /// Open a scope; [`Arena::collect`] is refused until it is dropped
    pub fn new(host: &'a mut H) -> Self {
        host.arena_mut().open_scope();
        Self {
            host,
            owned: SmallVec::new(),
        }
    }

    fn alloc<T: ArenaElement>(&mut self, len: usize) -> Result<Ptr> {
        let bytes = len
            .checked_mul(T::TAG.size_in_bytes())
            .ok_or(Error::OutOfMemory { requested: usize::MAX })?;
        let ptr = self.host.arena_mut().allocate(bytes, T::TAG)?;
        self.owned.push(ptr);
        Ok(ptr)
    }

    fn write<T: ArenaElement>(&mut self, data: &[T]) -> Result<Ptr> {
        let ptr = self.alloc::<T>(data.len())?;
        self.host.arena_mut().view_mut::<T>(ptr)?.copy_from_slice(data);
        Ok(ptr)
    }

    /// Copy `data` into a new `f64` block
    pub fn write_f64(&mut self, data: &[f64]) -> Result<Ptr> {
        self.write(data)
    }

    /// Copy `data` into a new `i32` block
    pub fn write_i32(&mut self, data: &[i32]) -> Result<Ptr> {
        self.write(data)
    }

    /// Allocate a zeroed `f64` block of `len` elements
    pub fn alloc_f64(&mut self, len: usize) -> Result<Ptr> {
        self.alloc::<f64>(len)
    }

    /// Allocate a zeroed `i32` block of `len` elements
    pub fn alloc_i32(&mut self, len: usize) -> Result<Ptr> {
        self.alloc::<i32>(len)
    }

    /// Copy an `f64` block out to the host
    pub fn read_f64(&self, ptr: Ptr) -> Result<Vec<f64>> {
        Ok(self.host.arena().view::<f64>(ptr)?.to_vec())
    }

    /// Copy an `i32` block out to the host
    pub fn read_i32(&self, ptr: Ptr) -> Result<Vec<i32>> {
        Ok(self.host.arena().view::<i32>(ptr)?.to_vec())
    }

    /// Pointers allocated by this scope, in allocation order
    pub fn pointers(&self) -> &[Ptr] {
        &self.owned
    }

    /// Element type of a block owned by this scope
    pub fn tag_of(&self, ptr: Ptr) -> Result<TypeTag> {
        Ok(self.host.arena().describe(ptr)?.0)
    }
}

impl<H: ArenaHost + ?Sized> Deref for ArenaScope<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.host
    }
}

impl<H: ArenaHost + ?Sized> DerefMut for ArenaScope<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        self.host
    }
}

impl<H: ArenaHost + ?Sized> Drop for ArenaScope<'_, H> {
    fn drop(&mut self) {
        let arena = self.host.arena_mut();
        for &ptr in &self.owned {
            if let Err(e) = arena.unpin(ptr) {
                tracing::trace!(%ptr, error = %e, "scope pointer already released");
            }
        }
        arena.close_scope();
    }
}
