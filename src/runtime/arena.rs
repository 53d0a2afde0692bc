//! Linear memory arena for the native kernel module
//!
//! The arena is one growable, page-granular byte buffer. Blocks are addressed
//! by [`Ptr`], a plain byte offset, so pointers can cross the module boundary
//! as integers. Ownership is tracked with pin counts:
//!
//! - [`Arena::allocate`] returns a block pinned once, owned by the caller
//! - [`Arena::pin`] / [`Arena::unpin`] adjust the count
//! - [`Arena::collect`] reclaims every block whose count reached zero
//!
//! Collection is explicit and never moves live blocks: it sweeps unpinned
//! blocks into the free list, coalesces neighbouring spans and trims free
//! space off the end of the used region. It is refused while an
//! [`ArenaScope`](super::ArenaScope) is open, because the scope's pointers
//! are about to be handed to an export.

use std::collections::BTreeMap;

use bytemuck::Pod;

use crate::error::{Error, Result};

/// Size of one arena page in bytes
pub const PAGE_SIZE: usize = 65536;

/// Alignment of every block, in bytes
pub const ALIGN: usize = 8;

/// Round `n` up to the next multiple of [`ALIGN`]
#[inline]
const fn align_up(n: usize) -> usize {
    (n + ALIGN - 1) & !(ALIGN - 1)
}

/// Byte offset of a block inside an [`Arena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ptr(usize);

impl Ptr {
    /// Wrap a raw byte offset, as received over the native ABI
    #[inline]
    pub const fn from_offset(offset: usize) -> Self {
        Self(offset)
    }

    /// The raw byte offset
    #[inline]
    pub const fn offset(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for Ptr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Element type stored in a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// 64-bit float
    F64,
    /// 32-bit signed integer
    I32,
}

impl TypeTag {
    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            TypeTag::F64 => 8,
            TypeTag::I32 => 4,
        }
    }
}

/// Element types that can be viewed inside the arena
pub trait ArenaElement: Pod {
    /// Tag a block must carry to be viewed as `Self`
    const TAG: TypeTag;
}

impl ArenaElement for f64 {
    const TAG: TypeTag = TypeTag::F64;
}

impl ArenaElement for i32 {
    const TAG: TypeTag = TypeTag::I32;
}

/// Arena sizing, in pages of [`PAGE_SIZE`] bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Pages reserved up front
    pub initial_pages: usize,
    /// Hard limit the arena may grow to
    pub max_pages: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            initial_pages: 16,
            max_pages: 16 * 1024,
        }
    }
}

impl ArenaConfig {
    /// Check `1 <= max_pages` and `initial_pages <= max_pages`
    pub fn validate(&self) -> Result<()> {
        if self.max_pages == 0 {
            return Err(Error::invalid_argument("max_pages", "arena needs at least one page"));
        }
        if self.initial_pages > self.max_pages {
            return Err(Error::invalid_argument(
                "initial_pages",
                format!(
                    "{} initial pages exceed the limit of {}",
                    self.initial_pages, self.max_pages
                ),
            ));
        }
        Ok(())
    }
}

/// Snapshot of arena usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Blocks not yet reclaimed (pinned or awaiting collection)
    pub live_blocks: usize,
    /// Bytes held by blocks with a non-zero pin count
    pub pinned_bytes: usize,
    /// Bytes the next collection would reclaim
    pub reclaimable_bytes: usize,
    /// Capacity not covered by any block
    pub free_bytes: usize,
    /// Current capacity in bytes
    pub capacity_bytes: usize,
    /// Number of completed collections
    pub collections: usize,
}

/// Result of one [`Arena::collect`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Blocks reclaimed
    pub reclaimed_blocks: usize,
    /// Bytes returned to the free list
    pub reclaimed_bytes: usize,
}

#[derive(Debug, Clone)]
struct Block {
    /// Requested length in bytes
    len: usize,
    /// Reserved length in bytes (`len` rounded up to [`ALIGN`], at least one unit)
    span: usize,
    tag: TypeTag,
    pins: usize,
}

/// Page-granular arena with pin-counted blocks
#[derive(Debug)]
pub struct Arena {
    memory: Vec<u64>,
    blocks: BTreeMap<usize, Block>,
    /// Free spans below `top`, keyed by offset, never adjacent to each other
    free: BTreeMap<usize, usize>,
    /// End of the used region; everything above is free
    top: usize,
    config: ArenaConfig,
    open_scopes: usize,
    collections: usize,
}

impl Arena {
    /// Reserve `config.initial_pages` pages
    pub fn new(config: ArenaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            memory: vec![0u64; config.initial_pages * PAGE_SIZE / 8],
            blocks: BTreeMap::new(),
            free: BTreeMap::new(),
            top: 0,
            config,
            open_scopes: 0,
            collections: 0,
        })
    }

    /// Current capacity in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.memory.len() * 8
    }

    /// Configuration the arena was built with
    #[inline]
    pub fn config(&self) -> ArenaConfig {
        self.config
    }

    /// Allocate `byte_length` bytes tagged `tag`, pinned once
    ///
    /// First fit from the free list, then bump allocation, then page-wise
    /// growth up to `max_pages`. New blocks are zero-filled.
    pub fn allocate(&mut self, byte_length: usize, tag: TypeTag) -> Result<Ptr> {
        if byte_length > self.config.max_pages.saturating_mul(PAGE_SIZE) {
            return Err(Error::OutOfMemory { requested: byte_length });
        }
        let span = align_up(byte_length.max(1));

        let reused = self
            .free
            .iter()
            .find(|&(_, &len)| len >= span)
            .map(|(&offset, &len)| (offset, len));
        let offset = match reused {
            Some((offset, len)) => {
                self.free.remove(&offset);
                if len > span {
                    self.free.insert(offset + span, len - span);
                }
                offset
            }
            None => {
                let offset = self.top;
                let end = offset
                    .checked_add(span)
                    .ok_or(Error::OutOfMemory { requested: byte_length })?;
                self.grow_to(end, byte_length)?;
                self.top = end;
                offset
            }
        };

        self.bytes_mut(offset, span).fill(0);
        self.blocks.insert(
            offset,
            Block {
                len: byte_length,
                span,
                tag,
                pins: 1,
            },
        );
        tracing::trace!(offset, byte_length, ?tag, "arena block allocated");
        Ok(Ptr(offset))
    }

    fn grow_to(&mut self, end: usize, requested: usize) -> Result<()> {
        if end <= self.capacity() {
            return Ok(());
        }
        let pages = end.div_ceil(PAGE_SIZE);
        if pages > self.config.max_pages {
            return Err(Error::OutOfMemory { requested });
        }
        tracing::debug!(pages, "growing native arena");
        self.memory.resize(pages * PAGE_SIZE / 8, 0);
        Ok(())
    }

    fn live_block(&self, ptr: Ptr) -> Result<&Block> {
        self.blocks
            .get(&ptr.0)
            .filter(|b| b.pins > 0)
            .ok_or(Error::InvalidPointer { ptr: ptr.0 })
    }

    /// Increment the pin count of a live block
    pub fn pin(&mut self, ptr: Ptr) -> Result<Ptr> {
        match self.blocks.get_mut(&ptr.0) {
            Some(block) if block.pins > 0 => {
                block.pins += 1;
                Ok(ptr)
            }
            _ => Err(Error::InvalidPointer { ptr: ptr.0 }),
        }
    }

    /// Decrement the pin count; at zero the block awaits the next collection
    pub fn unpin(&mut self, ptr: Ptr) -> Result<()> {
        match self.blocks.get_mut(&ptr.0) {
            Some(block) if block.pins > 0 => {
                block.pins -= 1;
                Ok(())
            }
            _ => Err(Error::InvalidPointer { ptr: ptr.0 }),
        }
    }

    /// Pin count of `ptr`, zero for released or unknown pointers
    pub fn pin_count(&self, ptr: Ptr) -> usize {
        self.blocks.get(&ptr.0).map_or(0, |b| b.pins)
    }

    /// Element type and byte length of a live block
    pub fn describe(&self, ptr: Ptr) -> Result<(TypeTag, usize)> {
        let block = self.live_block(ptr)?;
        Ok((block.tag, block.len))
    }

    /// Reserved bytes of blocks whose pin count reached zero
    pub fn reclaimable_bytes(&self) -> usize {
        self.blocks
            .values()
            .filter(|b| b.pins == 0)
            .map(|b| b.span)
            .sum()
    }

    /// Reclaim every block with a zero pin count
    pub fn collect(&mut self) -> Result<CollectStats> {
        if self.open_scopes > 0 {
            return Err(Error::ArenaBusy);
        }
        let dead: Vec<usize> = self
            .blocks
            .iter()
            .filter(|(_, b)| b.pins == 0)
            .map(|(&offset, _)| offset)
            .collect();

        let mut stats = CollectStats::default();
        for offset in dead {
            if let Some(block) = self.blocks.remove(&offset) {
                stats.reclaimed_blocks += 1;
                stats.reclaimed_bytes += block.span;
                self.release_span(offset, block.span);
            }
        }

        // Trim the tail
        while let Some((&offset, &len)) = self.free.last_key_value() {
            if offset + len != self.top {
                break;
            }
            self.free.remove(&offset);
            self.top = offset;
        }
        self.collections += 1;
        tracing::debug!(
            reclaimed_blocks = stats.reclaimed_blocks,
            reclaimed_bytes = stats.reclaimed_bytes,
            "arena collected"
        );
        Ok(stats)
    }

    /// Insert a span into the free list, merging with its neighbours
    fn release_span(&mut self, mut offset: usize, mut len: usize) {
        if let Some((&prev, &prev_len)) = self.free.range(..offset).next_back() {
            if prev + prev_len == offset {
                self.free.remove(&prev);
                offset = prev;
                len += prev_len;
            }
        }
        if let Some(&next_len) = self.free.get(&(offset + len)) {
            self.free.remove(&(offset + len));
            len += next_len;
        }
        self.free.insert(offset, len);
    }

    /// Usage snapshot
    pub fn stats(&self) -> ArenaStats {
        let used: usize = self.blocks.values().map(|b| b.span).sum();
        ArenaStats {
            live_blocks: self.blocks.len(),
            pinned_bytes: self
                .blocks
                .values()
                .filter(|b| b.pins > 0)
                .map(|b| b.len)
                .sum(),
            reclaimable_bytes: self.reclaimable_bytes(),
            free_bytes: self.capacity() - used,
            capacity_bytes: self.capacity(),
            collections: self.collections,
        }
    }

    pub(crate) fn open_scope(&mut self) {
        self.open_scopes += 1;
    }

    pub(crate) fn close_scope(&mut self) {
        self.open_scopes = self.open_scopes.saturating_sub(1);
    }

    /// Number of scopes currently open
    pub fn open_scopes(&self) -> usize {
        self.open_scopes
    }

    // ========================================================================
    // Typed views
    // ========================================================================

    #[inline]
    fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.memory)[offset..offset + len]
    }

    #[inline]
    fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.memory)[offset..offset + len]
    }

    fn typed_block<T: ArenaElement>(&self, ptr: Ptr) -> Result<usize> {
        let block = self.live_block(ptr)?;
        if block.tag != T::TAG {
            return Err(Error::invalid_argument(
                "ptr",
                format!("block at {ptr} holds {:?}, not {:?}", block.tag, T::TAG),
            ));
        }
        Ok(block.len - block.len % T::TAG.size_in_bytes())
    }

    /// Borrow a live block as a slice of `T`
    pub fn view<T: ArenaElement>(&self, ptr: Ptr) -> Result<&[T]> {
        let len = self.typed_block::<T>(ptr)?;
        bytemuck::try_cast_slice(self.bytes(ptr.0, len))
            .map_err(|e| Error::Internal(format!("arena view at {ptr}: {e:?}")))
    }

    /// Mutably borrow a live block as a slice of `T`
    pub fn view_mut<T: ArenaElement>(&mut self, ptr: Ptr) -> Result<&mut [T]> {
        let len = self.typed_block::<T>(ptr)?;
        bytemuck::try_cast_slice_mut(self.bytes_mut(ptr.0, len))
            .map_err(|e| Error::Internal(format!("arena view at {ptr}: {e:?}")))
    }
}
