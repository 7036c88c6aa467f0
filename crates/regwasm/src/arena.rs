use alloc::{boxed::Box, vec::Vec};
use core::{
    fmt::Debug,
    hash::{Hash, Hasher},
    marker::PhantomData,
};

/// Number of entities per arena page.
const PAGE_SIZE: usize = 256;

/// A typed reference to an entity owned by a [`Store`](crate::Store).
///
/// Handles are indices tagged with the store that created them. They do not keep the entity
/// alive and stay valid for the lifetime of that store; any other store rejects them.
pub struct Handle<T> {
    owner: u32,
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Owner tags are truncated to this many bits so a function reference fits a register slot.
    pub(crate) const OWNER_BITS: u32 = 30;

    pub(crate) const fn new(owner: u32, index: u32) -> Self {
        Self { owner, index, _marker: PhantomData }
    }

    /// The position of the entity in its arena.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn owner(&self) -> u32 {
        self.owner
    }
}

/// The owner tag of handles created by the store with the given id.
pub(crate) fn owner_tag(store_id: usize) -> u32 {
    store_id as u32 & ((1 << Handle::<()>::OWNER_BITS) - 1)
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (self.owner, self.index).cmp(&(other.owner, other.index))
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.index.hash(state);
    }
}

impl<T> Debug for Handle<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// A bump allocator for one kind of entity.
///
/// Entities are stored in fixed-size pages. A full page is never reallocated, a new one is
/// started instead, so an entity never moves once it has been allocated. There is no way to
/// free a single entity; everything is dropped together with the arena.
pub(crate) struct Arena<T> {
    owner: u32,
    pages: Vec<Vec<T>>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T> Debug for Arena<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena").field("len", &self.len).field("pages", &self.pages.len()).finish()
    }
}

impl<T> Arena<T> {
    /// An empty arena whose handles carry `owner`.
    pub(crate) fn new(owner: u32) -> Self {
        Self { owner, pages: Vec::new(), len: 0 }
    }

    /// Move `value` into the arena.
    pub(crate) fn alloc(&mut self, value: T) -> Handle<T> {
        let needs_page = self.pages.last().is_none_or(|page| page.len() == PAGE_SIZE);
        if needs_page {
            self.pages.push(Vec::with_capacity(PAGE_SIZE));
        }

        let index = self.len;
        if let Some(page) = self.pages.last_mut() {
            page.push(value);
        }
        self.len += 1;
        Handle::new(self.owner, index as u32)
    }

    /// Build an index list: the `imported` handles followed by `count` freshly allocated
    /// entities produced by `fill`.
    ///
    /// `fill` receives the position of the new entity among the new ones. If it fails,
    /// entities allocated so far stay in the arena.
    pub(crate) fn alloc_list<E>(
        &mut self,
        imported: &[Handle<T>],
        count: usize,
        mut fill: impl FnMut(usize) -> Result<T, E>,
    ) -> Result<Box<[Handle<T>]>, E> {
        let mut list = Vec::with_capacity(imported.len() + count);
        list.extend_from_slice(imported);
        for i in 0..count {
            let value = fill(i)?;
            list.push(self.alloc(value));
        }
        Ok(list.into_boxed_slice())
    }

    /// Look up an entity, rejecting handles of other arenas.
    pub(crate) fn get(&self, handle: Handle<T>) -> Option<&T> {
        if handle.owner != self.owner {
            return None;
        }
        let index = handle.index as usize;
        self.pages.get(index / PAGE_SIZE)?.get(index % PAGE_SIZE)
    }

    pub(crate) fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        if handle.owner != self.owner {
            return None;
        }
        let index = handle.index as usize;
        self.pages.get_mut(index / PAGE_SIZE)?.get_mut(index % PAGE_SIZE)
    }
}

impl<T> core::ops::Index<Handle<T>> for Arena<T> {
    type Output = T;

    #[inline(always)]
    fn index(&self, handle: Handle<T>) -> &T {
        let index = handle.index as usize;
        &self.pages[index / PAGE_SIZE][index % PAGE_SIZE]
    }
}

impl<T> core::ops::IndexMut<Handle<T>> for Arena<T> {
    #[inline(always)]
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        let index = handle.index as usize;
        &mut self.pages[index / PAGE_SIZE][index % PAGE_SIZE]
    }
}
