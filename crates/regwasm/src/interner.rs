use alloc::{collections::BTreeMap, vec::Vec};
use core::{fmt::Debug, marker::PhantomData};
use regwasm_types::FuncType;

/// A deduplicated id of a value stored in an [`Interner`].
pub struct Interned<T> {
    owner: u32,
    id: u32,
    _marker: PhantomData<fn() -> T>,
}

/// The interned id of a function signature.
///
/// Two ids from the same store are equal exactly when the signatures are equal.
pub type FuncTypeId = Interned<FuncType>;

impl<T> Interned<T> {
    /// The raw id.
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl<T> Clone for Interned<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Interned<T> {}

impl<T> PartialEq for Interned<T> {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.id == other.id
    }
}

impl<T> Eq for Interned<T> {}

impl<T> core::hash::Hash for Interned<T> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.id.hash(state);
    }
}

impl<T> Debug for Interned<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Interned({})", self.id)
    }
}

/// Maps structurally equal values to one dense id.
///
/// Ids are handed out in insertion order and are never reused.
pub struct Interner<T> {
    owner: u32,
    ids: BTreeMap<T, u32>,
    items: Vec<T>,
}

impl<T> Default for Interner<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T> Interner<T> {
    /// An empty interner whose ids carry `owner`, so ids of another interner are rejected.
    pub fn new(owner: u32) -> Self {
        Self { owner, ids: BTreeMap::new(), items: Vec::new() }
    }
}

impl<T: Debug> Debug for Interner<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl<T: Ord + Clone> Interner<T> {
    /// Intern `item`, returning the id of an equal item if there already is one.
    pub fn intern(&mut self, item: &T) -> Interned<T> {
        if let Some(id) = self.ids.get(item) {
            return Interned { owner: self.owner, id: *id, _marker: PhantomData };
        }

        let id = self.items.len() as u32;
        self.items.push(item.clone());
        self.ids.insert(item.clone(), id);
        Interned { owner: self.owner, id, _marker: PhantomData }
    }

    /// Look up the value behind an id, or `None` if the id was handed out by another interner.
    pub fn resolve(&self, id: Interned<T>) -> Option<&T> {
        if id.owner != self.owner {
            return None;
        }
        self.items.get(id.id as usize)
    }

    /// Number of distinct items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
