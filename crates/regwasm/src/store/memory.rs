use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;
use regwasm_types::{MemoryType, PAGE_SIZE};

use crate::{ResourceLimiter, Result, Trap, log};

/// A WebAssembly Memory Instance
///
/// See <https://webassembly.github.io/spec/core/exec/runtime.html#memory-instances>
#[derive(Debug)]
pub struct MemoryInstance {
    pub(crate) kind: MemoryType,
    pub(crate) data: Vec<u8>,
    pub(crate) page_count: usize,
}

impl MemoryInstance {
    pub(crate) fn new(kind: MemoryType) -> Self {
        log::debug!("initializing memory with {} pages", kind.page_count_initial);

        Self { kind, data: vec![0; kind.initial_size()], page_count: kind.page_count_initial as usize }
    }

    /// The declared type, with the current size as its minimum.
    pub fn ty(&self) -> MemoryType {
        MemoryType::new(self.page_count as u32, self.kind.page_count_max)
    }

    /// Current size in bytes
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the memory has no pages
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current size in pages
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// The whole memory as a byte slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The whole memory as a mutable byte slice
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline(never)]
    #[cold]
    fn trap_oob(&self, addr: usize, len: usize) -> Trap {
        Trap::MemoryOutOfBounds { offset: addr, len, max: self.data.len() }
    }

    /// The byte range `addr..addr + len`, if it lies within the memory.
    #[inline(always)]
    fn range(&self, addr: usize, len: usize) -> Result<Range<usize>, Trap> {
        match addr.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(addr..end),
            _ => Err(self.trap_oob(addr, len)),
        }
    }

    /// Write `data` at `addr`
    pub fn store(&mut self, addr: usize, data: &[u8]) -> Result<()> {
        let range = self.range(addr, data.len())?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    /// Read `len` bytes at `addr`
    pub fn load(&self, addr: usize, len: usize) -> Result<&[u8]> {
        Ok(&self.data[self.range(addr, len)?])
    }

    #[inline]
    pub(crate) fn load_as<const SIZE: usize, T: MemLoadable<SIZE>>(&self, addr: usize) -> Result<T, Trap> {
        let range = self.range(addr, SIZE)?;
        let mut bytes = [0; SIZE];
        bytes.copy_from_slice(&self.data[range]);
        Ok(T::from_le_bytes(bytes))
    }

    #[inline]
    pub(crate) fn store_as<const SIZE: usize, T: MemStorable<SIZE>>(&mut self, addr: usize, value: T) -> Result<(), Trap> {
        let range = self.range(addr, SIZE)?;
        self.data[range].copy_from_slice(&value.to_mem_bytes());
        Ok(())
    }

    pub(crate) fn fill(&mut self, addr: usize, len: usize, val: u8) -> Result<(), Trap> {
        let range = self.range(addr, len)?;
        self.data[range].fill(val);
        Ok(())
    }

    /// `memory.copy`; the ranges may overlap.
    pub(crate) fn copy_within(&mut self, dst: usize, src: usize, len: usize) -> Result<(), Trap> {
        let src = self.range(src, len)?;
        self.range(dst, len)?;
        self.data.copy_within(src, dst);
        Ok(())
    }

    /// Grow by `pages_delta` pages, returning the previous page count.
    ///
    /// Returns `None` if the new size exceeds the declared maximum or the limiter denies it.
    pub(crate) fn grow(&mut self, pages_delta: u32, limiter: Option<&dyn ResourceLimiter>) -> Option<u32> {
        let current_pages = self.page_count;
        let new_pages = current_pages + pages_delta as usize;

        if new_pages > self.kind.page_count_max() as usize {
            return None;
        }

        let new_size = new_pages * PAGE_SIZE;
        if let Some(limiter) = limiter {
            if !limiter.limit_memory_growth(new_size) {
                log::debug!("memory growth to {new_size} bytes denied by limiter");
                return None;
            }
        }

        // new pages are zeroed
        self.data.resize(new_size, 0);
        self.page_count = new_pages;
        Some(current_pages as u32)
    }
}

/// A trait for types that can be stored in memory
pub(crate) trait MemStorable<const N: usize> {
    /// Store a value in memory
    fn to_mem_bytes(self) -> [u8; N];
}

/// A trait for types that can be loaded from memory
pub(crate) trait MemLoadable<const N: usize>: Sized + Copy {
    /// Load a value from memory
    fn from_le_bytes(bytes: [u8; N]) -> Self;
}

macro_rules! impl_mem_traits {
    ($($type:ty, $size:expr),*) => {
        $(
            impl MemLoadable<$size> for $type {
                #[inline(always)]
                fn from_le_bytes(bytes: [u8; $size]) -> Self {
                    <$type>::from_le_bytes(bytes)
                }
            }

            impl MemStorable<$size> for $type {
                #[inline(always)]
                fn to_mem_bytes(self) -> [u8; $size] {
                    self.to_le_bytes()
                }
            }
        )*
    }
}

impl_mem_traits!(u8, 1, i8, 1, u16, 2, i16, 2, u32, 4, i32, 4, f32, 4, u64, 8, i64, 8, f64, 8);

#[cfg(test)]
mod memory_instance_tests {
    use super::*;

    fn create_test_memory() -> MemoryInstance {
        MemoryInstance::new(MemoryType::new(1, Some(2)))
    }

    struct DenyAll;
    impl ResourceLimiter for DenyAll {
        fn limit_memory_growth(&self, _desired: usize) -> bool {
            false
        }
    }

    #[test]
    fn test_memory_store_and_load() {
        let mut memory = create_test_memory();
        let data_to_store = [1, 2, 3, 4];
        assert!(memory.store(0, &data_to_store).is_ok());
        let loaded_data = memory.load(0, data_to_store.len()).unwrap();
        assert_eq!(loaded_data, &data_to_store);
    }

    #[test]
    fn test_memory_store_out_of_bounds() {
        let mut memory = create_test_memory();
        let data_to_store = [1, 2, 3, 4];
        assert!(memory.store(memory.len() - 2, &data_to_store).is_err());
        assert!(memory.store(usize::MAX, &data_to_store).is_err());
    }

    #[test]
    fn test_memory_load_as_little_endian() {
        let mut memory = create_test_memory();
        memory.store_as::<4, u32>(8, 0x0403_0201).unwrap();
        assert_eq!(memory.load(8, 4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(memory.load_as::<2, u16>(9).unwrap(), 0x0302);
        assert!(matches!(memory.load_as::<8, u64>(PAGE_SIZE - 4), Err(Trap::MemoryOutOfBounds { .. })));
    }

    #[test]
    fn test_memory_fill() {
        let mut memory = create_test_memory();
        assert!(memory.fill(0, 10, 42).is_ok());
        assert_eq!(&memory.data[0..10], &[42; 10]);
    }

    #[test]
    fn test_memory_fill_out_of_bounds() {
        let mut memory = create_test_memory();
        assert!(memory.fill(memory.len(), 10, 42).is_err());
    }

    #[test]
    fn test_memory_copy_within() {
        let mut memory = create_test_memory();
        memory.fill(0, 10, 1).unwrap();
        assert!(memory.copy_within(10, 0, 10).is_ok());
        assert_eq!(&memory.data[10..20], &[1; 10]);
    }

    #[test]
    fn test_memory_copy_within_out_of_bounds() {
        let mut memory = create_test_memory();
        assert!(memory.copy_within(memory.len(), 0, 10).is_err());
    }

    #[test]
    fn test_memory_grow() {
        let mut memory = create_test_memory();
        assert_eq!(memory.grow(1, None), Some(1));
        assert_eq!(memory.page_count(), 2);
        assert_eq!(memory.len(), 2 * PAGE_SIZE);
        assert!(memory.data[PAGE_SIZE..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_memory_grow_max_pages() {
        let mut memory = create_test_memory();
        assert_eq!(memory.grow(2, None), None);
        assert_eq!(memory.grow(1, None), Some(1));
        assert_eq!(memory.grow(1, None), None);
        assert_eq!(memory.grow(0, None), Some(2));
    }

    #[test]
    fn test_memory_grow_denied_by_limiter() {
        let mut memory = create_test_memory();
        assert_eq!(memory.grow(1, Some(&DenyAll)), None);
        assert_eq!(memory.page_count(), 1);
    }
}
