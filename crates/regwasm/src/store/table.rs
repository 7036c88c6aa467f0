use alloc::{vec, vec::Vec};
use core::ops::Range;
use regwasm_types::{TableType, ValType};

use crate::interpreter::UntypedValue;
use crate::{Error, ResourceLimiter, Result, Trap, WasmValue, log};

/// A WebAssembly Table Instance
///
/// See <https://webassembly.github.io/spec/core/exec/runtime.html#table-instances>
#[derive(Debug)]
pub struct TableInstance {
    pub(crate) kind: TableType,
    pub(crate) elements: Vec<UntypedValue>,
}

impl TableInstance {
    pub(crate) fn new(kind: TableType, init: UntypedValue) -> Self {
        log::debug!("initializing table with {} elements", kind.size_initial);
        Self { elements: vec![init; kind.size_initial as usize], kind }
    }

    /// The declared type, with the current size as its minimum.
    pub fn ty(&self) -> TableType {
        TableType::new(self.kind.element_type, self.elements.len() as u32, self.kind.size_max)
    }

    /// Current number of elements
    pub fn size(&self) -> u32 {
        self.elements.len() as u32
    }

    #[inline(never)]
    #[cold]
    fn trap_oob(&self, addr: usize, len: usize) -> Trap {
        Trap::TableOutOfBounds { offset: addr, len, max: self.elements.len() }
    }

    /// Read the element at `index`
    pub fn get(&self, index: u32) -> Result<WasmValue> {
        Ok(self.get_raw(index)?.attach_type(self.kind.element_type))
    }

    /// Replace the element at `index`
    ///
    /// The value must be a reference of the table's element type.
    pub fn set(&mut self, index: u32, value: WasmValue) -> Result<()> {
        if value.val_type() != self.kind.element_type {
            return Err(Error::Other("table element type mismatch".into()));
        }
        Ok(self.set_raw(index, value.into())?)
    }

    #[inline]
    pub(crate) fn get_raw(&self, index: u32) -> Result<UntypedValue, Trap> {
        self.elements.get(index as usize).copied().ok_or_else(|| self.trap_oob(index as usize, 1))
    }

    #[inline]
    pub(crate) fn set_raw(&mut self, index: u32, value: UntypedValue) -> Result<(), Trap> {
        if index as usize >= self.elements.len() {
            return Err(self.trap_oob(index as usize, 1));
        }

        self.elements[index as usize] = value;
        Ok(())
    }

    /// The element range `addr..addr + len`, if it lies within the table.
    #[inline]
    fn range(&self, addr: usize, len: usize) -> Result<Range<usize>, Trap> {
        match addr.checked_add(len) {
            Some(end) if end <= self.elements.len() => Ok(addr..end),
            _ => Err(self.trap_oob(addr, len)),
        }
    }

    pub(crate) fn load(&self, addr: usize, len: usize) -> Result<&[UntypedValue], Trap> {
        Ok(&self.elements[self.range(addr, len)?])
    }

    pub(crate) fn copy_from_slice(&mut self, dst: usize, src: &[UntypedValue]) -> Result<(), Trap> {
        let range = self.range(dst, src.len())?;
        self.elements[range].copy_from_slice(src);
        Ok(())
    }

    pub(crate) fn copy_within(&mut self, dst: usize, src: usize, len: usize) -> Result<(), Trap> {
        let src = self.range(src, len)?;
        self.range(dst, len)?;
        self.elements.copy_within(src, dst);
        Ok(())
    }

    pub(crate) fn fill(&mut self, addr: usize, len: usize, value: UntypedValue) -> Result<(), Trap> {
        let range = self.range(addr, len)?;
        self.elements[range].fill(value);
        Ok(())
    }

    /// Grow by `delta` elements initialized to `init`, returning the previous size.
    ///
    /// Returns `None` if the new size exceeds the declared maximum or `limit`, or if the
    /// limiter denies it.
    pub(crate) fn grow(
        &mut self,
        delta: u32,
        init: UntypedValue,
        limit: u32,
        limiter: Option<&dyn ResourceLimiter>,
    ) -> Option<u32> {
        let current = self.elements.len();
        let new_len = current.checked_add(delta as usize)?;
        let max = self.kind.size_max.map_or(limit, |max| max.min(limit)) as usize;

        if new_len > max {
            return None;
        }

        if let Some(limiter) = limiter {
            if !limiter.limit_table_growth(new_len) {
                log::debug!("table growth to {new_len} elements denied by limiter");
                return None;
            }
        }

        self.elements.resize(new_len, init);
        Some(current as u32)
    }

    /// Whether the table holds function references.
    pub(crate) fn is_func_table(&self) -> bool {
        self.kind.element_type == ValType::RefFunc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Function, Handle};

    fn dummy_table_type() -> TableType {
        TableType::new(ValType::RefFunc, 10, Some(20))
    }

    fn func_ref(index: u32) -> UntypedValue {
        UntypedValue::func_ref(Some(Function::Wasm(Handle::new(0, index))))
    }

    #[test]
    fn test_table_instance_creation() {
        let table = TableInstance::new(dummy_table_type(), UntypedValue::NULL);
        assert_eq!(table.size(), 10);
        assert!(table.elements.iter().all(|e| e.is_null()));
        assert_eq!(table.ty(), dummy_table_type());
    }

    #[test]
    fn test_get_wasm_val() {
        let mut table = TableInstance::new(dummy_table_type(), UntypedValue::NULL);
        table.set_raw(0, func_ref(3)).unwrap();

        assert_eq!(table.get(0).unwrap(), WasmValue::RefFunc(Function::Wasm(Handle::new(0, 3))));
        assert_eq!(table.get(1).unwrap(), WasmValue::RefNull(ValType::RefFunc));
        assert!(matches!(table.get(999), Err(Error::Trap(Trap::TableOutOfBounds { .. }))));
    }

    #[test]
    fn test_set_rejects_wrong_type() {
        let mut table = TableInstance::new(dummy_table_type(), UntypedValue::NULL);
        assert!(table.set(0, WasmValue::RefExtern(1)).is_err());
        assert!(table.set(0, WasmValue::RefNull(ValType::RefFunc)).is_ok());
        assert!(matches!(table.set(10, WasmValue::RefNull(ValType::RefFunc)), Err(Error::Trap(_))));
    }

    #[test]
    fn test_fill_and_copy() {
        let mut table = TableInstance::new(dummy_table_type(), UntypedValue::NULL);
        table.fill(2, 3, func_ref(1)).unwrap();
        table.copy_within(6, 2, 3).unwrap();
        assert_eq!(table.load(6, 3).unwrap(), &[func_ref(1); 3]);
        assert!(table.fill(8, 3, func_ref(1)).is_err());
        assert!(table.copy_within(0, 9, 2).is_err());
        assert!(table.copy_from_slice(9, &[func_ref(2); 2]).is_err());
    }

    #[test]
    fn test_grow() {
        let mut table = TableInstance::new(dummy_table_type(), UntypedValue::NULL);
        assert_eq!(table.grow(5, func_ref(0), u32::MAX, None), Some(10));
        assert_eq!(table.size(), 15);
        assert_eq!(table.get_raw(14).unwrap(), func_ref(0));
        assert_eq!(table.grow(6, UntypedValue::NULL, u32::MAX, None), None);
        assert_eq!(table.grow(1, UntypedValue::NULL, 15, None), None);
        assert_eq!(table.size(), 15);
    }
}
