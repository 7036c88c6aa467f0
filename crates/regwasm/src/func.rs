use alloc::{boxed::Box, string::String, vec, vec::Vec};
use regwasm_types::{FuncType, ValType};

use crate::{Error, Function, MemoryInstance, ModuleInstance, Result, Store, WasmValue, interpreter};

#[derive(Debug, Clone)]
/// A function handle
pub struct FuncHandle {
    pub(crate) func: Function,
    pub(crate) ty: FuncType,
    pub(crate) store_id: usize,

    /// The name of the function, if it has one
    pub name: Option<String>,
}

impl FuncHandle {
    /// The function this handle refers to
    pub fn func(&self) -> Function {
        self.func
    }

    /// The function's signature
    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    /// Call a function
    ///
    /// See <https://webassembly.github.io/spec/core/exec/modules.html#invocation>
    pub fn call(&self, store: &mut Store, params: &[WasmValue]) -> Result<Vec<WasmValue>> {
        if self.store_id != store.id() {
            return Err(Error::InvalidStore);
        }

        interpreter::invoke(store, self.func, params)
    }
}

#[derive(Debug)]
/// A typed function handle
pub struct TypedFuncHandle<P, R> {
    /// The underlying function handle
    pub func: FuncHandle,
    pub(crate) marker: core::marker::PhantomData<(P, R)>,
}

impl<P: IntoWasmValueTuple, R: FromWasmValueTuple> TypedFuncHandle<P, R> {
    /// Call a typed function
    pub fn call(&self, store: &mut Store, params: P) -> Result<R> {
        let wasm_values = params.into_wasm_value_tuple();
        let result = self.func.call(store, &wasm_values)?;
        R::from_wasm_value_tuple(&result)
    }
}

/// The context a host function is called with
///
/// Gives the host function access to the store and, if it was called from wasm code, to the
/// instance the call came from.
#[derive(Debug)]
pub struct Caller<'a> {
    pub(crate) store: &'a mut Store,
    pub(crate) instance: Option<ModuleInstance>,
}

impl<'a> Caller<'a> {
    /// The store
    pub fn store(&self) -> &Store {
        self.store
    }

    /// The store, mutably
    pub fn store_mut(&mut self) -> &mut Store {
        self.store
    }

    /// The calling instance, `None` if the host function was invoked directly
    pub fn instance(&self) -> Option<ModuleInstance> {
        self.instance
    }

    /// The default memory of the calling instance
    pub fn memory(&self) -> Result<&MemoryInstance> {
        let instance = self.instance.ok_or_else(|| Error::Other("host function has no calling instance".into()))?;
        let memory = instance.memory_handle(self.store)?;
        self.store.memory(memory)
    }

    /// The default memory of the calling instance, mutably
    pub fn memory_mut(&mut self) -> Result<&mut MemoryInstance> {
        let instance = self.instance.ok_or_else(|| Error::Other("host function has no calling instance".into()))?;
        let memory = instance.memory_handle(self.store)?;
        self.store.memory_mut(memory)
    }

    /// A memory exported by the calling instance
    pub fn exported_memory(&self, name: &str) -> Result<&MemoryInstance> {
        let instance = self.instance.ok_or_else(|| Error::Other("host function has no calling instance".into()))?;
        instance.exported_memory(self.store, name)
    }

    /// Copy `len` bytes at `addr` out of the caller's default memory
    pub fn read_memory(&self, addr: usize, len: usize) -> Result<Vec<u8>> {
        Ok(self.memory()?.load(addr, len)?.to_vec())
    }

    /// Write `data` at `addr` into the caller's default memory
    pub fn write_memory(&mut self, addr: usize, data: &[u8]) -> Result<()> {
        self.memory_mut()?.store(addr, data)
    }
}

/// Conversion of Rust values into function arguments or results
pub trait IntoWasmValueTuple {
    /// Convert into a list of values
    fn into_wasm_value_tuple(self) -> Vec<WasmValue>;
}

/// Conversion of function arguments or results into Rust values
pub trait FromWasmValueTuple {
    /// Convert from a list of values
    fn from_wasm_value_tuple(values: &[WasmValue]) -> Result<Self>
    where
        Self: Sized;
}

/// The value types of a Rust argument or result list
pub trait ValTypesFromTuple {
    /// The value types, in order
    fn val_types() -> Box<[ValType]>;
}

/// A Rust type with a WebAssembly counterpart
pub trait ToValType {
    /// The matching value type
    fn to_val_type() -> ValType;
}

impl ToValType for i32 {
    fn to_val_type() -> ValType {
        ValType::I32
    }
}

impl ToValType for i64 {
    fn to_val_type() -> ValType {
        ValType::I64
    }
}

impl ToValType for f32 {
    fn to_val_type() -> ValType {
        ValType::F32
    }
}

impl ToValType for f64 {
    fn to_val_type() -> ValType {
        ValType::F64
    }
}

macro_rules! impl_into_wasm_value_tuple {
    ($($T:ident),*) => {
        impl<$($T),*> IntoWasmValueTuple for ($($T,)*)
        where
            $($T: Into<WasmValue>),*
        {
            #[allow(non_snake_case)]
            #[inline]
            fn into_wasm_value_tuple(self) -> Vec<WasmValue> {
                let ($($T,)*) = self;
                vec![$($T.into(),)*]
            }
        }
    }
}

macro_rules! impl_into_wasm_value_tuple_single {
    ($T:ident) => {
        impl IntoWasmValueTuple for $T {
            #[inline]
            fn into_wasm_value_tuple(self) -> Vec<WasmValue> {
                vec![self.into()]
            }
        }
    };
}

macro_rules! impl_val_types_from_tuple {
    ($($t:ident),+) => {
        impl<$($t),+> ValTypesFromTuple for ($($t,)+)
        where
            $($t: ToValType,)+
        {
            #[inline]
            fn val_types() -> Box<[ValType]> {
                Box::new([$($t::to_val_type(),)+])
            }
        }
    };
}

impl ValTypesFromTuple for () {
    #[inline]
    fn val_types() -> Box<[ValType]> {
        Box::new([])
    }
}

impl<T1> ValTypesFromTuple for T1
where
    T1: ToValType,
{
    #[inline]
    fn val_types() -> Box<[ValType]> {
        Box::new([T1::to_val_type()])
    }
}

impl_val_types_from_tuple!(T1);
impl_val_types_from_tuple!(T1, T2);
impl_val_types_from_tuple!(T1, T2, T3);
impl_val_types_from_tuple!(T1, T2, T3, T4);
impl_val_types_from_tuple!(T1, T2, T3, T4, T5);
impl_val_types_from_tuple!(T1, T2, T3, T4, T5, T6);
impl_val_types_from_tuple!(T1, T2, T3, T4, T5, T6, T7);
impl_val_types_from_tuple!(T1, T2, T3, T4, T5, T6, T7, T8);

impl_into_wasm_value_tuple!();
impl_into_wasm_value_tuple!(T1);
impl_into_wasm_value_tuple!(T1, T2);
impl_into_wasm_value_tuple!(T1, T2, T3);
impl_into_wasm_value_tuple!(T1, T2, T3, T4);
impl_into_wasm_value_tuple!(T1, T2, T3, T4, T5);
impl_into_wasm_value_tuple!(T1, T2, T3, T4, T5, T6);
impl_into_wasm_value_tuple!(T1, T2, T3, T4, T5, T6, T7);
impl_into_wasm_value_tuple!(T1, T2, T3, T4, T5, T6, T7, T8);

impl_into_wasm_value_tuple_single!(i32);
impl_into_wasm_value_tuple_single!(i64);
impl_into_wasm_value_tuple_single!(f32);
impl_into_wasm_value_tuple_single!(f64);

fn result_count_mismatch(expected: usize, actual: usize) -> Error {
    Error::Other(alloc::format!("expected {expected} values, got {actual}"))
}

macro_rules! impl_from_wasm_value_tuple {
    ($($T:ident),*) => {
        impl<$($T),*> FromWasmValueTuple for ($($T,)*)
        where
            $($T: TryFrom<WasmValue, Error = ()>),*
        {
            #[inline]
            fn from_wasm_value_tuple(values: &[WasmValue]) -> Result<Self> {
                let names: &[&str] = &[$(stringify!($T)),*];
                if values.len() != names.len() {
                    return Err(result_count_mismatch(names.len(), values.len()));
                }

                #[allow(unused_variables, unused_mut)]
                let mut iter = values.iter();
                Ok((
                    $(
                        $T::try_from(*iter.next().ok_or_else(|| result_count_mismatch(names.len(), 0))?)
                            .map_err(|_| Error::Other("could not convert WasmValue to expected type".into()))?,
                    )*
                ))
            }
        }
    }
}

macro_rules! impl_from_wasm_value_tuple_single {
    ($T:ident) => {
        impl FromWasmValueTuple for $T {
            #[inline]
            fn from_wasm_value_tuple(values: &[WasmValue]) -> Result<Self> {
                match values {
                    [value] => $T::try_from(*value)
                        .map_err(|_| Error::Other("could not convert WasmValue to expected type".into())),
                    _ => Err(result_count_mismatch(1, values.len())),
                }
            }
        }
    };
}

impl_from_wasm_value_tuple!();
impl_from_wasm_value_tuple!(T1);
impl_from_wasm_value_tuple!(T1, T2);
impl_from_wasm_value_tuple!(T1, T2, T3);
impl_from_wasm_value_tuple!(T1, T2, T3, T4);
impl_from_wasm_value_tuple!(T1, T2, T3, T4, T5);
impl_from_wasm_value_tuple!(T1, T2, T3, T4, T5, T6);
impl_from_wasm_value_tuple!(T1, T2, T3, T4, T5, T6, T7);
impl_from_wasm_value_tuple!(T1, T2, T3, T4, T5, T6, T7, T8);

impl_from_wasm_value_tuple_single!(i32);
impl_from_wasm_value_tuple_single!(i64);
impl_from_wasm_value_tuple_single!(f32);
impl_from_wasm_value_tuple_single!(f64);
