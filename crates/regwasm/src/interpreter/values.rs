use crate::{Function, Handle, WasmValue};
use regwasm_types::ValType;

/// Bit pattern of a null reference. No valid reference payload has this bit set.
const NULL_REF: u64 = 1 << 63;

/// Marks a function reference as pointing at a host function.
const HOST_FUNC_REF: u64 = 1 << 62;

/// Position of the owner tag of a function reference, above the handle index.
const FUNC_REF_OWNER_SHIFT: u32 = 32;

/// A register slot.
///
/// The slot does not know its own type; every instruction reading it decides how to
/// interpret the 64 bits. 32-bit values are zero-extended, references use [`NULL_REF`]
/// for null and the handle index and owner otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct UntypedValue(pub(crate) u64);

impl UntypedValue {
    pub(crate) const NULL: Self = Self(NULL_REF);

    #[inline(always)]
    pub(crate) fn i32(value: i32) -> Self {
        Self(value as u32 as u64)
    }

    #[inline(always)]
    pub(crate) fn i64(value: i64) -> Self {
        Self(value as u64)
    }

    #[inline(always)]
    pub(crate) fn f32(value: f32) -> Self {
        Self(value.to_bits() as u64)
    }

    #[inline(always)]
    pub(crate) fn f64(value: f64) -> Self {
        Self(value.to_bits())
    }

    #[inline(always)]
    pub(crate) fn as_i32(self) -> i32 {
        self.0 as u32 as i32
    }

    #[inline(always)]
    pub(crate) fn as_u32(self) -> u32 {
        self.0 as u32
    }

    #[inline(always)]
    pub(crate) fn as_i64(self) -> i64 {
        self.0 as i64
    }

    #[inline(always)]
    pub(crate) fn as_f32(self) -> f32 {
        f32::from_bits(self.0 as u32)
    }

    #[inline(always)]
    pub(crate) fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    #[inline(always)]
    pub(crate) fn is_null(self) -> bool {
        self.0 & NULL_REF != 0
    }

    fn encode_ref(payload: u64) -> Self {
        debug_assert!(payload & NULL_REF == 0, "reference payload collides with the null pattern");
        Self(payload)
    }

    pub(crate) fn func_ref(func: Option<Function>) -> Self {
        match func {
            None => Self::NULL,
            Some(Function::Wasm(handle)) => Self::encode_ref(Self::handle_payload(handle)),
            Some(Function::Host(handle)) => Self::encode_ref(HOST_FUNC_REF | Self::handle_payload(handle)),
        }
    }

    fn handle_payload<T>(handle: Handle<T>) -> u64 {
        (handle.owner() as u64) << FUNC_REF_OWNER_SHIFT | handle.index() as u64
    }

    pub(crate) fn as_func_ref(self) -> Option<Function> {
        if self.is_null() {
            return None;
        }

        let index = self.0 as u32;
        let owner = (self.0 >> FUNC_REF_OWNER_SHIFT) as u32 & ((1 << Handle::<()>::OWNER_BITS) - 1);
        Some(match self.0 & HOST_FUNC_REF {
            0 => Function::Wasm(Handle::new(owner, index)),
            _ => Function::Host(Handle::new(owner, index)),
        })
    }

    pub(crate) fn extern_ref(value: Option<u32>) -> Self {
        match value {
            None => Self::NULL,
            Some(value) => Self::encode_ref(value as u64),
        }
    }

    pub(crate) fn as_extern_ref(self) -> Option<u32> {
        if self.is_null() { None } else { Some(self.0 as u32) }
    }

    /// Attach a type to the slot.
    pub(crate) fn attach_type(self, ty: ValType) -> WasmValue {
        match ty {
            ValType::I32 => WasmValue::I32(self.as_i32()),
            ValType::I64 => WasmValue::I64(self.as_i64()),
            ValType::F32 => WasmValue::F32(self.as_f32()),
            ValType::F64 => WasmValue::F64(self.as_f64()),
            ValType::RefFunc => self.as_func_ref().map_or(WasmValue::RefNull(ValType::RefFunc), WasmValue::RefFunc),
            ValType::RefExtern => {
                self.as_extern_ref().map_or(WasmValue::RefNull(ValType::RefExtern), WasmValue::RefExtern)
            }
        }
    }
}

impl From<WasmValue> for UntypedValue {
    fn from(value: WasmValue) -> Self {
        match value {
            WasmValue::I32(v) => Self::i32(v),
            WasmValue::I64(v) => Self::i64(v),
            WasmValue::F32(v) => Self::f32(v),
            WasmValue::F64(v) => Self::f64(v),
            WasmValue::RefNull(_) => Self::NULL,
            WasmValue::RefFunc(func) => Self::func_ref(Some(func)),
            WasmValue::RefExtern(v) => Self::extern_ref(Some(v)),
        }
    }
}

/// Conversion between register slots and the primitive types instructions operate on.
pub(crate) trait InternalValue: Copy {
    fn from_slot(slot: UntypedValue) -> Self;
    fn into_slot(self) -> UntypedValue;
}

macro_rules! impl_internalvalue {
    ($($t:ty => |$v:ident| $to_slot:expr, |$s:ident| $from_slot:expr);* $(;)?) => {
        $(
            impl InternalValue for $t {
                #[inline(always)]
                fn from_slot($s: UntypedValue) -> Self {
                    $from_slot
                }

                #[inline(always)]
                fn into_slot(self) -> UntypedValue {
                    let $v = self;
                    $to_slot
                }
            }
        )*
    };
}

impl_internalvalue! {
    i32 => |v| UntypedValue::i32(v), |s| s.as_i32();
    u32 => |v| UntypedValue(v as u64), |s| s.as_u32();
    i64 => |v| UntypedValue::i64(v), |s| s.as_i64();
    u64 => |v| UntypedValue(v), |s| s.0;
    f32 => |v| UntypedValue::f32(v), |s| s.as_f32();
    f64 => |v| UntypedValue::f64(v), |s| s.as_f64();
}
