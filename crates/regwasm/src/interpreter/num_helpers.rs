use crate::Trap;

#[cfg(not(feature = "std"))]
#[allow(unused_imports)]
use super::no_std_floats::NoStdFloatExt;

pub(crate) trait WasmIntExt
where
    Self: Sized,
{
    fn checked_wrapping_rem(self, rhs: Self) -> Result<Self, Trap>;
    fn wasm_checked_div(self, rhs: Self) -> Result<Self, Trap>;
}

/// Bounds of a trapping float to int truncation.
///
/// A value is in range if it lies strictly between the two bounds. They are the closest
/// representable values of the source type outside of the target range, since neither
/// `as` casts nor `TryFrom` report overflow for floats.
#[rustfmt::skip]
macro_rules! float_min_max {
    (f32, i32) => {(-2147483904.0_f32, 2147483648.0_f32)};
    (f64, i32) => {(-2147483649.0_f64, 2147483648.0_f64)};
    (f32, u32) => {(-1.0_f32, 4294967296.0_f32)}; // 2^32
    (f64, u32) => {(-1.0_f64, 4294967296.0_f64)}; // 2^32
    (f32, i64) => {(-9223373136366403584.0_f32, 9223372036854775808.0_f32)}; // 2^63 + 2^40 | 2^63
    (f64, i64) => {(-9223372036854777856.0_f64, 9223372036854775808.0_f64)}; // 2^63 + 2^40 | 2^63
    (f32, u64) => {(-1.0_f32, 18446744073709551616.0_f32)}; // 2^64
    (f64, u64) => {(-1.0_f64, 18446744073709551616.0_f64)}; // 2^64
    ($from:ty, $to:ty) => {compile_error!("invalid float conversion")};
}

/// Truncate a float to an integer, trapping on NaN and on values out of range
macro_rules! checked_conv_float {
    ($from:tt, $to:tt, $v:expr) => {
        checked_conv_float!($from, $to, $to, $v)
    };
    // Conversion through an intermediate unsigned type
    ($from:tt, $intermediate:tt, $to:tt, $v:expr) => {{
        let v: $from = $v;
        let (min, max) = float_min_max!($from, $intermediate);
        if $crate::unlikely(v.is_nan()) {
            Err($crate::Trap::InvalidConversionToInt)
        } else if $crate::unlikely(v <= min || v >= max) {
            Err($crate::Trap::IntegerOverflow)
        } else {
            Ok(v as $intermediate as $to)
        }
    }};
}

pub(crate) use checked_conv_float;
pub(crate) use float_min_max;

pub(crate) trait WasmFloatExt {
    fn wasm_minimum(self, other: Self) -> Self;
    fn wasm_maximum(self, other: Self) -> Self;
    fn wasm_nearest(self) -> Self;
}

macro_rules! impl_wasm_float_ops {
    ($($t:ty)*) => ($(
        impl WasmFloatExt for $t {
            // https://webassembly.github.io/spec/core/exec/numerics.html#op-fnearest
            fn wasm_nearest(self) -> Self {
                match self {
                    x if x.is_nan() => x,
                    x if x.is_infinite() || x == 0.0 => x,
                    x if (0.0..=0.5).contains(&x) => 0.0,
                    x if (-0.5..0.0).contains(&x) => -0.0,
                    x => {
                        // round() breaks ties away from zero
                        let rounded = x.round();
                        let diff = (x - rounded).abs();
                        if diff != 0.5 || rounded % 2.0 == 0.0 {
                            return rounded
                        }

                        rounded - x.signum()
                    }
                }
            }

            // https://webassembly.github.io/spec/core/exec/numerics.html#op-fmin
            #[inline]
            fn wasm_minimum(self, other: Self) -> Self {
                match self.partial_cmp(&other) {
                    Some(core::cmp::Ordering::Less) => self,
                    Some(core::cmp::Ordering::Greater) => other,
                    Some(core::cmp::Ordering::Equal) => if self.is_sign_negative() && other.is_sign_positive() { self } else { other },
                    None => self + other, // NaN propagation
                }
            }

            // https://webassembly.github.io/spec/core/exec/numerics.html#op-fmax
            #[inline]
            fn wasm_maximum(self, other: Self) -> Self {
                match self.partial_cmp(&other) {
                    Some(core::cmp::Ordering::Greater) => self,
                    Some(core::cmp::Ordering::Less) => other,
                    Some(core::cmp::Ordering::Equal) => if self.is_sign_negative() && other.is_sign_positive() { other } else { self },
                    None => self + other, // NaN propagation
                }
            }
        }
    )*)
}

impl_wasm_float_ops! { f32 f64 }

pub(crate) trait WasmIntOps {
    fn wasm_shl(self, rhs: Self) -> Self;
    fn wasm_shr(self, rhs: Self) -> Self;
    fn wasm_rotl(self, rhs: Self) -> Self;
    fn wasm_rotr(self, rhs: Self) -> Self;
}

macro_rules! impl_wrapping_self_sh {
    ($($t:ty)*) => ($(
        impl WasmIntOps for $t {
            #[inline]
            fn wasm_shl(self, rhs: Self) -> Self {
                self.wrapping_shl(rhs as u32)
            }

            #[inline]
            fn wasm_shr(self, rhs: Self) -> Self {
                self.wrapping_shr(rhs as u32)
            }

            #[inline]
            fn wasm_rotl(self, rhs: Self) -> Self {
                self.rotate_left(rhs as u32)
            }

            #[inline]
            fn wasm_rotr(self, rhs: Self) -> Self {
                self.rotate_right(rhs as u32)
            }
        }
    )*)
}

impl_wrapping_self_sh! { i32 i64 u32 u64 }

macro_rules! impl_checked_wrapping_rem {
    ($($t:ty)*) => ($(
        impl WasmIntExt for $t {
            #[inline]
            fn checked_wrapping_rem(self, rhs: Self) -> Result<Self, Trap> {
                if crate::unlikely(rhs == 0) {
                    return Err(Trap::DivisionByZero);
                }
                Ok(self.wrapping_rem(rhs))
            }

            #[inline]
            fn wasm_checked_div(self, rhs: Self) -> Result<Self, Trap> {
                if crate::unlikely(rhs == 0) {
                    return Err(Trap::DivisionByZero);
                }
                self.checked_div(rhs).ok_or(Trap::IntegerOverflow)
            }
        }
    )*)
}

impl_checked_wrapping_rem! { i32 i64 u32 u64 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_ties_to_even() {
        assert_eq!(0.5f32.wasm_nearest(), 0.0);
        assert_eq!(1.5f32.wasm_nearest(), 2.0);
        assert_eq!(2.5f64.wasm_nearest(), 2.0);
        assert_eq!((-3.5f64).wasm_nearest(), -4.0);
        assert_eq!((-2.5f32).wasm_nearest(), -2.0);
        assert_eq!(4.7f64.wasm_nearest(), 5.0);
        assert!((-0.25f64).wasm_nearest().is_sign_negative());
        assert!(f32::NAN.wasm_nearest().is_nan());
    }

    #[test]
    fn test_min_max_signed_zero() {
        assert!(0.0f32.wasm_minimum(-0.0).is_sign_negative());
        assert!((-0.0f32).wasm_maximum(0.0).is_sign_positive());
        assert!(1.0f64.wasm_minimum(f64::NAN).is_nan());
        assert!(f64::NAN.wasm_maximum(1.0).is_nan());
        assert_eq!(1.0f64.wasm_maximum(2.0), 2.0);
    }

    #[test]
    fn test_shifts_mask_the_count() {
        assert_eq!(1i32.wasm_shl(33), 2);
        assert_eq!((-8i32).wasm_shr(1), -4);
        assert_eq!(0x8000_0000u32.wasm_shr(31), 1);
        assert_eq!(1i64.wasm_rotr(1), i64::MIN);
        assert_eq!(i32::MIN.wasm_rotl(1), 1);
    }

    #[test]
    fn test_div_rem_traps() {
        assert!(matches!(1i32.wasm_checked_div(0), Err(Trap::DivisionByZero)));
        assert!(matches!(i32::MIN.wasm_checked_div(-1), Err(Trap::IntegerOverflow)));
        assert!(matches!(5u64.checked_wrapping_rem(0), Err(Trap::DivisionByZero)));
        assert_eq!(i64::MIN.checked_wrapping_rem(-1).unwrap(), 0);
        assert_eq!((-7i32).checked_wrapping_rem(2).unwrap(), -1);
        assert_eq!(7u32.wasm_checked_div(2).unwrap(), 3);
    }

    #[test]
    fn test_checked_truncation() {
        let ok: Result<i32, Trap> = checked_conv_float!(f32, i32, -2147483648.0);
        assert_eq!(ok.unwrap(), i32::MIN);

        let overflow: Result<i32, Trap> = checked_conv_float!(f64, i32, 2147483648.0);
        assert!(matches!(overflow, Err(Trap::IntegerOverflow)));

        let nan: Result<i64, Trap> = checked_conv_float!(f64, i64, f64::NAN);
        assert!(matches!(nan, Err(Trap::InvalidConversionToInt)));

        let unsigned: Result<i32, Trap> = checked_conv_float!(f64, u32, i32, 4294967295.0);
        assert_eq!(unsigned.unwrap(), -1);

        let negative: Result<i64, Trap> = checked_conv_float!(f32, u64, i64, -1.0);
        assert!(matches!(negative, Err(Trap::IntegerOverflow)));

        let fraction: Result<i64, Trap> = checked_conv_float!(f32, u64, i64, -0.9);
        assert_eq!(fraction.unwrap(), 0);
    }
}
