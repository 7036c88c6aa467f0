//! Float methods missing from `core`, backed by `libm`.

pub(super) trait NoStdFloatExt: Sized {
    fn round(self) -> Self;
    fn abs(self) -> Self;
    fn signum(self) -> Self;
    fn ceil(self) -> Self;
    fn floor(self) -> Self;
    fn trunc(self) -> Self;
    fn sqrt(self) -> Self;
    fn copysign(self, sign: Self) -> Self;
}

macro_rules! impl_no_std_float_ext {
    ($ty:ty, $round:ident, $abs:ident, $ceil:ident, $floor:ident, $trunc:ident, $sqrt:ident, $copysign:ident) => {
        impl NoStdFloatExt for $ty {
            #[inline]
            fn round(self) -> Self {
                libm::$round(self)
            }
            #[inline]
            fn abs(self) -> Self {
                libm::$abs(self)
            }
            #[inline]
            fn signum(self) -> Self {
                libm::$copysign(1.0, self)
            }
            #[inline]
            fn ceil(self) -> Self {
                libm::$ceil(self)
            }
            #[inline]
            fn floor(self) -> Self {
                libm::$floor(self)
            }
            #[inline]
            fn trunc(self) -> Self {
                libm::$trunc(self)
            }
            #[inline]
            fn sqrt(self) -> Self {
                libm::$sqrt(self)
            }
            #[inline]
            fn copysign(self, sign: Self) -> Self {
                libm::$copysign(self, sign)
            }
        }
    };
}

impl_no_std_float_ext!(f32, roundf, fabsf, ceilf, floorf, truncf, sqrtf, copysignf);
impl_no_std_float_ext!(f64, round, fabs, ceil, floor, trunc, sqrt, copysign);
