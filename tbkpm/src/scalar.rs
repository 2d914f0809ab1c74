// SPDX-License-Identifier: AGPL-3.0-only

//! Scalar kinds of Hamiltonian containers.
//!
//! A Hamiltonian is stored in one of four scalar kinds (`f32`, `f64`,
//! `complex<f32>`, `complex<f64>`) chosen at build time from the model's
//! precision and whether any energy is complex. Containers carry a runtime
//! [`ScalarTag`]; operations declare the tags they support and fail fast
//! with [`TbError::UnsupportedScalar`] on anything else.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use num_complex::{Complex32, Complex64};
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TbError};

/// Runtime tag of a scalar kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarTag {
    F32,
    F64,
    Cf32,
    Cf64,
}

impl ScalarTag {
    /// Tag for the given precision / complexity combination.
    #[must_use]
    pub const fn select(is_double: bool, is_complex: bool) -> Self {
        match (is_double, is_complex) {
            (false, false) => Self::F32,
            (true, false) => Self::F64,
            (false, true) => Self::Cf32,
            (true, true) => Self::Cf64,
        }
    }

    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Cf32 | Self::Cf64)
    }

    #[must_use]
    pub const fn is_double(self) -> bool {
        matches!(self, Self::F64 | Self::Cf64)
    }

    /// Size of one element in bytes.
    #[must_use]
    pub const fn size_of(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 | Self::Cf32 => 8,
            Self::Cf64 => 16,
        }
    }

    /// Fail unless `self` is one of `supported`.
    pub fn require(self, operation: &str, supported: &[Self]) -> Result<()> {
        if supported.contains(&self) {
            Ok(())
        } else {
            Err(TbError::unsupported(operation, self))
        }
    }
}

impl fmt::Display for ScalarTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
            Self::Cf32 => write!(f, "complex<f32>"),
            Self::Cf64 => write!(f, "complex<f64>"),
        }
    }
}

/// Arithmetic needed by the Hamiltonian builder and the Chebyshev recursion.
pub trait Scalar:
    Copy
    + Send
    + Sync
    + fmt::Debug
    + PartialEq
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + 'static
{
    const TAG: ScalarTag;

    /// Narrowing conversion; real kinds keep only the real part.
    fn from_complex(z: Complex64) -> Self;
    fn to_complex(self) -> Complex64;
    fn from_real(x: f64) -> Self;
    fn conj(self) -> Self;
    fn scale(self, s: f64) -> Self;
    fn norm_sqr(self) -> f64;

    /// Wrap a typed slice in the variant reference handed to modifiers.
    fn wrap_mut(data: &mut [Self]) -> ArrayRefMut<'_>;

    /// Typed access to a variant reference, `None` on tag mismatch.
    fn unwrap_mut<'a>(array: &'a mut ArrayRefMut<'_>) -> Option<&'a mut [Self]>;
}

macro_rules! impl_real_scalar {
    ($t:ty, $tag:ident) => {
        impl Scalar for $t {
            const TAG: ScalarTag = ScalarTag::$tag;

            #[inline]
            fn from_complex(z: Complex64) -> Self {
                z.re as $t
            }
            #[inline]
            fn to_complex(self) -> Complex64 {
                Complex64::new(f64::from(self), 0.0)
            }
            #[inline]
            fn from_real(x: f64) -> Self {
                x as $t
            }
            #[inline]
            fn conj(self) -> Self {
                self
            }
            #[inline]
            fn scale(self, s: f64) -> Self {
                self * s as $t
            }
            #[inline]
            fn norm_sqr(self) -> f64 {
                let x = f64::from(self);
                x * x
            }
            fn wrap_mut(data: &mut [Self]) -> ArrayRefMut<'_> {
                ArrayRefMut::$tag(data)
            }
            fn unwrap_mut<'a>(array: &'a mut ArrayRefMut<'_>) -> Option<&'a mut [Self]> {
                match array {
                    ArrayRefMut::$tag(data) => Some(&mut **data),
                    _ => None,
                }
            }
        }
    };
}

macro_rules! impl_complex_scalar {
    ($t:ty, $r:ty, $tag:ident) => {
        impl Scalar for $t {
            const TAG: ScalarTag = ScalarTag::$tag;

            #[inline]
            fn from_complex(z: Complex64) -> Self {
                <$t>::new(z.re as $r, z.im as $r)
            }
            #[inline]
            fn to_complex(self) -> Complex64 {
                Complex64::new(f64::from(self.re), f64::from(self.im))
            }
            #[inline]
            fn from_real(x: f64) -> Self {
                <$t>::new(x as $r, 0.0)
            }
            #[inline]
            fn conj(self) -> Self {
                num_complex::Complex::conj(&self)
            }
            #[inline]
            fn scale(self, s: f64) -> Self {
                self * (s as $r)
            }
            #[inline]
            fn norm_sqr(self) -> f64 {
                f64::from(num_complex::Complex::norm_sqr(&self))
            }
            fn wrap_mut(data: &mut [Self]) -> ArrayRefMut<'_> {
                ArrayRefMut::$tag(data)
            }
            fn unwrap_mut<'a>(array: &'a mut ArrayRefMut<'_>) -> Option<&'a mut [Self]> {
                match array {
                    ArrayRefMut::$tag(data) => Some(&mut **data),
                    _ => None,
                }
            }
        }
    };
}

impl_real_scalar!(f32, F32);
impl_real_scalar!(f64, F64);
impl_complex_scalar!(Complex32, f32, Cf32);
impl_complex_scalar!(Complex64, f64, Cf64);

/// Generic operation over whichever scalar kind an array holds.
pub trait ArrayVisitor {
    fn visit<T: Scalar>(&mut self, data: &mut [T]);
}

/// Mutable reference to an energy array of any supported scalar kind.
///
/// This is what onsite and hopping modifiers receive: they either operate
/// generically through [`ArrayVisitor`], through the complex-valued helpers,
/// or request a concrete slice with [`ArrayRefMut::as_slice_mut`], which
/// fails if the runtime tag does not match.
#[derive(Debug)]
pub enum ArrayRefMut<'a> {
    F32(&'a mut [f32]),
    F64(&'a mut [f64]),
    Cf32(&'a mut [Complex32]),
    Cf64(&'a mut [Complex64]),
}

impl ArrayRefMut<'_> {
    #[must_use]
    pub const fn tag(&self) -> ScalarTag {
        match self {
            Self::F32(_) => ScalarTag::F32,
            Self::F64(_) => ScalarTag::F64,
            Self::Cf32(_) => ScalarTag::Cf32,
            Self::Cf64(_) => ScalarTag::Cf64,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(d) => d.len(),
            Self::F64(d) => d.len(),
            Self::Cf32(d) => d.len(),
            Self::Cf64(d) => d.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn visit<V: ArrayVisitor>(&mut self, visitor: &mut V) {
        match self {
            Self::F32(d) => visitor.visit(&mut **d),
            Self::F64(d) => visitor.visit(&mut **d),
            Self::Cf32(d) => visitor.visit(&mut **d),
            Self::Cf64(d) => visitor.visit(&mut **d),
        }
    }

    /// Concrete slice access; fails if the array holds another scalar kind.
    pub fn as_slice_mut<T: Scalar>(&mut self) -> Result<&mut [T]> {
        let found = self.tag();
        T::unwrap_mut(self).ok_or_else(|| TbError::unsupported(&format!("{} slice", T::TAG), found))
    }

    /// Read element `i` widened to `Complex64`.
    #[must_use]
    pub fn get(&self, i: usize) -> Complex64 {
        match self {
            Self::F32(d) => d[i].to_complex(),
            Self::F64(d) => d[i].to_complex(),
            Self::Cf32(d) => d[i].to_complex(),
            Self::Cf64(d) => d[i].to_complex(),
        }
    }

    /// Set every element to a real value.
    pub fn fill_real(&mut self, value: f64) {
        struct Fill(f64);
        impl ArrayVisitor for Fill {
            fn visit<T: Scalar>(&mut self, data: &mut [T]) {
                data.fill(T::from_real(self.0));
            }
        }
        self.visit(&mut Fill(value));
    }

    pub fn set_zero(&mut self) {
        self.fill_real(0.0);
    }

    /// Rewrite every element through `f(index, value)`.
    ///
    /// Fails on real arrays if `f` produces a non-zero imaginary part; the
    /// model must be declared complex for such modifiers.
    pub fn apply(&mut self, mut f: impl FnMut(usize, Complex64) -> Complex64) -> Result<()> {
        let tag = self.tag();
        let n = self.len();
        for i in 0..n {
            let z = f(i, self.get(i));
            if !tag.is_complex() && z.im != 0.0 {
                return Err(TbError::unsupported("complex-valued energy assignment", tag));
            }
            match self {
                Self::F32(d) => d[i] = f32::from_complex(z),
                Self::F64(d) => d[i] = f64::from_complex(z),
                Self::Cf32(d) => d[i] = Complex32::from_complex(z),
                Self::Cf64(d) => d[i] = z,
            }
        }
        Ok(())
    }
}
