use std::sync::Arc;

use casey::snake;
use derive_more::{Deref, DerefMut, Display, From, Into};
use itertools::Itertools;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{
    int_tuple::IntTuple,
    layout::{Layout, LayoutError},
};

/// What [`Layout::slice`] does with one top-level mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis {
    /// The mode is kept in the sliced layout.
    #[default]
    #[display("..")]
    Full,
    /// The mode is fixed at a super-coordinate and folded into the offset.
    #[display("{_0}")]
    One(usize),
}

impl From<usize> for Axis {
    #[inline]
    fn from(value: usize) -> Self {
        Self::One(value)
    }
}

impl From<std::ops::RangeFull> for Axis {
    #[inline]
    fn from(_: std::ops::RangeFull) -> Self {
        Self::Full
    }
}

/// One [`Axis`] per top-level mode of the layout being sliced, e.g., `(1, .., 2)`
/// fixes modes 0 and 2 and keeps mode 1.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Deref, DerefMut, From, Into, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[display("[{}]", _0.iter().format(", "))]
pub struct Slice(Arc<[Axis]>);

impl From<Vec<Axis>> for Slice {
    #[inline]
    fn from(value: Vec<Axis>) -> Self {
        Self(value.into())
    }
}

impl<T: Into<Axis>> From<T> for Slice {
    #[inline]
    fn from(axis: T) -> Self {
        Self(Arc::from([axis.into()]))
    }
}

macro_rules! impl_slice_from_tuple {
    ($($t:ident),+) => {
        impl<$($t: Into<Axis>),+> From<($($t,)+)> for Slice {
            #[inline]
            fn from(($(snake!($t),)+): ($($t,)+)) -> Self {
                Self(Arc::from([$(snake!($t).into()),+]))
            }
        }
    };
}

impl_slice_from_tuple!(A0, A1);
impl_slice_from_tuple!(A0, A1, A2);
impl_slice_from_tuple!(A0, A1, A2, A3);
impl_slice_from_tuple!(A0, A1, A2, A3, A4);
impl_slice_from_tuple!(A0, A1, A2, A3, A4, A5);
impl_slice_from_tuple!(A0, A1, A2, A3, A4, A5, A6);
impl_slice_from_tuple!(A0, A1, A2, A3, A4, A5, A6, A7);

impl Slice {
    /// Keeps every top-level mode of `layout`.
    #[inline]
    pub fn from_layout(layout: &Layout) -> Self {
        Self::from(vec![Axis::Full; layout.rank()])
    }

    /// Whether no mode is fixed.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.iter().all(|&axis| matches!(axis, Axis::Full))
    }

    /// Indices of the fixed modes, with their super-coordinates.
    #[inline]
    pub fn fixed(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.iter().enumerate().filter_map(|(mode, &axis)| match axis {
            Axis::Full => None,
            Axis::One(coord) => Some((mode, coord)),
        })
    }
}

impl Layout {
    /// Fixes the top-level modes selected by [`Axis::One`] and keeps the [`Axis::Full`] ones.
    ///
    /// Returns the layout of the kept modes, together with the index offset of the fixed ones.
    /// A fixed mode is addressed by its super-coordinate, i.e., as if the mode were flattened to 1-D.
    pub fn slice(&self, slice: &Slice) -> Result<(Layout, usize), LayoutError> {
        let err = || LayoutError::Slice(self.clone(), slice.clone());
        if slice.len() != self.rank() {
            return Err(err());
        }
        if slice.is_full() {
            return Ok((self.clone(), 0));
        }

        let mut offset = 0;
        let mut modes = vec![];
        for (axis, mode) in slice.iter().zip_eq(self.modes()) {
            match *axis {
                Axis::Full => modes.push(mode),
                Axis::One(index) if index < mode.size() => offset += mode.value_linear(index),
                Axis::One(_) => return Err(err()),
            }
        }

        let (shape, stride): (Vec<_>, Vec<_>) = modes
            .into_iter()
            .map(|mode| <(IntTuple, IntTuple)>::from(mode))
            .unzip();
        let layout = Layout::from_parts(IntTuple::tuple(shape), IntTuple::tuple(stride));
        Ok((layout, offset))
    }
}
