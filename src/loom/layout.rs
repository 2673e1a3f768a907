use derive_more::Display;
use itertools::Itertools;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{int_tuple::IntTuple, slice::Slice};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("shape {0} and stride {1} are not congruent")]
    ShapeStrideMismatch(IntTuple, IntTuple),
    #[error("order {order} is not a valid ordering of shape {shape}")]
    InvalidOrder { shape: IntTuple, order: IntTuple },
    #[error("shape {target} is not divisible by tile {tile}")]
    ShapeNotDivisible { target: IntTuple, tile: IntTuple },
    #[error("index {index} is out of domain [0, {size})")]
    IndexOutOfDomain { index: usize, size: usize },
    #[error("coordinate {coord} is not compatible with shape {shape}")]
    CoordMismatch { coord: IntTuple, shape: IntTuple },
    #[error("coordinate {coord} is out of the domain of shape {shape}")]
    CoordOutOfDomain { coord: IntTuple, shape: IntTuple },
    #[error("rank mismatch: expected {expected}, but got {actual}")]
    Rank { expected: usize, actual: usize },
    #[error("complement error: layout {0} is not complementable to size {1}")]
    Complement(Layout, usize),
    #[error("composition error: layout {0} cannot be composed with {1}")]
    Composition(Layout, Layout),
    #[error("layout {0} is not dense")]
    NotDense(Layout),
    #[error("slice {1} is not compatible with layout {0}")]
    Slice(Layout, Slice),
}

/// An [`IndexFn`] is a mapping that maps an index to another.
pub trait IndexFn<Index> {
    type Output;

    /// Sends an index to a mapped value.
    fn value(&self, index: Index) -> Self::Output;
}

/// A point in the domain of a layout, in linear, R-tuple or natural form.
pub type Coord = IntTuple;

/// A [`Layout`] maps (hierarchical) coordinates to linear indices.
/// It is a pair of congruent shape and stride [`IntTuple`]s.
///
/// For more information, check:
/// 1. [CuTe documents](https://github.com/NVIDIA/cutlass/blob/main/media/docs/cute);
/// 2. [A note on the algebra of CuTe Layouts](https://leimao.github.io/downloads/article/2024-10-20-CuTe-Layout-Algebra/layout_algebra.pdf).
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "(IntTuple, IntTuple)", into = "(IntTuple, IntTuple)")
)]
#[display("({shape}:{stride})")]
pub struct Layout {
    shape: IntTuple,
    stride: IntTuple,
}

impl Default for Layout {
    /// The trivial layout `1:0`.
    #[inline]
    fn default() -> Self {
        Self {
            shape: IntTuple::Leaf(1),
            stride: IntTuple::Leaf(0),
        }
    }
}

impl TryFrom<(IntTuple, IntTuple)> for Layout {
    type Error = LayoutError;

    #[inline]
    fn try_from((shape, stride): (IntTuple, IntTuple)) -> Result<Self, Self::Error> {
        Self::new(shape, stride)
    }
}

impl From<Layout> for (IntTuple, IntTuple) {
    #[inline]
    fn from(value: Layout) -> Self {
        (value.shape, value.stride)
    }
}

impl AsRef<Layout> for Layout {
    #[inline]
    fn as_ref(&self) -> &Layout {
        self
    }
}

impl Layout {
    /// Creates a layout from shape and stride. Fails if they are not congruent.
    pub fn new(shape: impl Into<IntTuple>, stride: impl Into<IntTuple>) -> Result<Self, LayoutError> {
        let shape: IntTuple = shape.into();
        let stride: IntTuple = stride.into();
        match shape.congruent(&stride) {
            true => Ok(Self { shape, stride }),
            false => Err(LayoutError::ShapeStrideMismatch(shape, stride)),
        }
    }

    /// Assembles a layout whose congruency is already established.
    #[inline]
    pub(crate) fn from_parts(shape: IntTuple, stride: IntTuple) -> Self {
        debug_assert!(shape.congruent(&stride));
        Self { shape, stride }
    }

    /// Creates a compact layout of a shape, in which the leftmost leaf varies fastest.
    #[inline]
    pub fn from_shape(shape: impl Into<IntTuple>) -> Self {
        let shape: IntTuple = shape.into();
        let stride = shape.prefix_product();
        Self { shape, stride }
    }

    #[inline]
    pub fn shape(&self) -> &IntTuple {
        &self.shape
    }

    #[inline]
    pub fn stride(&self) -> &IntTuple {
        &self.stride
    }

    /// Number of top-level modes.
    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Number of coordinates in the domain.
    #[inline]
    pub fn size(&self) -> usize {
        self.shape.product()
    }

    /// Maximum index + 1. The co-domain of the layout mapping.
    pub fn cosize(&self) -> usize {
        if self.size() == 0 {
            return 0;
        }
        self.leaves().map(|(n, d)| (n - 1) * d).sum::<usize>() + 1
    }

    /// Returns `true` if the layout is a bijection onto `[0, size)`.
    pub fn is_dense(&self) -> bool {
        let modes = self
            .leaves()
            .filter(|&(n, _)| n != 1)
            .sorted_by_key(|&(n, d)| (d, n))
            .collect_vec();
        if modes.iter().any(|&(n, _)| n == 0) {
            return true;
        }
        modes
            .into_iter()
            .try_fold(1, |p, (n, d)| (d == p).then_some(p * n))
            .is_some()
    }

    /// Pairs of `(shape, stride)` of all leaf modes, in colexicographic order.
    #[inline]
    pub fn leaves(&self) -> impl Iterator<Item = (usize, usize)> + use<> {
        self.shape
            .flatten()
            .into_iter()
            .zip_eq(self.stride.flatten())
    }

    /// Retrieves the sublayout of the `i`-th top-level mode.
    #[inline]
    pub fn mode(&self, i: usize) -> Option<Layout> {
        let shape = self.shape.get(i)?.clone();
        let stride = self.stride.get(i)?.clone();
        Some(Self { shape, stride })
    }

    /// Iterates over sublayouts of top-level modes.
    #[inline]
    pub fn modes(&self) -> impl Iterator<Item = Layout> + '_ {
        self.shape
            .modes()
            .iter()
            .zip_eq(self.stride.modes())
            .map(|(shape, stride)| Self::from_parts(shape.clone(), stride.clone()))
    }

    /// Flattens all nested modes into a single level.
    pub fn flatten(&self) -> Self {
        if self.shape.is_leaf() {
            return self.clone();
        }
        let (shape, stride): (Vec<_>, Vec<_>) = self
            .leaves()
            .map(|(n, d)| (IntTuple::Leaf(n), IntTuple::Leaf(d)))
            .unzip();
        Self::from_parts(IntTuple::tuple(shape), IntTuple::tuple(stride))
    }

    /// Appends `other` as a new top-level mode.
    pub fn append(&self, other: impl AsRef<Layout>) -> Self {
        let other = other.as_ref();
        let shape = self.shape.modes().iter().chain([&other.shape]).cloned();
        let stride = self.stride.modes().iter().chain([&other.stride]).cloned();
        Self::from_parts(IntTuple::tuple(shape), IntTuple::tuple(stride))
    }

    /// Pads the layout with `1:0` modes up to `rank`.
    pub fn append_to(&self, rank: usize) -> Self {
        match self.rank() {
            r if r >= rank => self.clone(),
            r => (r..rank).fold(self.clone(), |acc, _| acc.append(Layout::default())),
        }
    }

    /// Maps any form of coordinate into the natural coordinate, which is congruent with the shape.
    ///
    /// A leaf coordinate addressing a nested mode is unraveled colexicographically across that mode,
    /// so a 1-D index, an R-tuple and a natural coordinate of the same point all agree.
    pub fn natural_coord(&self, coord: impl Into<Coord>) -> Result<Coord, LayoutError> {
        let coord: Coord = coord.into();
        natural(&coord, &self.shape)
    }

    /// Maps any form of coordinate into the R-tuple form: one linear super-coordinate per top-level mode.
    pub fn mode_coord(&self, coord: impl Into<Coord>) -> Result<Coord, LayoutError> {
        let coord = self.natural_coord(coord)?;
        match &self.shape {
            IntTuple::Leaf(_) => Ok(coord),
            IntTuple::Node(shapes) => Ok(IntTuple::tuple(
                shapes
                    .iter()
                    .zip_eq(coord.modes())
                    .map(|(shape, coord)| IntTuple::Leaf(dot(coord, &shape.prefix_product()))),
            )),
        }
    }

    /// Maps any form of coordinate into the 1-D (colexicographic) index of the domain.
    pub fn linear_coord(&self, coord: impl Into<Coord>) -> Result<usize, LayoutError> {
        let coord = self.natural_coord(coord)?;
        Ok(dot(&coord, &self.shape.prefix_product()))
    }

    /// Maps an index back to a natural coordinate.
    ///
    /// For a dense layout this inverts the mapping, i.e., `L(L.idx2crd(i)) == i`.
    /// Other layouts have no inverse, so the index is unraveled over the domain instead (see [`idx2crd`]).
    pub fn idx2crd(&self, index: usize) -> Result<Coord, LayoutError> {
        match self.is_dense() {
            true => self.inverse(index),
            false => idx2crd(index, &self.shape),
        }
    }

    /// Maps a coordinate (of any form) to its index. Same as [`IndexFn::value`].
    #[inline]
    pub fn crd2idx(&self, coord: impl Into<Coord>) -> Result<usize, LayoutError> {
        let coord = self.natural_coord(coord)?;
        Ok(dot(&coord, &self.stride))
    }

    /// Maps a linear index known to be within `[0, size)`.
    #[inline]
    pub(crate) fn value_linear(&self, index: usize) -> usize {
        self.leaves()
            .fold((0, index), |(value, rest), (n, d)| match n {
                0 => (value, rest),
                n => (value + (rest % n) * d, rest / n),
            })
            .0
    }

    /// Recovers the natural coordinate that a dense layout maps to `index`.
    pub fn inverse(&self, index: usize) -> Result<Coord, LayoutError> {
        if !self.is_dense() {
            return Err(LayoutError::NotDense(self.clone()));
        }
        let size = self.size();
        if index >= size {
            return Err(LayoutError::IndexOutOfDomain { index, size });
        }
        let mut stride = self.stride.flatten().into_iter();
        let coord = self.shape.map_leaves(&mut |n| match (n, stride.next()) {
            (1, _) | (_, None) => 0,
            (n, Some(d)) => (index / d) % n,
        });
        Ok(coord)
    }

    /// Returns an iterator over indices and their values.
    #[inline]
    pub fn iter_indices(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.size()).map(|index| (index, self.value_linear(index)))
    }

    /// Returns a parallel iterator over indices and their values.
    #[cfg(feature = "rayon")]
    #[inline]
    pub fn par_iter_indices(&self) -> impl rayon::iter::IndexedParallelIterator<Item = (usize, usize)> + '_ {
        use rayon::prelude::*;
        (0..self.size())
            .into_par_iter()
            .map(|index| (index, self.value_linear(index)))
    }

    /// Returns `true` if two layouts are totally equal as index mappings.
    /// Note that this check enumerates the whole domain so only use it in tests.
    #[inline]
    pub fn check_isomorphic(&self, other: impl AsRef<Layout>) -> bool {
        let other = other.as_ref();
        match self.size() == other.size() {
            true => self
                .iter_indices()
                .all(|(index, value)| other.value_linear(index) == value),
            false => false,
        }
    }
}

impl<C: Into<Coord>> IndexFn<C> for Layout {
    type Output = Result<usize, LayoutError>;

    #[inline]
    fn value(&self, index: C) -> Self::Output {
        self.crd2idx(index)
    }
}

/// Unravels a linear index of the domain of `shape` into a natural coordinate,
/// with the leftmost leaf varying fastest. Depends only on the shape.
pub fn idx2crd(index: usize, shape: &IntTuple) -> Result<Coord, LayoutError> {
    let size = shape.product();
    if index >= size {
        return Err(LayoutError::IndexOutOfDomain { index, size });
    }
    natural(&IntTuple::Leaf(index), shape)
}

/// Maps a coordinate of any form to its index under `(shape, stride)`.
pub fn crd2idx(coord: &Coord, shape: &IntTuple, stride: &IntTuple) -> Result<usize, LayoutError> {
    if !shape.congruent(stride) {
        return Err(LayoutError::ShapeStrideMismatch(shape.clone(), stride.clone()));
    }
    let coord = natural(coord, shape)?;
    Ok(dot(&coord, stride))
}

/// Concatenates layouts, each as a top-level mode.
pub fn make_layout(layouts: &[Layout]) -> Layout {
    let shape = layouts.iter().map(|x| x.shape.clone());
    let stride = layouts.iter().map(|x| x.stride.clone());
    Layout::from_parts(IntTuple::tuple(shape), IntTuple::tuple(stride))
}

/// Generalized dot product of congruent tuples.
fn dot(coord: &IntTuple, stride: &IntTuple) -> usize {
    match (coord, stride) {
        (IntTuple::Leaf(x), IntTuple::Leaf(d)) => x * d,
        (x, d) => x
            .modes()
            .iter()
            .zip_eq(d.modes())
            .map(|(x, d)| dot(x, d))
            .sum(),
    }
}

fn natural(coord: &Coord, shape: &IntTuple) -> Result<Coord, LayoutError> {
    let out_of_domain = || LayoutError::CoordOutOfDomain {
        coord: coord.clone(),
        shape: shape.clone(),
    };
    match (coord, shape) {
        (&IntTuple::Leaf(x), &IntTuple::Leaf(n)) if x < n => Ok(coord.clone()),
        (IntTuple::Leaf(_), IntTuple::Leaf(_)) => Err(out_of_domain()),
        (&IntTuple::Leaf(x), IntTuple::Node(shapes)) => {
            if x >= shape.product() {
                return Err(out_of_domain());
            }
            let mut rest = x;
            let coords: Vec<_> = shapes
                .iter()
                .map(|shape| {
                    let n = shape.product();
                    let x = rest % n;
                    rest /= n;
                    natural(&IntTuple::Leaf(x), shape)
                })
                .try_collect()?;
            Ok(IntTuple::tuple(coords))
        }
        (IntTuple::Node(coords), IntTuple::Node(shapes)) if coords.len() == shapes.len() => {
            let coords: Vec<_> = coords
                .iter()
                .zip_eq(shapes.iter())
                .map(|(coord, shape)| natural(coord, shape))
                .try_collect()?;
            Ok(IntTuple::tuple(coords))
        }
        _ => Err(LayoutError::CoordMismatch {
            coord: coord.clone(),
            shape: shape.clone(),
        }),
    }
}
