use derive_more::{Deref, DerefMut};
use itertools::Itertools;
use thiserror::Error;

use super::{
    algebra::Compose,
    int_tuple::IntTuple,
    layout::{IndexFn, Layout, LayoutError, make_layout},
    num::{DataType, Scalar},
    slice::Slice,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TensorError {
    #[error("tensor type error: {0} bytes cannot be viewed as {1}")]
    Type(usize, DataType),
    #[error("tensor creation error: layout {0} at offset {1} exceeds data len {2}")]
    Create(Layout, usize, usize),
    #[error("tile {coord} is out of range: there are {count} tiles along mode {mode}")]
    TileIndexOutOfRange {
        coord: IntTuple,
        mode: usize,
        count: usize,
    },
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Whether `mode` splits into tiles of `t` consecutive coordinates that each map affinely,
/// i.e., `t` lines up with the extents of the coalesced leaves of `mode`.
fn tiles_evenly(mode: &Layout, t: usize) -> bool {
    if mode.size() == 0 {
        return true;
    }
    if mode.size() % t != 0 {
        return false;
    }
    let mut rest = t;
    for (n, _) in mode.coalesce().leaves() {
        match rest {
            1 => break,
            r if r % n == 0 => rest /= n,
            r if n % r == 0 => rest = 1,
            _ => return false,
        }
    }
    rest == 1
}

/// Where a tensor lives inside its storage: a layout plus the index of its origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorView {
    layout: Layout,
    offset: usize,
}

impl TensorView {
    fn new(layout: Layout, offset: usize, len: usize) -> Result<Self, TensorError> {
        let end = offset.checked_add(layout.cosize());
        if layout.size() > 0 && end.is_none_or(|end| end > len) {
            return Err(TensorError::Create(layout, offset, len));
        }
        log::debug!("tensor view {layout} at {offset} over {len} elements");
        Ok(Self { layout, offset })
    }

    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of elements in the view.
    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage index of the element at `coord`.
    #[inline]
    pub fn index(&self, coord: impl Into<IntTuple>) -> Result<usize, TensorError> {
        Ok(self.offset + self.layout.value(coord)?)
    }

    #[inline]
    fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.layout
            .iter_indices()
            .map(|(_, value)| self.offset + value)
    }

    fn slice(&self, slice: &Slice) -> Result<Self, TensorError> {
        let (layout, offset) = self.layout.slice(slice)?;
        let offset = self.offset + offset;
        Ok(Self { layout, offset })
    }

    /// Cuts each top-level mode into tiles of `tile_shape` and selects the tile at `tile_coords`.
    ///
    /// A flat mode may end with a partial tile, which is clipped to the extent.
    /// A nested mode must be divisible by the tile, and the tile must line up with its leaves.
    fn tile(&self, tile_shape: IntTuple, tile_coords: IntTuple) -> Result<Self, TensorError> {
        let rank = self.layout.rank();
        for r in [tile_shape.rank(), tile_coords.rank()] {
            if r != rank {
                let err = LayoutError::Rank {
                    expected: rank,
                    actual: r,
                };
                return Err(err.into());
            }
        }

        let mut offset = self.offset;
        let mut modes = Vec::with_capacity(rank);
        for (index, ((mode, tile), coord)) in self
            .layout
            .modes()
            .zip_eq(tile_shape.modes())
            .zip_eq(tile_coords.modes())
            .enumerate()
        {
            let Some(k) = coord.value() else {
                let err = LayoutError::CoordMismatch {
                    coord: tile_coords.clone(),
                    shape: tile_shape.clone(),
                };
                return Err(err.into());
            };
            let (extent, t) = (mode.size(), tile.product());
            if t == 0 {
                let err = LayoutError::ShapeNotDivisible {
                    target: mode.shape().clone(),
                    tile: tile.clone(),
                };
                return Err(err.into());
            }
            let count = extent.div_ceil(t);
            if k >= count {
                return Err(TensorError::TileIndexOutOfRange {
                    coord: tile_coords.clone(),
                    mode: index,
                    count,
                });
            }

            match (mode.shape(), mode.stride()) {
                (&IntTuple::Leaf(_), &IntTuple::Leaf(stride)) => {
                    let n = t.min(extent - k * t);
                    modes.push(Layout::new(n, stride)?);
                    offset += k * t * stride;
                }
                _ if !tiles_evenly(&mode, t) => {
                    let err = LayoutError::ShapeNotDivisible {
                        target: mode.shape().clone(),
                        tile: tile.clone(),
                    };
                    return Err(err.into());
                }
                _ => {
                    modes.push(mode.compose(Layout::from_shape(t))?);
                    offset += mode.value_linear(k * t);
                }
            }
        }

        let layout = match self.layout.shape().is_leaf() {
            true => modes.into_iter().next().unwrap_or_default(),
            false => make_layout(&modes),
        };
        Ok(Self { layout, offset })
    }

    /// Deals the elements to the threads of `thread_layout` cyclically, mode by mode,
    /// and selects the fragment owned by `thread_id`.
    ///
    /// The `d`-th mode of `thread_layout` splits the `d`-th mode of the tensor;
    /// tensor modes beyond the rank of `thread_layout` are not split.
    fn distribute(&self, thread_layout: &Layout, thread_id: usize) -> Result<Self, TensorError> {
        if thread_layout.rank() > self.layout.rank() {
            let err = LayoutError::Rank {
                expected: self.layout.rank(),
                actual: thread_layout.rank(),
            };
            return Err(err.into());
        }

        let coord = thread_layout.inverse(thread_id)?;
        let coord = thread_layout.mode_coord(coord)?;

        let tilers = thread_layout
            .modes()
            .map(|mode| Layout::from_shape(mode.size()))
            .collect_vec();
        for (mode, tiler) in self.layout.modes().zip(&tilers) {
            let t = tiler.size();
            if t == 0 || !tiles_evenly(&mode, t) {
                let err = LayoutError::ShapeNotDivisible {
                    target: mode.shape().clone(),
                    tile: tiler.shape().clone(),
                };
                return Err(err.into());
            }
        }

        // ((thread modes...), (fragment modes...))
        let divided = self.layout.zipped_divide(&tilers)?;
        let threads = divided.mode(0).unwrap_or_default();
        let layout = divided.mode(1).unwrap_or_default();
        let offset = self.offset + threads.value(coord)?;
        Ok(Self { layout, offset })
    }
}

/// A read-only tensor over borrowed storage.
#[derive(Debug, Clone, Deref)]
pub struct LayoutTensor<'a, T> {
    #[deref]
    view: TensorView,
    data: &'a [T],
}

impl<'a, T: Scalar> LayoutTensor<'a, T> {
    /// Binds `layout` to `data`. Fails if the layout addresses past the end of `data`.
    #[inline]
    pub fn new(data: &'a [T], layout: Layout) -> Result<Self, TensorError> {
        Self::with_offset(data, layout, 0)
    }

    #[inline]
    pub fn with_offset(data: &'a [T], layout: Layout, offset: usize) -> Result<Self, TensorError> {
        let view = TensorView::new(layout, offset, data.len())?;
        Ok(Self { view, data })
    }

    /// Reinterprets a raw byte region as elements of `T`.
    pub fn from_bytes(bytes: &'a [u8], layout: Layout) -> Result<Self, TensorError> {
        let data: &[T] = bytemuck::try_cast_slice(bytes)
            .map_err(|_| TensorError::Type(bytes.len(), T::DATA_TYPE))?;
        Self::new(data, layout)
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        T::DATA_TYPE
    }

    #[inline]
    pub fn get(&self, coord: impl Into<IntTuple>) -> Result<&'a T, TensorError> {
        let index = self.view.index(coord)?;
        Ok(&self.data[index])
    }

    /// Iterates over elements in the colexicographic order of the domain.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &'a T> + '_ {
        let data = self.data;
        self.view.indices().map(move |index| &data[index])
    }

    #[cfg(feature = "rayon")]
    pub fn par_iter(&self) -> impl rayon::iter::IndexedParallelIterator<Item = &'a T> + '_ {
        use rayon::prelude::*;
        let (data, offset) = (self.data, self.offset());
        self.layout()
            .par_iter_indices()
            .map(move |(_, value)| &data[offset + value])
    }

    #[inline]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().copied().collect()
    }

    pub fn slice(&self, slice: impl Into<Slice>) -> Result<Self, TensorError> {
        let view = self.view.slice(&slice.into())?;
        let data = self.data;
        Ok(Self { view, data })
    }

    /// Selects the tile at `tile_coords` after cutting each mode into tiles of `tile_shape`.
    pub fn tile(
        &self,
        tile_shape: impl Into<IntTuple>,
        tile_coords: impl Into<IntTuple>,
    ) -> Result<Self, TensorError> {
        let view = self.view.tile(tile_shape.into(), tile_coords.into())?;
        let data = self.data;
        Ok(Self { view, data })
    }

    /// Selects the fragment of `thread_id` when the tensor is dealt over `thread_layout`.
    pub fn distribute(&self, thread_layout: &Layout, thread_id: usize) -> Result<Self, TensorError> {
        let view = self.view.distribute(thread_layout, thread_id)?;
        let data = self.data;
        Ok(Self { view, data })
    }
}

/// A mutable tensor over borrowed storage.
#[derive(Debug, Deref, DerefMut)]
pub struct LayoutTensorMut<'a, T> {
    #[deref]
    #[deref_mut]
    view: TensorView,
    data: &'a mut [T],
}

impl<'a, T: Scalar> LayoutTensorMut<'a, T> {
    #[inline]
    pub fn new(data: &'a mut [T], layout: Layout) -> Result<Self, TensorError> {
        Self::with_offset(data, layout, 0)
    }

    #[inline]
    pub fn with_offset(data: &'a mut [T], layout: Layout, offset: usize) -> Result<Self, TensorError> {
        let view = TensorView::new(layout, offset, data.len())?;
        Ok(Self { view, data })
    }

    /// Reinterprets a raw byte region as elements of `T`.
    pub fn from_bytes(bytes: &'a mut [u8], layout: Layout) -> Result<Self, TensorError> {
        let len = bytes.len();
        let data: &mut [T] =
            bytemuck::try_cast_slice_mut(bytes).map_err(|_| TensorError::Type(len, T::DATA_TYPE))?;
        Self::new(data, layout)
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        T::DATA_TYPE
    }

    /// Borrows the tensor as a read-only one.
    #[inline]
    pub fn as_tensor(&self) -> LayoutTensor<'_, T> {
        let view = self.view.clone();
        let data = &*self.data;
        LayoutTensor { view, data }
    }

    #[inline]
    pub fn get(&self, coord: impl Into<IntTuple>) -> Result<&T, TensorError> {
        let index = self.view.index(coord)?;
        Ok(&self.data[index])
    }

    #[inline]
    pub fn get_mut(&mut self, coord: impl Into<IntTuple>) -> Result<&mut T, TensorError> {
        let index = self.view.index(coord)?;
        Ok(&mut self.data[index])
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.view.indices().map(|index| &self.data[index])
    }

    #[inline]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().copied().collect()
    }

    /// Writes `value` to every element of the view.
    pub fn fill(&mut self, value: T) {
        let Self { view, data } = self;
        for index in view.indices() {
            data[index] = value;
        }
    }

    /// Writes zeros to every element of the view.
    #[inline]
    pub fn zero(&mut self) {
        self.fill(T::zero())
    }

    pub fn slice(&mut self, slice: impl Into<Slice>) -> Result<LayoutTensorMut<'_, T>, TensorError> {
        let view = self.view.slice(&slice.into())?;
        let data = &mut *self.data;
        Ok(LayoutTensorMut { view, data })
    }

    pub fn tile(
        &mut self,
        tile_shape: impl Into<IntTuple>,
        tile_coords: impl Into<IntTuple>,
    ) -> Result<LayoutTensorMut<'_, T>, TensorError> {
        let view = self.view.tile(tile_shape.into(), tile_coords.into())?;
        let data = &mut *self.data;
        Ok(LayoutTensorMut { view, data })
    }

    pub fn distribute(
        &mut self,
        thread_layout: &Layout,
        thread_id: usize,
    ) -> Result<LayoutTensorMut<'_, T>, TensorError> {
        let view = self.view.distribute(thread_layout, thread_id)?;
        let data = &mut *self.data;
        Ok(LayoutTensorMut { view, data })
    }
}
