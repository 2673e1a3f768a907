//! Layout algebra: derives new layouts from existing ones.
//!
//! The operations follow [CuTe's layout algebra](https://github.com/NVIDIA/cutlass/blob/main/media/docs/cute/02_layout_algebra.md).
//! All of them assume the colexicographic convention: the leftmost leaf of a coordinate varies fastest.

use itertools::Itertools;
use rustc_hash::FxHashSet as HashSet;

use super::{
    int_tuple::IntTuple,
    layout::{Layout, LayoutError, make_layout},
};

pub trait Compose<F> {
    type Output;

    /// Functional composition. `t.compose(f)` is `t ◦ f` in algebra.
    fn compose(&self, f: F) -> Self::Output;
}

/// Compact layout in which the rightmost leaf has stride 1.
#[inline]
pub fn row_major(dims: impl Into<IntTuple>) -> Layout {
    let shape: IntTuple = dims.into();
    let stride = shape.suffix_product();
    Layout::from_parts(shape, stride)
}

/// Compact layout in which the leftmost leaf has stride 1.
#[inline]
pub fn col_major(dims: impl Into<IntTuple>) -> Layout {
    Layout::from_shape(dims)
}

/// Creates a compact layout whose strides increase following `order`.
///
/// `order` must be congruent with `shape`, and its leaves must be a permutation of `0..n`,
/// where `n` is the number of leaves. The leaf ranked 0 gets stride 1.
pub fn make_ordered_layout(
    shape: impl Into<IntTuple>,
    order: impl Into<IntTuple>,
) -> Result<Layout, LayoutError> {
    let shape: IntTuple = shape.into();
    let order: IntTuple = order.into();
    let err = || LayoutError::InvalidOrder {
        shape: shape.clone(),
        order: order.clone(),
    };
    if !shape.congruent(&order) {
        return Err(err());
    }

    let ranks = order.flatten();
    let mut seen = HashSet::default();
    if !ranks.iter().all(|&r| r < ranks.len() && seen.insert(r)) {
        return Err(err());
    }

    let extents = shape.flatten();
    let mut stride = vec![0; extents.len()];
    let mut p = 1;
    for i in (0..ranks.len()).sorted_by_key(|&i| ranks[i]) {
        stride[i] = p;
        p *= extents[i];
    }
    let stride = IntTuple::unflatten(&shape, &stride).ok_or_else(err)?;

    let layout = Layout::from_parts(shape, stride);
    log::trace!("ordered layout by {order}: {layout}");
    Ok(layout)
}

#[inline]
pub fn coalesce(layout: &Layout) -> Layout {
    layout.coalesce()
}

#[inline]
pub fn complement(layout: &Layout, cotarget: usize) -> Result<Layout, LayoutError> {
    layout.complement(cotarget)
}

/// `(a ∘ b)(c) = a(b(c))`.
#[inline]
pub fn composition(a: &Layout, b: &Layout) -> Result<Layout, LayoutError> {
    a.compose(b)
}

#[inline]
pub fn logical_product(block: &Layout, tiler: &Layout) -> Result<Layout, LayoutError> {
    block.logical_product(tiler)
}

#[inline]
pub fn blocked_product(tile: &Layout, tiler: &Layout) -> Result<Layout, LayoutError> {
    tile.blocked_product(tiler)
}

#[inline]
pub fn logical_divide(layout: &Layout, tiler: &Layout) -> Result<Layout, LayoutError> {
    layout.logical_divide(tiler)
}

#[inline]
pub fn zipped_divide(layout: &Layout, tilers: &[Layout]) -> Result<Layout, LayoutError> {
    layout.zipped_divide(tilers)
}

#[inline]
pub fn tile_to_shape(tile: &Layout, target: impl Into<IntTuple>) -> Result<Layout, LayoutError> {
    tile.tile_to_shape(target)
}

#[inline]
pub fn tile_to_shape_ordered(
    tile: &Layout,
    target: impl Into<IntTuple>,
    order: impl Into<IntTuple>,
) -> Result<Layout, LayoutError> {
    tile.tile_to_shape_ordered(target, order)
}

fn from_leaves(leaves: Vec<(usize, usize)>) -> Layout {
    match leaves.len() {
        0 => Layout::default(),
        1 => Layout::from_parts(IntTuple::Leaf(leaves[0].0), IntTuple::Leaf(leaves[0].1)),
        _ => {
            let (shape, stride): (Vec<_>, Vec<_>) = leaves
                .into_iter()
                .map(|(n, d)| (IntTuple::Leaf(n), IntTuple::Leaf(d)))
                .unzip();
            Layout::from_parts(IntTuple::tuple(shape), IntTuple::tuple(stride))
        }
    }
}

impl Layout {
    /// Returns a mostly simplified layout with the same 1-D mapping.
    ///
    /// Size-1 modes are removed, and adjacent modes `(n0, n1):(d0, d1)` with `d1 = n0 × d0` are merged.
    pub fn coalesce(&self) -> Self {
        let leaves = self
            .leaves()
            .filter(|&(n, _)| n != 1)
            .coalesce(|(n0, d0), (n1, d1)| match d1 == n0 * d0 {
                true => Ok((n0 * n1, d0)),
                false => Err(((n0, d0), (n1, d1))),
            })
            .collect_vec();
        from_leaves(leaves)
    }

    /// Complements the layout to `cotarget`: the layout that enumerates the gaps of `self`
    /// in `[0, cotarget)`, so that `(self, complement)` covers the range.
    pub fn complement(&self, cotarget: usize) -> Result<Self, LayoutError> {
        if self.size() == 0 {
            return Ok(from_leaves(vec![(cotarget, 1)]));
        }

        let modes = self
            .leaves()
            .filter(|&(n, d)| n != 1 && d != 0)
            .sorted_by_key(|&(n, d)| (d, n));

        let mut leaves = vec![];
        let mut current = 1;
        for (n, d) in modes {
            if d % current != 0 {
                return Err(LayoutError::Complement(self.clone(), cotarget));
            }
            leaves.push((d / current, current));
            current = n * d;
        }
        leaves.push((cotarget.div_ceil(current), current));

        let complement = from_leaves(leaves).coalesce();
        log::trace!("complement of {self} to {cotarget}: {complement}");
        Ok(complement)
    }

    fn compose_leaf(&self, n: usize, d: usize) -> Result<Self, LayoutError> {
        let err = || {
            let rhs = Layout::from_parts(IntTuple::Leaf(n), IntTuple::Leaf(d));
            LayoutError::Composition(self.clone(), rhs)
        };
        if n == 0 || d == 0 {
            return Ok(from_leaves(vec![(n, 0)]));
        }

        let lhs = self.coalesce().leaves().collect_vec();
        let Some((&(_, last), init)) = lhs.split_last() else {
            return Err(err());
        };

        let mut leaves = vec![];
        let (mut rest_n, mut rest_d) = (n, d);
        for &(s, t) in init {
            // the stride must either divide or be divided by the current extent
            if s == 0 || (s % rest_d != 0 && rest_d % s != 0) {
                return Err(err());
            }
            let m = (s / rest_d).max(1).min(rest_n);
            if rest_n % m != 0 {
                return Err(err());
            }
            if m != 1 {
                leaves.push((m, rest_d * t));
            }
            rest_n /= m;
            rest_d = rest_d.div_ceil(s);
        }
        if rest_n != 1 || leaves.is_empty() {
            leaves.push((rest_n, rest_d * last));
        }
        Ok(from_leaves(leaves))
    }

    fn compose_impl(&self, shape: &IntTuple, stride: &IntTuple) -> Result<Self, LayoutError> {
        match (shape, stride) {
            (&IntTuple::Leaf(n), &IntTuple::Leaf(d)) => self.compose_leaf(n, d),
            (shape, stride) => {
                let modes: Vec<_> = shape
                    .modes()
                    .iter()
                    .zip_eq(stride.modes())
                    .map(|(shape, stride)| self.compose_impl(shape, stride))
                    .try_collect()?;
                Ok(make_layout(&modes))
            }
        }
    }

    /// Layout product `A ⊗ B := (A, A* ∘ B)`, where `A*` is the complement of `A`
    /// to `size(A) × cosize(B)`. The second mode enumerates the copies of `A`.
    pub fn logical_product(&self, tiler: impl AsRef<Layout>) -> Result<Self, LayoutError> {
        let tiler = tiler.as_ref();
        let rest = self
            .complement(self.size() * tiler.cosize())?
            .compose(tiler)?;
        Ok(make_layout(&[self.clone(), rest]))
    }

    /// Replicates `self` over each element of the domain of `tiler`, zipping mode by mode:
    /// the `i`-th mode of the result is `(self_i, tiler_i)`, with the strides of `tiler_i` scaled by `size(self)`.
    /// Ranks are matched by padding with `1:0` modes.
    ///
    /// For a compact `self` this agrees with [`Layout::logical_product`] mode by mode.
    pub fn blocked_product(&self, tiler: impl AsRef<Layout>) -> Result<Self, LayoutError> {
        let tiler = tiler.as_ref();
        let rank = self.rank().max(tiler.rank());
        let block = self.append_to(rank);
        let tiler = tiler.append_to(rank);

        let size = block.size();
        let modes = block
            .modes()
            .zip_eq(tiler.modes())
            .map(|(x, y)| {
                let stride = y.stride().map_leaves(&mut |d| d * size);
                let y = Layout::from_parts(y.shape().clone(), stride);
                make_layout(&[x, y])
            })
            .collect_vec();

        let layout = make_layout(&modes);
        log::trace!("blocked product {self} × {tiler}: {layout}");
        Ok(layout)
    }

    /// Layout division `A ⊘ B := A ∘ (B, B*)`, where `B*` is the complement of `B` to `size(A)`.
    /// The first mode is the tile, and the second mode enumerates the tiles.
    pub fn logical_divide(&self, tiler: impl AsRef<Layout>) -> Result<Self, LayoutError> {
        let tiler = tiler.as_ref();
        let complement = tiler.complement(self.size())?;
        let layout = self.compose(make_layout(&[tiler.clone(), complement]))?;
        log::trace!("logical divide {self} / {tiler}: {layout}");
        Ok(layout)
    }

    /// Divides the top-level modes of `self` by `tilers` mode by mode, then gathers the tiles
    /// into the first mode and the rests into the second: `((tile_0, tile_1, ...), (rest_0, rest_1, ...))`.
    ///
    /// Modes without a tiler go to the rest.
    pub fn zipped_divide(&self, tilers: &[Layout]) -> Result<Self, LayoutError> {
        if tilers.len() > self.rank() {
            return Err(LayoutError::Rank {
                expected: self.rank(),
                actual: tilers.len(),
            });
        }

        let mut tiles = vec![];
        let mut rests = vec![];
        for (index, mode) in self.modes().enumerate() {
            match tilers.get(index) {
                Some(tiler) => {
                    let divided = mode.logical_divide(tiler)?;
                    tiles.extend(divided.mode(0));
                    rests.extend(divided.mode(1));
                }
                None => rests.push(mode),
            }
        }
        Ok(make_layout(&[make_layout(&tiles), make_layout(&rests)]))
    }

    /// Repeats `self` as a tile to cover `target`, with tiles enumerated colexicographically.
    /// See [`Layout::tile_to_shape_ordered`].
    pub fn tile_to_shape(&self, target: impl Into<IntTuple>) -> Result<Self, LayoutError> {
        let target: IntTuple = target.into();
        let order = match &target {
            IntTuple::Leaf(_) => IntTuple::Leaf(0),
            IntTuple::Node(modes) => IntTuple::tuple((0..modes.len()).map(IntTuple::Leaf)),
        };
        self.tile_to_shape_ordered(target, order)
    }

    /// Repeats `self` as a tile to cover `target`, one mode per target dimension.
    ///
    /// Each dimension `d` is split into `(tile_d, target_d / tile_d)`. Copies of the tile are laid out
    /// as [`make_ordered_layout`] of the quotient shape with `order`, scaled by the tile's size.
    /// Fails if any target dimension is not a multiple of the tile's.
    ///
    /// A nested target mode is matched by its size only: mode `d` of the result has size
    /// `product(target_d)` and the structure `(tile_d, quotient_d)`, not the nesting of `target_d`.
    pub fn tile_to_shape_ordered(
        &self,
        target: impl Into<IntTuple>,
        order: impl Into<IntTuple>,
    ) -> Result<Self, LayoutError> {
        let target: IntTuple = target.into();
        let rank = target.rank();
        if self.rank() > rank {
            return Err(LayoutError::Rank {
                expected: rank,
                actual: self.rank(),
            });
        }

        let block = self.append_to(rank);
        let quotient: Vec<_> = block
            .modes()
            .zip_eq(target.modes())
            .map(|(tile, target)| match (tile.size(), target.product()) {
                (t, n) if t != 0 && n % t == 0 => Ok(n / t),
                _ => Err(LayoutError::ShapeNotDivisible {
                    target: target.clone(),
                    tile: tile.shape().clone(),
                }),
            })
            .try_collect()?;
        let quotient = match &target {
            IntTuple::Leaf(_) => IntTuple::Leaf(quotient[0]),
            IntTuple::Node(_) => IntTuple::tuple(quotient.into_iter().map(IntTuple::Leaf)),
        };

        let tiler = make_ordered_layout(quotient, order)?;
        block.blocked_product(tiler)
    }
}

impl<T: AsRef<Layout>> Compose<T> for Layout {
    type Output = Result<Self, LayoutError>;

    /// Layout composition. `a.compose(b)` corresponds to `A ∘ B` in layout algebra,
    /// i.e., `(A ∘ B)(c) = A(B(c))`. Distributes over the modes of `B`.
    fn compose(&self, f: T) -> Self::Output {
        let f = f.as_ref();
        let layout = self.compose_impl(f.shape(), f.stride())?;
        log::trace!("{self} ∘ {f} → {layout}");
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::{
        Compose, blocked_product, coalesce, col_major, complement, composition, make_ordered_layout,
        row_major, tile_to_shape,
    };
    use crate::{
        loom::{
            int_tuple::IntTuple,
            layout::{IndexFn, Layout, LayoutError, make_layout},
        },
        tuple,
    };

    fn random_shape(rng: &mut fastrand::Rng, depth: usize) -> IntTuple {
        match depth == 0 || rng.bool() {
            true => IntTuple::Leaf(rng.usize(1..5)),
            false => IntTuple::tuple((0..rng.usize(1..4)).map(|_| random_shape(rng, depth - 1))),
        }
    }

    #[test]
    fn test_row_col_major() -> Result<(), LayoutError> {
        let layout = row_major(tuple!(3, 4));
        assert_eq!(layout.to_string(), "((3, 4):(4, 1))");
        assert_eq!(layout.value(tuple!(1, 1))?, 5);
        assert_eq!(layout.idx2crd(7)?, tuple!(1, 3));

        let layout = col_major(tuple!(3, 4));
        assert_eq!(layout.to_string(), "((3, 4):(1, 3))");

        let layout = row_major(tuple!(2, tuple!(3, 4)));
        assert_eq!(layout.to_string(), "((2, (3, 4)):(12, (4, 1)))");
        let layout = col_major(tuple!(2, tuple!(3, 4)));
        assert_eq!(layout.to_string(), "((2, (3, 4)):(1, (2, 6)))");
        Ok(())
    }

    #[test]
    fn test_row_col_major_dense() {
        let mut rng = fastrand::Rng::with_seed(3);
        for _ in 0..100 {
            let shape = random_shape(&mut rng, 3);
            for layout in [row_major(&shape), col_major(&shape)] {
                assert_eq!(layout.cosize(), layout.size(), "{layout}");
                assert!(layout.is_dense(), "{layout}");
            }
        }
    }

    #[test]
    fn test_make_ordered_layout() -> Result<(), LayoutError> {
        let layout = make_ordered_layout(tuple!(2, 3, 4), tuple!(1, 2, 0))?;
        assert_eq!(layout.to_string(), "((2, 3, 4):(4, 8, 1))");
        assert!(layout.is_dense());

        let layout = make_ordered_layout(tuple!(2, tuple!(3, 4)), tuple!(2, tuple!(0, 1)))?;
        assert_eq!(layout.to_string(), "((2, (3, 4)):(12, (1, 3)))");

        // ascending order is column-major, descending order is row-major
        let shape = tuple!(3, 5, 2);
        assert_eq!(make_ordered_layout(&shape, tuple!(0, 1, 2))?, col_major(&shape));
        assert_eq!(make_ordered_layout(&shape, tuple!(2, 1, 0))?, row_major(&shape));

        for order in [tuple!(0, 0, 1), tuple!(0, 1, 3), tuple!(0, 1), tuple!(0, tuple!(1, 2))] {
            assert!(matches!(
                make_ordered_layout(&shape, order),
                Err(LayoutError::InvalidOrder { .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn test_make_ordered_layout_dense() -> Result<(), LayoutError> {
        let mut rng = fastrand::Rng::with_seed(5);
        for _ in 0..100 {
            let shape = random_shape(&mut rng, 2);
            if shape.product() > 1 << 12 {
                continue;
            }
            let mut ranks = (0..shape.leaf_count()).collect_vec();
            rng.shuffle(&mut ranks);
            let order = IntTuple::unflatten(&shape, &ranks).expect("leaf count matches");
            let layout = make_ordered_layout(&shape, &order)?;
            assert!(layout.is_dense(), "{layout}");
            for index in 0..layout.size() {
                assert_eq!(layout.value(layout.idx2crd(index)?)?, index);
            }
        }
        Ok(())
    }

    #[test]
    fn test_coalesce() -> Result<(), LayoutError> {
        fn check(layout: Layout) {
            let coalesced = layout.coalesce();
            println!("{layout} → {coalesced}");
            assert!(layout.check_isomorphic(&coalesced));
        }

        let layout = Layout::new(tuple!(2, tuple!(1, 6)), tuple!(1, tuple!(6, 2)))?;
        assert_eq!(coalesce(&layout).to_string(), "(12:1)");
        assert_eq!(Layout::new(1usize, 0usize)?.coalesce(), Layout::default());

        check(layout);
        check(Layout::new(1usize, 1usize)?);
        check(col_major(tuple!(2, 4, 6, 2)));
        check(row_major(tuple!(2, 4, 6)));
        check(Layout::new(tuple!(2, 1, 6), tuple!(1, 6, 2))?);
        check(Layout::new(tuple!(2, 1, 6), tuple!(1, 7, 2))?);
        check(Layout::new(tuple!(2, 4, 6), tuple!(4, 1, 8))?);
        check(Layout::new(tuple!(2, 1, 3), tuple!(2, 0, 4))?);
        check(Layout::new(tuple!(tuple!(2, 2), tuple!(2, 3)), tuple!(tuple!(1, 4), tuple!(2, 8)))?);
        Ok(())
    }

    #[test]
    fn test_complement() -> Result<(), LayoutError> {
        fn check(layout: &Layout, size: usize) -> Result<(), LayoutError> {
            let complement = layout.complement(size)?;
            println!("{{{layout}, {size}}} → {complement}");

            // 1. disjoint
            assert!((1..layout.size()).all(|x| {
                (1..complement.size()).all(|y| layout.value_linear(x) != complement.value_linear(y))
            }));

            // 2. ordered
            assert!(
                (0..complement.size())
                    .tuple_windows::<(_, _)>()
                    .all(|(x, y)| complement.value_linear(x) < complement.value_linear(y))
            );

            // 3. bounded
            if layout.size() > 0 {
                assert!(complement.size() >= size / layout.size());
            }

            // 4. together with an injective layout, still injective
            if layout.leaves().all(|(n, d)| n == 1 || d != 0) {
                let product = make_layout(&[layout.clone(), complement]);
                let values = product.iter_indices().map(|(_, value)| value).sorted().collect_vec();
                assert!(values.iter().tuple_windows::<(_, _)>().all(|(x, y)| x < y));
            }

            Ok(())
        }

        check(&Layout::new(1usize, 0usize)?, 5)?;
        check(&Layout::new(1usize, 2usize)?, 8)?;
        check(&Layout::new(4usize, 0usize)?, 8)?;
        check(&Layout::new(4usize, 1usize)?, 4)?;
        check(&Layout::new(4usize, 1usize)?, 8)?;
        check(&Layout::new(4usize, 2usize)?, 16)?;
        check(&Layout::new(4usize, 4usize)?, 16)?;
        check(&Layout::new(tuple!(2, 2), tuple!(4, 1))?, 32)?;
        check(&Layout::new(tuple!(2, 4), tuple!(1, 6))?, 48)?;

        assert_eq!(complement(&Layout::new(4usize, 2usize)?, 16)?.to_string(), "((2, 2):(1, 8))");
        assert_eq!(
            Layout::new(tuple!(2, 2), tuple!(4, 1))?.complement(24)?.to_string(),
            "((2, 3):(2, 8))"
        );

        assert!(matches!(
            Layout::new(tuple!(2, 2), tuple!(2, 3))?.complement(12),
            Err(LayoutError::Complement(_, _))
        ));
        Ok(())
    }

    #[test]
    fn test_composition() -> Result<(), LayoutError> {
        fn check(a: &Layout, b: &Layout) -> Result<Layout, LayoutError> {
            let c = a.compose(b)?;
            println!("{a} ∘ {b} → {c}");

            assert_eq!(c.size(), b.size());
            for index in 0..b.size() {
                let x = b.value(index)?;
                assert_eq!(a.value(x)?, c.value(index)?);
            }
            Ok(c)
        }

        let a = Layout::new(tuple!(6, 2), tuple!(8, 2))?;
        let b = Layout::new(tuple!(4, 3), tuple!(3, 1))?;
        assert_eq!(check(&a, &b)?.to_string(), "(((2, 2), 3):((24, 2), 8))");

        let a = Layout::new(20usize, 2usize)?;
        let b = Layout::new(tuple!(5, 4), tuple!(4, 1))?;
        assert_eq!(check(&a, &b)?.to_string(), "((5, 4):(8, 2))");
        assert_eq!(composition(&a, &b)?, a.compose(&b)?);

        let a = Layout::new(tuple!(10, 2), tuple!(16, 4))?;
        let b = Layout::new(tuple!(5, 4), tuple!(1, 5))?;
        assert_eq!(check(&a, &b)?.to_string(), "((5, (2, 2)):(16, (80, 4)))");

        check(&Layout::new(4usize, 2usize)?, &Layout::new(4usize, 1usize)?)?;
        check(&Layout::new(4usize, 0usize)?, &Layout::new(4usize, 1usize)?)?;
        check(&Layout::new(4usize, 1usize)?, &Layout::new(4usize, 0usize)?)?;
        check(&Layout::new(4usize, 2usize)?, &Layout::new(2usize, 2usize)?)?;
        check(&col_major(tuple!(4, 3)), &col_major(12usize))?;
        check(&col_major(12usize), &col_major(tuple!(4, 3)))?;
        check(&Layout::new(12usize, 2usize)?, &col_major(tuple!(4, 3)))?;
        check(&col_major(12usize), &row_major(tuple!(4, 3)))?;
        check(&col_major(12usize), &Layout::new(tuple!(2, 3), tuple!(2, 4))?)?;
        check(&row_major(tuple!(4, 3)), &Layout::new(tuple!(6, 2), tuple!(2, 1))?)?;
        check(&col_major(tuple!(8, 8)), &Layout::new(tuple!(2, 2, 2, 2, 2, 2), tuple!(1, 16, 4, 8, 2, 32))?)?;
        check(&Layout::new(tuple!(4, 8, 2), tuple!(2, 8, 1))?, &Layout::new(tuple!(2, 2, 2), tuple!(1, 8, 2))?)?;

        // by-mode structure of the right-hand side is kept
        let c = check(&col_major(tuple!(4, 6)), &col_major(tuple!(tuple!(2, 2), 6)))?;
        assert_eq!(c.rank(), 2);

        assert!(matches!(
            Layout::new(tuple!(3, 4), tuple!(4, 1))?.compose(Layout::new(2usize, 2usize)?),
            Err(LayoutError::Composition(_, _))
        ));
        Ok(())
    }

    #[test]
    fn test_logical_product() -> Result<(), LayoutError> {
        let a = Layout::new(tuple!(2, 2), tuple!(4, 1))?;
        let b = Layout::new(6usize, 1usize)?;
        let c = a.logical_product(&b)?;
        assert_eq!(c.to_string(), "(((2, 2), (2, 3)):((4, 1), (2, 8)))");

        let a = Layout::new(tuple!(2, 5), tuple!(5, 1))?;
        let b = Layout::new(tuple!(3, 4), tuple!(1, 3))?;
        let c = a.logical_product(&b)?;
        assert_eq!(c.to_string(), "(((2, 5), (3, 4)):((5, 1), (10, 30)))");
        assert!(c.is_dense());
        Ok(())
    }

    #[test]
    fn test_blocked_product() -> Result<(), LayoutError> {
        let tile = Layout::new(tuple!(2, 5), tuple!(5, 1))?;
        let tiler = col_major(tuple!(3, 4));
        let c = tile.blocked_product(&tiler)?;
        assert_eq!(c.to_string(), "(((2, 3), (5, 4)):((5, 10), (1, 30)))");
        assert_eq!(c.rank(), 2);
        assert!(c.is_dense());

        // element (i, j) of tile (x, y) lives at tile-local index plus the tile's offset
        for (x, y, i, j) in itertools::iproduct!(0..3usize, 0..4usize, 0..2usize, 0..5usize) {
            let coord = tuple!(tuple!(i, x), tuple!(j, y));
            let offset = tiler.value(tuple!(x, y))? * tile.size();
            assert_eq!(c.value(coord)?, tile.value(tuple!(i, j))? + offset);
        }

        // ranks are matched with trivial modes
        let c = col_major(4usize).blocked_product(col_major(tuple!(2, 3)))?;
        assert_eq!(c.to_string(), "(((4, 2), (1, 3)):((1, 4), (0, 8)))");
        Ok(())
    }

    #[test]
    fn test_logical_divide() -> Result<(), LayoutError> {
        let a = Layout::new(tuple!(4, 2, 3), tuple!(2, 1, 8))?;
        let b = Layout::new(4usize, 2usize)?;
        let c = a.logical_divide(&b)?;
        assert_eq!(c.to_string(), "(((2, 2), (2, 3)):((4, 1), (2, 8)))");
        assert_eq!(c.size(), a.size());

        let a = col_major(tuple!(8, 6));
        let c = a.zipped_divide(&[col_major(2usize), col_major(3usize)])?;
        assert_eq!(c.to_string(), "(((2, 3), (4, 2)):((1, 8), (2, 24)))");
        for (i, j, x, y) in itertools::iproduct!(0..2usize, 0..3usize, 0..4usize, 0..2usize) {
            let coord = tuple!(tuple!(i, j), tuple!(x, y));
            assert_eq!(c.value(coord)?, a.value(tuple!(i + 2 * x, j + 3 * y))?);
        }

        let c = a.zipped_divide(&[col_major(2usize)])?;
        assert_eq!(c.to_string(), "(((2), (4, 6)):((1), (2, 8)))");

        assert!(matches!(
            a.zipped_divide(&[col_major(2usize), col_major(2usize), col_major(2usize)]),
            Err(LayoutError::Rank { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_tile_to_shape() -> Result<(), LayoutError> {
        let tile = col_major(tuple!(2, 2));
        let layout = tile.tile_to_shape(tuple!(6, 4))?;
        assert_eq!(layout.to_string(), "(((2, 3), (2, 2)):((1, 4), (2, 12)))");
        assert_eq!(layout.rank(), 2);
        assert_eq!(layout.mode(0).map(|x| x.size()), Some(6));
        assert_eq!(layout.mode(1).map(|x| x.size()), Some(4));
        assert!(layout.is_dense());

        let layout = tile.tile_to_shape_ordered(tuple!(6, 4), tuple!(1, 0))?;
        assert_eq!(layout.to_string(), "(((2, 3), (2, 2)):((1, 8), (2, 4)))");

        let layout = col_major(4usize).tile_to_shape(12usize)?;
        assert_eq!(layout.to_string(), "(((4, 3)):((1, 4)))");

        // a nested target mode is matched by its size
        let layout = tile.tile_to_shape(tuple!(tuple!(2, 2), 4))?;
        assert_eq!(layout.to_string(), "(((2, 2), (2, 2)):((1, 4), (2, 8)))");
        assert_eq!(layout.mode(0).map(|x| x.size()), Some(4));
        assert_eq!(layout.mode(1).map(|x| x.size()), Some(4));
        Ok(())
    }

    #[test]
    fn test_tile_to_shape_sparse_tile() -> Result<(), LayoutError> {
        // copies are spaced by the tile's size, whatever its strides
        let tile = Layout::new(2usize, 2usize)?;
        let layout = tile.tile_to_shape(6usize)?;
        assert_eq!(layout.to_string(), "(((2, 3)):((2, 2)))");
        for (i, x) in itertools::iproduct!(0..2usize, 0..3usize) {
            let coord = tuple!(tuple!(i, x));
            assert_eq!(layout.value(coord)?, tile.value(i)? + 2 * x);
        }

        let layout = tile.blocked_product(col_major(4usize))?;
        assert_eq!(layout.to_string(), "(((2, 4)):((2, 2)))");
        let origins = (0..4usize)
            .map(|x| layout.value(tuple!(tuple!(0, x))))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(origins, vec![0, 2, 4, 6]);

        let tile = Layout::new(tuple!(2, 2), tuple!(3, 1))?;
        let layout = tile.blocked_product(col_major(tuple!(2, 3)))?;
        assert_eq!(layout.to_string(), "(((2, 2), (2, 3)):((3, 4), (1, 8)))");
        Ok(())
    }

    #[test]
    fn test_tile_to_shape_equals_blocked_product() -> Result<(), LayoutError> {
        let mut rng = fastrand::Rng::with_seed(11);
        for _ in 0..100 {
            let rank = rng.usize(1..4);
            let dims = (0..rank).map(|_| rng.usize(1..4)).collect_vec();
            let quotient = (0..rank).map(|_| rng.usize(1..4)).collect_vec();
            let target = dims.iter().zip_eq(&quotient).map(|(x, y)| x * y).collect_vec();

            let tile = match rng.bool() {
                true => row_major(dims.clone()),
                false => col_major(dims.clone()),
            };
            let c = tile_to_shape(&tile, target.clone())?;
            let d = blocked_product(&tile, &col_major(quotient.clone()))?;
            assert_eq!(c.size(), d.size());
            for index in 0..c.size() {
                let coord = c.idx2crd(index)?;
                assert_eq!(c.value(&coord)?, d.value(&coord)?, "{c} vs {d}");
            }

            let order = (0..rank).rev().collect_vec();
            let c = tile.tile_to_shape_ordered(target, order)?;
            let d = tile.blocked_product(row_major(quotient))?;
            assert!(c.check_isomorphic(&d), "{c} vs {d}");
        }
        Ok(())
    }

    #[test]
    fn test_tile_to_shape_not_divisible() -> Result<(), LayoutError> {
        let tile = col_major(tuple!(2, 3));
        assert!(matches!(
            tile.tile_to_shape(tuple!(4, 8)),
            Err(LayoutError::ShapeNotDivisible { .. })
        ));
        assert!(matches!(
            tile.tile_to_shape(tuple!(5, 6)),
            Err(LayoutError::ShapeNotDivisible { .. })
        ));
        assert!(matches!(
            tile.tile_to_shape(6usize),
            Err(LayoutError::Rank { .. })
        ));
        Ok(())
    }
}
