use casey::snake;
use derive_more::Display;
use itertools::Itertools;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A hierarchical tuple of integers: either a single leaf value, or an ordered sequence of [`IntTuple`]s.
///
/// Shapes, strides and coordinates of a [`Layout`](super::layout::Layout) are all [`IntTuple`]s.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntTuple {
    #[display("{_0}")]
    Leaf(usize),
    #[display("({})", _0.iter().format(", "))]
    Node(Box<[IntTuple]>),
}

impl Default for IntTuple {
    /// The empty (rank-0) tuple.
    #[inline]
    fn default() -> Self {
        Self::Node(Box::default())
    }
}

impl From<usize> for IntTuple {
    #[inline]
    fn from(value: usize) -> Self {
        Self::Leaf(value)
    }
}

impl From<&IntTuple> for IntTuple {
    #[inline]
    fn from(value: &IntTuple) -> Self {
        value.clone()
    }
}

impl<T: Into<IntTuple>, const N: usize> From<[T; N]> for IntTuple {
    #[inline]
    fn from(value: [T; N]) -> Self {
        Self::tuple(value.into_iter().map(Into::into))
    }
}

impl<T: Into<IntTuple>> From<Vec<T>> for IntTuple {
    #[inline]
    fn from(value: Vec<T>) -> Self {
        Self::tuple(value.into_iter().map(Into::into))
    }
}

macro_rules! impl_int_tuple_from {
    ($($t:ident),+) => {
        impl<$($t),+> From<($($t,)+)> for IntTuple
        where
            $($t: Into<IntTuple>),+
        {
            #[inline]
            fn from(($(snake!($t),)+): ($($t,)+)) -> Self {
                Self::Node([$(snake!($t).into()),+].into())
            }
        }
    };
}

impl_int_tuple_from!(T0);
impl_int_tuple_from!(T0, T1);
impl_int_tuple_from!(T0, T1, T2);
impl_int_tuple_from!(T0, T1, T2, T3);
impl_int_tuple_from!(T0, T1, T2, T3, T4);
impl_int_tuple_from!(T0, T1, T2, T3, T4, T5);
impl_int_tuple_from!(T0, T1, T2, T3, T4, T5, T6);
impl_int_tuple_from!(T0, T1, T2, T3, T4, T5, T6, T7);

/// Builds a (possibly nested) [`IntTuple`] from literals.
///
/// `tuple!(2, tuple!(3, 4))` is `(2, (3, 4))`.
#[macro_export]
macro_rules! tuple {
    () => {
        $crate::loom::int_tuple::IntTuple::default()
    };
    ($($e:expr),+ $(,)?) => {
        $crate::loom::int_tuple::IntTuple::tuple([$($crate::loom::int_tuple::IntTuple::from($e)),+])
    };
}

impl IntTuple {
    #[inline]
    pub fn leaf(value: usize) -> Self {
        Self::Leaf(value)
    }

    #[inline]
    pub fn tuple(elements: impl IntoIterator<Item = IntTuple>) -> Self {
        Self::Node(elements.into_iter().collect())
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// The leaf value, if this is a leaf.
    #[inline]
    pub fn value(&self) -> Option<usize> {
        match self {
            Self::Leaf(value) => Some(*value),
            Self::Node(_) => None,
        }
    }

    /// The child elements, if this is a node.
    #[inline]
    pub fn elements(&self) -> Option<&[IntTuple]> {
        match self {
            Self::Leaf(_) => None,
            Self::Node(elements) => Some(elements),
        }
    }

    /// Top-level modes. A leaf is its own single mode.
    #[inline]
    pub fn modes(&self) -> &[IntTuple] {
        match self {
            Self::Leaf(_) => std::slice::from_ref(self),
            Self::Node(elements) => elements,
        }
    }

    /// Iterates over top-level modes.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, IntTuple> {
        self.modes().iter()
    }

    /// Number of top-level modes. A leaf has rank 1.
    #[inline]
    pub fn rank(&self) -> usize {
        self.modes().len()
    }

    /// Maximum nesting depth. A leaf has depth 0.
    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::Node(elements) => 1 + elements.iter().map(Self::depth).max().unwrap_or(0),
        }
    }

    /// Retrieves the `i`-th top-level mode.
    #[inline]
    pub fn get(&self, i: usize) -> Option<&IntTuple> {
        self.modes().get(i)
    }

    /// Product of all leaves. The empty tuple has product 1.
    pub fn product(&self) -> usize {
        match self {
            Self::Leaf(value) => *value,
            Self::Node(elements) => elements.iter().map(Self::product).product(),
        }
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Node(elements) => elements.iter().map(Self::leaf_count).sum(),
        }
    }

    /// All leaves, depth-first and left to right.
    pub fn flatten(&self) -> Vec<usize> {
        let mut leaves = Vec::with_capacity(self.leaf_count());
        self.visit(&mut |value| leaves.push(value));
        leaves
    }

    fn visit(&self, f: &mut impl FnMut(usize)) {
        match self {
            Self::Leaf(value) => f(*value),
            Self::Node(elements) => elements.iter().for_each(|x| x.visit(f)),
        }
    }

    /// Returns `true` if both tuples have the same nested structure.
    pub fn congruent(&self, other: &IntTuple) -> bool {
        match (self, other) {
            (Self::Leaf(_), Self::Leaf(_)) => true,
            (Self::Node(x), Self::Node(y)) => {
                x.len() == y.len() && x.iter().zip_eq(y.iter()).all(|(x, y)| x.congruent(y))
            }
            _ => false,
        }
    }

    /// Scatters `flat` back into the tree structure of `profile`.
    /// Returns `None` if the number of values doesn't match the number of leaves.
    pub fn unflatten(profile: &IntTuple, flat: &[usize]) -> Option<Self> {
        fn build(profile: &IntTuple, flat: &mut impl Iterator<Item = usize>) -> Option<IntTuple> {
            match profile {
                IntTuple::Leaf(_) => flat.next().map(IntTuple::Leaf),
                IntTuple::Node(elements) => elements
                    .iter()
                    .map(|x| build(x, flat))
                    .collect::<Option<_>>()
                    .map(IntTuple::Node),
            }
        }

        if flat.len() != profile.leaf_count() {
            return None;
        }
        build(profile, &mut flat.iter().copied())
    }

    /// Applies `f` to every leaf, keeping the structure.
    pub fn map_leaves(&self, f: &mut impl FnMut(usize) -> usize) -> Self {
        match self {
            Self::Leaf(value) => Self::Leaf(f(*value)),
            Self::Node(elements) => Self::Node(elements.iter().map(|x| x.map_leaves(f)).collect()),
        }
    }

    /// Exclusive prefix products of the leaves in colexicographic order, i.e., compact column-major strides.
    pub fn prefix_product(&self) -> Self {
        let mut p = 1;
        self.map_leaves(&mut |n| {
            let q = p;
            p *= n;
            q
        })
    }

    /// Exclusive suffix products of the leaves, i.e., compact row-major strides.
    pub fn suffix_product(&self) -> Self {
        let flat = self.flatten();
        let mut stride = flat
            .iter()
            .rev()
            .scan(1, |p, &n| {
                let q = *p;
                *p *= n;
                Some(q)
            })
            .collect_vec();
        stride.reverse();
        self.map_leaves(&mut {
            let mut stride = stride.into_iter();
            move |_| stride.next().unwrap_or(0)
        })
    }
}

#[inline]
pub fn make_leaf(value: usize) -> IntTuple {
    IntTuple::leaf(value)
}

#[inline]
pub fn make_tuple(elements: impl IntoIterator<Item = IntTuple>) -> IntTuple {
    IntTuple::tuple(elements)
}

#[inline]
pub fn congruent(a: &IntTuple, b: &IntTuple) -> bool {
    a.congruent(b)
}

#[inline]
pub fn product(t: &IntTuple) -> usize {
    t.product()
}

#[inline]
pub fn flatten(t: &IntTuple) -> Vec<usize> {
    t.flatten()
}
