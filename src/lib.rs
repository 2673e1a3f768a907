pub mod loom;

pub use loom::{
    algebra::{Compose, col_major, make_ordered_layout, row_major},
    int_tuple::IntTuple,
    layout::{Coord, IndexFn, Layout, LayoutError, make_layout},
    tensor::{LayoutTensor, LayoutTensorMut, TensorError},
};
