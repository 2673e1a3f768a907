//! The `loom` module provides the hierarchical layout algebra underlying tensors and kernels.
//! A layout maps multidimensional logical coordinates to linear storage indices.
//!
//! ## Key Components
//! 1. **Integer Tuples**:
//!    - Recursively nested tuples of integers (`IntTuple`) for shapes, strides and coordinates.
//!
//! 2. **Layouts**:
//!    - Congruent shape and stride pairs (`Layout`) mapping coordinates to indices.
//!    - Linear, R-tuple and natural coordinate forms, all unraveled colexicographically.
//!
//! 3. **Layout Algebra**:
//!    - Coalescing, complement, composition, products and divisions.
//!    - Row/column-major and ordered constructors, tiling a layout to a shape.
//!
//! 4. **Tensor Views**:
//!    - Binding layouts to borrowed storage (`LayoutTensor`, `LayoutTensorMut`).
//!    - Tiling and distributing elements over threads.
//!
//! ## Design Principles
//! - **Purity**: layouts are immutable values; every operation derives a new one.
//! - **Safety**: coordinates are validated against the domain before indexing.

pub mod algebra;
pub mod int_tuple;
pub mod layout;
pub mod num;
pub mod print;
pub mod slice;
pub mod tensor;
