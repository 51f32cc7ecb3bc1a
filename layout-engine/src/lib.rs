//! FILENAME: layout-engine/src/lib.rs
//! Row and cell layout for the data grid.
//!
//! Derives, for every rendered row, the per-cell span, class, visibility,
//! accessibility and display-value metadata from the row kind and the
//! compiled column model. Pure: no state is kept between calls.
//!
//! Layers:
//! - `view`: Renderable descriptors (WHAT we display)
//! - `engine`: Layout functions (HOW rows are derived)

pub mod view;
pub mod engine;

pub use view::*;
pub use engine::{
    content_rows, filter_row, format_cell_value, header_rows, layout_row, summary_rows,
    LayoutContext, RowInput,
};
