use std::fmt;

use itertools::Itertools;

use super::layout::{Layout, LayoutError};

/// Limits of a rendered [`Grid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridOptions {
    pub max_rows: usize,
    pub max_cols: usize,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            max_rows: 32,
            max_cols: 32,
        }
    }
}

/// ASCII rendering of a layout of rank 2 or lower.
/// Rows run along mode 0 and columns along mode 1; each cell holds the index the layout maps the cell to.
///
/// ```text
/// ((2, 3):(3, 1))
///     0   1   2
///   +---+---+---+
/// 0 | 0 | 1 | 2 |
///   +---+---+---+
/// 1 | 3 | 4 | 5 |
///   +---+---+---+
/// ```
#[derive(Debug, Clone)]
pub struct Grid {
    layout: Layout,
    options: GridOptions,
}

impl Layout {
    #[inline]
    pub fn grid(&self) -> Result<Grid, LayoutError> {
        self.grid_with(GridOptions::default())
    }

    /// Renders the layout as a grid. Fails if the layout has more than 2 modes.
    pub fn grid_with(&self, options: GridOptions) -> Result<Grid, LayoutError> {
        match self.rank() {
            0..=2 => Ok(Grid {
                layout: self.clone(),
                options,
            }),
            rank => Err(LayoutError::Rank {
                expected: 2,
                actual: rank,
            }),
        }
    }
}

fn digits(x: usize) -> usize {
    x.checked_ilog10().map_or(1, |x| x as usize + 1)
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = &self.layout;
        let (rows, cols) = match (layout.mode(0), layout.mode(1)) {
            (Some(x), Some(y)) if layout.rank() == 2 => (x.size(), y.size()),
            _ => (layout.size(), 1),
        };
        let shown_rows = rows.min(self.options.max_rows);
        let shown_cols = cols.min(self.options.max_cols);

        // the cell at (r, c) is the mode coordinate, whose linear form is r + c × rows
        let value = |r: usize, c: usize| layout.value_linear(r + c * rows);
        let values = (0..shown_rows)
            .map(|r| (0..shown_cols).map(|c| value(r, c)).collect_vec())
            .collect_vec();

        let width = values
            .iter()
            .flatten()
            .copied()
            .chain([shown_cols.saturating_sub(1)])
            .map(digits)
            .max()
            .unwrap_or(1);
        let row_width = digits(shown_rows.saturating_sub(1));
        let more_cols = match shown_cols < cols {
            true => " ...",
            false => "",
        };

        writeln!(f, "{layout}")?;

        let header = (0..shown_cols).map(|c| format!(" {c:>width$}  ")).join("");
        let header = format!("{:pad$}{header}{more_cols}", "", pad = row_width + 2);
        writeln!(f, "{}", header.trim_end())?;

        let separator = format!(
            "{:pad$}+{}",
            "",
            format!("{:-<len$}+", "", len = width + 2).repeat(shown_cols),
            pad = row_width + 1
        );
        writeln!(f, "{separator}")?;
        for (r, row) in values.iter().enumerate() {
            let cells = row.iter().map(|v| format!(" {v:>width$} |")).join("");
            writeln!(f, "{r:>row_width$} |{cells}{more_cols}")?;
            writeln!(f, "{separator}")?;
        }
        if shown_rows < rows {
            writeln!(f, "{:pad$}...", "", pad = row_width + 1)?;
        }
        Ok(())
    }
}
