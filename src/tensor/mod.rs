//! Dense row-major grids shared by every row of a generation batch.
//!
//! [`Grid`] is the 2D `(rows, cols)` container used for the token batch, the
//! prompt mask and the logprob table. [`Logits`] is the 3D
//! `(rows, width, vocab)` block returned by a scoring model.

use crate::error::InferenceError;

/// A fixed-shape 2D grid stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

/// Token ids, one row per sequence.
pub type TokenGrid = Grid<u32>;

/// Per-position log-probabilities, same shape as the token grid.
pub type LogprobGrid = Grid<f32>;

impl<T: Copy> Grid<T> {
    /// Create a grid with every cell set to `value`.
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Build a grid from row-major data.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, InferenceError> {
        if data.len() != rows * cols {
            return Err(InferenceError::ShapeMismatch {
                expected: vec![rows, cols],
                actual: vec![data.len()],
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[T] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        let start = row * self.cols;
        &mut self.data[start..start + self.cols]
    }

    /// Copy out the column range `[start, end)` of every row.
    ///
    /// # Panics
    /// Panics if the range is reversed or exceeds the grid width.
    pub fn columns(&self, start: usize, end: usize) -> Grid<T> {
        assert!(
            start <= end && end <= self.cols,
            "column range {}..{} out of bounds for width {}",
            start,
            end,
            self.cols
        );
        let width = end - start;
        let mut data = Vec::with_capacity(self.rows * width);
        for r in 0..self.rows {
            data.extend_from_slice(&self.row(r)[start..end]);
        }
        Grid {
            rows: self.rows,
            cols: width,
            data,
        }
    }
}

/// Vocabulary logits for a `(rows, width)` slice of token positions.
#[derive(Debug, Clone)]
pub struct Logits {
    shape: [usize; 3],
    data: Vec<f32>,
}

impl Logits {
    /// Create logits of shape `(rows, width, vocab)` from row-major data.
    pub fn new(rows: usize, width: usize, vocab: usize, data: Vec<f32>) -> Result<Self, InferenceError> {
        if data.len() != rows * width * vocab {
            return Err(InferenceError::ShapeMismatch {
                expected: vec![rows, width, vocab],
                actual: vec![data.len()],
            });
        }
        Ok(Self {
            shape: [rows, width, vocab],
            data,
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    pub fn width(&self) -> usize {
        self.shape[1]
    }

    pub fn vocab_size(&self) -> usize {
        self.shape[2]
    }

    /// The vocabulary vector at `(row, pos)`.
    pub fn at(&self, row: usize, pos: usize) -> &[f32] {
        let vocab = self.shape[2];
        let start = (row * self.shape[1] + pos) * vocab;
        &self.data[start..start + vocab]
    }

    /// The vocabulary vector at the last scored position of `row`.
    pub fn last(&self, row: usize) -> &[f32] {
        self.at(row, self.shape[1] - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_filled_and_set() {
        let mut g = Grid::filled(2, 3, 0u32);
        g.set(1, 2, 7);
        assert_eq!(g.row(0), &[0, 0, 0]);
        assert_eq!(g.row(1), &[0, 0, 7]);
        assert_eq!(g.shape(), [2, 3]);
    }

    #[test]
    fn test_grid_from_vec_rejects_bad_len() {
        let err = Grid::from_vec(2, 2, vec![1u32, 2, 3]).unwrap_err();
        assert!(matches!(err, InferenceError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_grid_columns_slice() {
        let g = Grid::from_vec(2, 4, vec![1u32, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let s = g.columns(1, 3);
        assert_eq!(s.shape(), [2, 2]);
        assert_eq!(s.row(0), &[2, 3]);
        assert_eq!(s.row(1), &[6, 7]);
    }

    #[test]
    fn test_grid_empty_columns() {
        let g = Grid::filled(3, 4, 1u32);
        let s = g.columns(2, 2);
        assert_eq!(s.shape(), [3, 0]);
        assert!(s.row(1).is_empty());
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_grid_columns_out_of_range() {
        let g = Grid::filled(1, 2, 0u32);
        let _ = g.columns(1, 3);
    }

    #[test]
    fn test_logits_indexing() {
        // 2 rows, 2 positions, vocab 3
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let logits = Logits::new(2, 2, 3, data).unwrap();
        assert_eq!(logits.at(0, 1), &[3.0, 4.0, 5.0]);
        assert_eq!(logits.last(1), &[9.0, 10.0, 11.0]);
        assert_eq!(logits.shape(), [2, 2, 3]);
    }

    #[test]
    fn test_logits_shape_mismatch() {
        assert!(Logits::new(1, 2, 3, vec![0.0; 5]).is_err());
    }
}
