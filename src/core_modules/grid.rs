// THEORY:
// The `Grid` is the shared, "dumb" raster container for everything the pipeline
// produces that is not an 8-bit image: the four-way label mask coming out of the
// segmentation engines, the 0/255 foreground indicator, and the normalized
// foreground probability. It is row-major, knows its own dimensions, and does
// nothing clever. Keeping it generic means every stage speaks the same indexing
// language, and the dimension checks between stages reduce to comparing two
// `(width, height)` pairs.

/// A row-major 2D grid of values with explicit dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

impl<T: Clone> Grid<T> {
    /// Creates a grid where every cell holds `value`.
    pub fn filled(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }
}

impl<T> Grid<T> {
    /// Wraps an existing buffer. Returns `None` when the buffer length does not
    /// match `width * height`.
    pub fn from_vec(width: u32, height: u32, data: Vec<T>) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self { width, height, data })
    }

    /// Builds a grid by evaluating `f(x, y)` for every cell in row-major order.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> T) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn index_of(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn get(&self, x: u32, y: u32) -> Option<&T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(self.index_of(x, y))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// Applies `f` to every cell, producing a grid of the same shape.
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Grid<U> {
        Grid {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_rejects_wrong_length() {
        assert!(Grid::from_vec(3, 2, vec![0u8; 5]).is_none());
        assert!(Grid::from_vec(3, 2, vec![0u8; 6]).is_some());
    }

    #[test]
    fn from_fn_is_row_major() {
        let grid = Grid::from_fn(3, 2, |x, y| (x, y));
        assert_eq!(grid.as_slice()[0], (0, 0));
        assert_eq!(grid.as_slice()[2], (2, 0));
        assert_eq!(grid.as_slice()[3], (0, 1));
        assert_eq!(grid.get(2, 1), Some(&(2, 1)));
        assert_eq!(grid.get(3, 0), None);
    }

    #[test]
    fn map_keeps_dimensions() {
        let grid = Grid::filled(4, 5, 2u8);
        let doubled = grid.map(|v| f64::from(*v) * 2.0);
        assert_eq!(doubled.dimensions(), (4, 5));
        assert!(doubled.iter().all(|v| *v == 4.0));
    }
}
