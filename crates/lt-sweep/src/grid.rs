//! Cartesian grid over the four sweep axes.

use lt_types::{AxisValues, InvalidGridError, ParameterPoint};

/// Validated axes plus the total point count. Points are decoded on demand,
/// so the grid is never materialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterGrid {
    /// instances, parallel, batch, concurrency
    axes: [Vec<u32>; 4],
    len: usize,
}

impl ParameterGrid {
    pub fn new(axis_values: &AxisValues) -> Result<Self, InvalidGridError> {
        let axes = axis_values.validate()?;
        let len = axes
            .iter()
            .try_fold(1usize, |acc, axis| acc.checked_mul(axis.len()))
            .ok_or_else(|| InvalidGridError::Overflow {
                message: "product of axis lengths exceeds usize".to_string(),
            })?;
        Ok(Self { axes, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false for a validated grid.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Point at `index` in nested order, instances outermost and
    /// concurrency innermost.
    pub fn point(&self, index: usize) -> Option<ParameterPoint> {
        if index >= self.len {
            return None;
        }
        let mut rest = index;
        let mut coords = [0u32; 4];
        for (slot, axis) in coords.iter_mut().zip(&self.axes).rev() {
            *slot = axis[rest % axis.len()];
            rest /= axis.len();
        }
        Some(ParameterPoint::new(coords[0], coords[1], coords[2], coords[3]))
    }

    /// Fresh pass over the grid. Each call starts from the first point.
    pub fn iter(&self) -> GridIter<'_> {
        GridIter {
            grid: self,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for &'a ParameterGrid {
    type Item = ParameterPoint;
    type IntoIter = GridIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct GridIter<'a> {
    grid: &'a ParameterGrid,
    next: usize,
}

impl Iterator for GridIter<'_> {
    type Item = ParameterPoint;

    fn next(&mut self) -> Option<Self::Item> {
        let point = self.grid.point(self.next)?;
        self.next += 1;
        Some(point)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.len.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridIter<'_> {}
