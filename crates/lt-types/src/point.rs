//! Parameter points and the axis values they are drawn from.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::InvalidGridError;

/// The four configuration axes, outer-to-inner in grid order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Instances,
    Parallel,
    Batch,
    Concurrency,
}

impl Axis {
    /// All axes in nesting order (outermost first).
    pub const ALL: [Axis; 4] = [
        Axis::Instances,
        Axis::Parallel,
        Axis::Batch,
        Axis::Concurrency,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Axis::Instances => "instances",
            Axis::Parallel => "parallel",
            Axis::Batch => "batch",
            Axis::Concurrency => "concurrency",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One concrete grid cell: a combination of all four axis values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParameterPoint {
    pub instances: u32,
    pub parallel: u32,
    pub batch: u32,
    pub concurrency: u32,
}

impl ParameterPoint {
    pub fn new(instances: u32, parallel: u32, batch: u32, concurrency: u32) -> Self {
        Self {
            instances,
            parallel,
            batch,
            concurrency,
        }
    }

    /// Value of a single axis.
    pub fn get(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Instances => self.instances,
            Axis::Parallel => self.parallel,
            Axis::Batch => self.batch,
            Axis::Concurrency => self.concurrency,
        }
    }

    /// Total serving slots across all instances.
    pub fn total_slots(&self) -> u64 {
        self.instances as u64 * self.parallel as u64
    }
}

impl fmt::Display for ParameterPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{},{},{})",
            self.instances, self.parallel, self.batch, self.concurrency
        )
    }
}

/// Ordered candidate values for each axis, as supplied by the operator.
///
/// Values are kept signed so that bad input (zero, negatives) can be
/// reported precisely instead of failing at deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxisValues {
    pub instances: Vec<i64>,
    pub parallel: Vec<i64>,
    pub batch: Vec<i64>,
    pub concurrency: Vec<i64>,
}

impl AxisValues {
    pub fn new(
        instances: Vec<i64>,
        parallel: Vec<i64>,
        batch: Vec<i64>,
        concurrency: Vec<i64>,
    ) -> Self {
        Self {
            instances,
            parallel,
            batch,
            concurrency,
        }
    }

    pub fn values(&self, axis: Axis) -> &[i64] {
        match axis {
            Axis::Instances => &self.instances,
            Axis::Parallel => &self.parallel,
            Axis::Batch => &self.batch,
            Axis::Concurrency => &self.concurrency,
        }
    }

    /// Check every axis is non-empty, strictly positive and free of
    /// duplicates, and return the validated values as `u32` in axis order.
    pub fn validate(&self) -> Result<[Vec<u32>; 4], InvalidGridError> {
        let mut out: [Vec<u32>; 4] = Default::default();
        for (slot, axis) in out.iter_mut().zip(Axis::ALL) {
            let raw = self.values(axis);
            if raw.is_empty() {
                return Err(InvalidGridError::EmptyAxis {
                    axis: axis.name().to_string(),
                });
            }
            for (i, &value) in raw.iter().enumerate() {
                if value <= 0 {
                    return Err(InvalidGridError::NonPositiveValue {
                        axis: axis.name().to_string(),
                        value,
                    });
                }
                if raw[..i].contains(&value) {
                    return Err(InvalidGridError::DuplicateValue {
                        axis: axis.name().to_string(),
                        value,
                    });
                }
                let value = u32::try_from(value).map_err(|_| InvalidGridError::Overflow {
                    message: format!("axis '{axis}' value {value} exceeds u32"),
                })?;
                slot.push(value);
            }
        }
        Ok(out)
    }

    /// Product of the axis lengths.
    pub fn grid_size(&self) -> Option<usize> {
        Axis::ALL
            .iter()
            .try_fold(1usize, |acc, axis| acc.checked_mul(self.values(*axis).len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_display_matches_grid_tuple() {
        let point = ParameterPoint::new(2, 1, 8, 4);
        assert_eq!(point.to_string(), "(2,1,8,4)");
        assert_eq!(point.total_slots(), 2);
        assert_eq!(point.get(Axis::Batch), 8);
    }

    #[test]
    fn validate_rejects_empty_axis() {
        let axes = AxisValues::new(vec![1], vec![], vec![8], vec![1]);
        assert_eq!(
            axes.validate(),
            Err(InvalidGridError::EmptyAxis {
                axis: "parallel".into()
            })
        );
    }

    #[test]
    fn validate_rejects_zero_and_negative() {
        let axes = AxisValues::new(vec![1, 0], vec![1], vec![8], vec![1]);
        assert!(matches!(
            axes.validate(),
            Err(InvalidGridError::NonPositiveValue { value: 0, .. })
        ));

        let axes = AxisValues::new(vec![1], vec![1], vec![8], vec![-2]);
        assert!(matches!(
            axes.validate(),
            Err(InvalidGridError::NonPositiveValue { value: -2, .. })
        ));
    }

    #[test]
    fn validate_rejects_repeated_values() {
        let axes = AxisValues::new(vec![1, 2], vec![1], vec![8, 16, 8], vec![1]);
        assert_eq!(
            axes.validate(),
            Err(InvalidGridError::DuplicateValue {
                axis: "batch".into(),
                value: 8
            })
        );
    }

    #[test]
    fn axis_values_deserialize_from_named_mapping() {
        let json = r#"{"instances":[1,2],"parallel":[1],"batch":[8],"concurrency":[1,4]}"#;
        let axes: AxisValues = serde_json::from_str(json).unwrap();
        assert_eq!(axes.grid_size(), Some(4));

        let unknown = r#"{"instances":[1],"parallel":[1],"batch":[8],"concurrency":[1],"threads":[2]}"#;
        assert!(serde_json::from_str::<AxisValues>(unknown).is_err());
    }
}
