//! Packing list figures: volumes, weight and cubage (m³).

use core::ops::Add;

use serde::{Deserialize, Serialize};

use ledgerbridge_core::DomainError;

/// Products ship in at most this many boxes.
pub const MAX_BOXES: usize = 6;

/// Estimated kilograms per cubic metre when no weight is entered by hand.
const KG_PER_CUBIC_METRE: f64 = 80.0;

/// Box dimensions in metres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub height: f64,
    pub width: f64,
}

impl Dimensions {
    pub fn new(length: f64, height: f64, width: f64) -> Self {
        Self { length, height, width }
    }

    pub fn cubage(&self) -> f64 {
        self.length * self.height * self.width
    }

    fn validate(&self, index: usize) -> Result<(), DomainError> {
        for (label, value) in [("length", self.length), ("height", self.height), ("width", self.width)] {
            if value < 0.0 {
                return Err(DomainError::validation(format!(
                    "box {} {label} must not be negative",
                    index + 1
                )));
            }
        }
        Ok(())
    }
}

/// Volumes / weight / cubage triple carried by lines, moves and totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PackingFigures {
    pub volumes: f64,
    pub weight_kg: f64,
    pub cubage: f64,
}

impl PackingFigures {
    pub fn scaled(self, quantity: f64) -> Self {
        Self {
            volumes: self.volumes * quantity,
            weight_kg: self.weight_kg * quantity,
            cubage: self.cubage * quantity,
        }
    }
}

impl Add for PackingFigures {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            volumes: self.volumes + rhs.volumes,
            weight_kg: self.weight_kg + rhs.weight_kg,
            cubage: self.cubage + rhs.cubage,
        }
    }
}

impl core::iter::Sum for PackingFigures {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Per-unit packing data of a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackingProfile {
    pub volumes: f64,
    pub weight_kg: f64,
    /// Entered by hand; not derived from `boxes`.
    pub cubage: f64,
    pub boxes: [Dimensions; MAX_BOXES],
}

impl PackingProfile {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.volumes < 0.0 {
            return Err(DomainError::validation("volumes must not be negative"));
        }
        if self.volumes > MAX_BOXES as f64 {
            return Err(DomainError::validation(format!(
                "at most {MAX_BOXES} volumes are supported"
            )));
        }
        if self.weight_kg < 0.0 {
            return Err(DomainError::validation("weight must not be negative"));
        }
        for (i, dims) in self.boxes.iter().enumerate() {
            dims.validate(i)?;
        }
        Ok(())
    }

    pub fn per_unit(&self) -> PackingFigures {
        PackingFigures {
            volumes: self.volumes,
            weight_kg: self.weight_kg,
            cubage: self.cubage,
        }
    }
}

/// Interactive cubage calculation for a single line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CubageCalculator {
    pub volumes: f64,
    pub boxes: [Dimensions; MAX_BOXES],
    /// Weight entered by hand; replaces the cubage-based estimate.
    pub manual_weight_kg: Option<f64>,
}

impl CubageCalculator {
    /// Sum of box cubages over the first `volumes` boxes (capped at six).
    pub fn cubage(&self) -> f64 {
        let count = self.volumes.max(0.0).min(MAX_BOXES as f64) as usize;
        self.boxes.iter().take(count).map(Dimensions::cubage).sum()
    }

    pub fn estimated_weight(&self) -> f64 {
        self.cubage() * KG_PER_CUBIC_METRE
    }

    /// Figures to write back onto the line.
    pub fn compute(&self) -> Result<PackingFigures, DomainError> {
        let weight_kg = match self.manual_weight_kg {
            Some(w) if w <= 0.0 => {
                return Err(DomainError::validation("manual weight must be greater than zero"));
            }
            Some(w) => w,
            None => self.estimated_weight(),
        };
        Ok(PackingFigures {
            volumes: self.volumes,
            weight_kg,
            cubage: self.cubage(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn boxes(first: Dimensions, second: Dimensions) -> [Dimensions; MAX_BOXES] {
        let mut b = [Dimensions::default(); MAX_BOXES];
        b[0] = first;
        b[1] = second;
        b
    }

    #[test]
    fn cubage_only_counts_declared_volumes() {
        let calc = CubageCalculator {
            volumes: 1.0,
            boxes: boxes(Dimensions::new(1.0, 0.5, 0.5), Dimensions::new(2.0, 2.0, 2.0)),
            manual_weight_kg: None,
        };
        assert!((calc.cubage() - 0.25).abs() < 1e-12);
        let figures = calc.compute().unwrap();
        assert!((figures.weight_kg - 20.0).abs() < 1e-12);
    }

    #[test]
    fn manual_weight_overrides_estimate() {
        let calc = CubageCalculator {
            volumes: 2.0,
            boxes: boxes(Dimensions::new(1.0, 1.0, 1.0), Dimensions::new(1.0, 1.0, 1.0)),
            manual_weight_kg: Some(12.5),
        };
        let figures = calc.compute().unwrap();
        assert_eq!(figures.weight_kg, 12.5);
        assert!((figures.cubage - 2.0).abs() < 1e-12);
    }

    #[test]
    fn non_positive_manual_weight_is_rejected() {
        let calc = CubageCalculator { manual_weight_kg: Some(0.0), ..Default::default() };
        assert!(calc.compute().is_err());
    }

    #[test]
    fn profile_limits() {
        let mut profile = PackingProfile { volumes: 7.0, ..Default::default() };
        assert!(profile.validate().is_err());
        profile.volumes = 2.0;
        profile.boxes[3].height = -1.0;
        assert!(profile.validate().is_err());
        profile.boxes[3].height = 0.3;
        assert!(profile.validate().is_ok());
    }

    proptest! {
        #[test]
        fn scaling_is_linear(v in 0.0f64..6.0, w in 0.0f64..500.0, c in 0.0f64..10.0, q in 0.0f64..100.0) {
            let unit = PackingFigures { volumes: v, weight_kg: w, cubage: c };
            let scaled = unit.scaled(q);
            prop_assert!((scaled.weight_kg - w * q).abs() < 1e-6);
            let doubled: PackingFigures = [scaled, scaled].into_iter().sum();
            prop_assert!((doubled.cubage - 2.0 * c * q).abs() < 1e-6);
        }

        #[test]
        fn cubage_never_reads_past_six_boxes(volumes in 0.0f64..20.0) {
            let calc = CubageCalculator {
                volumes,
                boxes: [Dimensions::new(1.0, 1.0, 1.0); MAX_BOXES],
                manual_weight_kg: None,
            };
            prop_assert!(calc.cubage() <= MAX_BOXES as f64);
        }
    }
}
