//! Constraints between two localizations and their assembly into the MLCP.

pub mod data;
pub mod implementation;
pub mod localization;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use data::{ConstraintData, ConstraintRow};
pub use implementation::{
    BuildContext, BuildFn, ConstraintImplementation, ConstraintImplementationRegistry,
};
pub use localization::Localization;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstraintType {
    Contact,
    FrictionalContact,
    FixedPoint,
    Sliding,
    FixedRotationVector,
}

impl ConstraintType {
    pub const ALL: [ConstraintType; 5] = [
        ConstraintType::Contact,
        ConstraintType::FrictionalContact,
        ConstraintType::FixedPoint,
        ConstraintType::Sliding,
        ConstraintType::FixedRotationVector,
    ];

    /// Whether the rows act on attachment points rather than on orientations.
    pub fn is_positional(self) -> bool {
        self != ConstraintType::FixedRotationVector
    }
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintType::Contact => "contact",
            ConstraintType::FrictionalContact => "frictional contact",
            ConstraintType::FixedPoint => "fixed point",
            ConstraintType::Sliding => "sliding",
            ConstraintType::FixedRotationVector => "fixed rotation vector",
        };
        f.write_str(name)
    }
}

/// Side of a constraint; the positive side moves along the constraint directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintSide {
    Positive,
    Negative,
}

impl ConstraintSide {
    pub fn sign(self) -> f64 {
        match self {
            ConstraintSide::Positive => 1.0,
            ConstraintSide::Negative => -1.0,
        }
    }
}

/// Constraint between two attachment points, rebuilt into MLCP rows every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub data: ConstraintData,
    /// Positive then negative attachment point.
    pub localizations: (Localization, Localization),
}

impl Constraint {
    pub fn new(data: ConstraintData, positive: Localization, negative: Localization) -> Self {
        Self {
            data,
            localizations: (positive, negative),
        }
    }

    pub fn constraint_type(&self) -> ConstraintType {
        self.data.constraint_type()
    }

    pub fn num_rows(&self) -> usize {
        self.data.num_rows()
    }

    pub fn localization(&self, side: ConstraintSide) -> &Localization {
        match side {
            ConstraintSide::Positive => &self.localizations.0,
            ConstraintSide::Negative => &self.localizations.1,
        }
    }
}
