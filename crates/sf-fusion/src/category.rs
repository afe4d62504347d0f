// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::InferError;
use std::fmt;
use std::str::FromStr;

/// Fixed set of part categories with trained checkpoint sets: the ten
/// MVTec 3D-AD industrial classes plus the ten Eyecandies classes. Checkpoint
/// directories and identity strings use the canonical names returned by
/// [`Category::as_str`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Bagel,
    CableGland,
    Carrot,
    Cookie,
    Dowel,
    Foam,
    Peach,
    Potato,
    Rope,
    Tire,
    CandyCane,
    ChocolateCookie,
    ChocolatePraline,
    Confetto,
    GummyBear,
    HazelnutTruffle,
    LicoriceSandwich,
    Lollipop,
    Marshmallow,
    PeppermintCandy,
}

impl Category {
    /// All categories, in checkpoint-set order.
    pub const ALL: [Category; 20] = [
        Category::Bagel,
        Category::CableGland,
        Category::Carrot,
        Category::Cookie,
        Category::Dowel,
        Category::Foam,
        Category::Peach,
        Category::Potato,
        Category::Rope,
        Category::Tire,
        Category::CandyCane,
        Category::ChocolateCookie,
        Category::ChocolatePraline,
        Category::Confetto,
        Category::GummyBear,
        Category::HazelnutTruffle,
        Category::LicoriceSandwich,
        Category::Lollipop,
        Category::Marshmallow,
        Category::PeppermintCandy,
    ];

    /// Canonical name used in checkpoint paths and identity strings.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Bagel => "bagel",
            Category::CableGland => "cable_gland",
            Category::Carrot => "carrot",
            Category::Cookie => "cookie",
            Category::Dowel => "dowel",
            Category::Foam => "foam",
            Category::Peach => "peach",
            Category::Potato => "potato",
            Category::Rope => "rope",
            Category::Tire => "tire",
            Category::CandyCane => "CandyCane",
            Category::ChocolateCookie => "ChocolateCookie",
            Category::ChocolatePraline => "ChocolatePraline",
            Category::Confetto => "Confetto",
            Category::GummyBear => "GummyBear",
            Category::HazelnutTruffle => "HazelnutTruffle",
            Category::LicoriceSandwich => "LicoriceSandwich",
            Category::Lollipop => "Lollipop",
            Category::Marshmallow => "Marshmallow",
            Category::PeppermintCandy => "PeppermintCandy",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = InferError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == name)
            .ok_or_else(|| InferError::UnknownCategory {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "sprocket".parse::<Category>().unwrap_err();
        assert!(matches!(err, InferError::UnknownCategory { name } if name == "sprocket"));
    }
}
