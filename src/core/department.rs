//! Department identifiers.
//!
//! A department is an independently executable unit of domain work. The set
//! is fixed process-wide; declaration order doubles as the tie-break priority
//! used by the router and the resolver.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An independently executable unit of domain work.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Department {
    Character,
    Story,
    Visual,
    ImageQuality,
    Audio,
    Production,
}

impl Department {
    /// Every department, in priority order.
    pub const ALL: [Department; 6] = [
        Department::Character,
        Department::Story,
        Department::Visual,
        Department::ImageQuality,
        Department::Audio,
        Department::Production,
    ];

    /// Position in the fixed priority order (lower wins ties).
    pub fn priority_rank(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Character => "character",
            Department::Story => "story",
            Department::Visual => "visual",
            Department::ImageQuality => "image-quality",
            Department::Audio => "audio",
            Department::Production => "production",
        }
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Department {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Department::ALL
            .into_iter()
            .find(|d| d.as_str() == normalized)
            .ok_or_else(|| Error::UnknownDepartment(s.to_string()))
    }
}
