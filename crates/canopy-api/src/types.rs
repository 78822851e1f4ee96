use serde::{Deserialize, Serialize};
use specta::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Vertical,
    #[default]
    Horizontal,
}

impl From<canopy_core::Orientation> for Orientation {
    fn from(value: canopy_core::Orientation) -> Self {
        match value {
            canopy_core::Orientation::Vertical => Self::Vertical,
            canopy_core::Orientation::Horizontal => Self::Horizontal,
        }
    }
}

impl From<Orientation> for canopy_core::Orientation {
    fn from(value: Orientation) -> Self {
        match value {
            Orientation::Vertical => Self::Vertical,
            Orientation::Horizontal => Self::Horizontal,
        }
    }
}
