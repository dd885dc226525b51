use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomCategory {
    Bedroom,
    Bathroom,
    Kitchen,
    LivingRoom,
    DiningRoom,
    Hallway,
    Office,
    Exterior,
    #[default]
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Walls,
    Ceilings,
    Trim,
}

impl Surface {
    pub const ALL: [Surface; 3] = [Surface::Walls, Surface::Ceilings, Surface::Trim];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Walls => "walls",
            Self::Ceilings => "ceilings",
            Self::Trim => "trim",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "walls" | "wall" => Some(Self::Walls),
            "ceilings" | "ceiling" => Some(Self::Ceilings),
            "trim" | "trims" => Some(Self::Trim),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMeasurement {
    pub name: String,
    #[serde(default)]
    pub category: RoomCategory,
    #[serde(default)]
    pub walls_sqft: Decimal,
    #[serde(default)]
    pub ceilings_sqft: Decimal,
    #[serde(default)]
    pub trim_sqft: Decimal,
}

/// Raw surface areas for one quote.
///
/// `rooms: None` means the totals were entered directly. `Some(vec![])` is kept
/// distinct so the validator can reject an empty room list that claims areas.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurements {
    #[serde(default)]
    pub total_walls_sqft: Decimal,
    #[serde(default)]
    pub total_ceilings_sqft: Decimal,
    #[serde(default)]
    pub total_trim_sqft: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rooms: Option<Vec<RoomMeasurement>>,
}

impl Measurements {
    pub fn from_totals(walls: Decimal, ceilings: Decimal, trim: Decimal) -> Self {
        Self {
            total_walls_sqft: walls,
            total_ceilings_sqft: ceilings,
            total_trim_sqft: trim,
            rooms: None,
        }
    }

    pub fn from_rooms(rooms: Vec<RoomMeasurement>) -> Self {
        let mut measurements = Self { rooms: Some(rooms), ..Self::default() };
        let (walls, ceilings, trim) = measurements.room_sums();
        measurements.total_walls_sqft = walls;
        measurements.total_ceilings_sqft = ceilings;
        measurements.total_trim_sqft = trim;
        measurements
    }

    pub fn area(&self, surface: Surface) -> Decimal {
        match surface {
            Surface::Walls => self.total_walls_sqft,
            Surface::Ceilings => self.total_ceilings_sqft,
            Surface::Trim => self.total_trim_sqft,
        }
    }

    pub fn has_any_area(&self) -> bool {
        Surface::ALL.iter().any(|surface| self.area(*surface) > Decimal::ZERO)
    }

    /// Sums of (walls, ceilings, trim) over the room list; zero when absent.
    /// Saturates at the `Decimal` bounds.
    pub fn room_sums(&self) -> (Decimal, Decimal, Decimal) {
        self.rooms.iter().flatten().fold(
            (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
            |(walls, ceilings, trim), room| {
                (
                    walls.saturating_add(room.walls_sqft),
                    ceilings.saturating_add(room.ceilings_sqft),
                    trim.saturating_add(room.trim_sqft),
                )
            },
        )
    }
}
