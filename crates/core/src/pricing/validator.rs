use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::measurement::{Measurements, RoomMeasurement};
use crate::errors::FieldIssue;

/// Largest plausible area for a single room surface.
pub const MAX_ROOM_AREA_SQFT: i64 = 50_000;
/// Largest plausible total for one surface across a whole job.
pub const MAX_TOTAL_AREA_SQFT: i64 = 1_000_000;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<FieldIssue>,
    /// Non-fatal findings such as room sums that disagree with the totals.
    pub warnings: Vec<FieldIssue>,
}

pub trait MeasurementValidator: Send + Sync {
    fn validate(&self, measurements: &Measurements) -> ValidationReport;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StructuralValidator;

impl MeasurementValidator for StructuralValidator {
    fn validate(&self, measurements: &Measurements) -> ValidationReport {
        validate(measurements)
    }
}

pub fn validate(measurements: &Measurements) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let total_ceiling = Decimal::from(MAX_TOTAL_AREA_SQFT);

    let totals = [
        ("totalWallsSqft", measurements.total_walls_sqft),
        ("totalCeilingsSqft", measurements.total_ceilings_sqft),
        ("totalTrimSqft", measurements.total_trim_sqft),
    ];
    for (field, value) in totals {
        check_area(field, value, total_ceiling, &mut errors);
    }

    match &measurements.rooms {
        Some(rooms) if rooms.is_empty() => {
            if measurements.has_any_area() {
                errors.push(FieldIssue::new(
                    "rooms",
                    "rooms is present but empty while totals are non-zero; omit rooms or list them",
                ));
            }
        }
        Some(rooms) => {
            let before = errors.len();
            for (index, room) in rooms.iter().enumerate() {
                check_room(index, room, &mut errors);
            }
            if errors.len() == before {
                compare_room_sums(measurements, &mut warnings);
            }
        }
        None => {}
    }

    ValidationReport { is_valid: errors.is_empty(), errors, warnings }
}

fn check_area(field: &str, value: Decimal, ceiling: Decimal, errors: &mut Vec<FieldIssue>) {
    if value < Decimal::ZERO {
        errors.push(FieldIssue::new(field, format!("must be zero or greater (got {value})")));
    } else if value > ceiling {
        errors.push(FieldIssue::new(
            field,
            format!("{value} sq ft is implausibly large (limit {ceiling} sq ft)"),
        ));
    }
}

fn check_room(index: usize, room: &RoomMeasurement, errors: &mut Vec<FieldIssue>) {
    let room_ceiling = Decimal::from(MAX_ROOM_AREA_SQFT);
    if room.name.trim().is_empty() {
        errors.push(FieldIssue::new(format!("rooms[{index}].name"), "room name is required"));
    }
    check_area(&format!("rooms[{index}].wallsSqft"), room.walls_sqft, room_ceiling, errors);
    check_area(&format!("rooms[{index}].ceilingsSqft"), room.ceilings_sqft, room_ceiling, errors);
    check_area(&format!("rooms[{index}].trimSqft"), room.trim_sqft, room_ceiling, errors);
}

fn compare_room_sums(measurements: &Measurements, warnings: &mut Vec<FieldIssue>) {
    let (walls, ceilings, trim) = measurements.room_sums();
    let pairs = [
        ("totalWallsSqft", measurements.total_walls_sqft, walls),
        ("totalCeilingsSqft", measurements.total_ceilings_sqft, ceilings),
        ("totalTrimSqft", measurements.total_trim_sqft, trim),
    ];
    for (field, total, sum) in pairs {
        if total != sum {
            warnings.push(FieldIssue::new(
                field,
                format!("total {total} differs from room sum {sum}; the total is used for pricing"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::validate;
    use crate::domain::measurement::{Measurements, RoomCategory, RoomMeasurement};

    fn room(name: &str, walls: i64) -> RoomMeasurement {
        RoomMeasurement {
            name: name.to_string(),
            category: RoomCategory::Bedroom,
            walls_sqft: Decimal::new(walls, 0),
            ceilings_sqft: Decimal::ZERO,
            trim_sqft: Decimal::ZERO,
        }
    }

    #[test]
    fn totals_only_measurements_are_valid() {
        let report =
            validate(&Measurements::from_totals(Decimal::new(1000, 0), Decimal::ZERO, Decimal::ZERO));
        assert!(report.is_valid);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn negative_area_is_rejected_with_field_name() {
        let report =
            validate(&Measurements::from_totals(Decimal::new(-5, 0), Decimal::ZERO, Decimal::ZERO));
        assert!(!report.is_valid);
        assert_eq!(report.errors[0].field, "totalWallsSqft");
    }

    #[test]
    fn empty_room_list_with_totals_is_ambiguous() {
        let mut measurements =
            Measurements::from_totals(Decimal::new(300, 0), Decimal::ZERO, Decimal::ZERO);
        measurements.rooms = Some(Vec::new());

        let report = validate(&measurements);
        assert!(!report.is_valid);
        assert_eq!(report.errors[0].field, "rooms");
    }

    #[test]
    fn empty_room_list_without_totals_is_fine() {
        let measurements = Measurements { rooms: Some(Vec::new()), ..Measurements::default() };
        assert!(validate(&measurements).is_valid);
    }

    #[test]
    fn implausible_room_area_is_rejected() {
        let report = validate(&Measurements::from_rooms(vec![room("Warehouse", 60_000)]));
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|issue| issue.field == "rooms[0].wallsSqft"));
    }

    #[test]
    fn mismatched_room_sums_warn_without_failing() {
        let mut measurements = Measurements::from_rooms(vec![room("Den", 200), room("Study", 150)]);
        measurements.total_walls_sqft = Decimal::new(400, 0);

        let report = validate(&measurements);
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].field, "totalWallsSqft");
        assert_eq!(measurements.total_walls_sqft, Decimal::new(400, 0));
    }

    #[test]
    fn oversized_rooms_are_reported_without_summing() {
        let giant = RoomMeasurement { walls_sqft: Decimal::MAX, ..room("Hangar", 0) };
        let mut measurements = Measurements::from_rooms(vec![giant.clone(), giant]);
        measurements.total_walls_sqft = Decimal::new(500, 0);

        let report = validate(&measurements);
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|issue| issue.field == "rooms[1].wallsSqft"));
        assert!(report.warnings.is_empty());
    }
}
