/// Facility registry for the air-quality forecasting service.
///
/// Defines the canonical list of industrial facilities monitored by this
/// service, and the pollutant codes forecast for each of them. This is the
/// single source of truth for facility names; other modules should
/// reference facilities from here rather than hardcoding coordinates.

pub use crate::model::{
    POLLUTANT_CO, POLLUTANT_NO, POLLUTANT_NO2, POLLUTANT_O3, POLLUTANT_PM10, POLLUTANT_PM2_5,
    POLLUTANT_SO2,
};

// ---------------------------------------------------------------------------
// Pollutants
// ---------------------------------------------------------------------------

/// Every pollutant the service can forecast, in display order.
pub static POLLUTANTS: &[&str] = &[
    POLLUTANT_CO,
    POLLUTANT_NO,
    POLLUTANT_NO2,
    POLLUTANT_O3,
    POLLUTANT_SO2,
    POLLUTANT_PM2_5,
    POLLUTANT_PM10,
];

/// ASCII-safe display name for a pollutant code, e.g. `pm2_5` → `PM2.5`.
/// Unknown codes are upper-cased.
pub fn pollutant_display_name(code: &str) -> String {
    match code {
        POLLUTANT_CO => "CO".to_string(),
        POLLUTANT_NO => "NO".to_string(),
        POLLUTANT_NO2 => "NO2".to_string(),
        POLLUTANT_O3 => "O3".to_string(),
        POLLUTANT_SO2 => "SO2".to_string(),
        POLLUTANT_PM2_5 => "PM2.5".to_string(),
        POLLUTANT_PM10 => "PM10".to_string(),
        other => other.to_uppercase(),
    }
}

pub fn is_known_pollutant(code: &str) -> bool {
    POLLUTANTS.contains(&code)
}

// ---------------------------------------------------------------------------
// Facility metadata
// ---------------------------------------------------------------------------

/// Metadata for a single monitored facility.
#[derive(Debug, PartialEq)]
pub struct Facility {
    /// Display name, also used as the facility identifier in logs and the
    /// replay database.
    pub name: &'static str,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
}

/// All facilities monitored for hazardous air quality.
pub static FACILITY_REGISTRY: &[Facility] = &[
    Facility {
        name: "Refinery A",
        latitude: 51.1414,
        longitude: 71.4861,
    },
    Facility {
        name: "Compressor Station B",
        latitude: 47.1001,
        longitude: 51.9265,
    },
    Facility {
        name: "Gas Terminal C",
        latitude: 42.8820,
        longitude: 74.5827,
    },
    Facility {
        name: "Storage Site D",
        latitude: 43.2220,
        longitude: 76.8512,
    },
];

/// Returns the names of all monitored facilities.
pub fn all_facility_names() -> Vec<&'static str> {
    FACILITY_REGISTRY.iter().map(|f| f.name).collect()
}

/// Looks up a facility by name (case-insensitive). Returns `None` if not found.
pub fn find_facility(name: &str) -> Option<&'static Facility> {
    FACILITY_REGISTRY
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(name.trim()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_duplicate_facility_names() {
        let mut seen = std::collections::HashSet::new();
        for facility in FACILITY_REGISTRY {
            assert!(
                seen.insert(facility.name),
                "duplicate facility '{}' found in FACILITY_REGISTRY",
                facility.name
            );
        }
    }

    #[test]
    fn test_coordinates_are_valid_wgs84() {
        for facility in FACILITY_REGISTRY {
            assert!(
                (-90.0..=90.0).contains(&facility.latitude),
                "latitude out of range for '{}'",
                facility.name
            );
            assert!(
                (-180.0..=180.0).contains(&facility.longitude),
                "longitude out of range for '{}'",
                facility.name
            );
        }
    }

    #[test]
    fn test_find_facility_is_case_insensitive() {
        let facility = find_facility("refinery a").expect("Refinery A should be in registry");
        assert_eq!(facility.name, "Refinery A");
        assert!(find_facility("  Gas Terminal C ").is_some());
    }

    #[test]
    fn test_find_facility_returns_none_for_unknown_name() {
        assert!(find_facility("Offshore Platform Z").is_none());
    }

    #[test]
    fn test_all_facility_names_matches_registry_length() {
        assert_eq!(all_facility_names().len(), FACILITY_REGISTRY.len());
    }

    #[test]
    fn test_pollutant_codes_are_distinct_lowercase() {
        let mut seen = std::collections::HashSet::new();
        for code in POLLUTANTS {
            assert!(seen.insert(*code), "duplicate pollutant code '{}'", code);
            assert_eq!(*code, code.to_lowercase());
        }
        assert_eq!(POLLUTANTS.len(), 7);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(pollutant_display_name("pm2_5"), "PM2.5");
        assert_eq!(pollutant_display_name("no2"), "NO2");
        assert_eq!(pollutant_display_name("nh3"), "NH3");
        assert!(is_known_pollutant("o3"));
        assert!(!is_known_pollutant("nh3"));
    }
}
