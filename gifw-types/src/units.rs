//! Distance units and measurement formatting.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GifwTypesError;

const METRES_IN_MILE: f64 = 1609.344;
const METRES_IN_FOOT: f64 = 0.3048;
const METRES_IN_YARD: f64 = 0.9144;
const METRES_IN_NAUTICAL_MILE: f64 = 1852.0;
const SQ_METRES_IN_ACRE: f64 = 4046.856_422_4;
const SQ_METRES_IN_HECTARE: f64 = 10_000.0;

/// Unit of length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceUnit {
    /// Meters.
    #[serde(rename = "m")]
    Metres,
    /// Kilometers.
    #[serde(rename = "km")]
    Kilometres,
    /// International miles.
    #[serde(rename = "mi")]
    Miles,
    /// Feet.
    #[serde(rename = "ft")]
    Feet,
    /// Yards.
    #[serde(rename = "yd")]
    Yards,
    /// Nautical miles.
    #[serde(rename = "nmi")]
    NauticalMiles,
}

impl DistanceUnit {
    fn metres_in_unit(&self) -> f64 {
        match self {
            DistanceUnit::Metres => 1.0,
            DistanceUnit::Kilometres => 1000.0,
            DistanceUnit::Miles => METRES_IN_MILE,
            DistanceUnit::Feet => METRES_IN_FOOT,
            DistanceUnit::Yards => METRES_IN_YARD,
            DistanceUnit::NauticalMiles => METRES_IN_NAUTICAL_MILE,
        }
    }

    /// Converts a distance in this unit into meters.
    pub fn to_metres(&self, value: f64) -> f64 {
        value * self.metres_in_unit()
    }

    /// Converts a distance in meters into this unit.
    pub fn from_metres(&self, metres: f64) -> f64 {
        metres / self.metres_in_unit()
    }

    /// Short unit code.
    pub fn abbreviation(&self) -> &'static str {
        match self {
            DistanceUnit::Metres => "m",
            DistanceUnit::Kilometres => "km",
            DistanceUnit::Miles => "mi",
            DistanceUnit::Feet => "ft",
            DistanceUnit::Yards => "yd",
            DistanceUnit::NauticalMiles => "nmi",
        }
    }
}

impl FromStr for DistanceUnit {
    type Err = GifwTypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "m" | "metres" | "meters" => DistanceUnit::Metres,
            "km" | "kilometres" | "kilometers" => DistanceUnit::Kilometres,
            "mi" | "miles" => DistanceUnit::Miles,
            "ft" | "feet" => DistanceUnit::Feet,
            "yd" | "yards" => DistanceUnit::Yards,
            "nmi" | "nauticalmiles" => DistanceUnit::NauticalMiles,
            other => return Err(GifwTypesError::UnknownUnit(other.to_string())),
        })
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// Unit system used to present measurements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    /// Meters, hectares and kilometers.
    #[default]
    Metric,
    /// Feet, acres and miles.
    Imperial,
}

impl UnitSystem {
    /// Name of the unit system as stored in settings.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        }
    }

    /// Formats a length given in meters.
    pub fn format_length(&self, metres: f64) -> String {
        match self {
            UnitSystem::Metric if metres < 1000.0 => format!("{metres:.2} m"),
            UnitSystem::Metric => format!("{:.2} km", metres / 1000.0),
            UnitSystem::Imperial if metres < METRES_IN_MILE => {
                format!("{:.2} ft", metres / METRES_IN_FOOT)
            }
            UnitSystem::Imperial => format!("{:.2} mi", metres / METRES_IN_MILE),
        }
    }

    /// Formats an area given in square meters.
    pub fn format_area(&self, sq_metres: f64) -> String {
        match self {
            UnitSystem::Metric if sq_metres < SQ_METRES_IN_HECTARE => {
                format!("{sq_metres:.2} m²")
            }
            UnitSystem::Metric if sq_metres < 1_000_000.0 => {
                format!("{:.2} ha", sq_metres / SQ_METRES_IN_HECTARE)
            }
            UnitSystem::Metric => format!("{:.2} km²", sq_metres / 1_000_000.0),
            UnitSystem::Imperial if sq_metres < SQ_METRES_IN_ACRE => {
                format!("{:.2} ft²", sq_metres / (METRES_IN_FOOT * METRES_IN_FOOT))
            }
            UnitSystem::Imperial if sq_metres < METRES_IN_MILE * METRES_IN_MILE => {
                format!("{:.2} acres", sq_metres / SQ_METRES_IN_ACRE)
            }
            UnitSystem::Imperial => format!(
                "{:.2} mi²",
                sq_metres / (METRES_IN_MILE * METRES_IN_MILE)
            ),
        }
    }
}

impl FromStr for UnitSystem {
    type Err = GifwTypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metric" => Ok(UnitSystem::Metric),
            "imperial" => Ok(UnitSystem::Imperial),
            other => Err(GifwTypesError::UnknownUnit(other.to_string())),
        }
    }
}
