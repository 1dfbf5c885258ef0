use std::str::FromStr;

use derive_more::Display;

use crate::prelude::*;

/// Energy unit declared by the backend.
#[derive(Copy, Clone, Debug, Display, Eq, PartialEq)]
pub enum Unit {
    #[display("Wh")]
    WattHour,

    #[display("kWh")]
    KilowattHour,
}

impl Unit {
    /// Multiplier that converts a value in this unit into kilowatt-hours.
    #[must_use]
    pub const fn kilowatt_hours(self) -> f64 {
        match self {
            Self::WattHour => 0.001,
            Self::KilowattHour => 1.0,
        }
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(unit: &str) -> Result<Self> {
        match unit.trim().to_ascii_uppercase().as_str() {
            "WH" => Ok(Self::WattHour),
            "KWH" => Ok(Self::KilowattHour),
            _ => Err(Error::UnsupportedUnit(unit.to_owned())),
        }
    }
}
