//! Enumerated device parameters

use std::fmt;

use serde::Deserialize;

use crate::frame::{Message, ProtocolError};

/// Power state as encoded in `on_off`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OnOff {
    /// Unit running
    On = 1,
    /// Unit stopped
    Off = 2,
}

impl OnOff {
    /// Decode the wire value, if known
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::On),
            2 => Some(Self::Off),
            _ => None,
        }
    }

    /// The wire value
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<bool> for OnOff {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

/// Humidity setpoint as encoded in `s_umd`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TargetHumidity {
    /// 40 % relative humidity
    FortyPercent = 1,
    /// 50 % relative humidity
    FiftyPercent = 2,
    /// 60 % relative humidity
    SixtyPercent = 3,
}

impl TargetHumidity {
    /// Decode the wire value, if known
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::FortyPercent),
            2 => Some(Self::FiftyPercent),
            3 => Some(Self::SixtyPercent),
            _ => None,
        }
    }

    /// The wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The setpoint in percent relative humidity
    pub fn percent(self) -> u8 {
        match self {
            Self::FortyPercent => 40,
            Self::FiftyPercent => 50,
            Self::SixtyPercent => 60,
        }
    }
}

/// Operating preset reported in `mod`
///
/// Codes this crate has no name for are preserved in [`DeviceMode::Other`] so that a
/// status round-trip never loses information.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DeviceMode {
    /// Balanced flow with heat recovery
    HeatRecovery,
    /// Extraction only
    Extraction,
    /// Immission (supply) only
    Immission,
    /// Heat recovery driven by the humidity setpoint
    HumidityRecovery,
    /// Extraction driven by the humidity setpoint
    HumidityExtraction,
    /// Summer comfort preset
    ComfortSummer,
    /// Winter comfort preset
    ComfortWinter,
    /// Heat recovery driven by humidity and CO2
    HumidityCo2Recovery,
    /// Extraction driven by humidity and CO2
    HumidityCo2Extraction,
    /// A preset without a dedicated variant
    Other(u8),
}

impl DeviceMode {
    /// The preset reported by a status response
    ///
    /// Only `mod` is inspected, so other malformed fields do not matter here. A response
    /// without `mod` reports heat recovery, matching [`DeviceStatus`](crate::DeviceStatus).
    pub fn from_status(message: &Message) -> Result<Self, ProtocolError> {
        let Some(value) = message.get("mod") else {
            return Ok(Self::HeatRecovery);
        };
        u8::deserialize(value)
            .map(Self::from)
            .map_err(|source| ProtocolError::Payload {
                what: "mode",
                source,
            })
    }

    /// The wire value
    pub fn code(self) -> u8 {
        match self {
            Self::HeatRecovery => 1,
            Self::Extraction => 2,
            Self::Immission => 3,
            Self::HumidityRecovery => 4,
            Self::HumidityExtraction => 5,
            Self::ComfortSummer => 6,
            Self::ComfortWinter => 7,
            Self::HumidityCo2Recovery => 10,
            Self::HumidityCo2Extraction => 11,
            Self::Other(code) => code,
        }
    }
}

impl From<u8> for DeviceMode {
    fn from(code: u8) -> Self {
        match code {
            1 => Self::HeatRecovery,
            2 => Self::Extraction,
            3 => Self::Immission,
            4 => Self::HumidityRecovery,
            5 => Self::HumidityExtraction,
            6 => Self::ComfortSummer,
            7 => Self::ComfortWinter,
            10 => Self::HumidityCo2Recovery,
            11 => Self::HumidityCo2Extraction,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HeatRecovery => "heat recovery",
            Self::Extraction => "extraction",
            Self::Immission => "immission",
            Self::HumidityRecovery => "humidity recovery",
            Self::HumidityExtraction => "humidity extraction",
            Self::ComfortSummer => "comfort summer",
            Self::ComfortWinter => "comfort winter",
            Self::HumidityCo2Recovery => "humidity/CO2 recovery",
            Self::HumidityCo2Extraction => "humidity/CO2 extraction",
            Self::Other(code) => return write!(f, "mode {code}"),
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mode_codes_round_trip() {
        for code in 0..=u8::MAX {
            assert_eq!(DeviceMode::from(code).code(), code);
        }
    }

    #[test]
    fn mode_from_status() {
        let status = |value| Message::from_value(value).unwrap();
        assert_eq!(
            DeviceMode::from_status(&status(json!({"mod": 4, "v_AirQ": 1.5, "par_rt": "x"})))
                .unwrap(),
            DeviceMode::HumidityRecovery
        );
        assert_eq!(
            DeviceMode::from_status(&status(json!({"res": 1}))).unwrap(),
            DeviceMode::HeatRecovery
        );
        assert!(matches!(
            DeviceMode::from_status(&status(json!({"mod": "auto"}))),
            Err(ProtocolError::Payload { what: "mode", .. })
        ));
    }

    #[test]
    fn unknown_codes() {
        assert_eq!(OnOff::from_code(0), None);
        assert_eq!(TargetHumidity::from_code(4), None);
        assert_eq!(DeviceMode::from(42), DeviceMode::Other(42));
        assert_eq!(DeviceMode::Other(42).to_string(), "mode 42");
    }
}
