//! Which operating presets accept which adjustments

use std::fmt;

use thiserror::Error;

use crate::device::DeviceMode;

/// A mode-gated adjustment
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Manual fan speed (`spd_row`)
    FanSpeed,
    /// Humidity setpoint selection (`s_umd`)
    TargetHumidity,
    /// Night mode (`night_mod`)
    NightMode,
}

const MODULAR_FAN_SPEED_MODES: &[DeviceMode] = &[
    DeviceMode::HeatRecovery,
    DeviceMode::Extraction,
    DeviceMode::Immission,
    DeviceMode::ComfortSummer,
    DeviceMode::ComfortWinter,
];

const HUMIDITY_SELECTOR_MODES: &[DeviceMode] = &[
    DeviceMode::HumidityRecovery,
    DeviceMode::HumidityExtraction,
    DeviceMode::HumidityCo2Recovery,
    DeviceMode::HumidityCo2Extraction,
];

impl Capability {
    /// Presets in which this adjustment is accepted
    pub fn allowed_modes(self) -> &'static [DeviceMode] {
        match self {
            // Night mode caps the fan, so it is only offered where the speed is user-set
            Self::FanSpeed | Self::NightMode => MODULAR_FAN_SPEED_MODES,
            Self::TargetHumidity => HUMIDITY_SELECTOR_MODES,
        }
    }

    /// Whether the device accepts this adjustment while running in `mode`
    pub fn supported_in(self, mode: DeviceMode) -> bool {
        self.allowed_modes().contains(&mode)
    }

    /// Fail with [`NotSupported`] unless `mode` allows this adjustment or `force` is set
    pub fn check(self, mode: DeviceMode, force: bool) -> Result<(), NotSupported> {
        if force || self.supported_in(mode) {
            return Ok(());
        }
        Err(NotSupported {
            capability: self,
            mode,
        })
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FanSpeed => "fan speed",
            Self::TargetHumidity => "target humidity",
            Self::NightMode => "night mode",
        })
    }
}

/// An adjustment was requested in a preset that does not accept it
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error("{capability} is not supported in {mode} mode")]
pub struct NotSupported {
    /// The rejected adjustment
    pub capability: Capability,
    /// The preset the device reported
    pub mode: DeviceMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_speed_gate() {
        assert!(Capability::FanSpeed.supported_in(DeviceMode::HeatRecovery));
        assert!(!Capability::FanSpeed.supported_in(DeviceMode::HumidityRecovery));
    }

    #[test]
    fn humidity_gate() {
        assert!(Capability::TargetHumidity.supported_in(DeviceMode::HumidityCo2Extraction));
        assert!(!Capability::TargetHumidity.supported_in(DeviceMode::ComfortWinter));
    }

    #[test]
    fn force_overrides() {
        let err = Capability::NightMode
            .check(DeviceMode::HumidityExtraction, false)
            .unwrap_err();
        assert_eq!(err.mode, DeviceMode::HumidityExtraction);
        assert_eq!(
            err.to_string(),
            "night mode is not supported in humidity extraction mode"
        );
        assert!(Capability::NightMode
            .check(DeviceMode::HumidityExtraction, true)
            .is_ok());
    }

    #[test]
    fn unknown_modes_are_gated() {
        assert!(Capability::FanSpeed
            .check(DeviceMode::Other(12), false)
            .is_err());
    }
}
