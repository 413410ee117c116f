//! Typed view of a `stato_sync` response

use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::{
    device::{DeviceMode, OnOff},
    frame::{Message, ProtocolError},
};

/// Free memory below which a device is no longer considered healthy, in bytes
const MIN_HEALTHY_MEMORY: i64 = 10_000;

/// Complete device status
///
/// Fields missing from the response take their default values; fields of the wrong JSON type
/// make decoding fail.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceStatus {
    /// Exchange sequence number
    #[serde(default)]
    pub idp: u32,
    /// Sender of the frame (`frm`)
    #[serde(default, rename = "frm")]
    pub frame_from: String,
    /// Command echoed by the device (`cmd`)
    #[serde(default, rename = "cmd")]
    pub command: String,
    /// Response code (`res`); 1 on success
    #[serde(default, rename = "res")]
    pub response: i64,
    /// Identification and hardware details
    #[serde(flatten)]
    pub device_info: DeviceInfo,
    /// Live sensor readings
    #[serde(flatten)]
    pub sensors: SensorReadings,
    /// Raw parameter tables
    #[serde(flatten)]
    pub parameters: ParameterArrays,
    /// Current operating state
    #[serde(flatten)]
    pub operating: OperatingParameters,
    /// Controller diagnostics
    #[serde(flatten)]
    pub system: SystemInfo,
    #[serde(skip)]
    raw: Map<String, Value>,
}

impl DeviceStatus {
    /// Decode the payload of a successful status query
    pub fn from_message(message: &Message) -> Result<Self, ProtocolError> {
        let raw = message.fields().clone();
        let mut status = serde_json::from_value::<Self>(Value::Object(raw.clone()))
            .map_err(|source| ProtocolError::Payload {
                what: "status",
                source,
            })?;
        status.raw = raw;
        Ok(status)
    }

    /// The payload exactly as received
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Whether the unit is switched on
    pub fn is_on(&self) -> bool {
        self.operating.is_on()
    }

    /// Successful response, no active errors and enough free memory
    pub fn is_healthy(&self) -> bool {
        self.response == 1
            && !self.parameters.has_errors()
            && self.system.memory_free > MIN_HEALTHY_MEMORY
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pico device status: {}", self.device_info.name)?;
        writeln!(f, "  Firmware: {}", self.device_info.firmware_full())?;
        writeln!(f, "  Temperature: {:.1}°C", self.sensors.temperature_celsius())?;
        writeln!(f, "  Humidity: {:.1}%", self.sensors.humidity_percent())?;
        writeln!(f, "  Mode: {}", self.operating.mode)?;
        writeln!(f, "  Status: {}", if self.is_on() { "ON" } else { "OFF" })?;
        writeln!(f, "  Fan speed: {}", self.operating.speed)?;
        writeln!(f, "  Errors: {}", self.parameters.active_errors().count())?;
        writeln!(f, "  Uptime: {:.1} days", self.system.uptime_days())?;
        write!(f, "  Memory free: {:.1} KB", self.system.memory_free_kb())
    }
}

/// Identification and hardware details
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    /// Address the device reports for itself
    pub ip: String,
    /// Firmware version (`fw_ver`)
    #[serde(rename = "fw_ver")]
    pub firmware_version: String,
    /// Firmware release note (`fw_note`)
    #[serde(rename = "fw_note")]
    pub firmware_note: String,
    /// Protocol version (`vr`)
    #[serde(rename = "vr")]
    pub version: i64,
    /// Hardware model (`modello`)
    #[serde(rename = "modello")]
    pub model: i64,
    /// Base or top mounting variant (`BaseTop`)
    #[serde(rename = "BaseTop")]
    pub base_top: i64,
    /// Datamatrix code printed on the board (`Grd_DM`)
    #[serde(rename = "Grd_DM")]
    pub grid_datamatrix: String,
    /// Configuration mode (`config_mod`)
    #[serde(rename = "config_mod")]
    pub config_mode: i64,
    /// Position of this unit in a master/slave group (`id_slave`)
    #[serde(rename = "id_slave")]
    pub slave_id: i64,
    /// User-assigned device name
    pub name: String,
    /// Non-zero when slave units are attached
    pub has_slave: i64,
    /// Bitmap of attached slave units (`bmp_slave`)
    #[serde(rename = "bmp_slave")]
    pub slave_bitmap: i64,
}

impl DeviceInfo {
    /// Version and release note, e.g. `2.1 (stable)`
    pub fn firmware_full(&self) -> String {
        format!("{} ({})", self.firmware_version, self.firmware_note)
    }

    /// Whether the board reports a datamatrix code
    pub fn has_datamatrix(&self) -> bool {
        self.grid_datamatrix != "NoDataMatrix!!"
    }
}

/// Live sensor readings
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SensorReadings {
    /// Temperature in °C (`v_tmpr`)
    #[serde(rename = "v_tmpr")]
    pub temperature: f64,
    /// Relative humidity in percent (`v_umd`)
    #[serde(rename = "v_umd")]
    pub humidity: f64,
    /// Air quality index (`v_AirQ`), 0 without a sensor
    #[serde(rename = "v_AirQ")]
    pub air_quality: i64,
    /// Total volatile organic compounds (`v_Tvoc`)
    #[serde(rename = "v_Tvoc")]
    pub tvoc: i64,
    /// Equivalent CO2 (`v_ECo2`)
    #[serde(rename = "v_ECo2")]
    pub eco2: i64,
    /// Unfiltered humidity sensor value (`umd_raw`)
    #[serde(rename = "umd_raw")]
    pub humidity_raw: i64,
    /// Humidity setpoint code (`s_umd`), see [`TargetHumidity`](crate::TargetHumidity)
    #[serde(rename = "s_umd")]
    pub humidity_setpoint: i64,
    /// CO2 setpoint (`s_co2`)
    #[serde(rename = "s_co2")]
    pub co2_setpoint: i64,
}

impl SensorReadings {
    /// Temperature rounded to one decimal
    pub fn temperature_celsius(&self) -> f64 {
        round1(self.temperature)
    }

    /// Humidity rounded to one decimal
    pub fn humidity_percent(&self) -> f64 {
        round1(self.humidity)
    }

    /// Whether an air quality sensor reports anything
    pub fn has_air_quality(&self) -> bool {
        self.air_quality > 0 || self.tvoc > 0 || self.eco2 > 0
    }
}

/// Raw parameter tables
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParameterArrays {
    /// Realtime parameters (`par_rt`)
    #[serde(rename = "par_rt")]
    pub realtime: Vec<i64>,
    /// Minimum and maximum limits (`par_mm`)
    #[serde(rename = "par_mm")]
    pub minmax: Vec<i64>,
    /// Ambient parameters (`par_amb`)
    #[serde(rename = "par_amb")]
    pub ambient: Vec<i64>,
    /// External input parameters (`par_ext`)
    #[serde(rename = "par_ext")]
    pub external: Vec<i64>,
    /// Error codes, grouped by subsystem (`err`)
    #[serde(rename = "err")]
    pub errors: Vec<Vec<i64>>,
    /// Manual mode settings (`man`)
    #[serde(rename = "man")]
    pub manual: Vec<i64>,
}

impl ParameterArrays {
    /// Whether any subsystem reports an error
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|group| !group.is_empty())
    }

    /// Every active error code
    pub fn active_errors(&self) -> impl Iterator<Item = i64> + '_ {
        self.errors.iter().flatten().copied()
    }
}

/// Current operating state
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OperatingParameters {
    /// Operating preset (`mod`)
    #[serde(rename = "mod", deserialize_with = "device_mode")]
    pub mode: DeviceMode,
    /// Step within the current preset (`step_mod`)
    #[serde(rename = "step_mod")]
    pub step_mode: i64,
    /// Power state code (`on_off`), see [`OnOff`]
    pub on_off: i64,
    /// Current fan speed
    pub speed: i64,
    /// Requested fan speed (`spd_rich`)
    #[serde(rename = "spd_rich")]
    pub speed_requested: i64,
    /// Manual fan speed setting (`spd_row`)
    #[serde(rename = "spd_row")]
    pub speed_row: i64,
    /// Fan rotation direction (`fan_dir`)
    #[serde(rename = "fan_dir")]
    pub fan_direction: i64,
    /// Airflow direction of the current cycle (`verso`)
    #[serde(rename = "verso")]
    pub direction: i64,
    /// Temperature difference over the last cycle (`Delta_tmprCiclo`)
    #[serde(rename = "Delta_tmprCiclo")]
    pub delta_temp_cycle: i64,
    /// Humidity difference over the last cycle (`Delta_umdCiclo`)
    #[serde(rename = "Delta_umdCiclo")]
    pub delta_humidity_cycle: i64,
    /// 1 when night mode is on (`night_mod`)
    #[serde(rename = "night_mod")]
    pub night_mode: i64,
    /// 1 when the front LED is on
    pub led_on_off: i64,
    /// Short LED indication setting (`led_on_off_breve`)
    #[serde(rename = "led_on_off_breve")]
    pub led_on_off_short: i64,
    /// LED color code
    pub led_color: i64,
    /// Weekly schedule mode (`m_crono`)
    #[serde(rename = "m_crono")]
    pub chrono_mode: i64,
    /// Non-zero while a timer is running (`tw_active`)
    #[serde(rename = "tw_active")]
    pub timer_active: i64,
}

impl OperatingParameters {
    /// The decoded power state, if the code is known
    pub fn power(&self) -> Option<OnOff> {
        OnOff::from_code(self.on_off)
    }

    /// Whether the unit is switched on
    pub fn is_on(&self) -> bool {
        self.power() == Some(OnOff::On)
    }

    /// Whether the fan is turning
    pub fn fan_running(&self) -> bool {
        self.speed > 0
    }

    /// Whether night mode is active
    pub fn night_mode_active(&self) -> bool {
        self.night_mode == 1
    }

    /// Whether the front LED is lit
    pub fn led_on(&self) -> bool {
        self.led_on_off == 1
    }
}

impl Default for OperatingParameters {
    fn default() -> Self {
        Self {
            mode: DeviceMode::HeatRecovery,
            step_mode: 0,
            on_off: 0,
            speed: 0,
            speed_requested: 0,
            speed_row: 0,
            fan_direction: 0,
            direction: 0,
            delta_temp_cycle: 0,
            delta_humidity_cycle: 0,
            night_mode: 0,
            led_on_off: 0,
            led_on_off_short: 0,
            led_color: 0,
            chrono_mode: 0,
            timer_active: 0,
        }
    }
}

/// Controller diagnostics
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    /// Controller counter (`cntr`)
    #[serde(rename = "cntr")]
    pub counter: i64,
    /// Free memory in bytes (`memfree`)
    #[serde(rename = "memfree")]
    pub memory_free: i64,
    /// Seconds since boot (`up_time`)
    #[serde(rename = "up_time")]
    pub uptime: i64,
    /// Date from the real-time clock, `NO RTC` when absent
    pub date: String,
    /// Time of day from the real-time clock
    pub time: String,
    /// Day of the week, -1 when unknown
    pub week: i64,
}

impl SystemInfo {
    /// Whether the controller has a real-time clock
    pub fn has_rtc(&self) -> bool {
        self.date != "NO RTC"
    }

    /// Uptime in hours
    pub fn uptime_hours(&self) -> f64 {
        self.uptime.max(0) as f64 / 3600.0
    }

    /// Uptime in days
    pub fn uptime_days(&self) -> f64 {
        self.uptime.max(0) as f64 / 86_400.0
    }

    /// Free memory in KiB
    pub fn memory_free_kb(&self) -> f64 {
        self.memory_free as f64 / 1024.0
    }
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            counter: 0,
            memory_free: 0,
            uptime: 0,
            date: String::new(),
            time: String::new(),
            week: -1,
        }
    }
}

fn device_mode<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DeviceMode, D::Error> {
    u8::deserialize(deserializer).map(DeviceMode::from)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> Result<DeviceStatus, ProtocolError> {
        DeviceStatus::from_message(&Message::from_value(value).unwrap())
    }

    #[test]
    fn typical_status() {
        let status = decode(json!({
            "idp": 12, "frm": "mst", "cmd": "stato_sync", "res": 1,
            "name": "Living room", "fw_ver": "2.1", "fw_note": "stable",
            "v_tmpr": 21.46, "v_umd": 48.04, "mod": 6, "on_off": 1, "speed": 40,
            "night_mod": 1, "err": [[], [3, 4]], "memfree": 20480, "up_time": 172800,
            "date": "NO RTC", "Grd_DM": "NoDataMatrix!!"
        }))
        .unwrap();
        assert_eq!(status.idp, 12);
        assert_eq!(status.device_info.name, "Living room");
        assert_eq!(status.device_info.firmware_full(), "2.1 (stable)");
        assert!(!status.device_info.has_datamatrix());
        assert_eq!(status.sensors.temperature_celsius(), 21.5);
        assert_eq!(status.operating.mode, DeviceMode::ComfortSummer);
        assert!(status.is_on());
        assert!(status.operating.fan_running());
        assert!(status.operating.night_mode_active());
        assert_eq!(status.parameters.active_errors().collect::<Vec<_>>(), [3, 4]);
        assert!(!status.is_healthy());
        assert!(!status.system.has_rtc());
        assert_eq!(status.system.uptime_days(), 2.0);
        assert_eq!(status.system.memory_free_kb(), 20.0);
        assert_eq!(status.raw()["v_tmpr"], 21.46);
    }

    #[test]
    fn defaults_for_missing_fields() {
        let status = decode(json!({"idp": 3, "res": 1})).unwrap();
        assert_eq!(status.operating.mode, DeviceMode::HeatRecovery);
        assert_eq!(status.system.week, -1);
        assert_eq!(status.operating.power(), None);
        assert!(!status.sensors.has_air_quality());
        assert!(!status.is_healthy());
    }

    #[test]
    fn healthy() {
        let status = decode(json!({"res": 1, "err": [[]], "memfree": 10_001})).unwrap();
        assert!(status.is_healthy());
    }

    #[test]
    fn wrong_type_is_a_protocol_error() {
        assert!(matches!(
            decode(json!({"res": 1, "name": 7})),
            Err(ProtocolError::Payload { what: "status", .. })
        ));
    }

    #[test]
    fn summary() {
        let status = decode(json!({"name": "Hall", "on_off": 2, "mod": 2})).unwrap();
        let text = status.to_string();
        assert!(text.starts_with("Pico device status: Hall\n"));
        assert!(text.contains("  Mode: extraction\n"));
        assert!(text.contains("  Status: OFF\n"));
    }
}
