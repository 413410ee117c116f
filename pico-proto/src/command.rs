//! Request payloads

use serde_json::{Map, Value};

use crate::{
    config::OperationKind,
    device::{DeviceMode, OnOff, TargetHumidity},
    frame::{Role, STATUS_QUERY, UPDATE_PARAMETERS},
};

/// A request body without its IDP
///
/// The `pin`, `frm` and `idp` fields are filled in when the command is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    params: Map<String, Value>,
}

impl Command {
    /// A command with an arbitrary name and no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    /// Request the full device status
    pub fn status_query() -> Self {
        Self::new(STATUS_QUERY)
    }

    /// An `upd_pico` update setting a single parameter
    fn update(key: &str, value: impl Into<Value>) -> Self {
        Self::new(UPDATE_PARAMETERS).param(key, value)
    }

    /// Switch the unit on or off
    pub fn power(state: OnOff) -> Self {
        Self::update("on_off", state.code())
    }

    /// Select an operating preset
    pub fn set_mode(mode: DeviceMode) -> Self {
        Self::update("mod", mode.code())
    }

    /// Set the manual fan speed
    pub fn fan_speed(speed: u8) -> Self {
        Self::update("spd_row", speed)
    }

    /// Select the humidity setpoint
    pub fn target_humidity(target: TargetHumidity) -> Self {
        Self::update("s_umd", target.code())
    }

    /// Turn the front LED on or off
    pub fn led(on: bool) -> Self {
        Self::update("led_on_off_breve", u8::from(on))
    }

    /// Enable or disable night mode
    pub fn night_mode(on: bool) -> Self {
        Self::update("night_mod", u8::from(on))
    }

    /// Add or replace a parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The command name (`cmd`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters sent alongside the command name
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Whether this command only reads state
    pub fn kind(&self) -> OperationKind {
        if self.name == STATUS_QUERY {
            OperationKind::Query
        } else {
            OperationKind::Command
        }
    }

    /// The request body for a device protected by `pin`
    ///
    /// Parameters cannot override the reserved `cmd`, `frm` and `pin` fields.
    pub fn payload(&self, pin: &str) -> Map<String, Value> {
        let mut fields = self.params.clone();
        fields.insert("cmd".into(), self.name.clone().into());
        fields.insert("frm".into(), Role::App.as_str().into());
        fields.insert("pin".into(), pin.into());
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_query_payload() {
        let payload = Command::status_query().payload("1234");
        assert_eq!(
            Value::Object(payload),
            json!({"cmd": "stato_sync", "frm": "app", "pin": "1234"})
        );
        assert_eq!(Command::status_query().kind(), OperationKind::Query);
    }

    #[test]
    fn updates() {
        let cases = [
            (Command::power(OnOff::Off), json!({"on_off": 2})),
            (Command::set_mode(DeviceMode::ComfortSummer), json!({"mod": 6})),
            (Command::fan_speed(40), json!({"spd_row": 40})),
            (
                Command::target_humidity(TargetHumidity::SixtyPercent),
                json!({"s_umd": 3}),
            ),
            (Command::led(true), json!({"led_on_off_breve": 1})),
            (Command::night_mode(false), json!({"night_mod": 0})),
        ];
        for (command, params) in cases {
            assert_eq!(command.name(), "upd_pico");
            assert_eq!(command.kind(), OperationKind::Command);
            assert_eq!(Value::Object(command.params().clone()), params);
        }
    }

    #[test]
    fn reserved_fields_win() {
        let payload = Command::new("custom")
            .param("pin", "0000")
            .param("temp", 25)
            .payload("1234");
        assert_eq!(payload["pin"], "1234");
        assert_eq!(payload["cmd"], "custom");
        assert_eq!(payload["temp"], 25);
    }
}
