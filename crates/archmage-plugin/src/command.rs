//! Command arguments and the UI-facing command reference.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ApiError;
use crate::registry::{Deferred, ExtensionCommands};

/// A value passed to or returned from a command handler.
///
/// The first five variants are the primitive kinds accepted by host-internal
/// commands. `Value` carries structured data and is only accepted between
/// extensions.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Arg {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Value(serde_json::Value),
}

impl Arg {
    /// Whether a host-internal command may receive this value from an
    /// extension.
    pub fn is_primitive(&self) -> bool {
        match self {
            Arg::Value(v) => !(v.is_array() || v.is_object()),
            _ => true,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Arg::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::String(s) => Some(s),
            Arg::Value(v) => v.as_str(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Arg::Number(n) => Some(*n),
            Arg::Value(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Arg::Bool(b) => Some(*b),
            Arg::Value(v) => v.as_bool(),
            _ => None,
        }
    }

    /// JSON form; `Undefined` maps to `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Arg::Undefined | Arg::Null => serde_json::Value::Null,
            Arg::Bool(b) => serde_json::Value::Bool(*b),
            Arg::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Arg::String(s) => serde_json::Value::String(s.clone()),
            Arg::Value(v) => v.clone(),
        }
    }
}

impl From<serde_json::Value> for Arg {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Arg::Null,
            serde_json::Value::Bool(b) => Arg::Bool(b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => Arg::Number(f),
                None => Arg::Value(serde_json::Value::Number(n)),
            },
            serde_json::Value::String(s) => Arg::String(s),
            other => Arg::Value(other),
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::String(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::String(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Number(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Number(value as f64)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Arg::Null)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Undefined => f.write_str("undefined"),
            Arg::Null => f.write_str("null"),
            Arg::Bool(b) => write!(f, "{b}"),
            Arg::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Arg::Number(n) => write!(f, "{n}"),
            Arg::String(s) => f.write_str(s),
            Arg::Value(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for Arg {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Arg {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Arg::from)
    }
}

/// A reference to a command, as surfaced in a palette or keybinding UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Title shown in the UI, like `Save`.
    pub title: String,
    /// Identifier of the registered handler.
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    /// Arguments the handler is invoked with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<Arg>>,
}

impl Command {
    pub fn new(title: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            command: command.into(),
            tooltip: None,
            arguments: None,
        }
    }

    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Vec<Arg>) -> Self {
        self.arguments = Some(arguments);
        self
    }

    /// Parse a command reference from JSON.
    pub fn parse(json: &str) -> Result<Self, ApiError> {
        let command: Command = serde_json::from_str(json)?;
        command.validate()?;
        Ok(command)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::InvalidCommand(format!(
                "title must not be empty for '{}'",
                self.command
            )));
        }
        if self.command.trim().is_empty() {
            return Err(ApiError::InvalidCommand(format!(
                "command id must not be empty for '{}'",
                self.title
            )));
        }
        Ok(())
    }

    /// Run the referenced command with its declared arguments, as the
    /// extension owning `commands`.
    pub fn execute(&self, commands: &ExtensionCommands) -> Deferred<Arg> {
        if let Err(e) = self.validate() {
            return Deferred::rejected(e);
        }
        commands.execute_command(&self.command, self.arguments.clone().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primitive_classification() {
        assert!(Arg::Undefined.is_primitive());
        assert!(Arg::Null.is_primitive());
        assert!(Arg::Bool(true).is_primitive());
        assert!(Arg::Number(1.5).is_primitive());
        assert!(Arg::from("text").is_primitive());
        assert!(Arg::Value(json!("scalar")).is_primitive());
        assert!(!Arg::Value(json!([1, 2])).is_primitive());
        assert!(!Arg::Value(json!({"a": 1})).is_primitive());
    }

    #[test]
    fn test_from_json_value() {
        assert_eq!(Arg::from(json!(null)), Arg::Null);
        assert_eq!(Arg::from(json!(3)), Arg::Number(3.0));
        assert_eq!(Arg::from(json!("s")), Arg::String("s".into()));
        assert_eq!(Arg::from(json!([1])), Arg::Value(json!([1])));
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Arg::from(None::<&str>), Arg::Null);
        assert_eq!(Arg::from(Some(true)), Arg::Bool(true));
    }

    #[test]
    fn test_display() {
        assert_eq!(Arg::Undefined.to_string(), "undefined");
        assert_eq!(Arg::Number(42.0).to_string(), "42");
        assert_eq!(Arg::Number(0.5).to_string(), "0.5");
        assert_eq!(Arg::Value(json!({"k": 1})).to_string(), r#"{"k":1}"#);
    }

    #[test]
    fn test_undefined_serializes_as_null() {
        let value = serde_json::to_value(vec![Arg::Undefined, Arg::from(1i64)]).unwrap();
        assert_eq!(value, json!([null, 1.0]));
    }

    #[test]
    fn test_parse_command_reference() {
        let command = Command::parse(
            r#"{"title":"Open wallet","command":"wallet.open","tooltip":"Opens it","arguments":[1,"main",{"x":true}]}"#,
        )
        .unwrap();
        assert_eq!(command.title, "Open wallet");
        assert_eq!(command.tooltip.as_deref(), Some("Opens it"));
        let args = command.arguments.unwrap();
        assert_eq!(args[0], Arg::Number(1.0));
        assert_eq!(args[1], Arg::String("main".into()));
        assert!(!args[2].is_primitive());
    }

    #[test]
    fn test_serialize_skips_missing_optionals() {
        let json = serde_json::to_value(Command::new("Save", "file.save")).unwrap();
        assert_eq!(json, json!({"title": "Save", "command": "file.save"}));
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let err = Command::new("", "file.save").validate().unwrap_err();
        assert!(matches!(err, ApiError::InvalidCommand(_)));
        let err = Command::parse(r#"{"title":"Save","command":" "}"#).unwrap_err();
        assert!(matches!(err, ApiError::InvalidCommand(_)));
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let err = Command::parse(r#"{"title":"Save"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Serialization(_)));
    }
}
