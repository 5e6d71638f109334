use serde::{Deserialize, Serialize};
use std::fmt;

use crate::editor_host::HostError;

/// Delimiter of the legacy command form `action|arg1|arg2`
pub const LEGACY_DELIMITER: char = '|';

/// Prefix of every failed result written back to the external actor
pub const ERROR_PREFIX: &str = "Error: ";

/// Prefix of every successful result produced by a scene handler
pub const SUCCESS_PREFIX: &str = "Success: ";

/// Errors produced while parsing or executing a bridge command
///
/// None of these ever leave the dispatcher as an error value: they are rendered
/// into an `Error:`-prefixed result string.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Empty command")]
    EmptyCommand,
    #[error("Malformed command: {0}")]
    Malformed(String),
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
    #[error("'{action}' requires at least {expected} argument(s), usage: {usage}")]
    MissingArguments {
        action: String,
        expected: usize,
        usage: &'static str,
    },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

/// A single request: an action name followed by loosely typed positional arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Echoed back with the result so the sender can tell answers apart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl Command {
    pub fn new(action: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            action: action.into(),
            args,
            id: None,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Parse a raw request body
    ///
    /// A body starting with `{` is the structured JSON form, anything else is the
    /// legacy pipe-delimited form. Arguments of the legacy form cannot contain `|`.
    pub fn parse(raw: &str) -> Result<Self, CommandError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CommandError::EmptyCommand);
        }

        if trimmed.starts_with('{') {
            let command: Command = serde_json::from_str(trimmed)
                .map_err(|e| CommandError::Malformed(e.to_string()))?;
            if command.action.trim().is_empty() {
                return Err(CommandError::EmptyCommand);
            }
            return Ok(command);
        }

        let mut fields = trimmed.split(LEGACY_DELIMITER);
        let action = fields.next().unwrap_or_default().trim().to_string();
        if action.is_empty() {
            return Err(CommandError::EmptyCommand);
        }

        Ok(Command {
            action,
            args: fields.map(|field| field.to_string()).collect(),
            id: None,
        })
    }

    /// Encode in the structured form, which survives any argument content
    pub fn encode(&self) -> String {
        // Serializing a struct of strings cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Encode in the legacy pipe form, for hosts that only understand it
    pub fn encode_legacy(&self) -> Result<String, CommandError> {
        if let Some(arg) = self.args.iter().find(|arg| arg.contains(LEGACY_DELIMITER)) {
            return Err(CommandError::InvalidArgument(format!(
                "'{}' contains the '{}' delimiter",
                arg, LEGACY_DELIMITER
            )));
        }

        let mut fields = Vec::with_capacity(self.args.len() + 1);
        fields.push(self.action.as_str());
        fields.extend(self.args.iter().map(String::as_str));
        Ok(fields.join("|"))
    }
}

/// Request id of a raw command body, if it carries one
pub fn request_id(raw: &str) -> Option<u64> {
    Command::parse(raw).ok().and_then(|command| command.id)
}

/// A result tagged with the id of the command it answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub id: u64,
    pub result: String,
}

impl CommandReply {
    pub fn new(id: u64, result: impl Into<String>) -> Self {
        Self {
            id,
            result: result.into(),
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a result body; bare result strings carry no id and yield `None`
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action)?;
        for arg in &self.args {
            write!(f, " {:?}", arg)?;
        }
        Ok(())
    }
}

/// Three component vector used for transform arguments
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const ONE: Vector3 = Vector3 {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Parse a vector argument in the form `(a,b,c)` or `a,b,c`
pub fn parse_vector3(raw: &str) -> Result<Vector3, CommandError> {
    let inner = raw
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim();

    let components = inner
        .split(',')
        .map(|part| {
            part.trim().parse::<f32>().map_err(|_| {
                CommandError::InvalidArgument(format!(
                    "'{}' is not a number in vector '{}'",
                    part.trim(),
                    raw
                ))
            })
        })
        .collect::<Result<Vec<f32>, CommandError>>()?;

    match components.as_slice() {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(CommandError::InvalidArgument(format!(
            "Expected 3 components in vector '{}', got {}",
            raw,
            components.len()
        ))),
    }
}

/// Parse a boolean argument, accepting the spellings Unity users tend to type
pub fn parse_bool(raw: &str) -> Result<bool, CommandError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(CommandError::InvalidArgument(format!(
            "'{}' is not a boolean",
            other
        ))),
    }
}

/// Permissive float parsing: missing or unparsable values yield `default`
pub fn parse_f32_or(raw: Option<&str>, default: f32) -> f32 {
    raw.and_then(|value| value.trim().parse::<f32>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
}

/// Permissive unsigned parsing: missing, unparsable or zero values yield `default`
pub fn parse_u32_or(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

/// Format a failure the way the external actor expects to see it
pub fn error_result(error: &CommandError) -> String {
    format!("{}{}", ERROR_PREFIX, error)
}

/// Whether a result string reports a failure
pub fn is_error_result(result: &str) -> bool {
    result.starts_with(ERROR_PREFIX.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_legacy_command() {
        let command = Command::parse("set_property|Player|position|(1,2,3)").unwrap();
        assert_eq!(command.action, "set_property");
        assert_eq!(command.args, vec!["Player", "position", "(1,2,3)"]);
    }

    #[test]
    fn test_parse_action_only() {
        let command = Command::parse("ping\n").unwrap();
        assert_eq!(command.action, "ping");
        assert!(command.args.is_empty());
    }

    #[test]
    fn test_parse_structured_command_keeps_delimiter_in_args() {
        let original = Command::new(
            "create_gameobject",
            vec!["Enemy|Boss".to_string()],
        );
        let parsed = Command::parse(&original.encode()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_structured_command_without_args() {
        let parsed = Command::parse(r#"{"action":"list_gameobjects"}"#).unwrap();
        assert_eq!(parsed.action, "list_gameobjects");
        assert!(parsed.args.is_empty());
    }

    #[test]
    fn test_parse_empty_and_malformed() {
        assert!(matches!(Command::parse("   "), Err(CommandError::EmptyCommand)));
        assert!(matches!(Command::parse("|Player"), Err(CommandError::EmptyCommand)));
        assert!(matches!(
            Command::parse("{not json"),
            Err(CommandError::Malformed(_))
        ));
    }

    #[test]
    fn test_request_id_round_trip() {
        let command = Command::new("ping", Vec::new()).with_id(42);
        let encoded = command.encode();
        assert!(encoded.contains("\"id\":42"));
        assert_eq!(request_id(&encoded), Some(42));
        assert_eq!(request_id("ping"), None);
        assert!(!Command::new("ping", Vec::new()).encode().contains("id"));
    }

    #[test]
    fn test_reply_parse() {
        let reply = CommandReply::new(7, "Success: Created GameObject 'Player'");
        assert_eq!(CommandReply::parse(&reply.encode()), Some(reply));
        assert_eq!(CommandReply::parse("Success: Created GameObject 'Player'"), None);
        assert_eq!(CommandReply::parse("{\"result\":\"pong\"}"), None);
    }

    #[test]
    fn test_legacy_encoding_rejects_delimiter() {
        let command = Command::new("create_gameobject", vec!["a|b".to_string()]);
        assert!(command.encode_legacy().is_err());

        let command = Command::new("create_gameobject", vec!["Player".to_string()]);
        assert_eq!(command.encode_legacy().unwrap(), "create_gameobject|Player");
    }

    #[test]
    fn test_vector_parse_and_display() {
        let vector = parse_vector3("(1.5, -2, 3)").unwrap();
        assert_eq!(vector, Vector3::new(1.5, -2.0, 3.0));

        let text = vector.to_string();
        assert_eq!(text, "(1.5, -2, 3)");
        assert_eq!(parse_vector3(&text).unwrap(), vector);

        assert_eq!(parse_vector3("4,5,6").unwrap(), Vector3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_vector_wrong_arity_and_garbage() {
        assert!(parse_vector3("(1,2)").is_err());
        assert!(parse_vector3("1,2,3,4").is_err());
        assert!(parse_vector3("(a,b,c)").is_err());
        assert!(parse_vector3("").is_err());
    }

    #[test]
    fn test_permissive_numbers() {
        assert_eq!(parse_f32_or(Some("2.5"), 0.0), 2.5);
        assert_eq!(parse_f32_or(Some("soon"), 0.0), 0.0);
        assert_eq!(parse_f32_or(Some("NaN"), 1.0), 1.0);
        assert_eq!(parse_f32_or(None, 3.0), 3.0);

        assert_eq!(parse_u32_or(Some("640"), 1920), 640);
        assert_eq!(parse_u32_or(Some("-1"), 1920), 1920);
        assert_eq!(parse_u32_or(Some("0"), 1080), 1080);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("True").unwrap());
        assert!(!parse_bool(" 0 ").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_error_result_prefix() {
        let result = error_result(&CommandError::UnknownCommand("fly".to_string()));
        assert_eq!(result, "Error: Unknown command 'fly'");
        assert!(is_error_result(&result));
        assert!(!is_error_result("Success: done"));
    }
}
