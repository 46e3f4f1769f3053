//! Operator console: line commands read from stdin
//!
//! - `set <device> <channel> <state> <json value>`: simulate a host state change
//! - `location <id>`: show one location
//! - `locations`: list all locations
//! - `refresh`: force a reconnect

use std::sync::Arc;

use serde_json::Value;

use crate::manager::RingManager;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set {
        device_id: String,
        channel_id: String,
        state_id: String,
        value: Value,
    },
    Location(String),
    Locations,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    Usage(&'static str),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut parts = line.trim().splitn(5, ' ').filter(|p| !p.is_empty());

        match parts.next() {
            None => Err(ParseError::Empty),
            Some("set") => {
                let (Some(device_id), Some(channel_id), Some(state_id), Some(raw)) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Err(ParseError::Usage(
                        "set <device> <channel> <state> <json value>",
                    ));
                };
                // Bare words are taken as strings
                let value = serde_json::from_str(raw.trim())
                    .unwrap_or_else(|_| Value::String(raw.trim().to_string()));

                Ok(Self::Set {
                    device_id: device_id.to_string(),
                    channel_id: channel_id.to_string(),
                    state_id: state_id.to_string(),
                    value,
                })
            }
            Some("location") => parts
                .next()
                .map(|id| Self::Location(id.to_string()))
                .ok_or(ParseError::Usage("location <id>")),
            Some("locations") => Ok(Self::Locations),
            Some("refresh") => Ok(Self::Refresh),
            Some(other) => Err(ParseError::Unknown(other.to_string())),
        }
    }

    pub async fn execute(self, manager: &Arc<RingManager>) {
        match self {
            Self::Set {
                device_id,
                channel_id,
                state_id,
                value,
            } => {
                manager
                    .process_user_input(&device_id, &channel_id, &state_id, &value)
                    .await;
            }
            Self::Location(id) => match manager.location_by_id(&id).await {
                Some(location) => tracing::info!("{:?}", location),
                None => tracing::warn!("No location with id {}", id),
            },
            Self::Locations => {
                let locations = manager.locations().await;
                tracing::info!("{} locations", locations.len());
                for location in locations {
                    tracing::info!("  {} ({})", location.name(), location.id());
                }
            }
            Self::Refresh => {
                if let Err(e) = manager.refresh_all(false).await {
                    tracing::error!("Refresh failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_with_json_value() {
        let cmd = Command::parse("set 123 light switch true").unwrap();
        assert_eq!(
            cmd,
            Command::Set {
                device_id: "123".to_string(),
                channel_id: "light".to_string(),
                state_id: "switch".to_string(),
                value: Value::Bool(true),
            }
        );
    }

    #[test]
    fn test_parse_set_keeps_spaces_in_value() {
        let Command::Set { value, .. } =
            Command::parse(r#"set 123 info name "Front Door""#).unwrap()
        else {
            panic!("expected set");
        };
        assert_eq!(value, Value::from("Front Door"));

        let Command::Set { value, .. } = Command::parse("set 123 info name on").unwrap() else {
            panic!("expected set");
        };
        assert_eq!(value, Value::from("on"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Command::parse("   "), Err(ParseError::Empty));
        assert!(matches!(Command::parse("set 123 light"), Err(ParseError::Usage(_))));
        assert!(matches!(Command::parse("location"), Err(ParseError::Usage(_))));
        assert_eq!(
            Command::parse("reboot now"),
            Err(ParseError::Unknown("reboot".to_string()))
        );
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse("locations"), Ok(Command::Locations));
        assert_eq!(Command::parse("refresh"), Ok(Command::Refresh));
        assert_eq!(
            Command::parse("location loc-1"),
            Ok(Command::Location("loc-1".to_string()))
        );
    }
}
