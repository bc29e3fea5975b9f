//! Frame parsing helpers for the real-time client.

use serde::Deserialize;

use agileflow_protocol::ServerEvent;

/// Parsed inbound frame with unknown event names lifted out.
#[derive(Debug, PartialEq)]
pub enum ParsedServerFrame {
    Event(ServerEvent),
    /// Event this client does not understand; ignored by callers
    Unknown { event: String },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

pub fn parse_server_frame(text: &str) -> Result<ParsedServerFrame, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(text)?;
    Ok(match ServerEvent::from_parts(&envelope.event, envelope.data)? {
        Some(event) => ParsedServerFrame::Event(event),
        None => ParsedServerFrame::Unknown {
            event: envelope.event,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agileflow_protocol::{ParticipantRole, Prediction};

    #[test]
    fn parses_known_event() {
        let frame = parse_server_frame(
            r#"{"event":"results_revealed","data":{"predictions":[{"role":"UX","prediction":3}]}}"#,
        )
        .unwrap();

        assert_eq!(
            frame,
            ParsedServerFrame::Event(ServerEvent::ResultsRevealed {
                predictions: vec![Prediction {
                    role: ParticipantRole::Ux,
                    value: 3.0
                }]
            })
        );
    }

    #[test]
    fn session_reset_without_data_parses() {
        let frame = parse_server_frame(r#"{"event":"session_reset"}"#).unwrap();
        assert_eq!(frame, ParsedServerFrame::Event(ServerEvent::SessionReset));
    }

    #[test]
    fn unknown_event_keeps_its_name() {
        let frame = parse_server_frame(r#"{"event":"cursor_moved","data":{"x":1}}"#).unwrap();
        assert_eq!(
            frame,
            ParsedServerFrame::Unknown {
                event: "cursor_moved".into()
            }
        );
    }

    #[test]
    fn non_json_is_an_error() {
        assert!(parse_server_frame("hello").is_err());
    }
}
