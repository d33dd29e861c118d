//! Core protocol types for the Hookman wire format.
//!
//! Every frame on the socket is one JSON object with a `type`
//! discriminator. Outbound frames are built from a typed [`Command`] plus a
//! [`RequestId`]; inbound frames decode into an [`Envelope`] and are then
//! classified into an [`Inbound`] the dispatcher can match on.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Request ids
// ---------------------------------------------------------------------------

/// Correlation id attached to every outbound command.
///
/// The service never answers by id, so ids only need to be distinct enough
/// to read in logs. `#[serde(untagged)]` puts the bare number or string on
/// the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// A sequence number from [`RequestIds`].
    Seq(u64),
    /// A fixed name, used for the auth command.
    Named(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seq(n) => write!(f, "{n}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Monotonic source of [`RequestId`]s, one per client.
#[derive(Debug)]
pub struct RequestIds {
    next: AtomicU64,
}

impl RequestIds {
    /// Id used for every auth command.
    pub const AUTH: &'static str = "auth";

    /// Creates a counter starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next sequence id.
    pub fn next(&self) -> RequestId {
        RequestId::Seq(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps `command` in an envelope with a freshly assigned id.
    pub fn assign(&self, command: Command) -> OutboundEnvelope {
        let id = match command {
            Command::Auth { .. } => RequestId::Named(Self::AUTH.to_owned()),
            _ => self.next(),
        };
        OutboundEnvelope { id, command }
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Outbound commands
// ---------------------------------------------------------------------------

/// A command the client sends to the service.
///
/// `#[serde(tag = "type", rename_all = "lowercase")]` produces
/// `{ "type": "listen", "channel": "news" }` style objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    /// Authenticate the connection with an API key.
    Auth { key: String },

    /// Start server-side delivery for a topic.
    Listen { channel: String },

    /// Stop server-side delivery for a topic.
    Unlisten { channel: String },

    /// An application message. Who receives it depends on which of
    /// `channel` and `client_token` are set: neither means broadcast.
    Ccast {
        payload: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },

    /// Turn delivery of broadcasts to this client on or off.
    Broadcast { broadcast: bool },
}

impl Command {
    /// Builds a `ccast`. Empty strings count as absent.
    pub fn ccast(
        payload: Value,
        client_token: Option<&str>,
        channel: Option<&str>,
    ) -> Self {
        fn present(s: Option<&str>) -> Option<String> {
            s.filter(|s| !s.is_empty()).map(str::to_owned)
        }
        Self::Ccast {
            payload,
            client_token: present(client_token),
            channel: present(channel),
        }
    }

    /// The wire name of this command's `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Listen { .. } => "listen",
            Self::Unlisten { .. } => "unlisten",
            Self::Ccast { .. } => "ccast",
            Self::Broadcast { .. } => "broadcast",
        }
    }
}

/// A command with its id, flattened into one JSON object on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub id: RequestId,
    #[serde(flatten)]
    pub command: Command,
}

// ---------------------------------------------------------------------------
// Inbound envelopes
// ---------------------------------------------------------------------------

/// The `type` discriminator of an inbound envelope.
///
/// Unrecognised type strings decode to [`EnvelopeType::Unknown`] rather
/// than failing, so new server message kinds don't break older clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnvelopeType {
    Auth,
    Event,
    Broadcast,
    Listen,
    Unlisten,
    Ccast,
    Unknown(String),
}

impl From<String> for EnvelopeType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "auth" => Self::Auth,
            "event" => Self::Event,
            "broadcast" => Self::Broadcast,
            "listen" => Self::Listen,
            "unlisten" => Self::Unlisten,
            "ccast" => Self::Ccast,
            _ => Self::Unknown(s),
        }
    }
}

impl From<EnvelopeType> for String {
    fn from(kind: EnvelopeType) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auth => "auth",
            Self::Event => "event",
            Self::Broadcast => "broadcast",
            Self::Listen => "listen",
            Self::Unlisten => "unlisten",
            Self::Ccast => "ccast",
            Self::Unknown(other) => other,
        };
        f.write_str(name)
    }
}

/// One decoded inbound frame.
///
/// Every field except `type` is optional; which ones are meaningful
/// depends on the type. `id` is kept as raw JSON because the service may
/// echo ids of any shape and nothing correlates on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<bool>,
}

/// Result of the auth handshake as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credentials accepted. The token identifies this connection to peers.
    Accepted { client_token: Option<String> },
    /// Credentials rejected. The connection stays open.
    Rejected { message: String },
}

/// An inbound envelope classified by what the client should do with it.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Answer to the auth command.
    Auth(AuthOutcome),
    /// An application event, optionally scoped to a channel.
    Event {
        channel: Option<String>,
        payload: Value,
    },
    /// Acknowledgement of a broadcast toggle.
    BroadcastToggled { enabled: bool },
    /// A type the client has no handling for.
    Ignored(EnvelopeType),
}

impl Envelope {
    /// Message used when the service rejects auth without saying why.
    pub const DEFAULT_AUTH_ERROR: &'static str = "authentication rejected";

    /// Classifies this envelope.
    ///
    /// Auth counts as rejected only when `ack` is `false` and `error` is
    /// `true`; any other auth answer is a success. An empty channel string
    /// is treated as no channel.
    pub fn into_inbound(self) -> Inbound {
        match self.kind {
            EnvelopeType::Auth => {
                if self.ack == Some(false) && self.error == Some(true) {
                    Inbound::Auth(AuthOutcome::Rejected {
                        message: self
                            .error_message
                            .unwrap_or_else(|| Self::DEFAULT_AUTH_ERROR.to_owned()),
                    })
                } else {
                    Inbound::Auth(AuthOutcome::Accepted {
                        client_token: self.client_token,
                    })
                }
            }
            EnvelopeType::Event => Inbound::Event {
                channel: self.channel.filter(|c| !c.is_empty()),
                payload: self.payload.unwrap_or(Value::Null),
            },
            EnvelopeType::Broadcast => Inbound::BroadcastToggled {
                enabled: self.broadcast == Some(true),
            },
            other => Inbound::Ignored(other),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The service defines exact JSON shapes; these tests pin what our
    //! serde attributes put on the wire and what they accept.

    use serde_json::json;

    use super::*;

    fn decode(text: &str) -> Envelope {
        serde_json::from_str(text).unwrap()
    }

    // =====================================================================
    // Request ids
    // =====================================================================

    #[test]
    fn test_request_ids_are_monotonic_from_one() {
        let ids = RequestIds::new();
        assert_eq!(ids.next(), RequestId::Seq(1));
        assert_eq!(ids.next(), RequestId::Seq(2));
        assert_eq!(ids.next(), RequestId::Seq(3));
    }

    #[test]
    fn test_auth_command_gets_named_id() {
        let ids = RequestIds::new();
        let env = ids.assign(Command::Auth { key: "k".into() });
        assert_eq!(env.id, RequestId::Named("auth".into()));
        // The auth id does not consume a sequence number.
        assert_eq!(ids.next(), RequestId::Seq(1));
    }

    #[test]
    fn test_request_id_serializes_bare() {
        assert_eq!(serde_json::to_string(&RequestId::Seq(9)).unwrap(), "9");
        assert_eq!(
            serde_json::to_string(&RequestId::Named("auth".into())).unwrap(),
            "\"auth\""
        );
    }

    // =====================================================================
    // Outbound commands: one test per kind, pinning the JSON shape
    // =====================================================================

    #[test]
    fn test_auth_json_format() {
        let env = RequestIds::new().assign(Command::Auth { key: "secret".into() });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json, json!({"id": "auth", "type": "auth", "key": "secret"}));
    }

    #[test]
    fn test_listen_and_unlisten_json_format() {
        let ids = RequestIds::new();
        let listen = serde_json::to_value(ids.assign(Command::Listen {
            channel: "news".into(),
        }))
        .unwrap();
        assert_eq!(listen, json!({"id": 1, "type": "listen", "channel": "news"}));

        let unlisten = serde_json::to_value(ids.assign(Command::Unlisten {
            channel: "news".into(),
        }))
        .unwrap();
        assert_eq!(
            unlisten,
            json!({"id": 2, "type": "unlisten", "channel": "news"})
        );
    }

    #[test]
    fn test_ccast_omits_absent_targets() {
        let cmd = Command::ccast(json!({"hello": "world"}), None, None);
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json, json!({"type": "ccast", "payload": {"hello": "world"}}));
    }

    #[test]
    fn test_ccast_with_channel_and_token() {
        let cmd = Command::ccast(json!(1), Some("tok"), Some("news"));
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["channel"], "news");
        assert_eq!(json["client_token"], "tok");
        assert_eq!(json["payload"], 1);
    }

    #[test]
    fn test_ccast_treats_empty_strings_as_absent() {
        let cmd = Command::ccast(json!("x"), Some(""), Some(""));
        assert_eq!(
            cmd,
            Command::Ccast {
                payload: json!("x"),
                client_token: None,
                channel: None,
            }
        );
    }

    #[test]
    fn test_broadcast_toggle_json_format() {
        let json = serde_json::to_value(Command::Broadcast { broadcast: false }).unwrap();
        assert_eq!(json, json!({"type": "broadcast", "broadcast": false}));
    }

    #[test]
    fn test_command_kind_matches_wire_type() {
        let cmds = [
            Command::Auth { key: "k".into() },
            Command::Listen { channel: "c".into() },
            Command::Unlisten { channel: "c".into() },
            Command::ccast(Value::Null, None, None),
            Command::Broadcast { broadcast: true },
        ];
        for cmd in cmds {
            let json = serde_json::to_value(&cmd).unwrap();
            assert_eq!(json["type"], cmd.kind());
        }
    }

    // =====================================================================
    // Inbound envelopes
    // =====================================================================

    #[test]
    fn test_envelope_type_known_names() {
        assert_eq!(decode(r#"{"type":"auth"}"#).kind, EnvelopeType::Auth);
        assert_eq!(decode(r#"{"type":"event"}"#).kind, EnvelopeType::Event);
        assert_eq!(
            decode(r#"{"type":"broadcast"}"#).kind,
            EnvelopeType::Broadcast
        );
    }

    #[test]
    fn test_unknown_type_decodes_as_unknown() {
        let env = decode(r#"{"type":"presence","who":"x"}"#);
        assert_eq!(env.kind, EnvelopeType::Unknown("presence".into()));
        assert_eq!(env.into_inbound(), Inbound::Ignored(EnvelopeType::Unknown("presence".into())));
    }

    #[test]
    fn test_missing_type_is_an_error() {
        let result: Result<Envelope, _> = serde_json::from_str(r#"{"payload":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_string_type_is_an_error() {
        let result: Result<Envelope, _> = serde_json::from_str(r#"{"type":7}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_envelope_accepts_any_id_shape() {
        let env = decode(r#"{"id":431.77,"type":"event"}"#);
        assert_eq!(env.id, Some(json!(431.77)));
    }

    #[test]
    fn test_auth_success_carries_token() {
        let inbound = decode(r#"{"type":"auth","ack":true,"client_token":"abc"}"#)
            .into_inbound();
        assert_eq!(
            inbound,
            Inbound::Auth(AuthOutcome::Accepted {
                client_token: Some("abc".into())
            })
        );
    }

    #[test]
    fn test_auth_failure_requires_nack_and_error() {
        let rejected = decode(
            r#"{"type":"auth","ack":false,"error":true,"error_message":"bad key"}"#,
        )
        .into_inbound();
        assert_eq!(
            rejected,
            Inbound::Auth(AuthOutcome::Rejected {
                message: "bad key".into()
            })
        );

        // `ack: false` alone is not a rejection.
        let odd = decode(r#"{"type":"auth","ack":false}"#).into_inbound();
        assert!(matches!(odd, Inbound::Auth(AuthOutcome::Accepted { .. })));
    }

    #[test]
    fn test_auth_failure_without_message_uses_default() {
        let rejected = decode(r#"{"type":"auth","ack":false,"error":true}"#).into_inbound();
        assert_eq!(
            rejected,
            Inbound::Auth(AuthOutcome::Rejected {
                message: Envelope::DEFAULT_AUTH_ERROR.into()
            })
        );
    }

    #[test]
    fn test_event_with_channel() {
        let inbound = decode(r#"{"type":"event","channel":"news","payload":{"n":1}}"#)
            .into_inbound();
        assert_eq!(
            inbound,
            Inbound::Event {
                channel: Some("news".into()),
                payload: json!({"n": 1}),
            }
        );
    }

    #[test]
    fn test_event_empty_channel_and_missing_payload() {
        let inbound = decode(r#"{"type":"event","channel":""}"#).into_inbound();
        assert_eq!(
            inbound,
            Inbound::Event {
                channel: None,
                payload: Value::Null,
            }
        );
    }

    #[test]
    fn test_broadcast_ack() {
        assert_eq!(
            decode(r#"{"type":"broadcast","broadcast":true}"#).into_inbound(),
            Inbound::BroadcastToggled { enabled: true }
        );
        assert_eq!(
            decode(r#"{"type":"broadcast"}"#).into_inbound(),
            Inbound::BroadcastToggled { enabled: false }
        );
    }

    #[test]
    fn test_inbound_echo_of_command_is_ignored() {
        let inbound = decode(r#"{"id":3,"type":"listen","channel":"news"}"#).into_inbound();
        assert_eq!(inbound, Inbound::Ignored(EnvelopeType::Listen));
    }
}
