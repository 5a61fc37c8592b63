use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Request id used for the registration handshake
pub const REGISTER_ID: &str = "register_0";

/// SSAP endpoint URIs used by this crate
pub mod uri {
    pub const POWER_STATE: &str = "ssap://com.webos.service.tvpower/power/getPowerState";
    pub const FOREGROUND_APP: &str = "ssap://com.webos.applicationManager/getForegroundAppInfo";
    pub const VOLUME: &str = "ssap://audio/getVolume";
    pub const CURRENT_CHANNEL: &str = "ssap://tv/getCurrentChannel";

    pub const SYSTEM_INFO: &str = "ssap://system/getSystemInfo";
    pub const SOFTWARE_INFO: &str = "ssap://com.webos.service.update/getCurrentSWInformation";
    pub const SERVICE_LIST: &str = "ssap://api/getServiceList";
    pub const LIST_APPS: &str = "ssap://com.webos.applicationManager/listApps";

    pub const POINTER_SOCKET: &str = "ssap://com.webos.service.networkinput/getPointerInputSocket";

    pub const TURN_OFF: &str = "ssap://system/turnOff";
    pub const SET_MUTE: &str = "ssap://audio/setMute";
    pub const SET_VOLUME: &str = "ssap://audio/setVolume";
    pub const LAUNCH: &str = "ssap://system.launcher/launch";
    pub const OPEN_CHANNEL: &str = "ssap://tv/openChannel";
}

/// Message type tag carried in the `type` field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Register,
    Registered,
    Request,
    Subscribe,
    Unsubscribe,
    Response,
    Error,
    #[serde(other)]
    Unknown,
}

/// Outgoing message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Incoming message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Request {
    /// Create a one-shot request for the given endpoint
    pub fn new(uri: impl Into<String>) -> Self {
        Self::with_kind(MessageKind::Request, uri)
    }

    /// Create a subscription request for the given endpoint
    pub fn subscribe(uri: impl Into<String>) -> Self {
        Self::with_kind(MessageKind::Subscribe, uri)
    }

    /// Create the registration request, carrying the stored pairing key if any
    pub fn register(client_key: Option<&str>) -> Self {
        Self {
            kind: MessageKind::Register,
            id: REGISTER_ID.to_string(),
            uri: None,
            payload: Some(register_payload(client_key)),
        }
    }

    fn with_kind(kind: MessageKind, uri: impl Into<String>) -> Self {
        Self {
            kind,
            id: Uuid::new_v4().simple().to_string(),
            uri: Some(uri.into()),
            payload: None,
        }
    }

    /// Set the request payload
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Get the request ID
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Response {
    /// Error text if the message reports a failure.
    ///
    /// Covers `error` typed replies as well as payloads carrying
    /// `returnValue: false` or an `errorCode`.
    pub fn error_message(&self) -> Option<String> {
        if self.kind == MessageKind::Error {
            return Some(
                self.error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            );
        }

        let payload = self.payload.as_ref()?;
        let failed = payload.get("returnValue").and_then(Value::as_bool) == Some(false);
        let code = payload.get("errorCode");
        if !failed && code.is_none() {
            return None;
        }

        let text = payload
            .get("errorText")
            .and_then(Value::as_str)
            .map(str::to_string);
        let code = code.map(|c| match c.as_str() {
            Some(s) => s.to_string(),
            None => c.to_string(),
        });
        Some(match (code, text) {
            (Some(code), Some(text)) => format!("{} {}", code, text),
            (Some(code), None) => code,
            (None, Some(text)) => text,
            (None, None) => "request failed".to_string(),
        })
    }

    /// Pairing prompt acknowledgement sent while the user has not confirmed yet
    pub fn is_pairing_prompt(&self) -> bool {
        self.kind == MessageKind::Response
            && self
                .payload
                .as_ref()
                .and_then(|p| p.get("pairingType"))
                .and_then(Value::as_str)
                == Some("PROMPT")
    }

    /// Pairing key issued in a `registered` reply
    pub fn client_key(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.get("client-key"))
            .and_then(Value::as_str)
    }

    /// Consume the message into its payload, mapping failures to errors
    pub fn into_result(self) -> crate::error::Result<Value> {
        if let Some(detail) = self.error_message() {
            return Err(crate::error::WebOsError::ApiError { detail });
        }
        self.payload.ok_or_else(|| {
            crate::error::WebOsError::InvalidResponse("No payload in response".to_string())
        })
    }

    /// Build a push message carrying `payload`, as the television sends it
    #[cfg(test)]
    pub(crate) fn push(payload: Value) -> Self {
        Self {
            kind: MessageKind::Response,
            id: None,
            payload: Some(payload),
            error: None,
        }
    }
}

/// Encode a button press for the pointer input socket
pub fn button_frame(name: &str) -> String {
    format!("type:button\nname:{}\n\n", name)
}

fn register_payload(client_key: Option<&str>) -> Value {
    let mut payload = json!({
        "forcePairing": false,
        "pairingType": "PROMPT",
        "manifest": {
            "manifestVersion": 1,
            "appVersion": "1.1",
            "permissions": [
                "LAUNCH",
                "LAUNCH_WEBAPP",
                "APP_TO_APP",
                "CONTROL_AUDIO",
                "CONTROL_DISPLAY",
                "CONTROL_INPUT_JOYSTICK",
                "CONTROL_INPUT_MEDIA_RECORDING",
                "CONTROL_INPUT_MEDIA_PLAYBACK",
                "CONTROL_INPUT_TV",
                "CONTROL_POWER",
                "READ_APP_STATUS",
                "READ_CURRENT_CHANNEL",
                "READ_INPUT_DEVICE_LIST",
                "READ_NETWORK_STATE",
                "READ_RUNNING_APPS",
                "READ_TV_CHANNEL_LIST",
                "WRITE_NOTIFICATION_TOAST",
                "READ_POWER_STATE",
                "READ_COUNTRY_INFO",
                "READ_INSTALLED_APPS",
                "CONTROL_MOUSE_AND_KEYBOARD",
                "READ_LGE_SDX",
                "READ_UPDATE_INFO",
                "READ_LGE_TV_INPUT_EVENTS",
                "READ_TV_CURRENT_TIME"
            ]
        }
    });

    if let (Some(key), Some(obj)) = (client_key, payload.as_object_mut()) {
        obj.insert("client-key".to_string(), Value::String(key.to_string()));
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_ssap_envelope() {
        let request = Request::new(uri::SET_MUTE).with_payload(json!({ "mute": true }));
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["type"], "request");
        assert_eq!(value["uri"], "ssap://audio/setMute");
        assert_eq!(value["payload"]["mute"], true);
        assert_eq!(value["id"].as_str().unwrap(), request.id());
    }

    #[test]
    fn subscribe_omits_empty_payload() {
        let request = Request::subscribe(uri::VOLUME);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["type"], "subscribe");
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn register_carries_client_key_only_when_known() {
        let fresh = serde_json::to_value(Request::register(None)).unwrap();
        assert_eq!(fresh["id"], REGISTER_ID);
        assert!(fresh["payload"].get("client-key").is_none());
        assert_eq!(fresh["payload"]["pairingType"], "PROMPT");

        let paired = serde_json::to_value(Request::register(Some("abc123"))).unwrap();
        assert_eq!(paired["payload"]["client-key"], "abc123");
    }

    #[test]
    fn error_reply_is_reported() {
        let response: Response = serde_json::from_str(
            r#"{"type":"error","id":"x","error":"401 insufficient permissions","payload":{}}"#,
        )
        .unwrap();
        assert_eq!(
            response.error_message().as_deref(),
            Some("401 insufficient permissions")
        );
    }

    #[test]
    fn error_code_in_payload_is_reported() {
        let response: Response = serde_json::from_str(
            r#"{"type":"response","id":"x","payload":{"returnValue":false,"errorCode":-102,"errorText":"no channel"}}"#,
        )
        .unwrap();
        assert_eq!(response.error_message().as_deref(), Some("-102 no channel"));
        assert!(response.into_result().is_err());
    }

    #[test]
    fn successful_reply_yields_payload() {
        let response: Response = serde_json::from_str(
            r#"{"type":"response","id":"x","payload":{"returnValue":true,"volume":12}}"#,
        )
        .unwrap();
        assert!(response.error_message().is_none());
        assert_eq!(response.into_result().unwrap()["volume"], 12);
    }

    #[test]
    fn pairing_prompt_and_key_are_recognised() {
        let prompt: Response = serde_json::from_str(
            r#"{"type":"response","id":"register_0","payload":{"pairingType":"PROMPT","returnValue":true}}"#,
        )
        .unwrap();
        assert!(prompt.is_pairing_prompt());

        let registered: Response = serde_json::from_str(
            r#"{"type":"registered","id":"register_0","payload":{"client-key":"k-1"}}"#,
        )
        .unwrap();
        assert_eq!(registered.kind, MessageKind::Registered);
        assert_eq!(registered.client_key(), Some("k-1"));
    }

    #[test]
    fn unknown_message_types_still_parse() {
        let response: Response =
            serde_json::from_str(r#"{"type":"hello","payload":{}}"#).unwrap();
        assert_eq!(response.kind, MessageKind::Unknown);
    }

    #[test]
    fn button_frame_matches_pointer_socket_format() {
        assert_eq!(button_frame("UP"), "type:button\nname:UP\n\n");
    }
}
