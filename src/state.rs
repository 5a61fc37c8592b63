use crate::error::{WebOsError, Result};
use crate::protocol::uri;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Connection lifecycle of one television
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Television not reachable, or session torn down
    Disconnected,
    /// Started, no reachability result yet
    Probing,
    /// Control session being established
    Connecting,
    /// Waiting for the user to accept the pairing prompt on the television
    AwaitingPairingConfirmation,
    /// Session established and bootstrapped
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Probing => "probing",
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingPairingConfirmation => "awaiting pairing confirmation",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Latest known state of the television
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStateSnapshot {
    pub power_on: bool,
    pub muted: bool,
    pub volume: i32,
    pub foreground_app_id: Option<String>,
    pub channel_number: Option<String>,
    pub channel_name: Option<String>,
    pub info_overlay_visible: bool,
    pub paused: bool,
}

/// A subscription that feeds one field group of the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Power,
    ForegroundApp,
    Audio,
    Channel,
}

impl Feed {
    pub const ALL: [Feed; 4] = [Feed::Power, Feed::ForegroundApp, Feed::Audio, Feed::Channel];

    pub fn uri(self) -> &'static str {
        match self {
            Feed::Power => uri::POWER_STATE,
            Feed::ForegroundApp => uri::FOREGROUND_APP,
            Feed::Audio => uri::VOLUME,
            Feed::Channel => uri::CURRENT_CHANNEL,
        }
    }

    /// Apply one push to the snapshot
    ///
    /// A payload that does not carry this feed's fields is rejected and the
    /// snapshot is left as it was.
    pub fn apply(self, snapshot: &mut DeviceStateSnapshot, payload: &Value) -> Result<()> {
        match self {
            Feed::Power => {
                snapshot.power_on = power_on_from(payload)?;
            }
            Feed::ForegroundApp => {
                let app = payload
                    .get("appId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("appId missing"))?;
                snapshot.foreground_app_id = (!app.is_empty()).then(|| app.to_string());
            }
            Feed::Audio => apply_audio(snapshot, payload)?,
            Feed::Channel => {
                let number = payload
                    .get("channelNumber")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("channelNumber missing"))?;
                snapshot.channel_number = Some(number.to_string());
                snapshot.channel_name = payload
                    .get("channelName")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
        }
        Ok(())
    }
}

/// Derive the on/off signal from a power state push
///
/// The television reports "Active" in several fields while waking up; any of
/// them counts as on, unless the state or processing field says
/// "Active Standby", which always means off.
pub fn power_on_from(payload: &Value) -> Result<bool> {
    let field = |name: &str| payload.get(name).and_then(Value::as_str);
    let state = field("state");
    let processing = field("processing");
    let reason = field("powerOnReason");

    if state.is_none() && processing.is_none() && reason.is_none() {
        return Err(invalid("power state missing"));
    }

    let active = [state, processing, reason].contains(&Some("Active"));
    let standby = [state, processing].contains(&Some("Active Standby"));
    Ok(active && !standby)
}

/// Update mute and volume, each only if the push says it changed
fn apply_audio(snapshot: &mut DeviceStateSnapshot, payload: &Value) -> Result<()> {
    // Newer firmware nests the values in `volumeStatus`
    let (muted, volume) = match payload.get("volumeStatus") {
        Some(status) => (
            status.get("muteStatus").and_then(Value::as_bool),
            status.get("volume").and_then(Value::as_i64),
        ),
        None => (
            payload.get("muted").and_then(Value::as_bool),
            payload.get("volume").and_then(Value::as_i64),
        ),
    };
    if muted.is_none() && volume.is_none() {
        return Err(invalid("audio state missing"));
    }
    let volume = volume
        .map(i32::try_from)
        .transpose()
        .map_err(|_| invalid("volume out of range"))?;

    let changed: Option<Vec<&str>> = payload
        .get("changed")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect());
    let was_changed = |key: &str| match &changed {
        Some(keys) => keys.contains(&key),
        None => true,
    };

    if let Some(muted) = muted.filter(|_| was_changed("muted")) {
        snapshot.muted = muted;
    }
    if let Some(volume) = volume.filter(|_| was_changed("volume")) {
        snapshot.volume = volume;
    }
    Ok(())
}

fn invalid(detail: &str) -> WebOsError {
    WebOsError::InvalidResponse(detail.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standby_overrides_active() {
        let payload = json!({ "state": "Active", "processing": "Active Standby" });
        assert!(!power_on_from(&payload).unwrap());
    }

    #[test]
    fn plain_active_is_on() {
        assert!(power_on_from(&json!({ "state": "Active" })).unwrap());
        assert!(power_on_from(&json!({ "state": "Suspend", "powerOnReason": "Active" })).unwrap());
    }

    #[test]
    fn active_standby_state_is_off() {
        assert!(!power_on_from(&json!({ "state": "Active Standby" })).unwrap());
        assert!(!power_on_from(&json!({ "state": "Screen Off" })).unwrap());
    }

    #[test]
    fn empty_power_payload_is_rejected() {
        let mut snapshot = DeviceStateSnapshot {
            power_on: true,
            ..Default::default()
        };
        assert!(Feed::Power.apply(&mut snapshot, &json!({})).is_err());
        assert!(snapshot.power_on);
    }

    #[test]
    fn mute_change_leaves_volume_alone() {
        let mut snapshot = DeviceStateSnapshot {
            volume: 20,
            ..Default::default()
        };
        Feed::Audio
            .apply(
                &mut snapshot,
                &json!({ "muted": true, "volume": 3, "changed": ["muted"] }),
            )
            .unwrap();

        assert!(snapshot.muted);
        assert_eq!(snapshot.volume, 20);
    }

    #[test]
    fn volume_change_leaves_mute_alone() {
        let mut snapshot = DeviceStateSnapshot {
            muted: true,
            ..Default::default()
        };
        Feed::Audio
            .apply(
                &mut snapshot,
                &json!({ "muted": false, "volume": 15, "changed": ["volume"] }),
            )
            .unwrap();

        assert!(snapshot.muted);
        assert_eq!(snapshot.volume, 15);
    }

    #[test]
    fn initial_audio_reply_sets_both() {
        let mut snapshot = DeviceStateSnapshot::default();
        Feed::Audio
            .apply(&mut snapshot, &json!({ "muted": true, "volume": 9 }))
            .unwrap();
        assert!(snapshot.muted);
        assert_eq!(snapshot.volume, 9);
    }

    #[test]
    fn nested_volume_status_is_understood() {
        let mut snapshot = DeviceStateSnapshot::default();
        Feed::Audio
            .apply(
                &mut snapshot,
                &json!({ "volumeStatus": { "muteStatus": false, "volume": 31 }, "changed": ["volume"] }),
            )
            .unwrap();
        assert_eq!(snapshot.volume, 31);
    }

    #[test]
    fn out_of_range_volume_leaves_cache_alone() {
        let mut snapshot = DeviceStateSnapshot::default();
        snapshot.volume = 12;

        let result = Feed::Audio.apply(&mut snapshot, &json!({ "muted": true, "volume": 4_294_967_308u64 }));

        assert!(matches!(result, Err(WebOsError::InvalidResponse(_))));
        assert_eq!(snapshot.volume, 12);
        assert!(!snapshot.muted);
    }

    #[test]
    fn foreground_app_sets_input() {
        let mut snapshot = DeviceStateSnapshot::default();
        Feed::ForegroundApp
            .apply(&mut snapshot, &json!({ "appId": "com.webos.app.hdmi1" }))
            .unwrap();
        assert_eq!(snapshot.foreground_app_id.as_deref(), Some("com.webos.app.hdmi1"));

        Feed::ForegroundApp
            .apply(&mut snapshot, &json!({ "appId": "" }))
            .unwrap();
        assert_eq!(snapshot.foreground_app_id, None);
    }

    #[test]
    fn channel_updates_number_and_name_together() {
        let mut snapshot = DeviceStateSnapshot::default();
        Feed::Channel
            .apply(
                &mut snapshot,
                &json!({ "channelNumber": "7-1", "channelName": "KABC" }),
            )
            .unwrap();
        assert_eq!(snapshot.channel_number.as_deref(), Some("7-1"));
        assert_eq!(snapshot.channel_name.as_deref(), Some("KABC"));

        assert!(Feed::Channel
            .apply(&mut snapshot, &json!({ "channelName": "lost" }))
            .is_err());
        assert_eq!(snapshot.channel_name.as_deref(), Some("KABC"));
    }
}
