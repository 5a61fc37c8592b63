//! Remote-control keys and their webOS button names

use serde::{Deserialize, Serialize};

/// Abstract remote key, numbered as the accessory layer sends them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteKey {
    Rewind,
    FastForward,
    NextTrack,
    PreviousTrack,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Select,
    Back,
    Exit,
    PlayPause,
    Information,
}

impl RemoteKey {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => RemoteKey::Rewind,
            1 => RemoteKey::FastForward,
            2 => RemoteKey::NextTrack,
            3 => RemoteKey::PreviousTrack,
            4 => RemoteKey::ArrowUp,
            5 => RemoteKey::ArrowDown,
            6 => RemoteKey::ArrowLeft,
            7 => RemoteKey::ArrowRight,
            8 => RemoteKey::Select,
            9 => RemoteKey::Back,
            10 => RemoteKey::Exit,
            11 => RemoteKey::PlayPause,
            15 => RemoteKey::Information,
            _ => return None,
        })
    }

    /// Button name for this key
    ///
    /// `paused` picks PLAY or PAUSE for the play/pause key, `switch_info_menu`
    /// picks MENU or INFO for the information key. Keys the television has no
    /// button for map to an empty name.
    pub fn button(self, paused: bool, switch_info_menu: bool) -> &'static str {
        match self {
            RemoteKey::Rewind => "REWIND",
            RemoteKey::FastForward => "FASTFORWARD",
            RemoteKey::NextTrack | RemoteKey::PreviousTrack => "",
            RemoteKey::ArrowUp => "UP",
            RemoteKey::ArrowDown => "DOWN",
            RemoteKey::ArrowLeft => "LEFT",
            RemoteKey::ArrowRight => "RIGHT",
            RemoteKey::Select => "ENTER",
            RemoteKey::Back => "BACK",
            RemoteKey::Exit => "EXIT",
            RemoteKey::PlayPause if paused => "PLAY",
            RemoteKey::PlayPause => "PAUSE",
            RemoteKey::Information => info_button(switch_info_menu),
        }
    }
}

/// Relative volume key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeSelector {
    Increment,
    Decrement,
}

impl VolumeSelector {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(VolumeSelector::Increment),
            1 => Some(VolumeSelector::Decrement),
            _ => None,
        }
    }

    pub fn button(self) -> &'static str {
        match self {
            VolumeSelector::Increment => "VOLUMEUP",
            VolumeSelector::Decrement => "VOLUMEDOWN",
        }
    }
}

/// Requested visibility of the on-screen info overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerModeSelection {
    Show,
    Hide,
}

/// Button that toggles the info overlay given its current visibility
pub fn overlay_button(visible: bool, switch_info_menu: bool) -> &'static str {
    if visible {
        "BACK"
    } else {
        info_button(switch_info_menu)
    }
}

fn info_button(switch_info_menu: bool) -> &'static str {
    if switch_info_menu {
        "MENU"
    } else {
        "INFO"
    }
}
