// src/settings.rs
//
// Persistent terminal settings, stored as TOML.
//
// Every field carries a serde default so partial or older files still load.
// The file is written with defaults on first run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::io::codec::{decode_hex, parse_hex_u32};
use crate::io::serial::{FlowControl, Parity};
use crate::io::InterfaceType;
use crate::parser::{InputMode, Payload};
use crate::repeat::{PresetSlot, PRESET_COUNT};

/// CAN id used when neither a preset nor the settings give a valid one
pub const FALLBACK_CAN_ID: u32 = 0x123;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub interface: InterfaceType,
    #[serde(default)]
    pub mode: InputMode,
    #[serde(default = "default_true")]
    pub crlf: bool,
    #[serde(default)]
    pub serial: SerialSettings,
    #[serde(default)]
    pub can: CanSettings,
    #[serde(default = "default_presets")]
    pub presets: Vec<Preset>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SerialSettings {
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub flow: FlowControl,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CanSettings {
    #[serde(default = "default_can_interface")]
    pub interface: String,
    #[serde(default = "default_can_bitrate")]
    pub bitrate: u32,
    #[serde(default = "default_tx_id")]
    pub tx_id: String,
    /// Receive filter as `id:mask` in hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetFormat {
    #[default]
    Hex,
    Text,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Preset {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub format: PresetFormat,
    #[serde(default)]
    pub data: String,
    /// Overrides `can.tx_id` for this preset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_id: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_device() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud() -> u32 {
    115200
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_can_interface() -> String {
    "can0".to_string()
}

fn default_can_bitrate() -> u32 {
    1_000_000
}

fn default_tx_id() -> String {
    "0x123".to_string()
}

fn default_presets() -> Vec<Preset> {
    PresetSlot::all().map(Preset::default_for).collect()
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            device: default_device(),
            baud: default_baud(),
            data_bits: default_data_bits(),
            parity: Parity::default(),
            stop_bits: default_stop_bits(),
            flow: FlowControl::default(),
        }
    }
}

impl Default for CanSettings {
    fn default() -> Self {
        Self {
            interface: default_can_interface(),
            bitrate: default_can_bitrate(),
            tx_id: default_tx_id(),
            filter: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interface: InterfaceType::default(),
            mode: InputMode::default(),
            crlf: default_true(),
            serial: SerialSettings::default(),
            can: CanSettings::default(),
            presets: default_presets(),
        }
    }
}

impl Preset {
    pub fn default_for(slot: PresetSlot) -> Self {
        Self {
            name: format!("Preset {}", slot),
            ..Self::default()
        }
    }
}

// ============================================================================
// Presets
// ============================================================================

impl Settings {
    /// Make sure there are exactly ten presets and each has a name
    pub fn normalize(&mut self) {
        self.presets.truncate(PRESET_COUNT);
        while self.presets.len() < PRESET_COUNT {
            self.presets.push(Preset::default());
        }
        for (slot, preset) in PresetSlot::all().zip(self.presets.iter_mut()) {
            if preset.name.trim().is_empty() {
                preset.name = format!("Preset {}", slot);
            }
        }
    }

    pub fn preset(&self, slot: PresetSlot) -> Option<&Preset> {
        self.presets.get(slot.index())
    }

    pub fn preset_mut(&mut self, slot: PresetSlot) -> Option<&mut Preset> {
        self.presets.get_mut(slot.index())
    }

    /// The configured CAN transmit id, falling back to 0x123
    pub fn can_tx_id(&self) -> u32 {
        parse_hex_u32(self.can.tx_id.trim()).unwrap_or(FALLBACK_CAN_ID)
    }

    /// Build the payload a preset sends on the current interface.
    /// CAN presets are always hex; serial presets follow their format.
    pub fn resolve_preset(&self, slot: PresetSlot) -> Result<Payload, String> {
        let preset = self
            .preset(slot)
            .ok_or_else(|| format!("Preset {} does not exist", slot))?;
        if preset.data.trim().is_empty() {
            return Err(format!("Preset {} is empty", slot));
        }

        match self.interface {
            InterfaceType::Can => {
                let bytes = decode_hex(&preset.data)
                    .map_err(|e| format!("Preset {} data: {}", slot, e))?;
                let can_id = match preset.can_id.as_deref().map(str::trim) {
                    Some(id) if !id.is_empty() => Some(
                        parse_hex_u32(id)
                            .ok_or_else(|| format!("Preset {} has invalid CAN ID '{}'", slot, id))?,
                    ),
                    _ => None,
                };
                Ok(Payload::hex(bytes).with_can_id(can_id))
            }
            InterfaceType::Serial => match preset.format {
                PresetFormat::Text => Ok(Payload::text(preset.data.clone())),
                PresetFormat::Hex => decode_hex(&preset.data)
                    .map(Payload::hex)
                    .map_err(|e| format!("Preset {} data: {}", slot, e)),
            },
        }
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// `<config dir>/busterm/config.toml`
pub fn default_settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or_else(|| "Failed to get config dir".to_string())?;
    Ok(dir.join("busterm").join("config.toml"))
}

/// `<data dir>/busterm/history`
pub fn default_history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("busterm").join("history"))
}

pub fn load_settings(path: &Path) -> Result<Settings, String> {
    if path.exists() {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("Failed to read settings: {}", e))?;
        let mut settings: Settings =
            toml::from_str(&content).map_err(|e| format!("Failed to parse settings: {}", e))?;
        settings.normalize();
        Ok(settings)
    } else {
        // First run: write the defaults so the operator has a file to edit
        let settings = Settings::default();
        save_settings(path, &settings)?;
        tlog!("[settings] Created {}", path.display());
        Ok(settings)
    }
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config dir: {}", e))?;
    }
    let content = toml::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    std::fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))
}
