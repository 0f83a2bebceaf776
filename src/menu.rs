// src/menu.rs
//
// Settings menu.
//
// The menu is a small state machine: `Menu::render` turns the current screen
// into lines and `Menu::handle_key` moves between screens and edits the
// settings in place. `ConsoleMenu` drives it from the keyboard while the
// event loop is suspended.

use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};
use std::io::Write;

use crate::io::codec::{decode_hex, parse_hex_u32};
use crate::io::serial::{check_baud_rate, FlowControl, Parity};
use crate::io::socketcan::codec::{parse_filter, validate_bitrate, validate_interface_name};
use crate::io::InterfaceType;
use crate::parser::InputMode;
use crate::repeat::{PresetSlot, Registry};
use crate::settings::{Preset, PresetFormat, Settings};
use crate::terminal::commands::MANUAL_LINES;

// ============================================================================
// Types
// ============================================================================

/// A key as the menu understands it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuKey {
    Char(char),
    Enter,
    Backspace,
    Esc,
}

/// A value edited through a text prompt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Device,
    Baud,
    DataBits,
    Parity,
    StopBits,
    Flow,
    CanInterface,
    CanBitrate,
    CanTxId,
    CanFilter,
    PresetName(PresetSlot),
    PresetCanId(PresetSlot),
    PresetData(PresetSlot),
}

impl Field {
    fn prompt(&self) -> &'static str {
        match self {
            Field::Device => "Device path (e.g. /dev/ttyUSB0)",
            Field::Baud => "Baud rate (e.g. 9600, 115200)",
            Field::DataBits => "Data bits (5-8)",
            Field::Parity => "Parity (N/E/O)",
            Field::StopBits => "Stop bits (1/2)",
            Field::Flow => "Flow control (none/hardware/software)",
            Field::CanInterface => "CAN interface (e.g. can0, vcan0)",
            Field::CanBitrate => "CAN bitrate (125000/250000/500000/1000000)",
            Field::CanTxId => "TX CAN ID (hex, e.g. 0x123)",
            Field::CanFilter => "Filter (id:mask in hex, or 'none')",
            Field::PresetName(_) => "Name ('-' restores the default)",
            Field::PresetCanId(_) => "CAN ID (hex, '-' uses the TX CAN ID)",
            Field::PresetData(_) => "Data ('-' clears)",
        }
    }

    /// Fields the transport is opened with
    fn needs_reconnect(&self) -> bool {
        matches!(
            self,
            Field::Device
                | Field::Baud
                | Field::DataBits
                | Field::Parity
                | Field::StopBits
                | Field::Flow
                | Field::CanInterface
                | Field::CanBitrate
                | Field::CanFilter
        )
    }

    /// Screen to return to after the edit
    fn parent(&self) -> MenuState {
        match *self {
            Field::PresetName(slot) | Field::PresetCanId(slot) | Field::PresetData(slot) => {
                MenuState::Preset(slot)
            }
            _ => MenuState::Main,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MenuState {
    Main,
    Presets,
    Preset(PresetSlot),
    Edit { field: Field, input: String },
    Manual,
    Done,
}

/// What the loop must do once the menu closes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MenuOutcome {
    pub reconnect: bool,
    pub save: bool,
}

pub struct Menu {
    pub state: MenuState,
    /// Feedback from the last action, shown under the screen
    pub notice: Option<String>,
    pub outcome: MenuOutcome,
}

impl Default for Menu {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// State Machine
// ============================================================================

impl Menu {
    pub fn new() -> Self {
        Self {
            state: MenuState::Main,
            notice: None,
            outcome: MenuOutcome::default(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == MenuState::Done
    }

    fn edit(field: Field) -> MenuState {
        MenuState::Edit {
            field,
            input: String::new(),
        }
    }

    pub fn handle_key(&mut self, key: MenuKey, settings: &mut Settings) {
        let state = std::mem::replace(&mut self.state, MenuState::Done);
        if !matches!(state, MenuState::Edit { .. }) {
            self.notice = None;
        }
        self.state = match state {
            MenuState::Main => self.main_key(key, settings),
            MenuState::Presets => match key {
                MenuKey::Char(c) if c.is_ascii_digit() => {
                    let n = if c == '0' { 10 } else { c as u8 - b'0' };
                    PresetSlot::new(n).map_or(MenuState::Presets, MenuState::Preset)
                }
                MenuKey::Esc => MenuState::Main,
                MenuKey::Char(c) if c.eq_ignore_ascii_case(&'q') => MenuState::Main,
                _ => MenuState::Presets,
            },
            MenuState::Preset(slot) => self.preset_key(slot, key, settings),
            MenuState::Edit { field, mut input } => match key {
                MenuKey::Char(c) if !c.is_control() => {
                    input.push(c);
                    MenuState::Edit { field, input }
                }
                MenuKey::Backspace => {
                    input.pop();
                    MenuState::Edit { field, input }
                }
                MenuKey::Esc => field.parent(),
                MenuKey::Enter => {
                    match self.commit(field, input.trim(), settings) {
                        Ok(true) => {
                            if field.needs_reconnect() {
                                self.outcome.reconnect = true;
                            }
                            self.notice = None;
                        }
                        Ok(false) => self.notice = None,
                        Err(e) => self.notice = Some(e),
                    }
                    field.parent()
                }
                MenuKey::Char(_) => MenuState::Edit { field, input },
            },
            MenuState::Manual => MenuState::Main,
            MenuState::Done => MenuState::Done,
        };
    }

    fn main_key(&mut self, key: MenuKey, settings: &mut Settings) -> MenuState {
        let c = match key {
            MenuKey::Char(c) => c.to_ascii_uppercase(),
            MenuKey::Esc => 'Q',
            _ => return MenuState::Main,
        };
        let serial = settings.interface == InterfaceType::Serial;
        match c {
            'T' => {
                settings.interface = match settings.interface {
                    InterfaceType::Serial => InterfaceType::Can,
                    InterfaceType::Can => InterfaceType::Serial,
                };
                self.outcome.reconnect = true;
                self.notice = Some(format!("Switched to {} mode", settings.interface));
                MenuState::Main
            }
            'A' if serial => Self::edit(Field::Device),
            'B' if serial => Self::edit(Field::Baud),
            'C' if serial => Self::edit(Field::DataBits),
            'D' if serial => Self::edit(Field::Parity),
            'E' if serial => Self::edit(Field::StopBits),
            'F' if serial => Self::edit(Field::Flow),
            'A' => Self::edit(Field::CanInterface),
            'B' => Self::edit(Field::CanBitrate),
            'C' => Self::edit(Field::CanTxId),
            'D' => Self::edit(Field::CanFilter),
            'M' => {
                settings.mode = match settings.mode {
                    InputMode::Hex => InputMode::Text,
                    InputMode::Text => InputMode::Hex,
                };
                MenuState::Main
            }
            'L' => {
                settings.crlf = !settings.crlf;
                self.notice = Some(format!("CRLF is now {}", if settings.crlf { "ON" } else { "OFF" }));
                MenuState::Main
            }
            'P' => MenuState::Presets,
            'H' => MenuState::Manual,
            'S' => {
                self.outcome.save = true;
                MenuState::Done
            }
            'Q' => MenuState::Done,
            _ => MenuState::Main,
        }
    }

    fn preset_key(&mut self, slot: PresetSlot, key: MenuKey, settings: &mut Settings) -> MenuState {
        let c = match key {
            MenuKey::Char(c) => c.to_ascii_uppercase(),
            MenuKey::Esc => 'Q',
            _ => return MenuState::Preset(slot),
        };
        match c {
            'N' => Self::edit(Field::PresetName(slot)),
            'I' => Self::edit(Field::PresetCanId(slot)),
            'E' => Self::edit(Field::PresetData(slot)),
            'F' => {
                if let Some(preset) = settings.preset_mut(slot) {
                    preset.format = match preset.format {
                        PresetFormat::Hex => PresetFormat::Text,
                        PresetFormat::Text => PresetFormat::Hex,
                    };
                }
                MenuState::Preset(slot)
            }
            'D' => {
                if let Some(preset) = settings.preset_mut(slot) {
                    *preset = Preset::default_for(slot);
                }
                self.notice = Some(format!("Preset {} cleared to defaults", slot));
                MenuState::Preset(slot)
            }
            'Q' => MenuState::Presets,
            _ => MenuState::Preset(slot),
        }
    }

    /// Apply an edited value. Empty input keeps the current value and
    /// returns `Ok(false)`.
    fn commit(&mut self, field: Field, input: &str, settings: &mut Settings) -> Result<bool, String> {
        if input.is_empty() {
            return Ok(false);
        }
        match field {
            Field::Device => settings.serial.device = input.to_string(),
            Field::Baud => {
                let baud = input
                    .parse::<u32>()
                    .map_err(|_| format!("Invalid baud rate '{}'", input))?;
                settings.serial.baud = check_baud_rate(baud)?;
            }
            Field::DataBits => {
                settings.serial.data_bits = input
                    .parse::<u8>()
                    .ok()
                    .filter(|b| (5..=8).contains(b))
                    .ok_or_else(|| format!("Invalid data bits '{}'", input))?;
            }
            Field::Parity => {
                settings.serial.parity =
                    Parity::parse(input).ok_or_else(|| format!("Invalid parity '{}'", input))?;
            }
            Field::StopBits => {
                settings.serial.stop_bits = match input {
                    "1" => 1,
                    "2" => 2,
                    _ => return Err(format!("Invalid stop bits '{}'", input)),
                };
            }
            Field::Flow => {
                settings.serial.flow = FlowControl::parse(input)
                    .ok_or_else(|| format!("Invalid flow control '{}'", input))?;
            }
            Field::CanInterface => {
                validate_interface_name(input)?;
                settings.can.interface = input.to_string();
            }
            Field::CanBitrate => settings.can.bitrate = validate_bitrate(input)?,
            Field::CanTxId => {
                parse_hex_u32(input).ok_or_else(|| format!("Invalid CAN ID '{}'", input))?;
                settings.can.tx_id = input.to_string();
            }
            Field::CanFilter => {
                if input.eq_ignore_ascii_case("none") {
                    settings.can.filter = None;
                } else {
                    parse_filter(input)?;
                    settings.can.filter = Some(input.to_string());
                }
            }
            Field::PresetName(slot) => {
                let name = if input == "-" {
                    format!("Preset {}", slot)
                } else {
                    input.to_string()
                };
                if let Some(preset) = settings.preset_mut(slot) {
                    preset.name = name;
                }
            }
            Field::PresetCanId(slot) => {
                let id = if input == "-" {
                    None
                } else {
                    parse_hex_u32(input).ok_or_else(|| format!("Invalid CAN ID '{}'", input))?;
                    Some(input.to_string())
                };
                if let Some(preset) = settings.preset_mut(slot) {
                    preset.can_id = id;
                }
            }
            Field::PresetData(slot) => {
                let hex = settings.interface == InterfaceType::Can
                    || settings.preset(slot).map(|p| p.format) == Some(PresetFormat::Hex);
                let data = if input == "-" { String::new() } else { input.to_string() };
                if hex && !data.is_empty() {
                    decode_hex(&data).map_err(|e| format!("Invalid hex data: {}", e))?;
                }
                if let Some(preset) = settings.preset_mut(slot) {
                    preset.data = data;
                }
            }
        }
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    pub fn render(&self, settings: &Settings, registry: &Registry) -> Vec<String> {
        let mut lines = match &self.state {
            MenuState::Main => render_main(settings, registry),
            MenuState::Presets => render_presets(settings),
            MenuState::Preset(slot) => render_preset(*slot, settings),
            MenuState::Edit { field, input } => {
                vec![format!("{}: {}", field.prompt(), input)]
            }
            MenuState::Manual => {
                let mut lines: Vec<String> = MANUAL_LINES.iter().map(|l| l.to_string()).collect();
                lines.push(String::new());
                lines.push("Press any key to return...".to_string());
                lines
            }
            MenuState::Done => Vec::new(),
        };
        if let Some(notice) = &self.notice {
            lines.push(String::new());
            lines.push(notice.clone());
        }
        lines
    }
}

const RULE: &str = "+-----------------------------------------------------------------+";

fn row(text: &str) -> String {
    format!("| {:<63} |", text)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}

fn render_main(settings: &Settings, registry: &Registry) -> Vec<String> {
    let mut lines = vec![
        RULE.to_string(),
        row("                    BUSTERM Settings Menu"),
        RULE.to_string(),
        row(&format!("T - Interface type: {}", settings.interface)),
        RULE.to_string(),
    ];

    match settings.interface {
        InterfaceType::Serial => {
            let s = &settings.serial;
            lines.push(row("Serial Configuration"));
            lines.push(RULE.to_string());
            lines.push(row(&format!("A - Device        : {}", s.device)));
            lines.push(row(&format!("B - Baud rate     : {}", s.baud)));
            lines.push(row(&format!("C - Data bits     : {}", s.data_bits)));
            lines.push(row(&format!("D - Parity        : {}", s.parity.letter())));
            lines.push(row(&format!("E - Stop bits     : {}", s.stop_bits)));
            lines.push(row(&format!("F - Flow control  : {}", s.flow.name())));
        }
        InterfaceType::Can => {
            let c = &settings.can;
            lines.push(row("CAN Configuration"));
            lines.push(RULE.to_string());
            lines.push(row(&format!("A - Interface     : {}", c.interface)));
            lines.push(row(&format!("B - Bitrate       : {}", c.bitrate)));
            lines.push(row(&format!("C - TX CAN ID     : {}", c.tx_id)));
            lines.push(row(&format!(
                "D - Filter        : {}",
                c.filter.as_deref().unwrap_or("none")
            )));
        }
    }

    lines.push(RULE.to_string());
    lines.push(row(&format!("M - Mode          : {}", settings.mode.name())));
    lines.push(row(&format!("L - CRLF          : {}", if settings.crlf { "yes" } else { "no" })));
    lines.push(RULE.to_string());
    lines.push(row("Presets (Alt+1-9,0 to send, /p N to use)"));
    lines.push(RULE.to_string());

    for (slot, preset) in PresetSlot::all().zip(settings.presets.iter()) {
        let task = registry.preset(slot);
        let status = if task.enabled {
            format!("R:{}ms", task.interval_ms)
        } else {
            String::new()
        };
        lines.push(row(&format!(
            "{:>2}) {:<10} {:<25} {:>12}",
            slot.number(),
            truncate(&preset.name, 10),
            truncate(&preset.data, 25),
            status
        )));
    }

    lines.push(RULE.to_string());
    lines.push(row("P - Edit presets   H - Show manual   S - Save   Q - Exit"));
    lines.push(RULE.to_string());
    lines
}

fn render_presets(settings: &Settings) -> Vec<String> {
    let mut lines = vec![RULE.to_string(), row("                    Preset Editor"), RULE.to_string()];
    for (slot, preset) in PresetSlot::all().zip(settings.presets.iter()) {
        let id = match settings.interface {
            InterfaceType::Can => format!(
                "ID:{:<8}",
                preset.can_id.as_deref().unwrap_or(settings.can.tx_id.as_str())
            ),
            InterfaceType::Serial => String::new(),
        };
        lines.push(row(&format!(
            "{:>2}) {:<14} {:<11} {}",
            slot.number(),
            truncate(&preset.name, 14),
            id,
            truncate(&preset.data, 20)
        )));
    }
    lines.push(RULE.to_string());
    lines.push(row("Select [1-9,0] to edit, or Q to return"));
    lines.push(RULE.to_string());
    lines
}

fn render_preset(slot: PresetSlot, settings: &Settings) -> Vec<String> {
    let Some(preset) = settings.preset(slot) else {
        return Vec::new();
    };
    let format = match preset.format {
        PresetFormat::Hex => "hex",
        PresetFormat::Text => "text",
    };
    let mut lines = vec![
        RULE.to_string(),
        row(&format!("Preset {} Options", slot)),
        RULE.to_string(),
        row(&format!("N - Name   : {}", preset.name)),
        row(&format!("F - Format : {}", format)),
    ];
    if settings.interface == InterfaceType::Can {
        lines.push(row(&format!(
            "I - CAN ID : {}",
            preset.can_id.as_deref().unwrap_or("(TX CAN ID)")
        )));
    }
    lines.push(row(&format!("E - Data   : {}", preset.data)));
    lines.push(RULE.to_string());
    lines.push(row("D - Restore defaults   Q - Back"));
    lines.push(RULE.to_string());
    lines
}

// ============================================================================
// Console Driver
// ============================================================================

/// Runs the menu to completion
pub trait MenuDriver {
    fn run(&mut self, settings: &mut Settings, registry: &Registry) -> std::io::Result<MenuOutcome>;
}

/// Reads keys from the terminal while the event loop is suspended
pub struct ConsoleMenu;

impl ConsoleMenu {
    fn draw(lines: &[String]) -> std::io::Result<()> {
        let mut out = std::io::stdout();
        queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
        for line in lines {
            queue!(out, Print(line), Print("\r\n"))?;
        }
        out.flush()
    }

    fn next_key() -> std::io::Result<MenuKey> {
        loop {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Release {
                    continue;
                }
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    return Ok(MenuKey::Esc);
                }
                match key.code {
                    KeyCode::Char(c) => return Ok(MenuKey::Char(c)),
                    KeyCode::Enter => return Ok(MenuKey::Enter),
                    KeyCode::Backspace => return Ok(MenuKey::Backspace),
                    KeyCode::Esc => return Ok(MenuKey::Esc),
                    _ => {}
                }
            }
        }
    }
}

impl MenuDriver for ConsoleMenu {
    fn run(&mut self, settings: &mut Settings, registry: &Registry) -> std::io::Result<MenuOutcome> {
        let mut menu = Menu::new();
        while !menu.is_done() {
            let mut lines = menu.render(settings, registry);
            if matches!(menu.state, MenuState::Main | MenuState::Presets | MenuState::Preset(_)) {
                lines.push(String::new());
                lines.push("Select option: ".to_string());
            }
            Self::draw(&lines)?;
            let key = Self::next_key()?;
            menu.handle_key(key, settings);
        }
        execute!(std::io::stdout(), Clear(ClearType::All), MoveTo(0, 0))?;
        Ok(menu.outcome)
    }
}
