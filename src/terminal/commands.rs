// src/terminal/commands.rs
//
// Slash-command dispatch.

use std::time::Instant;

use super::display::Screen;
use super::Session;
use crate::io::serial::check_baud_rate;
use crate::io::InterfaceType;
use crate::parser::{
    parse_can_command, parse_hex_command, parse_preset_command, parse_text_repeat, InputMode,
    RepeatRequest,
};

/// Shown by `/help` and the menu's manual screen
pub const MANUAL_LINES: &[&str] = &[
    "Commands:",
    "  /help, /h             Show this help",
    "  /menu                 Open the settings menu (also Ctrl-T)",
    "  /clear                Clear the screen (also Ctrl-L)",
    "  /status               Show connection and repeat status",
    "  /p N                  Send preset N (1-10) once (also Alt+1..9,0)",
    "  /p N -r [-t MS]       Repeat preset N every MS ms",
    "  /p N -nr              Stop repeating preset N",
    "  /rs                   Show repeat status",
    "  /rs stop              Stop the inline repeat",
    "  /ra                   Stop all repeats",
    "  /hex XX XX ..         Send hex bytes in any mode",
    "  /can ID XX ..         Send a CAN frame with an explicit id",
    "  /rpt MS text          Repeat text every MS ms",
    "  /device PATH          Set the serial device",
    "  /baud RATE            Set the serial baud rate",
    "  /mode normal|hex      Set the input mode",
    "  /crlf on|off          Append CR LF to text lines",
    "",
    "Hex mode flags:",
    "  -id 0xID              CAN id for this line",
    "  -r                    Repeat this line",
    "  -t MS                 Repeat interval (default 1000, minimum 10)",
    "",
    "Keys: Ctrl-C quit, Ctrl-D quit on an empty line, Up/Down history",
];

impl<S: Screen> Session<S> {
    /// Run a `/name argument` command
    pub(crate) fn dispatch(&mut self, name: &str, argument: &str, now: Instant) {
        match name {
            "help" | "h" => self.screen.message(&MANUAL_LINES.join("\n")),
            "menu" => self.request_menu(),
            "clear" => self.screen.clear_screen(),
            "status" => self.show_status(),
            "p" => self.preset_command(argument, now),
            "rs" => self.repeat_status_command(argument),
            "ra" => {
                self.registry.disarm_all();
                self.screen.message("All repeats stopped.");
            }
            "hex" => match parse_hex_command(argument) {
                Ok(payload) => {
                    if self.check_can_length(&payload) {
                        self.send_once(&payload);
                    }
                }
                Err(e) => self.screen.message(&format!("Error: {}", e)),
            },
            "can" => {
                if self.settings.interface != InterfaceType::Can {
                    self.screen.message("Error: /can needs the CAN interface");
                    return;
                }
                match parse_can_command(argument) {
                    Ok(payload) => {
                        if self.check_can_length(&payload) {
                            self.send_once(&payload);
                        }
                    }
                    Err(e) => self.screen.message(&format!("Error: {}", e)),
                }
            }
            "rpt" => match parse_text_repeat(argument) {
                Ok((interval_ms, payload)) => self.start_inline(payload, interval_ms, now),
                Err(e) => self.screen.message(&format!("Error: {}", e)),
            },
            "device" => self.device_command(argument),
            "baud" => self.baud_command(argument),
            "mode" => self.mode_command(argument),
            "crlf" => self.crlf_command(argument),
            "r" => self.screen.message(
                "Note: Use /p N -r to start repeat, /p N -nr to stop.\nUse /rs for status, /ra to stop all.",
            ),
            "ri" | "rp" => self
                .screen
                .message("Note: Use /p N -r -t MS for interval, /rs for status."),
            _ => self.screen.message("Unknown command. Type /help"),
        }
    }

    fn preset_command(&mut self, argument: &str, now: Instant) {
        let command = match parse_preset_command(argument) {
            Ok(command) => command,
            Err(e) => {
                self.screen.message(&format!("Error: {}", e));
                return;
            }
        };
        let slot = command.slot;
        match command.repeat {
            RepeatRequest::None => {
                self.fire_preset(slot);
            }
            RepeatRequest::Start { interval_ms } => {
                if let Err(e) = self.settings.resolve_preset(slot) {
                    self.screen.message(&format!("Error: {}", e));
                    return;
                }
                let ms = self.registry.arm_preset(slot, interval_ms, now);
                self.screen
                    .message(&format!("Preset {} repeating every {}ms", slot, ms));
            }
            RepeatRequest::Stop => {
                if self.registry.disarm_preset(slot) {
                    self.screen.message(&format!("Preset {} repeat stopped.", slot));
                } else {
                    self.screen.message(&format!("Preset {} is not repeating.", slot));
                }
            }
        }
    }

    fn repeat_status_command(&mut self, argument: &str) {
        if argument.eq_ignore_ascii_case("stop") {
            if self.registry.disarm_inline() {
                self.screen.message("Inline repeat stopped.");
            } else {
                self.screen.message("No inline repeat is active.");
            }
        } else if argument.is_empty() {
            let mut lines = vec!["Repeat Status:".to_string()];
            lines.extend(self.repeat_lines());
            self.screen.message(&lines.join("\n"));
        } else {
            self.screen.message("Usage: /rs [stop]");
        }
    }

    fn repeat_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(inline) = self.registry.inline() {
            let target = match (self.settings.interface, inline.payload.can_id) {
                (InterfaceType::Can, Some(id)) => format!("ID 0x{:X}, ", id),
                (InterfaceType::Can, None) => format!("ID 0x{:X}, ", self.settings.can_tx_id()),
                (InterfaceType::Serial, _) => String::new(),
            };
            lines.push(format!(
                "  Inline: {}{} bytes, every {}ms",
                target,
                inline.payload.bytes().len(),
                inline.task.interval_ms
            ));
        }
        for (slot, interval_ms) in self.registry.running_presets() {
            let name = self
                .settings
                .preset(slot)
                .map(|p| p.name.as_str())
                .unwrap_or_default();
            lines.push(format!("  Preset {} ({}): every {}ms", slot, name, interval_ms));
        }
        if lines.is_empty() {
            lines.push("  No repeats are active.".to_string());
        }
        lines
    }

    fn show_status(&mut self) {
        let mut lines = Vec::new();
        match self.settings.interface {
            InterfaceType::Serial => lines.push(format!(
                "  Device: {} @ {} baud",
                self.settings.serial.device, self.settings.serial.baud
            )),
            InterfaceType::Can => lines.push(format!(
                "  CAN: {} @ {} bps (ID: {})",
                self.settings.can.interface, self.settings.can.bitrate, self.settings.can.tx_id
            )),
        }
        lines.push(format!(
            "  Mode: {}, CRLF: {}",
            self.settings.mode.name(),
            if self.settings.crlf { "on" } else { "off" }
        ));
        lines.extend(self.repeat_lines());
        self.screen.message(&lines.join("\n"));
    }

    fn device_command(&mut self, argument: &str) {
        if argument.is_empty() {
            self.screen.message("Usage: /device PATH");
            return;
        }
        self.settings.serial.device = argument.to_string();
        self.persist();
        self.screen.message(&format!(
            "Device set to {} (reconnect with Ctrl-T menu)",
            argument
        ));
    }

    fn baud_command(&mut self, argument: &str) {
        let baud = match argument.parse::<u32>() {
            Ok(baud) => baud,
            Err(_) => {
                self.screen.message("Usage: /baud RATE");
                return;
            }
        };
        match check_baud_rate(baud) {
            Ok(baud) => {
                self.settings.serial.baud = baud;
                self.persist();
                self.screen.message(&format!(
                    "Baud rate set to {} (reconnect with Ctrl-T menu)",
                    baud
                ));
            }
            Err(e) => self.screen.message(&format!("Error: {}", e)),
        }
    }

    fn mode_command(&mut self, argument: &str) {
        if argument.is_empty() {
            self.screen
                .message(&format!("Mode: {}", self.settings.mode.name()));
            return;
        }
        match InputMode::parse(argument) {
            Some(mode) => {
                self.settings.mode = mode;
                self.persist();
                self.screen.message(&format!("Mode set to {}", mode.name()));
            }
            None => self.screen.message("Usage: /mode normal|hex"),
        }
    }

    fn crlf_command(&mut self, argument: &str) {
        let crlf = if argument.eq_ignore_ascii_case("on") {
            true
        } else if argument.eq_ignore_ascii_case("off") {
            false
        } else {
            self.screen.message("Usage: /crlf on|off");
            return;
        };
        self.settings.crlf = crlf;
        self.persist();
        self.screen
            .message(&format!("CRLF is now {}", if crlf { "ON" } else { "OFF" }));
    }
}
