// src/parser.rs
//
// Turns one submitted line into either a slash command or a payload with
// repeat flags.
//
// In hex mode the line is a sequence of byte tokens with the inline flags
// `-id 0xNNN`, `-t MS` and `-r`. In text mode the whole line is sent
// verbatim and no flags are recognised; `/rpt MS text` arms a text repeat.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io::codec::{decode_hex, decode_hex_byte, parse_can_id, parse_hex_u32, CodecError, CAN_EFF_MAX};
use crate::repeat::PresetSlot;

/// Interval used by `-r` when `-t` is absent
pub const DEFAULT_INTERVAL_MS: u32 = 1000;

/// Shortest accepted repeat interval
pub const MIN_INTERVAL_MS: u32 = 10;

// ============================================================================
// Types
// ============================================================================

/// How typed lines are interpreted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMode {
    #[default]
    #[serde(rename = "hex")]
    Hex,
    #[serde(rename = "normal")]
    Text,
}

impl InputMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hex" => Some(InputMode::Hex),
            "normal" | "text" => Some(InputMode::Text),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InputMode::Hex => "hex",
            InputMode::Text => "normal",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayloadBody {
    Hex(Vec<u8>),
    /// `append_terminator` asks for the line terminator; the dispatcher only
    /// honours it when CRLF is enabled on a serial destination
    Text { text: String, append_terminator: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    pub body: PayloadBody,
    /// Destination override, used only on CAN
    pub can_id: Option<u32>,
}

impl Payload {
    pub fn hex(bytes: Vec<u8>) -> Self {
        Self {
            body: PayloadBody::Hex(bytes),
            can_id: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            body: PayloadBody::Text {
                text: text.into(),
                append_terminator: true,
            },
            can_id: None,
        }
    }

    pub fn with_can_id(mut self, id: Option<u32>) -> Self {
        self.can_id = id;
        self
    }

    /// Raw payload bytes without any line terminator
    pub fn bytes(&self) -> &[u8] {
        match &self.body {
            PayloadBody::Hex(b) => b,
            PayloadBody::Text { text, .. } => text.as_bytes(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatRequest {
    None,
    /// `interval_ms` of `None` keeps the slot's previous interval
    Start { interval_ms: Option<u32> },
    Stop,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedLine {
    Command { name: String, argument: String },
    Data { payload: Payload, repeat: RepeatRequest },
}

/// Parsed `/p N [-r [-t MS]] [-nr]`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresetCommand {
    pub slot: PresetSlot,
    /// `None` sends the preset once
    pub repeat: RepeatRequest,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Odd number of hex digits")]
    OddLength,
    #[error("Invalid hex digits '{0}'")]
    InvalidDigit(String),
    #[error("Invalid hex byte '{0}'")]
    InvalidHexByte(String),
    #[error("Unknown flag '{0}'")]
    UnknownFlag(String),
    #[error("Missing argument for {0}")]
    MissingArgument(String),
    #[error("Invalid interval '{0}' (integer >= 10 ms)")]
    BadInterval(String),
    #[error("Invalid CAN ID '{0}'")]
    BadCanId(String),
    #[error("Invalid preset '{0}' (1-10)")]
    BadSlot(String),
    #[error("Nothing to send")]
    EmptyPayload,
}

impl From<CodecError> for ParseError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::OddLength => ParseError::OddLength,
            CodecError::InvalidDigit(pair) => ParseError::InvalidDigit(pair),
        }
    }
}

// ============================================================================
// Line Parsing
// ============================================================================

fn is_flag(token: &str, flag: &str) -> bool {
    token.eq_ignore_ascii_case(flag)
}

/// Milliseconds written as plain decimal digits, at least `MIN_INTERVAL_MS`
pub fn parse_interval_ms(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<u32>().ok().filter(|ms| *ms >= MIN_INTERVAL_MS)
}

fn parse_interval(token: &str) -> Result<u32, ParseError> {
    parse_interval_ms(token).ok_or_else(|| ParseError::BadInterval(token.to_string()))
}

/// Parse one submitted line in the given mode
pub fn parse_line(line: &str, mode: InputMode) -> Result<ParsedLine, ParseError> {
    if let Some(body) = line.trim_start().strip_prefix('/') {
        let body = body.trim();
        let (name, argument) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };
        return Ok(ParsedLine::Command {
            name: name.to_ascii_lowercase(),
            argument: argument.to_string(),
        });
    }

    match mode {
        InputMode::Text => {
            if line.is_empty() {
                return Err(ParseError::EmptyPayload);
            }
            Ok(ParsedLine::Data {
                payload: Payload::text(line),
                repeat: RepeatRequest::None,
            })
        }
        InputMode::Hex => parse_hex_line(line),
    }
}

fn parse_hex_line(line: &str) -> Result<ParsedLine, ParseError> {
    let mut tokens = line.split_whitespace();
    let mut data = Vec::new();
    let mut can_id = None;
    let mut interval_ms = None;
    let mut repeat = false;

    while let Some(token) = tokens.next() {
        if is_flag(token, "-id") {
            let value = tokens
                .next()
                .ok_or_else(|| ParseError::MissingArgument("-id".to_string()))?;
            can_id = Some(parse_can_id(value).ok_or_else(|| ParseError::BadCanId(value.to_string()))?);
        } else if is_flag(token, "-t") {
            let value = tokens
                .next()
                .ok_or_else(|| ParseError::MissingArgument("-t".to_string()))?;
            interval_ms = Some(parse_interval(value)?);
        } else if is_flag(token, "-r") {
            repeat = true;
        } else if token.starts_with('-') {
            return Err(ParseError::UnknownFlag(token.to_string()));
        } else {
            let byte =
                decode_hex_byte(token).ok_or_else(|| ParseError::InvalidHexByte(token.to_string()))?;
            data.push(byte);
        }
    }

    if data.is_empty() {
        return Err(ParseError::EmptyPayload);
    }

    let repeat = if repeat {
        RepeatRequest::Start {
            interval_ms: Some(interval_ms.unwrap_or(DEFAULT_INTERVAL_MS)),
        }
    } else {
        RepeatRequest::None
    };

    Ok(ParsedLine::Data {
        payload: Payload::hex(data).with_can_id(can_id),
        repeat,
    })
}

// ============================================================================
// Command Arguments
// ============================================================================

/// `/rpt MS text`: the text is everything after the interval token, verbatim
pub fn parse_text_repeat(argument: &str) -> Result<(u32, Payload), ParseError> {
    let argument = argument.trim_start();
    if argument.is_empty() {
        return Err(ParseError::MissingArgument("/rpt".to_string()));
    }

    let (ms, text) = match argument.split_once(char::is_whitespace) {
        Some((ms, rest)) => (ms, rest.trim_start()),
        None => (argument, ""),
    };
    let interval_ms = parse_interval(ms)?;
    if text.is_empty() {
        return Err(ParseError::EmptyPayload);
    }
    Ok((interval_ms, Payload::text(text)))
}

/// `/p N [-r [-t MS]] [-nr]`. `-nr` wins over `-r`; `-t` only matters with `-r`.
pub fn parse_preset_command(argument: &str) -> Result<PresetCommand, ParseError> {
    let mut tokens = argument.split_whitespace();
    let slot_token = tokens
        .next()
        .ok_or_else(|| ParseError::MissingArgument("/p".to_string()))?;
    let slot = slot_token
        .parse::<u8>()
        .ok()
        .and_then(PresetSlot::new)
        .ok_or_else(|| ParseError::BadSlot(slot_token.to_string()))?;

    let mut start = false;
    let mut stop = false;
    let mut interval_ms = None;

    while let Some(token) = tokens.next() {
        if is_flag(token, "-r") {
            start = true;
        } else if is_flag(token, "-nr") {
            stop = true;
        } else if is_flag(token, "-t") {
            let value = tokens
                .next()
                .ok_or_else(|| ParseError::MissingArgument("-t".to_string()))?;
            interval_ms = Some(parse_interval(value)?);
        } else {
            return Err(ParseError::UnknownFlag(token.to_string()));
        }
    }

    let repeat = if stop {
        RepeatRequest::Stop
    } else if start {
        RepeatRequest::Start { interval_ms }
    } else {
        RepeatRequest::None
    };
    Ok(PresetCommand { slot, repeat })
}

/// `/hex XX ..`, whitespace-insensitive
pub fn parse_hex_command(argument: &str) -> Result<Payload, ParseError> {
    let bytes = decode_hex(argument)?;
    if bytes.is_empty() {
        return Err(ParseError::EmptyPayload);
    }
    Ok(Payload::hex(bytes))
}

/// `/can ID XX ..`; the id may omit `0x` and the data may be empty
pub fn parse_can_command(argument: &str) -> Result<Payload, ParseError> {
    let argument = argument.trim();
    if argument.is_empty() {
        return Err(ParseError::MissingArgument("/can".to_string()));
    }
    let (id_token, data) = match argument.split_once(char::is_whitespace) {
        Some((id, rest)) => (id, rest),
        None => (argument, ""),
    };
    let id = parse_hex_u32(id_token)
        .filter(|id| *id <= CAN_EFF_MAX)
        .ok_or_else(|| ParseError::BadCanId(id_token.to_string()))?;
    let bytes = decode_hex(data)?;
    Ok(Payload::hex(bytes).with_can_id(Some(id)))
}

// ============================================================================
// Prompt Annotation
// ============================================================================

/// Byte count shown in the prompt for the line being typed
pub fn prompt_byte_count(line: &str, mode: InputMode, crlf: bool) -> usize {
    if line.trim_start().starts_with('/') {
        return 0;
    }
    match mode {
        InputMode::Text => line.len() + if crlf { 2 } else { 0 },
        InputMode::Hex => {
            let mut tokens = line.split_whitespace();
            let mut digits = 0;
            while let Some(token) = tokens.next() {
                if is_flag(token, "-id") || is_flag(token, "-t") {
                    tokens.next();
                } else if !is_flag(token, "-r") {
                    digits += token.len();
                }
            }
            digits / 2
        }
    }
}

pub fn prompt_for(line: &str, mode: InputMode, crlf: bool) -> String {
    if line.is_empty() {
        "> ".to_string()
    } else {
        format!("[{}b] > ", prompt_byte_count(line, mode, crlf))
    }
}
