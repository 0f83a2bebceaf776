// src/terminal/display.rs
//
// Operator-facing output. Messages are printed above the line being typed,
// and the prompt plus partial input are redrawn underneath.

use crossterm::cursor::MoveToColumn;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};
use std::io::{Stdout, Write};

/// Where the terminal core sends status lines and prompt updates
pub trait Screen {
    /// One status or result line, shown above the input line
    fn message(&mut self, text: &str);

    /// Redraw the input line. `cursor` counts characters into `line`.
    fn redraw(&mut self, prompt: &str, line: &str, cursor: usize);

    fn clear_screen(&mut self);
}

/// Raw-mode terminal on stdout
pub struct ConsoleScreen {
    out: Stdout,
    prompt: String,
    line: String,
    cursor: usize,
    /// Off until the interactive loop owns the terminal
    show_input: bool,
}

impl ConsoleScreen {
    pub fn new() -> Self {
        Self {
            out: std::io::stdout(),
            prompt: "> ".to_string(),
            line: String::new(),
            cursor: 0,
            show_input: false,
        }
    }

    /// Start drawing the prompt and input line under every message
    pub fn show_input(&mut self) {
        self.show_input = true;
    }

    fn draw_input(&mut self) -> std::io::Result<()> {
        if !self.show_input {
            return self.out.flush();
        }
        let column = self.prompt.chars().count() + self.cursor;
        queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(&self.prompt),
            Print(&self.line),
            MoveToColumn(u16::try_from(column).unwrap_or(u16::MAX))
        )?;
        self.out.flush()
    }
}

impl Default for ConsoleScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen for ConsoleScreen {
    fn message(&mut self, text: &str) {
        let result = queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))
            .and_then(|_| {
                // Raw mode needs an explicit carriage return on every line
                for line in text.lines() {
                    queue!(self.out, Print(line), Print("\r\n"))?;
                }
                Ok(())
            })
            .and_then(|_| self.draw_input());
        if let Err(e) = result {
            tlog!("[terminal] Failed to write to stdout: {}", e);
        }
    }

    fn redraw(&mut self, prompt: &str, line: &str, cursor: usize) {
        self.prompt.clear();
        self.prompt.push_str(prompt);
        self.line.clear();
        self.line.push_str(line);
        self.cursor = cursor;
        if let Err(e) = self.draw_input() {
            tlog!("[terminal] Failed to write to stdout: {}", e);
        }
    }

    fn clear_screen(&mut self) {
        let result = execute!(
            self.out,
            Clear(ClearType::All),
            crossterm::cursor::MoveTo(0, 0)
        )
        .and_then(|_| self.draw_input());
        if let Err(e) = result {
            tlog!("[terminal] Failed to clear screen: {}", e);
        }
    }
}

/// Records everything for assertions
#[cfg(test)]
#[derive(Default)]
pub struct RecordingScreen {
    pub messages: Vec<String>,
    pub prompt: String,
    pub line: String,
    pub clears: usize,
}

#[cfg(test)]
impl Screen for RecordingScreen {
    fn message(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }

    fn redraw(&mut self, prompt: &str, line: &str, _cursor: usize) {
        self.prompt = prompt.to_string();
        self.line = line.to_string();
    }

    fn clear_screen(&mut self) {
        self.clears += 1;
    }
}
