// src/terminal/mod.rs
//
// Interactive terminal session and its event loop.
//
// `Session` owns everything the loop touches between wake-ups: settings,
// the repeat registry, the open transport and the screen. The loop itself
// (`run_event_loop`) only waits on the transport fd, the keyboard and the
// soonest repeat deadline, then hands whatever woke it to the session.

pub mod commands;
pub mod display;
pub mod line_editor;

use crossterm::event::Event;
use futures::{Stream, StreamExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::unix::{AsyncFd, AsyncFdReadyGuard};
use tokio::io::Interest;

use crate::io::codec::CAN_MAX_DATA;
use crate::io::{InterfaceType, IoError, Transport};
use crate::menu::MenuDriver;
use crate::parser::{
    parse_line, prompt_for, InputMode, ParsedLine, Payload, PayloadBody, RepeatRequest,
    DEFAULT_INTERVAL_MS,
};
use crate::repeat::{PresetSlot, Registry, SlotId};
use crate::settings::{save_settings, Settings};
use crate::transmit::{self, Destination, Outcome};

use display::Screen;
use line_editor::{EditorAction, LineEditor};

/// Upper bound on a single wait, so repeats armed between waits are never
/// late by more than one tick
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Opens a transport for the current settings (used on reconnect)
pub type Opener = Box<dyn FnMut(&Settings) -> Result<Box<dyn Transport>, IoError>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Running,
    MenuSuspended,
    Terminating,
}

// ============================================================================
// Session
// ============================================================================

pub struct Session<S: Screen> {
    pub settings: Settings,
    /// `None` disables persistence
    settings_path: Option<PathBuf>,
    pub registry: Registry,
    transport: Option<Box<dyn Transport>>,
    pub screen: S,
    opener: Opener,
    pub state: LoopState,
    menu_requested: bool,
    failure: Option<String>,
}

impl<S: Screen> Session<S> {
    pub fn new(
        settings: Settings,
        settings_path: Option<PathBuf>,
        transport: Box<dyn Transport>,
        screen: S,
        opener: Opener,
    ) -> Self {
        Self {
            settings,
            settings_path,
            registry: Registry::new(Instant::now()),
            transport: Some(transport),
            screen,
            opener,
            state: LoopState::Running,
            menu_requested: false,
            failure: None,
        }
    }

    /// The error that ended the loop, if any
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn transport_description(&self) -> String {
        self.transport
            .as_ref()
            .map_or_else(|| "(not connected)".to_string(), |t| t.describe())
    }

    fn transport_fd(&self) -> Option<RawFd> {
        self.transport.as_ref().map(|t| t.as_raw_fd())
    }

    pub fn request_menu(&mut self) {
        self.menu_requested = true;
    }

    fn take_menu_request(&mut self) -> bool {
        std::mem::take(&mut self.menu_requested)
    }

    fn destination(&self) -> Destination {
        match self.settings.interface {
            InterfaceType::Can => Destination::Can {
                default_id: self.settings.can_tx_id(),
            },
            InterfaceType::Serial => Destination::Serial {
                append_crlf: self.settings.crlf,
            },
        }
    }

    fn transmit(&mut self, payload: &Payload) -> Outcome {
        let destination = self.destination();
        match self.transport.as_deref_mut() {
            Some(transport) => transmit::send(transport, &destination, payload),
            None => Outcome::failed("-".to_string(), "not connected"),
        }
    }

    /// Save settings. A failure is reported and otherwise ignored.
    pub fn persist(&mut self) {
        let Some(path) = self.settings_path.as_ref() else {
            return;
        };
        if let Err(e) = save_settings(path, &self.settings) {
            tlog!("[terminal] {}", e);
            self.screen.message(&format!("Warning: {}", e));
        }
    }

    // ------------------------------------------------------------------------
    // Repeats
    // ------------------------------------------------------------------------

    /// Transmit every due repeat. Failures are reported and leave the task armed.
    pub fn fire_due(&mut self, now: Instant) {
        for id in self.registry.due(now) {
            match id {
                SlotId::Inline => {
                    let Some(payload) = self.registry.inline().map(|i| i.payload.clone()) else {
                        continue;
                    };
                    let outcome = self.transmit(&payload);
                    self.screen.message(&format!("Inline {}", outcome.descriptor));
                }
                SlotId::Preset(slot) => {
                    self.fire_preset(slot);
                }
            }
        }
    }

    /// Resolve a preset from the current settings and send it once
    pub fn fire_preset(&mut self, slot: PresetSlot) -> bool {
        let payload = match self.settings.resolve_preset(slot) {
            Ok(payload) => payload,
            Err(e) => {
                self.screen.message(&format!("TX FAILED[Preset {}]: {}", slot, e));
                return false;
            }
        };
        let outcome = self.transmit(&payload);
        match outcome.error {
            None => {
                let name = self
                    .settings
                    .preset(slot)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                self.screen.message(&format!("TX[Preset {} ({})]", slot, name));
                true
            }
            Some(reason) => {
                self.screen.message(&format!("TX FAILED[Preset {}]: {}", slot, reason));
                false
            }
        }
    }

    /// Arm the inline repeat and send the first copy right away
    pub(crate) fn start_inline(&mut self, payload: Payload, interval_ms: u32, now: Instant) {
        self.registry.arm_inline(payload, interval_ms, now);
        self.screen.message(&format!(
            "Inline repeat started: every {}ms. Use /rs stop to stop, /ra to stop all.",
            interval_ms
        ));
        self.fire_due(now);
    }

    /// Time to wait before the next wake-up
    pub fn next_timeout(&self, now: Instant) -> Duration {
        self.registry
            .soonest_wait(now)
            .map_or(DEFAULT_TICK, |wait| wait.min(DEFAULT_TICK))
    }

    // ------------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------------

    /// Parse and act on one submitted line
    pub fn handle_line(&mut self, line: &str, now: Instant) {
        // Text mode sends whitespace as typed
        let blank = match self.settings.mode {
            InputMode::Hex => line.trim().is_empty(),
            InputMode::Text => line.is_empty(),
        };
        if blank {
            return;
        }
        match parse_line(line, self.settings.mode) {
            Err(e) => self.screen.message(&format!("Error: {}", e)),
            Ok(ParsedLine::Command { name, argument }) => self.dispatch(&name, &argument, now),
            Ok(ParsedLine::Data { payload, repeat }) => {
                if !self.check_can_length(&payload) {
                    return;
                }
                match repeat {
                    RepeatRequest::Start { interval_ms } => {
                        let ms = interval_ms.unwrap_or(DEFAULT_INTERVAL_MS);
                        self.start_inline(payload, ms, now);
                    }
                    RepeatRequest::Stop => {
                        self.registry.disarm_inline();
                    }
                    RepeatRequest::None => self.send_once(&payload),
                }
            }
        }
    }

    /// Typed hex on CAN must fit one frame
    pub(crate) fn check_can_length(&mut self, payload: &Payload) -> bool {
        let too_long = self.settings.interface == InterfaceType::Can
            && matches!(payload.body, PayloadBody::Hex(_))
            && payload.bytes().len() > CAN_MAX_DATA;
        if too_long {
            self.screen.message("Error: CAN data max 8 bytes");
        }
        !too_long
    }

    pub(crate) fn send_once(&mut self, payload: &Payload) {
        let outcome = self.transmit(payload);
        self.screen.message(&outcome.descriptor);
    }

    pub fn handle_editor_action(&mut self, action: EditorAction, editor: &LineEditor, now: Instant) {
        match action {
            EditorAction::Submitted(line) => self.handle_line(&line, now),
            EditorAction::Eof | EditorAction::Interrupt => self.state = LoopState::Terminating,
            EditorAction::Menu => self.request_menu(),
            EditorAction::SendPreset(slot) => {
                self.fire_preset(slot);
            }
            EditorAction::ClearScreen => self.screen.clear_screen(),
            EditorAction::Changed | EditorAction::None => {}
        }
        self.redraw(editor);
    }

    pub fn redraw(&mut self, editor: &LineEditor) {
        let line = editor.line();
        let prompt = prompt_for(&line, self.settings.mode, self.settings.crlf);
        self.screen.redraw(&prompt, &line, editor.cursor());
    }

    /// Read whatever the transport has and echo it. Returns whether anything
    /// was read, so the caller knows to keep polling before waiting again.
    pub fn poll_transport(&mut self) -> Result<bool, IoError> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(false);
        };
        match transport.read_available()? {
            Some(inbound) => {
                self.screen.message(&inbound.describe());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ------------------------------------------------------------------------
    // Menu
    // ------------------------------------------------------------------------

    /// Run the menu to completion and apply what it asked for
    pub fn enter_menu(&mut self, menu: &mut dyn MenuDriver) {
        self.state = LoopState::MenuSuspended;
        let interface_before = self.settings.interface;

        let outcome = match menu.run(&mut self.settings, &self.registry) {
            Ok(outcome) => outcome,
            Err(e) => {
                tlog!("[terminal] Menu failed: {}", e);
                self.screen.message(&format!("Error: menu failed: {}", e));
                self.state = LoopState::Running;
                return;
            }
        };

        if self.settings.interface != interface_before && self.registry.disarm_all() > 0 {
            self.screen.message("Interface changed; all repeats stopped.");
        }
        if outcome.save {
            self.persist();
            self.screen.message("Settings saved.");
        }
        if outcome.reconnect {
            self.reconnect();
        }
        if self.state == LoopState::MenuSuspended {
            self.state = LoopState::Running;
        }
    }

    /// Close the current transport and open one for the current settings.
    /// A failure ends the loop.
    fn reconnect(&mut self) {
        if let Some(old) = self.transport.take() {
            tlog!("[terminal] Closing {}", old.describe());
        }
        self.screen.message("Reconnecting...");
        match (self.opener)(&self.settings) {
            Ok(transport) => {
                tlog!("[terminal] Reconnected to {}", transport.describe());
                self.screen.message(&format!("Connected to {}", transport.describe()));
                self.transport = Some(transport);
            }
            Err(e) => {
                tlog!("[terminal] Reconnect failed: {}", e);
                self.failure = Some(format!("Failed to reconnect: {}", e));
                self.state = LoopState::Terminating;
            }
        }
    }
}

// ============================================================================
// Event Loop
// ============================================================================

enum Wake<'a> {
    Transport(std::io::Result<AsyncFdReadyGuard<'a, RawFd>>),
    Input(Option<std::io::Result<Event>>),
    Tick,
}

/// Drive the session until it terminates. Must run inside a tokio runtime
/// with IO and time enabled.
///
/// `input` builds the keyboard stream. It is called again after every menu
/// visit, since the menu reads the terminal itself. The end of a stream ends
/// the session.
pub async fn run_event_loop<S, E, F>(
    session: &mut Session<S>,
    editor: &mut LineEditor,
    menu: &mut dyn MenuDriver,
    mut input: F,
    shutdown: Arc<AtomicBool>,
) -> Result<(), String>
where
    S: Screen,
    E: Stream<Item = std::io::Result<Event>> + Unpin,
    F: FnMut() -> E,
{
    session.redraw(editor);

    'session: while session.state != LoopState::Terminating {
        let fd = session
            .transport_fd()
            .ok_or_else(|| "No transport is open".to_string())?;
        let transport_fd = AsyncFd::with_interest(fd, Interest::READABLE)
            .map_err(|e| format!("Failed to watch transport: {}", e))?;
        let mut events = input();

        loop {
            if shutdown.load(Ordering::SeqCst) {
                tlog!("[terminal] Shutdown requested");
                session.state = LoopState::Terminating;
            }
            if session.state == LoopState::Terminating {
                break 'session;
            }
            if session.take_menu_request() {
                break;
            }

            let timeout = session.next_timeout(Instant::now());
            let wake = tokio::select! {
                biased;
                ready = transport_fd.readable() => Wake::Transport(ready),
                event = events.next() => Wake::Input(event),
                _ = tokio::time::sleep(timeout) => Wake::Tick,
            };

            session.fire_due(Instant::now());

            match wake {
                Wake::Transport(ready) => {
                    let mut guard = ready.map_err(|e| format!("Failed to poll transport: {}", e))?;
                    match session.poll_transport() {
                        Ok(true) => {}
                        Ok(false) => guard.clear_ready(),
                        Err(e) => {
                            tlog!("[terminal] Transport read failed: {}", e);
                            return Err(format!("Connection lost: {}", e));
                        }
                    }
                }
                Wake::Input(None) => session.state = LoopState::Terminating,
                Wake::Input(Some(Err(e))) => {
                    return Err(format!("Failed to read keyboard: {}", e));
                }
                Wake::Input(Some(Ok(event))) => {
                    let action = match event {
                        Event::Key(key) => editor.handle_key(&key),
                        Event::Paste(text) => editor.paste(&text),
                        _ => EditorAction::None,
                    };
                    session.handle_editor_action(action, editor, Instant::now());
                }
                Wake::Tick => {}
            }
        }

        drop(events);
        drop(transport_fd);
        session.enter_menu(menu);
        session.redraw(editor);
    }

    match session.failure.take() {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mock::{MockTransport, Written};
    use crate::io::Inbound;
    use crate::menu::MenuOutcome;
    use crate::settings::PresetFormat;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use display::RecordingScreen;
    use futures::stream::{self, LocalBoxStream};
    use line_editor::History;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    fn slot(n: u8) -> PresetSlot {
        PresetSlot::new(n).unwrap()
    }

    fn failing_opener() -> Opener {
        Box::new(|_| Err(IoError::connection("test", "no device")))
    }

    fn session(kind: InterfaceType) -> (Session<RecordingScreen>, MockTransport) {
        let mut settings = Settings::default();
        settings.interface = kind;
        let mock = MockTransport::new(kind);
        let session = Session::new(
            settings,
            None,
            Box::new(mock.clone()),
            RecordingScreen::default(),
            failing_opener(),
        );
        (session, mock)
    }

    fn set_preset(s: &mut Session<RecordingScreen>, n: u8, format: PresetFormat, data: &str) {
        let preset = s.settings.preset_mut(slot(n)).unwrap();
        preset.format = format;
        preset.data = data.to_string();
    }

    /// Scripted menu: applies `edit` to the settings and returns `outcome`
    struct ScriptedMenu<F: FnMut(&mut Settings)> {
        edit: F,
        outcome: MenuOutcome,
    }

    impl<F: FnMut(&mut Settings)> MenuDriver for ScriptedMenu<F> {
        fn run(&mut self, settings: &mut Settings, _registry: &Registry) -> std::io::Result<MenuOutcome> {
            (self.edit)(settings);
            Ok(self.outcome)
        }
    }

    #[test]
    fn test_hex_line_sends_once() {
        let (mut s, mock) = session(InterfaceType::Serial);
        s.handle_line("48 69", Instant::now());
        assert_eq!(mock.written(), vec![Written::Bytes(vec![0x48, 0x69])]);
        assert_eq!(s.screen.messages, vec!["TX[2 bytes]"]);
    }

    #[test]
    fn test_parse_error_sends_nothing() {
        let (mut s, mock) = session(InterfaceType::Can);
        s.handle_line("AA BB -rr", Instant::now());
        assert!(mock.written().is_empty());
        assert_eq!(s.screen.messages, vec!["Error: Unknown flag '-rr'"]);
        assert!(!s.registry.any_running());
    }

    #[test]
    fn test_blank_line_is_ignored() {
        let (mut s, mock) = session(InterfaceType::Serial);
        s.settings.mode = InputMode::Hex;
        s.handle_line("   ", Instant::now());
        assert!(mock.written().is_empty());
        assert!(s.screen.messages.is_empty());

        s.settings.mode = InputMode::Text;
        s.handle_line("", Instant::now());
        assert!(mock.written().is_empty());
    }

    #[test]
    fn test_text_mode_sends_whitespace_line() {
        let (mut s, mock) = session(InterfaceType::Serial);
        s.settings.mode = InputMode::Text;
        s.settings.crlf = false;
        s.handle_line("   ", Instant::now());
        assert_eq!(mock.written(), vec![Written::Bytes(b"   ".to_vec())]);
        assert_eq!(s.screen.messages, vec!["TX[3 bytes]"]);
    }

    #[test]
    fn test_text_mode_sends_flags_verbatim() {
        let (mut s, mock) = session(InterfaceType::Serial);
        s.settings.mode = InputMode::Text;
        s.settings.crlf = false;
        s.handle_line("-r test", Instant::now());
        assert_eq!(mock.written(), vec![Written::Bytes(b"-r test".to_vec())]);
        assert!(!s.registry.any_running());
    }

    #[test]
    fn test_can_hex_over_eight_bytes_rejected() {
        let (mut s, mock) = session(InterfaceType::Can);
        s.handle_line("00 01 02 03 04 05 06 07 08", Instant::now());
        assert!(mock.written().is_empty());
        assert_eq!(s.screen.messages, vec!["Error: CAN data max 8 bytes"]);
    }

    #[test]
    fn test_inline_repeat_fires_immediately_then_on_interval() {
        let (mut s, mock) = session(InterfaceType::Can);
        let t0 = Instant::now();
        s.handle_line("AA BB -id 0x10 -r -t 500", t0);

        let frame = Written::Frame { id: 0x10, data: vec![0xAA, 0xBB] };
        assert_eq!(mock.written(), vec![frame.clone()]);
        assert!(s.screen.messages[0].starts_with("Inline repeat started: every 500ms"));
        assert_eq!(s.screen.messages[1], "Inline TX[ID:0x010 DLC:2]");

        s.fire_due(t0 + Duration::from_millis(499));
        assert_eq!(mock.written().len(), 1);
        s.fire_due(t0 + Duration::from_millis(500));
        assert_eq!(mock.written(), vec![frame.clone(), frame]);
    }

    #[test]
    fn test_inline_payload_is_a_snapshot() {
        let (mut s, mock) = session(InterfaceType::Serial);
        let t0 = Instant::now();
        s.handle_line("01 -r -t 100", t0);
        s.handle_line("02", t0);
        s.fire_due(t0 + Duration::from_millis(100));
        assert_eq!(
            mock.written(),
            vec![
                Written::Bytes(vec![0x01]),
                Written::Bytes(vec![0x02]),
                Written::Bytes(vec![0x01]),
            ]
        );
    }

    #[test]
    fn test_preset_repeat_reads_live_edits() {
        let (mut s, mock) = session(InterfaceType::Serial);
        set_preset(&mut s, 3, PresetFormat::Hex, "01");
        let t0 = Instant::now();
        s.registry.arm_preset(slot(3), Some(250), t0);

        s.fire_due(t0 + Duration::from_millis(250));
        set_preset(&mut s, 3, PresetFormat::Hex, "02 03");
        s.fire_due(t0 + Duration::from_millis(500));

        assert_eq!(
            mock.written(),
            vec![Written::Bytes(vec![0x01]), Written::Bytes(vec![0x02, 0x03])]
        );
        assert_eq!(s.screen.messages, vec!["TX[Preset 3 (Preset 3)]"; 2]);
    }

    #[test]
    fn test_failed_repeat_stays_armed() {
        let (mut s, mock) = session(InterfaceType::Can);
        set_preset(&mut s, 1, PresetFormat::Hex, "AA");
        let t0 = Instant::now();
        s.registry.arm_preset(slot(1), Some(100), t0);

        mock.state.borrow_mut().fail_writes = Some("No buffer space available".to_string());
        s.fire_due(t0 + Duration::from_millis(100));
        assert!(s.screen.messages[0].starts_with("TX FAILED[Preset 1]: "));
        assert!(s.registry.is_preset_running(slot(1)));

        mock.state.borrow_mut().fail_writes = None;
        s.fire_due(t0 + Duration::from_millis(200));
        assert_eq!(mock.written(), vec![Written::Frame { id: 0x123, data: vec![0xAA] }]);
    }

    #[test]
    fn test_empty_preset_reports_failure() {
        let (mut s, mock) = session(InterfaceType::Serial);
        assert!(!s.fire_preset(slot(5)));
        assert!(mock.written().is_empty());
        assert_eq!(s.screen.messages, vec!["TX FAILED[Preset 5]: Preset 5 is empty"]);
    }

    #[test]
    fn test_next_timeout_is_bounded_by_tick() {
        let (mut s, _mock) = session(InterfaceType::Serial);
        let t0 = Instant::now();
        assert_eq!(s.next_timeout(t0), DEFAULT_TICK);
        s.registry.arm_preset(slot(2), Some(30), t0);
        assert_eq!(s.next_timeout(t0), Duration::from_millis(30));
        s.registry.arm_preset(slot(2), Some(5000), t0);
        assert_eq!(s.next_timeout(t0), DEFAULT_TICK);
    }

    #[test]
    fn test_poll_transport_echoes_inbound() {
        let (mut s, mock) = session(InterfaceType::Serial);
        mock.push_inbound(Inbound::Bytes(b"Hi".to_vec()));
        assert!(s.poll_transport().unwrap());
        assert!(!s.poll_transport().unwrap());
        assert_eq!(s.screen.messages, vec!["RX[2 bytes]: 0x48 0x69"]);

        mock.push_read_error("device disconnected");
        assert!(s.poll_transport().is_err());
    }

    #[test]
    fn test_editor_actions() {
        let (mut s, mock) = session(InterfaceType::Serial);
        set_preset(&mut s, 10, PresetFormat::Hex, "FF");
        let editor = LineEditor::new(History::new());
        let now = Instant::now();

        s.handle_editor_action(EditorAction::SendPreset(slot(10)), &editor, now);
        assert_eq!(mock.written(), vec![Written::Bytes(vec![0xFF])]);

        s.handle_editor_action(EditorAction::ClearScreen, &editor, now);
        assert_eq!(s.screen.clears, 1);

        s.handle_editor_action(EditorAction::Menu, &editor, now);
        assert!(s.take_menu_request());
        assert!(!s.take_menu_request());

        s.handle_editor_action(EditorAction::Eof, &editor, now);
        assert_eq!(s.state, LoopState::Terminating);
    }

    #[test]
    fn test_prompt_shows_byte_count() {
        let (mut s, _mock) = session(InterfaceType::Serial);
        let mut editor = LineEditor::new(History::new());
        for c in "AA BB".chars() {
            let action = editor.handle_key(&KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
            s.handle_editor_action(action, &editor, Instant::now());
        }
        assert_eq!(s.screen.prompt, "[2b] > ");
        assert_eq!(s.screen.line, "AA BB");

        let action = editor.handle_key(&KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        s.handle_editor_action(action, &editor, Instant::now());
        assert_eq!(s.screen.prompt, "> ");
        assert_eq!(s.screen.line, "");
    }

    #[test]
    fn test_menu_interface_switch_disarms_and_reconnects() {
        let (mut s, _mock) = session(InterfaceType::Serial);
        let opened = Rc::new(Cell::new(0));
        let counter = opened.clone();
        s.opener = Box::new(move |settings: &Settings| {
            counter.set(counter.get() + 1);
            Ok(Box::new(MockTransport::new(settings.interface)) as Box<dyn Transport>)
        });
        let t0 = Instant::now();
        s.handle_line("01 -r", t0);
        s.registry.arm_preset(slot(4), Some(100), t0);

        let mut menu = ScriptedMenu {
            edit: |settings: &mut Settings| settings.interface = InterfaceType::Can,
            outcome: MenuOutcome { reconnect: true, save: false },
        };
        s.enter_menu(&mut menu);

        assert!(!s.registry.any_running());
        assert_eq!(opened.get(), 1);
        assert_eq!(s.state, LoopState::Running);
        assert_eq!(s.transport_description(), "mock CAN");
        assert!(s.screen.messages.iter().any(|m| m == "Interface changed; all repeats stopped."));
    }

    #[test]
    fn test_menu_without_interface_change_keeps_repeats() {
        let (mut s, _mock) = session(InterfaceType::Serial);
        s.registry.arm_preset(slot(4), Some(100), Instant::now());
        let mut menu = ScriptedMenu {
            edit: |settings: &mut Settings| settings.crlf = false,
            outcome: MenuOutcome::default(),
        };
        s.enter_menu(&mut menu);
        assert!(s.registry.is_preset_running(slot(4)));
        assert!(!s.settings.crlf);
        assert_eq!(s.transport_description(), "mock SERIAL");
    }

    #[test]
    fn test_failed_reconnect_terminates() {
        let (mut s, _mock) = session(InterfaceType::Serial);
        let mut menu = ScriptedMenu {
            edit: |_: &mut Settings| {},
            outcome: MenuOutcome { reconnect: true, save: false },
        };
        s.enter_menu(&mut menu);
        assert_eq!(s.state, LoopState::Terminating);
        assert_eq!(s.failure(), Some("Failed to reconnect: test: no device"));
        assert_eq!(s.transport_description(), "(not connected)");
    }

    #[test]
    fn test_menu_save_persists_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let (mut s, _mock) = session(InterfaceType::Serial);
        s.settings_path = Some(path.clone());
        let mut menu = ScriptedMenu {
            edit: |settings: &mut Settings| settings.serial.baud = 9600,
            outcome: MenuOutcome { reconnect: false, save: true },
        };
        s.enter_menu(&mut menu);
        let saved = crate::settings::load_settings(&path).unwrap();
        assert_eq!(saved.serial.baud, 9600);
    }

    // ------------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------------

    type Keys = LocalBoxStream<'static, std::io::Result<Event>>;

    fn pollable_session(kind: InterfaceType) -> (Session<RecordingScreen>, MockTransport) {
        let mut settings = Settings::default();
        settings.interface = kind;
        let mock = MockTransport::pollable(kind);
        let session = Session::new(
            settings,
            None,
            Box::new(mock.clone()),
            RecordingScreen::default(),
            failing_opener(),
        );
        (session, mock)
    }

    fn press(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent::new(code, modifiers))
    }

    fn typed(text: &str) -> Vec<Event> {
        let mut events: Vec<Event> = text
            .chars()
            .map(|c| press(KeyCode::Char(c), KeyModifiers::NONE))
            .collect();
        events.push(press(KeyCode::Enter, KeyModifiers::NONE));
        events
    }

    fn ctrl(c: char) -> Event {
        press(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    /// Each call yields the next batch of keys, then stays silent
    fn scripted_keys(batches: Vec<Vec<Event>>, built: &Rc<Cell<usize>>) -> impl FnMut() -> Keys {
        let mut batches: VecDeque<Vec<Event>> = batches.into();
        let built = built.clone();
        move || {
            built.set(built.get() + 1);
            let events = batches.pop_front().unwrap_or_default();
            stream::iter(events.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed_local()
        }
    }

    async fn drive<E, F>(
        session: &mut Session<RecordingScreen>,
        menu: &mut dyn MenuDriver,
        input: F,
        shutdown: Arc<AtomicBool>,
    ) -> Result<(), String>
    where
        E: Stream<Item = std::io::Result<Event>> + Unpin,
        F: FnMut() -> E,
    {
        let mut editor = LineEditor::new(History::new());
        tokio::time::timeout(
            Duration::from_secs(5),
            run_event_loop(session, &mut editor, menu, input, shutdown),
        )
        .await
        .expect("event loop did not finish")
    }

    fn idle_menu() -> ScriptedMenu<impl FnMut(&mut Settings)> {
        ScriptedMenu {
            edit: |_: &mut Settings| {},
            outcome: MenuOutcome::default(),
        }
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown_flag() {
        let (mut s, mock) = pollable_session(InterfaceType::Serial);
        let built = Rc::new(Cell::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
        });

        let result = drive(&mut s, &mut idle_menu(), scripted_keys(vec![], &built), shutdown).await;
        assert_eq!(result, Ok(()));
        assert_eq!(s.state, LoopState::Terminating);
        assert!(mock.written().is_empty());
    }

    #[tokio::test]
    async fn test_loop_ends_with_keyboard_stream() {
        let (mut s, _mock) = pollable_session(InterfaceType::Serial);
        let shutdown = Arc::new(AtomicBool::new(false));
        let result = drive(
            &mut s,
            &mut idle_menu(),
            stream::empty::<std::io::Result<Event>>,
            shutdown,
        )
        .await;
        assert_eq!(result, Ok(()));
        assert_eq!(s.state, LoopState::Terminating);
    }

    #[tokio::test]
    async fn test_loop_menu_round_trip_rebuilds_input() {
        let (mut s, old) = pollable_session(InterfaceType::Serial);
        let reopened: Rc<RefCell<Option<MockTransport>>> = Rc::new(RefCell::new(None));
        let handle = reopened.clone();
        s.opener = Box::new(move |settings: &Settings| {
            let mock = MockTransport::pollable(settings.interface);
            *handle.borrow_mut() = Some(mock.clone());
            Ok(Box::new(mock) as Box<dyn Transport>)
        });

        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let mut menu = ScriptedMenu {
            edit: move |settings: &mut Settings| {
                counter.set(counter.get() + 1);
                settings.crlf = false;
            },
            outcome: MenuOutcome { reconnect: true, save: false },
        };
        let built = Rc::new(Cell::new(0));
        let mut after_menu = typed("AA");
        after_menu.push(ctrl('c'));
        let keys = scripted_keys(vec![vec![ctrl('t')], after_menu], &built);

        let result = drive(&mut s, &mut menu, keys, Arc::new(AtomicBool::new(false))).await;
        assert_eq!(result, Ok(()));
        assert_eq!(runs.get(), 1);
        assert_eq!(built.get(), 2);
        assert!(!s.settings.crlf);
        assert!(s.screen.messages.iter().any(|m| m == "Connected to mock SERIAL"));

        let new = reopened.borrow().clone().unwrap();
        assert!(old.written().is_empty());
        assert_eq!(new.written(), vec![Written::Bytes(vec![0xAA])]);
    }

    #[tokio::test]
    async fn test_loop_reports_failed_reconnect() {
        let (mut s, _mock) = pollable_session(InterfaceType::Serial);
        let mut menu = ScriptedMenu {
            edit: |_: &mut Settings| {},
            outcome: MenuOutcome { reconnect: true, save: false },
        };
        let built = Rc::new(Cell::new(0));
        let keys = scripted_keys(vec![vec![ctrl('t')]], &built);

        let result = drive(&mut s, &mut menu, keys, Arc::new(AtomicBool::new(false))).await;
        assert_eq!(result, Err("Failed to reconnect: test: no device".to_string()));
        assert_eq!(built.get(), 1);
    }

    #[tokio::test]
    async fn test_loop_exits_on_read_error() {
        let (mut s, mock) = pollable_session(InterfaceType::Serial);
        mock.push_inbound(Inbound::Bytes(b"Hi".to_vec()));
        mock.push_read_error("device disconnected");
        let built = Rc::new(Cell::new(0));

        let result = drive(
            &mut s,
            &mut idle_menu(),
            scripted_keys(vec![], &built),
            Arc::new(AtomicBool::new(false)),
        )
        .await;
        assert_eq!(result, Err("Connection lost: mock: device disconnected".to_string()));
        assert_eq!(s.screen.messages, vec!["RX[2 bytes]: 0x48 0x69"]);
    }

    #[tokio::test]
    async fn test_loop_fires_then_reads_then_handles_keys() {
        let (mut s, mock) = pollable_session(InterfaceType::Serial);
        s.registry.arm_inline(Payload::hex(vec![0x01]), 60_000, Instant::now());
        mock.push_inbound(Inbound::Bytes(b"Hi".to_vec()));
        let built = Rc::new(Cell::new(0));
        let mut keys = typed("AA");
        keys.push(ctrl('c'));

        let result = drive(
            &mut s,
            &mut idle_menu(),
            scripted_keys(vec![keys], &built),
            Arc::new(AtomicBool::new(false)),
        )
        .await;
        assert_eq!(result, Ok(()));
        assert_eq!(
            s.screen.messages,
            vec!["Inline TX[1 bytes]", "RX[2 bytes]: 0x48 0x69", "TX[1 bytes]"]
        );
        assert_eq!(
            mock.written(),
            vec![Written::Bytes(vec![0x01]), Written::Bytes(vec![0xAA])]
        );
    }
}
