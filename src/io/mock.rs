// src/io/mock.rs
//
// In-memory transport for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;

use super::{Inbound, InterfaceType, IoError, Outbound, Transport};

/// A recorded write
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Written {
    Bytes(Vec<u8>),
    Frame { id: u32, data: Vec<u8> },
}

#[derive(Debug, Default)]
pub struct MockState {
    pub written: Vec<Written>,
    pub inbound: VecDeque<Result<Inbound, String>>,
    /// Every write fails with this message
    pub fail_writes: Option<String>,
    /// Accept at most this many bytes per write
    pub short_write: Option<usize>,
    /// Present on pollable mocks
    pub wire: Option<Wire>,
}

/// Socket pair whose read end stays readable while inbound is queued
#[derive(Debug)]
pub struct Wire {
    rx: UnixStream,
    tx: UnixStream,
}

/// Cloning shares the recorded state
#[derive(Clone)]
pub struct MockTransport {
    pub kind: InterfaceType,
    pub state: Rc<RefCell<MockState>>,
}

impl MockTransport {
    pub fn new(kind: InterfaceType) -> Self {
        Self {
            kind,
            state: Rc::new(RefCell::new(MockState::default())),
        }
    }

    /// A mock with a real fd, for driving the event loop
    pub fn pollable(kind: InterfaceType) -> Self {
        let (rx, tx) = UnixStream::pair().expect("socket pair");
        rx.set_nonblocking(true).expect("nonblocking read end");
        let mock = Self::new(kind);
        mock.state.borrow_mut().wire = Some(Wire { rx, tx });
        mock
    }

    fn wake(&self) {
        if let Some(wire) = self.state.borrow().wire.as_ref() {
            (&wire.tx).write_all(&[1]).expect("wake mock fd");
        }
    }

    pub fn written(&self) -> Vec<Written> {
        self.state.borrow().written.clone()
    }

    pub fn push_inbound(&self, inbound: Inbound) {
        self.state.borrow_mut().inbound.push_back(Ok(inbound));
        self.wake();
    }

    pub fn push_read_error(&self, message: &str) {
        self.state.borrow_mut().inbound.push_back(Err(message.to_string()));
        self.wake();
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> InterfaceType {
        self.kind
    }

    fn describe(&self) -> String {
        format!("mock {}", self.kind)
    }

    fn write(&mut self, out: Outbound<'_>) -> Result<usize, IoError> {
        let mut state = self.state.borrow_mut();
        if let Some(message) = &state.fail_writes {
            return Err(IoError::connection("mock", message.clone()));
        }
        let accepted = state.short_write.map_or(out.len(), |n| n.min(out.len()));
        let record = match out {
            Outbound::Bytes(b) => Written::Bytes(b[..accepted].to_vec()),
            Outbound::Frame { id, data } => Written::Frame {
                id,
                data: data.to_vec(),
            },
        };
        state.written.push(record);
        Ok(accepted)
    }

    fn read_available(&mut self) -> Result<Option<Inbound>, IoError> {
        let mut state = self.state.borrow_mut();
        if let Some(wire) = state.wire.as_ref() {
            let mut buf = [0u8; 64];
            while matches!((&wire.rx).read(&mut buf), Ok(n) if n > 0) {}
        }
        match state.inbound.pop_front() {
            None => Ok(None),
            Some(Ok(inbound)) => Ok(Some(inbound)),
            Some(Err(message)) => Err(IoError::connection("mock", message)),
        }
    }
}

impl AsRawFd for MockTransport {
    fn as_raw_fd(&self) -> RawFd {
        self.state.borrow().wire.as_ref().map_or(-1, |w| w.rx.as_raw_fd())
    }
}
