//! Request/response exchange on top of the frame codec.
//!
//! A [`FrameExchange`] borrows the transport and carries the checksum mode
//! the peer currently expects. Every round trip goes through
//! [`FrameExchange::exchange`], parameterised by an [`ExchangePolicy`].

use tracing::{debug, trace, warn};

use crate::error::{BslError, BslResult, ProtocolError};
use crate::protocol::constants::{FRAME_START, MAX_READ_SIZE};
use crate::protocol::frame::{self, Frame, FrameError};
use crate::protocol::header::version_string;
use crate::protocol::{ChecksumMode, Command, Reply, codec};
use crate::transport::{TransportError, UsbTransport};

/// How many receive attempts a round trip gets and which replies it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangePolicy {
    /// Receive attempts after the single send.
    pub attempts: u32,
    /// Reply that completes the step.
    pub expected: Reply,
    /// Replies accepted in place of `expected`, logged as warnings.
    pub tolerated: &'static [Reply],
}

impl ExchangePolicy {
    /// One attempt, `expected` only.
    pub const fn expect(expected: Reply) -> Self {
        Self {
            attempts: 1,
            expected,
            tolerated: &[],
        }
    }

    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub const fn tolerating(mut self, tolerated: &'static [Reply]) -> Self {
        self.tolerated = tolerated;
        self
    }

    fn accepts(&self, reply: Reply) -> bool {
        reply == self.expected || self.tolerated.contains(&reply)
    }
}

/// Frame-level session state: the borrowed transport and the checksum mode.
pub struct FrameExchange<'a, T: UsbTransport> {
    transport: &'a T,
    mode: ChecksumMode,
    max_read: usize,
}

impl<'a, T: UsbTransport> FrameExchange<'a, T> {
    pub fn new(transport: &'a T, mode: ChecksumMode) -> Self {
        Self {
            transport,
            mode,
            max_read: MAX_READ_SIZE,
        }
    }

    pub fn mode(&self) -> ChecksumMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ChecksumMode) {
        if self.mode != mode {
            debug!(from = %self.mode, to = %mode, "Checksum mode switched");
        }
        self.mode = mode;
    }

    pub fn transport(&self) -> &'a T {
        self.transport
    }

    /// Build a command frame in the current mode.
    pub fn build_frame(&self, command: Command, payload: Vec<u8>) -> BslResult<Frame> {
        Ok(Frame::command(command, payload, self.mode)?)
    }

    /// Stuff and write one frame.
    pub fn send(&self, frame: &Frame) -> BslResult<()> {
        let wire = frame.encode();
        trace!(kind = %format!("0x{:02X}", frame.kind()), len = wire.len(), "Sending frame");
        self.transport.write(&wire)?;
        Ok(())
    }

    /// Write the bare start delimiter the boot ROM and FDL1 answer with
    /// their version string.
    pub fn send_probe(&self) -> BslResult<()> {
        self.transport.write(&[FRAME_START])?;
        Ok(())
    }

    /// Read one wire chunk, extended until it does not end on an escape byte.
    pub fn receive_one(&self) -> BslResult<Vec<u8>> {
        let mut wire = self.transport.read(self.max_read)?;
        if wire.is_empty() {
            return Err(TransportError::ReadFailed("Empty response".into()).into());
        }
        while codec::ends_mid_escape(&wire) {
            let more = self.transport.read(self.max_read)?;
            if more.is_empty() {
                return Err(TransportError::ReadFailed("Empty continuation".into()).into());
            }
            wire.extend_from_slice(&more);
        }
        Ok(wire)
    }

    /// Receive chunks until the length field says the frame is complete,
    /// then validate it.
    pub fn receive_frame(&self) -> BslResult<Frame> {
        let mut raw = Vec::new();
        loop {
            let chunk = self.receive_one()?;
            raw.extend(codec::unstuff(&chunk));
            if raw.first() != Some(&FRAME_START) {
                return Err(FrameError::BadDelimiter.into());
            }
            if let Some(total) = frame::expected_len(&raw)
                && raw.len() >= total
            {
                if raw.len() > total {
                    trace!(extra = raw.len() - total, "Discarding bytes after frame");
                    raw.truncate(total);
                }
                break;
            }
        }
        let frame = Frame::parse(&raw, self.mode)?;
        trace!(reply = %frame.reply(), len = frame.payload().len(), "Received frame");
        Ok(frame)
    }

    /// Receive a frame, retrying on transport and frame errors.
    pub fn receive_with_retries(&self, attempts: u32) -> BslResult<Frame> {
        let attempts = attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.receive_frame() {
                Ok(frame) => return Ok(frame),
                Err(e) if e.is_retryable() => {
                    debug!(attempt, attempts, error = %e, "Receive failed");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            BslError::Transport(TransportError::ReadFailed("No receive attempted".into()))
        }))
    }

    /// Send `command` and wait for a reply `policy` accepts.
    pub fn exchange(
        &self,
        command: Command,
        payload: Vec<u8>,
        policy: &ExchangePolicy,
    ) -> BslResult<Frame> {
        let request = self.build_frame(command, payload)?;
        debug!(command = %command, mode = %self.mode, "Exchange");
        self.send(&request)?;

        let reply = self.receive_with_retries(policy.attempts)?;
        self.check_reply(command, reply, policy)
    }

    fn check_reply(
        &self,
        command: Command,
        reply: Frame,
        policy: &ExchangePolicy,
    ) -> BslResult<Frame> {
        let code = reply.reply();
        if !policy.accepts(code) {
            return Err(ProtocolError::UnexpectedResponse {
                command,
                expected: policy.expected,
                actual: code,
            }
            .into());
        }
        if code != policy.expected {
            warn!(command = %command, reply = %code, "Tolerated reply");
        }
        Ok(reply)
    }

    /// Version probe: bare delimiter out, any valid frame back.
    ///
    /// Each attempt re-sends the delimiter.
    pub fn probe(&self, attempts: u32) -> BslResult<String> {
        let attempts = attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            self.send_probe()?;
            match self.receive_frame() {
                Ok(frame) => return Ok(version_string(frame.payload())),
                Err(e) if e.is_retryable() => {
                    debug!(attempt, attempts, error = %e, "Version probe failed");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            BslError::Transport(TransportError::ReadFailed("No probe attempted".into()))
        }))
    }
}
