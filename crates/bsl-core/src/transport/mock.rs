//! Mock USB transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::{ChecksumMode, Frame, Reply, codec};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

/// One queued read result.
enum Incoming {
    Data(Vec<u8>),
    Timeout,
}

/// Mock transport for unit testing protocol logic.
///
/// Reads pop a queue of canned chunks. An optional responder sees every
/// write and may append the device's answer to that queue.
pub struct MockTransport {
    /// Queued chunks to return on read.
    read_queue: Arc<Mutex<VecDeque<Incoming>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Scripted device behaviour.
    responder: Arc<Mutex<Option<Responder>>>,
    /// Simulated VID/PID.
    vid: u16,
    pid: u16,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            read_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(Mutex::new(None)),
            vid: crate::protocol::SPRD_VENDOR_ID,
            pid: crate::protocol::SPRD_DOWNLOAD_PID,
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Mock whose responder answers each written (wire) buffer.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        let mock = Self::new();
        *mock.responder.lock().unwrap() = Some(Box::new(responder));
        mock
    }

    /// Queue a raw chunk to be returned on next read.
    pub fn queue_read(&self, bytes: &[u8]) {
        self.read_queue
            .lock()
            .unwrap()
            .push_back(Incoming::Data(bytes.to_vec()));
    }

    /// Queue a read that times out.
    pub fn queue_timeout(&self) {
        self.read_queue.lock().unwrap().push_back(Incoming::Timeout);
    }

    /// Queue a complete reply frame, stuffed for the wire.
    pub fn queue_reply(&self, reply: Reply, payload: &[u8], mode: ChecksumMode) {
        self.queue_read(&reply_wire(reply, payload, mode));
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Captured writes, unstuffed.
    pub fn get_raw_writes(&self) -> Vec<Vec<u8>> {
        self.get_writes().iter().map(|w| codec::unstuff(w)).collect()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    /// Number of reads still queued.
    pub fn pending_reads(&self) -> usize {
        self.read_queue.lock().unwrap().len()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire bytes of a device reply.
pub fn reply_wire(reply: Reply, payload: &[u8], mode: ChecksumMode) -> Vec<u8> {
    // Replies are built by the test harness; oversize payloads are a test bug.
    Frame::build(reply.code(), payload.to_vec(), mode)
        .expect("reply payload fits the length field")
        .encode()
}

impl UsbTransport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.write_log.lock().unwrap().push(data.to_vec());
        if let Some(responder) = self.responder.lock().unwrap().as_mut() {
            let mut queue = self.read_queue.lock().unwrap();
            for chunk in responder(data) {
                queue.push_back(Incoming::Data(chunk));
            }
        }
        Ok(data.len())
    }

    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        let mut queue = self.read_queue.lock().unwrap();
        match queue.pop_front() {
            Some(Incoming::Data(mut chunk)) => {
                if chunk.len() > max_len {
                    let rest = chunk.split_off(max_len);
                    queue.push_front(Incoming::Data(rest));
                }
                Ok(chunk)
            }
            Some(Incoming::Timeout) | None => Err(TransportError::Timeout { timeout_ms: 200 }),
        }
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
