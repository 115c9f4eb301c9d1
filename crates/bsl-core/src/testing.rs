//! Scripted device for exercising whole sessions against `MockTransport`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::protocol::{
    ChecksumMode, Command, Frame, LoadRequest, PartitionRequest, ReadWindow, Reply, codec,
};
use crate::transport::MockTransport;
use crate::transport::mock::reply_wire;

/// Which program is answering on the device side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Rom,
    Fdl1,
    Fdl2,
}

impl Stage {
    fn mode(self) -> ChecksumMode {
        match self {
            Stage::Rom => ChecksumMode::Crc,
            Stage::Fdl1 | Stage::Fdl2 => ChecksumMode::InternetSum,
        }
    }
}

enum Pending {
    Load(u32),
    Write(String),
}

struct State {
    stage: Stage,
    chunk: usize,
    silent_probe: bool,
    start_reply: Reply,
    rom_exec_reply: Reply,
    fdl2_exec_reply: Reply,
    failing_midst: Option<usize>,
    midst_seen: usize,
    fdl2_exec_stalls: usize,
    capacity: Option<u32>,
    pending: Option<Pending>,
    reading: Option<String>,
    partitions: HashMap<String, Vec<u8>>,
    loads: HashMap<u32, Vec<u8>>,
    written: HashMap<String, Vec<u8>>,
    read_requests: Vec<ReadWindow>,
    commands: Vec<u8>,
}

impl State {
    fn answer(&mut self, wire: &[u8]) -> Vec<Vec<u8>> {
        let mode = self.stage.mode();
        if wire == [0x7E] {
            if self.silent_probe {
                return Vec::new();
            }
            let version: &[u8] = match self.stage {
                Stage::Rom => b"SPRD3\0",
                Stage::Fdl1 | Stage::Fdl2 => b"Spreadtrum Boot Block version 1.1\0",
            };
            return self.split(reply_wire(Reply::Version, version, mode));
        }

        let Ok(frame) = Frame::parse(&codec::unstuff(wire), mode) else {
            return Vec::new();
        };
        self.commands.push(frame.kind());

        let mut stalls = 0;
        let (reply, payload) = match frame.kind() {
            k if k == Command::Connect.code() => (Reply::Ack, Vec::new()),
            k if k == Command::StartData.code() => (self.start_data(frame.payload()), Vec::new()),
            k if k == Command::MidstData.code() => {
                let index = self.midst_seen;
                self.midst_seen += 1;
                if self.failing_midst == Some(index) {
                    return self.split(reply_wire(Reply::OperationFailed, &[], mode));
                }
                match &self.pending {
                    Some(Pending::Load(address)) => self
                        .loads
                        .entry(*address)
                        .or_default()
                        .extend_from_slice(frame.payload()),
                    Some(Pending::Write(name)) => self
                        .written
                        .entry(name.clone())
                        .or_default()
                        .extend_from_slice(frame.payload()),
                    None => return self.split(reply_wire(Reply::InvalidCommand, &[], mode)),
                }
                (Reply::Ack, Vec::new())
            }
            k if k == Command::EndData.code() => {
                self.pending = None;
                (Reply::Ack, Vec::new())
            }
            k if k == Command::ExecData.code() => match self.stage {
                Stage::Rom => {
                    if self.rom_exec_reply == Reply::Ack {
                        self.stage = Stage::Fdl1;
                    }
                    (self.rom_exec_reply, Vec::new())
                }
                Stage::Fdl1 => {
                    self.stage = Stage::Fdl2;
                    stalls = self.fdl2_exec_stalls;
                    (self.fdl2_exec_reply, Vec::new())
                }
                Stage::Fdl2 => (Reply::InvalidCommand, Vec::new()),
            },
            k if k == Command::NormalReset.code() || k == Command::PowerDown.code() => {
                (Reply::Ack, Vec::new())
            }
            k if k == Command::ReadFlashStart.code() => {
                let Ok(request) = PartitionRequest::from_bytes(frame.payload()) else {
                    return self.split(reply_wire(Reply::InvalidCommand, &[], mode));
                };
                self.reading = Some(request.name);
                (self.start_reply, Vec::new())
            }
            k if k == Command::ReadFlashMidst.code() => {
                let Ok(request) = ReadWindow::from_bytes(frame.payload()) else {
                    return self.split(reply_wire(Reply::InvalidCommand, &[], mode));
                };
                self.read_requests.push(request);
                (Reply::ReadFlashData, self.read_window(request))
            }
            k if k == Command::ReadFlashEnd.code() => {
                self.reading = None;
                (Reply::Ack, Vec::new())
            }
            _ => (Reply::InvalidCommand, Vec::new()),
        };

        let mut out = vec![Vec::new(); stalls];
        out.extend(self.split(reply_wire(reply, &payload, mode)));
        out
    }

    fn start_data(&mut self, payload: &[u8]) -> Reply {
        if self.stage == Stage::Fdl2 {
            let Ok(request) = PartitionRequest::from_bytes(payload) else {
                return Reply::InvalidCommand;
            };
            if self.capacity.is_some_and(|capacity| request.size > capacity) {
                return Reply::DownSizeError;
            }
            self.written.insert(request.name.clone(), Vec::new());
            self.pending = Some(Pending::Write(request.name));
        } else {
            let Ok(request) = LoadRequest::from_bytes(payload) else {
                return Reply::InvalidCommand;
            };
            self.loads.insert(request.address, Vec::new());
            self.pending = Some(Pending::Load(request.address));
        }
        Reply::Ack
    }

    /// Unknown or unopened partitions read back empty.
    fn read_window(&self, request: ReadWindow) -> Vec<u8> {
        let Some(data) = self.reading.as_ref().and_then(|name| self.partitions.get(name)) else {
            return Vec::new();
        };
        let start = (request.offset as usize).min(data.len());
        let end = (start + request.size as usize).min(data.len());
        data[start..end].to_vec()
    }

    fn split(&self, wire: Vec<u8>) -> Vec<Vec<u8>> {
        wire.chunks(self.chunk).map(<[u8]>::to_vec).collect()
    }
}

/// Device model answering BSL frames the way ROM, FDL1 and FDL2 do.
#[derive(Clone)]
pub struct FakeDevice {
    state: Arc<Mutex<State>>,
}

impl FakeDevice {
    fn at(stage: Stage) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                stage,
                chunk: 4096,
                silent_probe: false,
                start_reply: Reply::Ack,
                rom_exec_reply: Reply::Ack,
                fdl2_exec_reply: Reply::Ack,
                failing_midst: None,
                midst_seen: 0,
                fdl2_exec_stalls: 0,
                capacity: None,
                pending: None,
                reading: None,
                partitions: HashMap::new(),
                loads: HashMap::new(),
                written: HashMap::new(),
                read_requests: Vec::new(),
                commands: Vec::new(),
            })),
        }
    }

    /// Freshly enumerated device talking to the boot ROM.
    pub fn rom() -> Self {
        Self::at(Stage::Rom)
    }

    /// Device already running FDL2.
    pub fn ready() -> Self {
        Self::at(Stage::Fdl2)
    }

    fn update(self, f: impl FnOnce(&mut State)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_partition(self, name: &str, data: Vec<u8>) -> Self {
        let name = name.to_string();
        self.update(|s| {
            s.partitions.insert(name, data);
        })
    }

    pub fn answer_start_with(self, reply: Reply) -> Self {
        self.update(|s| s.start_reply = reply)
    }

    /// Reply to `EXEC_DATA` for FDL1. Anything but ACK leaves the ROM running.
    pub fn rom_exec_reply(self, reply: Reply) -> Self {
        self.update(|s| s.rom_exec_reply = reply)
    }

    /// Answer the `index`-th `MIDST_DATA` (zero based) with `OPERATION_FAILED`.
    pub fn fail_midst_at(self, index: usize) -> Self {
        self.update(|s| s.failing_midst = Some(index))
    }

    pub fn fdl2_exec_reply(self, reply: Reply) -> Self {
        self.update(|s| s.fdl2_exec_reply = reply)
    }

    /// Empty reads before FDL2 acknowledges `EXEC_DATA`.
    pub fn stall_fdl2_exec(self, reads: usize) -> Self {
        self.update(|s| s.fdl2_exec_stalls = reads)
    }

    pub fn partition_capacity(self, bytes: u32) -> Self {
        self.update(|s| s.capacity = Some(bytes))
    }

    pub fn silent_probe(self) -> Self {
        self.update(|s| s.silent_probe = true)
    }

    /// Largest chunk a single read returns.
    pub fn chunked(self, bytes: usize) -> Self {
        self.update(|s| s.chunk = bytes.max(1))
    }

    pub fn transport(&self) -> MockTransport {
        let state = Arc::clone(&self.state);
        MockTransport::with_responder(move |wire| state.lock().unwrap().answer(wire))
    }

    pub fn stage(&self) -> Stage {
        self.state.lock().unwrap().stage
    }

    pub fn commands(&self) -> Vec<u8> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn read_requests(&self) -> Vec<ReadWindow> {
        self.state.lock().unwrap().read_requests.clone()
    }

    pub fn loaded(&self, address: u32) -> Option<Vec<u8>> {
        self.state.lock().unwrap().loads.get(&address).cloned()
    }

    pub fn written(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().written.get(name).cloned()
    }
}
