use crate::connect_init::PendingConnect;
use crate::connection::{AdmissionError, BacklogFull, Channel, Connection, NspState, SocketHooks};
use crate::output::{NspOutput, PendingAction, ReturnAddress};
use crate::reason::{DisconnectKind, ReasonCode};
use crate::seq_num::SeqNum;
use bytes::Bytes;
use std::sync::{Arc, Mutex};

/// What the application side of a [RecordingSocket] saw, plus knobs to control its behavior
#[derive(Debug, Default)]
pub struct SocketRecord {
    pub data: Vec<Bytes>,
    pub other_data: Vec<Bytes>,
    pub notifications: usize,
    pub backlog: Vec<PendingConnect>,

    pub orphaned: bool,
    pub listening: bool,
    pub congested: bool,
    pub reject_with: Option<AdmissionError>,
    pub backlog_capacity: usize,
}

pub struct RecordingSocket {
    record: Arc<Mutex<SocketRecord>>,
}

impl RecordingSocket {
    pub fn new() -> (RecordingSocket, Arc<Mutex<SocketRecord>>) {
        let record = Arc::new(Mutex::new(SocketRecord {
            backlog_capacity: 4,
            ..Default::default()
        }));
        (RecordingSocket { record: record.clone() }, record)
    }
}

impl SocketHooks for RecordingSocket {
    fn enqueue(&self, channel: Channel, payload: Bytes) -> Result<(), AdmissionError> {
        let mut record = self.record.lock().unwrap();
        if let Some(err) = record.reject_with {
            return Err(err);
        }
        match channel {
            Channel::Data => record.data.push(payload),
            Channel::OtherData => record.other_data.push(payload),
        }
        Ok(())
    }

    fn notify_state_change(&self) {
        self.record.lock().unwrap().notifications += 1;
    }

    fn is_orphaned(&self) -> bool {
        self.record.lock().unwrap().orphaned
    }

    fn is_listening(&self) -> bool {
        self.record.lock().unwrap().listening
    }

    fn is_congested(&self) -> bool {
        self.record.lock().unwrap().congested
    }

    fn backlog_push(&self, pending: PendingConnect) -> Result<(), BacklogFull> {
        let mut record = self.record.lock().unwrap();
        if record.backlog.len() >= record.backlog_capacity {
            return Err(BacklogFull);
        }
        record.backlog.push(pending);
        Ok(())
    }
}

pub fn test_connection(state: NspState, local_port: u16) -> (Connection, Arc<Mutex<SocketRecord>>) {
    let (socket, record) = RecordingSocket::new();
    let mut conn = Connection::new(state, local_port, Box::new(socket));
    if state == NspState::Run {
        conn.remote_port = Some(local_port + 0x1000);
    }
    (conn, record)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputCall {
    DataAck { local_port: u16 },
    OtherAck { local_port: u16 },
    Disconnect { local_port: u16, kind: DisconnectKind, reason: ReasonCode },
    ReturnDisconnect { addr: ReturnAddress, kind: DisconnectKind, reason: ReasonCode },
    CheckTransmitQueue { local_port: u16, channel: Channel, acked: SeqNum },
    Output { local_port: u16 },
    SchedulePending { local_port: u16, action: PendingAction },
}

/// [NspOutput] that records all calls. `check_transmit_queue` reports an opened window for
///  every call.
#[derive(Default, Clone)]
pub struct RecordingOutput {
    pub calls: Arc<Mutex<Vec<OutputCall>>>,
}

impl RecordingOutput {
    pub fn calls(&self) -> Vec<OutputCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: OutputCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl NspOutput for RecordingOutput {
    fn send_data_ack(&self, conn: &Connection) {
        self.record(OutputCall::DataAck { local_port: conn.local_port });
    }

    fn send_other_ack(&self, conn: &Connection) {
        self.record(OutputCall::OtherAck { local_port: conn.local_port });
    }

    fn send_disconnect(&self, conn: &Connection, kind: DisconnectKind, reason: ReasonCode) {
        self.record(OutputCall::Disconnect { local_port: conn.local_port, kind, reason });
    }

    fn return_disconnect(&self, addr: &ReturnAddress, kind: DisconnectKind, reason: ReasonCode) {
        self.record(OutputCall::ReturnDisconnect { addr: *addr, kind, reason });
    }

    fn check_transmit_queue(&self, conn: &Connection, channel: Channel, acked: SeqNum) -> bool {
        self.record(OutputCall::CheckTransmitQueue { local_port: conn.local_port, channel, acked });
        true
    }

    fn output(&self, conn: &Connection) {
        self.record(OutputCall::Output { local_port: conn.local_port });
    }

    fn schedule_pending(&self, conn: &Connection, action: PendingAction) {
        self.record(OutputCall::SchedulePending { local_port: conn.local_port, action });
    }
}

/// message header for all messages except connect-init and connect-ack
pub fn header(flags: u8, dst_port: u16, src_port: u16) -> Vec<u8> {
    let mut result = vec![flags];
    result.extend_from_slice(&dst_port.to_le_bytes());
    result.extend_from_slice(&src_port.to_le_bytes());
    result
}

/// body of a data-class message: ack fields, segment number, payload
pub fn segment_body(acks: &[u16], seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut result = Vec::new();
    for ack in acks {
        result.extend_from_slice(&ack.to_le_bytes());
    }
    result.extend_from_slice(&seq.to_le_bytes());
    result.extend_from_slice(payload);
    result
}
