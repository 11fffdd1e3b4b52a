use crate::connect_init::PendingConnect;
use crate::image_data::OptionalData;
use crate::reason::ReasonCode;
use crate::seq_num::SeqNum;
use bitflags::bitflags;
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt::{Debug, Display, Formatter};
use std::time::{Duration, Instant};
use thiserror::Error;
#[cfg(test)] use mockall::automock;

/// NSP connection states. The numeric values are the ones used by existing implementations'
///  management interfaces.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum NspState {
    Open = 1,
    ConnectReceived = 2,
    DisconnectReject = 3,
    DisconnectRejectComplete = 4,
    ConnectConfirm = 5,
    ConnectInit = 6,
    NoResources = 7,
    NoCommunication = 8,
    ConnectDelivered = 9,
    Rejected = 10,
    Run = 11,
    DisconnectInit = 12,
    DisconnectInitComplete = 13,
    DisconnectNotification = 14,
    Closed = 15,
    ClosedNotification = 16,
}

impl Display for NspState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NspState::Open => "O",
            NspState::ConnectReceived => "CR",
            NspState::DisconnectReject => "DR",
            NspState::DisconnectRejectComplete => "DRC",
            NspState::ConnectConfirm => "CC",
            NspState::ConnectInit => "CI",
            NspState::NoResources => "NR",
            NspState::NoCommunication => "NC",
            NspState::ConnectDelivered => "CD",
            NspState::Rejected => "RJ",
            NspState::Run => "RUN",
            NspState::DisconnectInit => "DI",
            NspState::DisconnectInitComplete => "DIC",
            NspState::DisconnectNotification => "DN",
            NspState::Closed => "CL",
            NspState::ClosedNotification => "CN",
        };
        write!(f, "{}", s)
    }
}

/// Coarse state as seen by the application's socket layer
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LinkState {
    Open,
    Established,
    Closed,
}

/// Connection progress as seen by the application
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SocketState {
    Unconnected,
    Connecting,
    Connected,
    Disconnecting,
}

bitflags! {
    #[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
    pub struct Shutdown: u8 {
        const RECEIVE = 0b01;
        const SEND    = 0b10;
    }
}

/// Error reported to the application when the connection fails
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum ConnectionError {
    #[error("connection refused by peer")]
    Refused,
    #[error("host unreachable")]
    HostUnreachable,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum FlowSwitch {
    #[default]
    Send,
    DontSend,
}

/// The peer's flow control mode, announced in the `services` byte of connect-init and
///  connect-confirm messages
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlowControlMode {
    None,
    SegmentRequestCount,
    MessageCount,
    Reserved,
}

impl FlowControlMode {
    const MASK: u8 = 0x0c;

    pub fn from_services(services: u8) -> FlowControlMode {
        match services & Self::MASK {
            0x00 => FlowControlMode::None,
            0x04 => FlowControlMode::SegmentRequestCount,
            0x08 => FlowControlMode::MessageCount,
            _ => FlowControlMode::Reserved,
        }
    }
}

/// The two independently sequenced sub-channels of a connection
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Channel {
    Data,
    OtherData,
}

/// Opaque reference to the cached route a connection sends through
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RouteHandle(pub u64);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PersistAction {
    /// release the connection for good once the timer expires
    Destroy,
}

/// Timer requests for the (external) timer engine. `None` means 'not armed'.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ConnectionTimers {
    pub persist: Option<(PersistAction, Duration)>,
    pub connect: Option<Duration>,
    pub ack_delay: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("receive buffer full")]
    BufferFull,
    #[error("rejected by socket filter")]
    Filtered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("accept backlog is full")]
pub struct BacklogFull;

/// The narrow interface between a connection's protocol state and the socket / buffer
///  machinery of whoever owns it. Implementations are internally synchronized.
#[cfg_attr(test, automock)]
pub trait SocketHooks: Send + Sync + 'static {
    /// hand a received payload to the application, subject to receive buffer admission
    fn enqueue(&self, channel: Channel, payload: Bytes) -> Result<(), AdmissionError>;

    fn notify_state_change(&self);

    /// true once the application released the socket: the connection lingers only to finish
    ///  the protocol exchange, and there is nobody to notify
    fn is_orphaned(&self) -> bool;

    fn is_listening(&self) -> bool;

    /// local receive buffers are filling up, the peer should be asked to stop sending
    fn is_congested(&self) -> bool;

    fn backlog_push(&self, pending: PendingConnect) -> Result<(), BacklogFull>;
}

/// Protocol state of a single NSP connection. All fields are owned by whoever holds the
///  connection's lock; frames for a connection are applied one at a time.
pub struct Connection {
    pub state: NspState,
    pub link_state: LinkState,
    pub socket_state: SocketState,
    pub shutdown: Shutdown,
    pub error: Option<ConnectionError>,

    pub local_port: u16,
    /// unknown (`None`) for an outgoing connection until the peer's first reply
    pub remote_port: Option<u16>,

    /// next expected segment number per channel
    pub data_seq_recv: SeqNum,
    pub other_seq_recv: SeqNum,
    /// highest segment number the peer acknowledged per channel
    pub ack_recv_data: SeqNum,
    pub ack_recv_other: SeqNum,

    pub remote_services: u8,
    pub remote_info: u8,
    pub remote_segment_size: u16,
    pub max_window: u16,

    pub flow_remote_switch: FlowSwitch,
    pub flow_local_switch: FlowSwitch,
    pub flow_remote_data_credit: i32,
    pub flow_remote_other_credit: i32,
    /// An other-data acknowledgement or flow control report is owed to the peer. The outbound
    ///  path sets this when it defers such a report; accepting an other-data segment clears
    ///  it because the immediate other-data ack covers it.
    pub other_report: bool,

    pub timers: ConnectionTimers,

    pub connect_data_in: Option<OptionalData>,
    pub disconnect_reason_in: ReasonCode,
    pub disconnect_data_in: Option<OptionalData>,

    pub retransmit_backoff: u32,
    pub last_activity: Option<Instant>,
    pub route: Option<RouteHandle>,
    /// segments that passed sequencing but were refused by receive buffer admission
    pub drops: u64,

    hooks: Box<dyn SocketHooks>,
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("local_port", &self.local_port)
            .field("remote_port", &self.remote_port)
            .field("data_seq_recv", &self.data_seq_recv)
            .field("other_seq_recv", &self.other_seq_recv)
            .field("ack_recv_data", &self.ack_recv_data)
            .field("ack_recv_other", &self.ack_recv_other)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub const MIN_WINDOW: u16 = 1;

    pub fn new(state: NspState, local_port: u16, hooks: Box<dyn SocketHooks>) -> Connection {
        Connection {
            state,
            link_state: LinkState::Open,
            socket_state: SocketState::Unconnected,
            shutdown: Shutdown::empty(),
            error: None,
            local_port,
            remote_port: None,
            data_seq_recv: SeqNum::from_raw(1),
            other_seq_recv: SeqNum::from_raw(1),
            ack_recv_data: SeqNum::ZERO,
            ack_recv_other: SeqNum::ZERO,
            remote_services: 0,
            remote_info: 0,
            remote_segment_size: 0,
            max_window: Self::MIN_WINDOW,
            flow_remote_switch: FlowSwitch::Send,
            flow_local_switch: FlowSwitch::Send,
            flow_remote_data_credit: 0,
            flow_remote_other_credit: 0,
            other_report: false,
            timers: Default::default(),
            connect_data_in: None,
            disconnect_reason_in: ReasonCode::Ok,
            disconnect_data_in: None,
            retransmit_backoff: 0,
            last_activity: None,
            route: None,
            drops: 0,
            hooks,
        }
    }

    pub fn hooks(&self) -> &dyn SocketHooks {
        self.hooks.as_ref()
    }

    pub fn is_orphaned(&self) -> bool {
        self.hooks.is_orphaned()
    }

    /// tell the application about a state change, unless there is no application any more
    pub fn notify(&self) {
        if !self.hooks.is_orphaned() {
            self.hooks.notify_state_change();
        }
    }

    pub fn remote_flow_control(&self) -> FlowControlMode {
        FlowControlMode::from_services(self.remote_services)
    }

    pub fn ack_delay_pending(&self) -> bool {
        self.timers.ack_delay.is_some()
    }

    /// Bookkeeping for every message that reaches a connection: the peer is alive, so
    ///  retransmission backoff starts over. A message may have arrived via a better route, which
    ///  is adopted only for running connections to leave listeners and half-open connections
    ///  alone.
    pub fn touch(&mut self, route: Option<RouteHandle>, now: Instant) {
        if self.state == NspState::Run && route.is_some() && route != self.route {
            self.route = route;
        }
        self.retransmit_backoff = 0;
        self.last_activity = Some(now);
    }
}
