use crate::connect_init::PendingConnect;
use crate::connection::{Connection, ConnectionError, FlowControlMode, LinkState, NspState, PersistAction, Shutdown, SocketState};
use crate::frame_cursor::FrameCursor;
use crate::frame_kind::RouteFlags;
use crate::image_data::OptionalData;
use crate::output::{PendingAction, ReceiveContext};
use crate::reason::{DisconnectKind, ReasonCode};
use tracing::{debug, trace};

/// Inputs to the connection state machine
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NspEvent {
    ConnectConfirm,
    ConnectAck,
    DisconnectInit,
    DisconnectConfirm(ReasonCode),
    /// a connect-init we sent came back as undeliverable
    ReturnedConnectInit,
    /// a data or ack message reached the connection
    AcceptedTraffic,
}

/// The transition table. `None` means that the event leaves the state unchanged - this is
///  not an error, and handlers may still update other connection fields.
pub fn next_state(state: NspState, event: NspEvent) -> Option<NspState> {
    use NspState::*;

    match (event, state) {
        (NspEvent::ConnectConfirm, ConnectInit | ConnectDelivered) => Some(Run),

        (NspEvent::ConnectAck, ConnectInit) => Some(ConnectDelivered),

        (NspEvent::DisconnectInit, ConnectInit | ConnectDelivered) => Some(Rejected),
        (NspEvent::DisconnectInit, Run) => Some(DisconnectNotification),
        (NspEvent::DisconnectInit, DisconnectInit) => Some(DisconnectInitComplete),

        (NspEvent::DisconnectConfirm(_), ConnectInit) => Some(NoResources),
        (NspEvent::DisconnectConfirm(ReasonCode::DisconnectComplete), DisconnectReject) => Some(DisconnectRejectComplete),
        (NspEvent::DisconnectConfirm(ReasonCode::NoLink), DisconnectReject) => Some(ClosedNotification),
        (NspEvent::DisconnectConfirm(_), DisconnectInit) => Some(DisconnectInitComplete),
        (NspEvent::DisconnectConfirm(_), Run | ConnectConfirm) => Some(ClosedNotification),

        (NspEvent::ReturnedConnectInit, ConnectInit) => Some(NoCommunication),

        (NspEvent::AcceptedTraffic, ConnectConfirm) => Some(Run),

        _ => None,
    }
}

fn known_port(port: u16) -> Option<u16> {
    (port != 0).then_some(port)
}

impl Connection {
    fn transition(&mut self, event: NspEvent) -> Option<NspState> {
        let next = next_state(self.state, event)?;
        debug!("connection {}: {:?} {} -> {}", self.local_port, event, self.state, next);
        self.state = next;
        Some(next)
    }

    /// If the peer is reached via a route that leaves the local ethernet, its announced segment
    ///  size may not fit through and is replaced by the configured segment buffer size.
    fn adjust_segment_size(&mut self, route_flags: RouteFlags, ctx: &ReceiveContext) {
        if route_flags.is_off_ethernet() {
            self.remote_segment_size = ctx.config.off_ethernet_segment_size();
        }
    }

    fn arm_destroy_timer(&mut self, ctx: &ReceiveContext) {
        self.timers.persist = Some((PersistAction::Destroy, ctx.config.destroy_timeout));
    }

    fn notify_disconnect(&mut self) {
        if self.is_orphaned() {
            return;
        }
        if self.socket_state != SocketState::Unconnected {
            self.socket_state = SocketState::Disconnecting;
        }
        self.notify();
    }

    /// A validated connect request for a listening connection: queue it for the application to
    ///  accept, or drop it if the accept backlog is full
    pub fn on_connect_init(&mut self, pending: PendingConnect) {
        if !self.hooks().is_listening() {
            debug!("connect request for port {}, which is not listening - dropping", self.local_port);
            return;
        }
        match self.hooks().backlog_push(pending) {
            Ok(()) => {
                trace!("connect request queued on listener {}", self.local_port);
                self.notify();
            }
            Err(e) => {
                debug!("dropping connect request for listener {}: {}", self.local_port, e);
            }
        }
    }

    /// `body` is the message after flags and ports
    pub fn on_connect_confirm(&mut self, src_port: u16, body: &[u8], route_flags: RouteFlags, ctx: &ReceiveContext) {
        let mut cursor = FrameCursor::new(body);
        let (services, info, segment_size) = match (cursor.read_u8(), cursor.read_u8(), cursor.read_u16_le()) {
            (Ok(services), Ok(info), Ok(segment_size)) => (services, info, segment_size),
            _ => {
                trace!("connect confirm too short - dropping");
                return;
            }
        };

        if self.transition(NspEvent::ConnectConfirm).is_none() {
            trace!("ignoring connect confirm in state {}", self.state);
            return;
        }

        self.timers.persist = None;
        self.timers.connect = None;
        self.remote_port = known_port(src_port);
        self.link_state = LinkState::Established;
        self.remote_services = services;
        self.remote_info = info;
        self.remote_segment_size = segment_size;
        self.adjust_segment_size(route_flags, ctx);

        if self.remote_flow_control() == FlowControlMode::None {
            self.max_window = ctx.config.no_flow_control_max_window;
        }

        if let Some(data) = OptionalData::parse(&mut cursor) {
            self.connect_data_in = Some(data);
        }

        ctx.output.schedule_pending(self, PendingAction::Idle);
        self.notify();
    }

    pub fn on_connect_ack(&mut self, ctx: &ReceiveContext) {
        if self.transition(NspEvent::ConnectAck).is_some() {
            self.timers.persist = None;
            self.timers.connect = Some(ctx.config.outgoing_timer);
        }
    }

    pub fn on_disconnect_init(&mut self, src_port: u16, body: &[u8], ctx: &ReceiveContext) {
        let mut cursor = FrameCursor::new(body);
        let Ok(reason) = cursor.read_u16_le() else {
            trace!("disconnect init too short - dropping");
            return;
        };
        let reason = ReasonCode::from(reason);

        self.disconnect_reason_in = reason;
        self.disconnect_data_in = OptionalData::parse(&mut cursor);

        // some implementations send disconnect-init without a port while connecting
        if self.remote_port.is_none() {
            self.remote_port = known_port(src_port);
        }
        self.link_state = LinkState::Closed;

        match self.transition(NspEvent::DisconnectInit) {
            Some(NspState::Rejected) => {
                self.error = Some(ConnectionError::Refused);
                self.timers.connect = None;
            }
            Some(NspState::DisconnectNotification) => {
                self.shutdown = Shutdown::all();
            }
            _ => {}
        }

        self.notify_disconnect();

        if self.remote_port.is_some() {
            ctx.output.send_disconnect(self, DisconnectKind::Confirm, ReasonCode::DisconnectComplete);
        }
        self.arm_destroy_timer(ctx);
    }

    pub fn on_disconnect_confirm(&mut self, body: &[u8], ctx: &ReceiveContext) {
        if body.len() != 2 {
            trace!("disconnect confirm with {} body bytes - dropping", body.len());
            return;
        }
        let reason = ReasonCode::from(u16::from_le_bytes([body[0], body[1]]));

        self.link_state = LinkState::Closed;
        if self.state == NspState::Run {
            self.shutdown = Shutdown::all();
        }
        self.transition(NspEvent::DisconnectConfirm(reason));

        self.notify_disconnect();
        self.arm_destroy_timer(ctx);
    }

    pub fn on_returned_connect_init(&mut self) {
        if self.transition(NspEvent::ReturnedConnectInit).is_some() {
            self.link_state = LinkState::Closed;
            self.error = Some(ConnectionError::HostUnreachable);
            self.notify();
        }
    }

    /// Data and ack messages complete the handshake for a connection that sent a
    ///  connect-confirm, the same as a connect-ack would. Orphaned connections are not promoted.
    pub fn promote_on_traffic(&mut self, route_flags: RouteFlags, ctx: &ReceiveContext) {
        if self.is_orphaned() {
            return;
        }
        if self.transition(NspEvent::AcceptedTraffic).is_some() {
            self.link_state = LinkState::Established;
            self.notify();
            self.adjust_segment_size(route_flags, ctx);
        }
    }
}
