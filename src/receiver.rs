use crate::ack::process_acks;
use crate::config::NspConfig;
use crate::connect_init::{validate_connect_init, ConnectRequest, PendingConnect};
use crate::connection::{Connection, NspState, RouteHandle};
use crate::delivery::{on_data_segment, on_other_data};
use crate::frame_cursor::FrameCursor;
use crate::frame_kind::{ControlKind, FrameKind, FrameKindError, RouteFlags};
use crate::link_service::on_link_service;
use crate::lookup::ConnectionLookup;
use crate::output::{NspOutput, ReceiveContext, ReturnAddress};
use crate::reason::{DisconnectKind, ReasonCode};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, span, trace, Instrument, Level};
use uuid::Uuid;

/// An NSP message as delivered by the routing layer
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// the NSP message, starting with its flags byte
    pub payload: Bytes,
    pub route_flags: RouteFlags,
    pub src_node: u16,
    pub dst_node: u16,
    /// the route the message arrived on, if the routing layer tracks one
    pub route: Option<RouteHandle>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RxOutcome {
    /// processed by a connection, or answered on behalf of a missing one
    Accepted,
    Dropped,
}

/// Addressing part of every message except connect-init
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct MessagePorts {
    dst_port: u16,
    /// 0 for connect-ack, which carries no source port
    src_port: u16,
    header_len: usize,
}

impl MessagePorts {
    const MIN_LEN: usize = 3;
    const FULL_LEN: usize = 5;

    fn parse(payload: &[u8]) -> Option<MessagePorts> {
        let mut cursor = FrameCursor::new(payload);
        cursor.skip(1).ok()?;
        let dst_port = cursor.read_u16_le().ok()?;
        match cursor.read_u16_le() {
            Ok(src_port) => Some(MessagePorts { dst_port, src_port, header_len: Self::FULL_LEN }),
            Err(_) => Some(MessagePorts { dst_port, src_port: 0, header_len: Self::MIN_LEN }),
        }
    }
}

/// The receive side of NSP: classifies inbound messages, finds the connection each belongs to
///  and applies it there. Messages for the same connection are applied one at a time, messages
///  for different connections concurrently.
pub struct NspReceiver {
    config: Arc<NspConfig>,
    lookup: Arc<dyn ConnectionLookup>,
    output: Arc<dyn NspOutput>,
}

impl NspReceiver {
    pub fn new(config: Arc<NspConfig>, lookup: Arc<dyn ConnectionLookup>, output: Arc<dyn NspOutput>) -> anyhow::Result<NspReceiver> {
        config.validate()?;

        Ok(NspReceiver {
            config,
            lookup,
            output,
        })
    }

    pub async fn on_frame(&self, frame: InboundFrame) -> RxOutcome {
        let correlation_id = Uuid::new_v4();
        let span = span!(Level::TRACE, "nsp_frame_received", ?correlation_id);
        self.do_on_frame(frame).instrument(span).await
    }

    async fn do_on_frame(&self, frame: InboundFrame) -> RxOutcome {
        if frame.payload.len() < 2 {
            trace!("message from node {:#06x} too short - dropping", frame.src_node);
            return RxOutcome::Dropped;
        }

        let kind = match FrameKind::decode(frame.payload[0]) {
            Ok(kind) => kind,
            Err(e @ FrameKindError::Malformed(_)) => {
                self.log_martian(&frame, &e.to_string(), None);
                return RxOutcome::Dropped;
            }
            Err(e) => {
                trace!("{} - dropping", e);
                return RxOutcome::Dropped;
            }
        };
        trace!("received {:?} from node {:#06x}", kind, frame.src_node);

        if let FrameKind::Control(ControlKind::ConnectInit { .. }) = kind {
            return if frame.route_flags.is_returned() {
                self.on_returned_connect_init(&frame).await
            }
            else {
                self.on_connect_init(&frame, kind).await
            };
        }

        // connect-init is the only message type that is of interest when returned
        if frame.route_flags.is_returned() {
            trace!("returned {:?} - dropping", kind);
            return RxOutcome::Dropped;
        }

        let Some(ports) = MessagePorts::parse(&frame.payload) else {
            trace!("{:?} without destination port - dropping", kind);
            return RxOutcome::Dropped;
        };

        let Some(handle) = self.lookup.find_by_ports(ports.dst_port, ports.src_port) else {
            return self.no_destination(&frame, kind, ports, ReasonCode::NoLink);
        };

        let mut conn = handle.lock().await;
        if conn.remote_port.is_some_and(|remote| remote != ports.src_port) {
            trace!("port {} is connected to remote port {:?}, not {}", ports.dst_port, conn.remote_port, ports.src_port);
            drop(conn);
            return self.no_destination(&frame, kind, ports, ReasonCode::NoLink);
        }

        conn.touch(frame.route, Instant::now());
        let body = frame.payload.slice(ports.header_len..);
        apply_frame(&mut conn, kind, ports.src_port, body, frame.route_flags, &self.context());
        RxOutcome::Accepted
    }

    fn context(&self) -> ReceiveContext<'_> {
        ReceiveContext {
            config: &self.config,
            output: self.output.as_ref(),
        }
    }

    async fn on_connect_init(&self, frame: &InboundFrame, kind: FrameKind) -> RxOutcome {
        let ports = connect_init_ports(&frame.payload);

        let request = match validate_connect_init(&frame.payload) {
            Ok(request) => request,
            Err(e) => {
                self.log_martian(frame, &e.to_string(), ports);
                return match ports {
                    Some(ports) => self.no_destination(frame, kind, ports, e.reason()),
                    None => RxOutcome::Dropped,
                };
            }
        };

        let Some(listener) = self.lookup.find_listener(&request.destination) else {
            debug!("no listener for {:?}", request.destination);
            return match ports {
                Some(ports) => self.no_destination(frame, kind, ports, ReasonCode::NoLink),
                None => RxOutcome::Dropped,
            };
        };

        let mut conn = listener.lock().await;
        conn.touch(frame.route, Instant::now());
        queue_connect_request(&mut conn, request, frame.src_node);
        RxOutcome::Accepted
    }

    /// One of our own connect-init messages came back as undeliverable
    async fn on_returned_connect_init(&self, frame: &InboundFrame) -> RxOutcome {
        let Some(ports) = connect_init_ports(&frame.payload) else {
            return RxOutcome::Dropped;
        };

        let Some(handle) = self.lookup.find_by_returned_header(ports.dst_port, ports.src_port) else {
            trace!("returned connect init for unknown port {}", ports.src_port);
            return RxOutcome::Dropped;
        };

        let mut conn = handle.lock().await;
        if conn.remote_port.unwrap_or(0) != ports.dst_port {
            return RxOutcome::Dropped;
        }
        conn.on_returned_connect_init();
        RxOutcome::Accepted
    }

    /// Answers a message that belongs to no connection. Only connect-init and connect-confirm
    ///  get a reply, and never when they were returned by the routing layer.
    fn no_destination(&self, frame: &InboundFrame, kind: FrameKind, ports: MessagePorts, reason: ReasonCode) -> RxOutcome {
        if frame.route_flags.is_returned() || reason.is_no_reply() {
            return RxOutcome::Dropped;
        }

        let disconnect_kind = match kind {
            FrameKind::Control(ControlKind::ConnectInit { .. }) => DisconnectKind::Init,
            FrameKind::Control(ControlKind::ConnectConfirm) => DisconnectKind::Confirm,
            _ => {
                trace!("no connection for {:?} to port {} - dropping", kind, ports.dst_port);
                return RxOutcome::Dropped;
            }
        };

        let addr = ReturnAddress {
            remote_node: frame.src_node,
            local_node: frame.dst_node,
            local_port: ports.dst_port,
            remote_port: ports.src_port,
        };
        debug!("no connection for {:?} from {:?} - replying with {:?}", kind, addr, reason);
        self.output.return_disconnect(&addr, disconnect_kind, reason);
        RxOutcome::Accepted
    }

    fn log_martian(&self, frame: &InboundFrame, msg: &str, ports: Option<MessagePorts>) {
        if self.config.log_martians {
            let (src_port, dst_port) = ports
                .map(|p| (p.src_port, p.dst_port))
                .unwrap_or_default();
            debug!("martian message ({}) src={:#06x} dst={:#06x} srcport={:#06x} dstport={:#06x}",
                msg, frame.src_node, frame.dst_node, src_port, dst_port);
        }
    }
}

/// ports of a connect-init message, which always has a source port
fn connect_init_ports(payload: &[u8]) -> Option<MessagePorts> {
    MessagePorts::parse(payload)
        .filter(|ports| ports.header_len == MessagePorts::FULL_LEN)
}

fn queue_connect_request(conn: &mut Connection, request: ConnectRequest, remote_node: u16) {
    conn.on_connect_init(PendingConnect { request, remote_node });
}

/// Applies a message other than connect-init to the connection it belongs to. `body` is the
///  message after its flags and ports.
pub fn apply_frame(conn: &mut Connection, kind: FrameKind, src_port: u16, body: Bytes, route_flags: RouteFlags, ctx: &ReceiveContext) {
    match kind {
        FrameKind::Control(ControlKind::ConnectInit { .. }) => {
            trace!("connect init for an existing connection - ignoring");
        }
        FrameKind::Control(ControlKind::ConnectConfirm) => conn.on_connect_confirm(src_port, &body, route_flags, ctx),
        FrameKind::Control(ControlKind::DisconnectInit) => conn.on_disconnect_init(src_port, &body, ctx),
        FrameKind::Control(ControlKind::DisconnectConfirm) => conn.on_disconnect_confirm(&body, ctx),
        FrameKind::ConnectAck => conn.on_connect_ack(ctx),
        _ => {
            conn.promote_on_traffic(route_flags, ctx);

            let consumed = process_acks(conn, &mut FrameCursor::new(&body), kind.is_other_channel(), ctx.output);
            if !kind.is_segment() {
                return;
            }
            if conn.state != NspState::Run {
                trace!("{:?} in state {} - dropping", kind, conn.state);
                return;
            }

            let segment = body.slice(consumed..);
            match kind {
                FrameKind::LinkService => {
                    on_link_service(conn, &segment, ctx);
                }
                FrameKind::OtherData => {
                    on_other_data(conn, segment, ctx);
                }
                _ => {
                    on_data_segment(conn, segment, ctx);
                }
            }
        }
    }
}
