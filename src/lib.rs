//! Receive path of the DECnet Network Services Protocol (NSP).
//!
//! Messages arrive from the routing layer as [receiver::InboundFrame]s. Every message starts
//!  with a flags byte that identifies its type; all message types except connect-init and
//!  connect-ack continue with destination and source port:
//!
//! ```ascii
//! 0: flags
//! 1: destination port (u16 LE)
//! 3: source port (u16 LE)
//! 5: body
//! ```
//!
//! Data-class messages and acknowledgements carry up to two piggy-backed ack fields at the
//!  start of their body, followed by a 12-bit segment number for data and other-data.
pub mod ack;
pub mod config;
pub mod connect_init;
pub mod connection;
pub mod delivery;
pub mod frame_cursor;
pub mod frame_kind;
pub mod image_data;
pub mod link_service;
pub mod lookup;
pub mod output;
pub mod reason;
pub mod receiver;
pub mod seq_num;
pub mod state_machine;

#[cfg(test)]
pub mod test_util;


#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
