use anyhow::bail;
use std::time::Duration;

/// Receive path configuration. It is created once and shared immutably by everything that
///  processes inbound messages.
#[derive(Debug, Clone)]
pub struct NspConfig {
    /// Log a diagnostic for messages that are dropped because they are malformed or address
    ///  nothing. These can be triggered by remote nodes at will, so they are off by default.
    pub log_martians: bool,

    /// The largest NSP segment (including headers) that is guaranteed to make it through the
    ///  network. When a peer is reached via a route that leaves the local ethernet, its announced
    ///  segment size is replaced by a value derived from this.
    pub segment_buffer_size: u16,

    /// The send window used for peers that do no flow control at all
    pub no_flow_control_max_window: u16,

    /// How long an outgoing connection waits for a connect-confirm after the peer acknowledged
    ///  the connect-init
    pub outgoing_timer: Duration,

    /// How long the acknowledgement of a data segment may be held back, waiting for outgoing
    ///  data to piggy-back it on
    pub ack_delay: Duration,

    /// Time a disconnected connection lingers before it is destroyed
    pub destroy_timeout: Duration,
}

impl Default for NspConfig {
    fn default() -> Self {
        NspConfig {
            log_martians: false,
            segment_buffer_size: 1450,
            no_flow_control_max_window: Self::MAX_WINDOW,
            outgoing_timer: Duration::from_secs(3),
            ack_delay: Duration::from_secs(3),
            destroy_timeout: Duration::from_secs(5),
        }
    }
}

impl NspConfig {
    /// largest data message header: flags, ports, two ack fields and the segment number
    pub const MAX_DATA_HEADER: u16 = 11;

    /// half the sequence number space minus two: more segments in flight would make
    ///  acknowledgements ambiguous
    pub const MAX_WINDOW: u16 = 0x07fe;

    const MIN_SEGMENT_BUFFER_SIZE: u16 = 230;

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.segment_buffer_size < Self::MIN_SEGMENT_BUFFER_SIZE {
            bail!("segment buffer size must be at least {}", Self::MIN_SEGMENT_BUFFER_SIZE);
        }
        if self.no_flow_control_max_window == 0 || self.no_flow_control_max_window > Self::MAX_WINDOW {
            bail!("send window for peers without flow control must be in the range 1..={}", Self::MAX_WINDOW);
        }
        if self.ack_delay.is_zero() {
            bail!("ack delay must not be zero");
        }
        Ok(())
    }

    /// the remote segment size used for peers that are reached off the local ethernet
    pub fn off_ethernet_segment_size(&self) -> u16 {
        self.segment_buffer_size.saturating_sub(Self::MAX_DATA_HEADER + 6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_is_valid() {
        let config = NspConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.off_ethernet_segment_size(), 1433);
    }

    #[rstest]
    #[case::segment_buffer_too_small(NspConfig { segment_buffer_size: 100, ..Default::default() })]
    #[case::zero_window(NspConfig { no_flow_control_max_window: 0, ..Default::default() })]
    #[case::window_too_big(NspConfig { no_flow_control_max_window: 2047, ..Default::default() })]
    #[case::zero_ack_delay(NspConfig { ack_delay: Duration::ZERO, ..Default::default() })]
    fn test_validate_invalid(#[case] config: NspConfig) {
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_off_ethernet_segment_size_of_tiny_buffer() {
        let config = NspConfig { segment_buffer_size: 10, ..Default::default() };
        assert_eq!(config.off_ethernet_segment_size(), 0);
    }
}
