use std::time::Duration;

use crate::{HexBus, transport::Transport};

#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of writes that may be on the wire unacknowledged.
    pub write_window: usize,
    /// Consecutive idle tokens tolerated while a read is pending.
    pub idle_abort_threshold: u32,
    /// Slice of time spent waiting on the transport between checks, while
    /// waiting for acknowledgements or interrupts.
    pub poll_interval: Duration,
    /// Terminate the process when the link loses sync.
    pub abort_on_desync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            write_window: 1,
            idle_abort_threshold: 3,
            poll_interval: Duration::from_millis(200),
            abort_on_desync: true,
        }
    }
}

/// Builder to create a [HexBus] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use hexbus_client::{Builder, transport::TcpTransport};
///
/// let bus = Builder::new()
///     .write_window(4)
///     .abort_on_desync(false)
///     .build(TcpTransport::connect("fpga.local:8363")?);
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Allow up to `window` unacknowledged writes in flight. Zero is treated as one.
    pub fn write_window(mut self, window: usize) -> Self {
        self.config.write_window = window.max(1);
        self
    }

    /// Number of idle tokens after which a pending read is abandoned
    pub fn idle_abort_threshold(mut self, count: u32) -> Self {
        self.config.idle_abort_threshold = count.max(1);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// If disabled, a desync is returned as [crate::BusError::Desync] instead of
    /// terminating the process.
    pub fn abort_on_desync(mut self, abort: bool) -> Self {
        self.config.abort_on_desync = abort;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the bus on top of an open transport
    pub fn build<T: Transport>(self, transport: T) -> HexBus<T> {
        HexBus::with_config(transport, self.config)
    }
}
