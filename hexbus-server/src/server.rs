use std::{
    io::{self, ErrorKind},
    time::{Duration, Instant},
};

use bytes::BytesMut;
use hexbus_protocol::codec::HexbusCodec;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, ToSocketAddrs},
    time::timeout,
};
use tokio_util::codec::Decoder;

use crate::{Device, responder::Responder};

#[derive(Debug, Clone)]
pub struct Config {
    /// Emit an idle token after this much silence. `None` disables idle tokens.
    pub idle_interval: Option<Duration>,
    /// Close the connection after the client has been silent this long.
    pub read_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_interval: None,
            read_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct Server<D: Device> {
    responder: Responder<D>,
    config: Config,
}

/// Builder to create a [Server] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use hexbus_server::{device::RegisterFile, server::Builder};
/// use std::time::Duration;
///
/// let server = Builder::new()
///     .idle_interval(Duration::from_millis(500))
///     .read_timeout(Duration::from_secs(20))
///     .build(RegisterFile::new());
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Send an idle token whenever the link has been quiet for `interval`.
    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.config.idle_interval = Some(interval);
        self
    }

    /// Set the client inactivity timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Build and return the server
    pub fn build<D: Device>(self, device: D) -> Server<D> {
        Server::new(device, self.config)
    }
}

impl<D: Device> Server<D> {
    pub fn new(device: D, config: Config) -> Server<D> {
        Server {
            responder: Responder::new(device),
            config,
        }
    }

    pub fn device(&self) -> &D {
        self.responder.device()
    }

    pub async fn listen(&mut self, addr: impl ToSocketAddrs) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Accept clients from an already bound listener, one at a time.
    pub async fn serve(&mut self, listener: TcpListener) -> io::Result<()> {
        log::info!("Server listening on {}", listener.local_addr()?);
        loop {
            match listener.accept().await {
                Ok((tcp, peer)) => {
                    log::info!("New client connection from {}", peer);
                    if let Err(e) = self.handle_client(tcp).await {
                        log::error!("Client error: {}", e);
                    }
                }
                Err(e) => log::error!("Connection error: {}", e),
            }
        }
    }

    async fn handle_client(&mut self, mut tcp: TcpStream) -> io::Result<()> {
        tcp.set_nodelay(true)?;
        self.responder.reset();

        let mut codec = HexbusCodec::new();
        let mut inbound = BytesMut::with_capacity(256);
        let mut outbound = BytesMut::with_capacity(256);
        let tick = self.config.idle_interval.unwrap_or(self.config.read_timeout);
        let mut last_activity = Instant::now();

        loop {
            let read = match timeout(tick, tcp.read_buf(&mut inbound)).await {
                Ok(Ok(n)) => n,
                Ok(Err(err))
                    if err.kind() == ErrorKind::ConnectionAborted
                        || err.kind() == ErrorKind::ConnectionReset =>
                {
                    log::info!("Client disconnected");
                    return Ok(());
                }
                Ok(Err(err)) => return Err(err),
                Err(_elapsed) => {
                    if last_activity.elapsed() >= self.config.read_timeout {
                        log::error!("Client read timeout, closing connection");
                        return Ok(());
                    }
                    if self.config.idle_interval.is_some() {
                        self.responder.idle(&mut outbound);
                        tcp.write_all(&outbound).await?;
                        outbound.clear();
                    }
                    continue;
                }
            };
            if read == 0 {
                log::info!("Client disconnected");
                return Ok(());
            }
            last_activity = Instant::now();

            while let Some(token) = codec.decode(&mut inbound)? {
                log::trace!("Host token {} {:x}", token.tag, token.value);
                self.responder.handle(token, &mut outbound);
            }
            if !outbound.is_empty() {
                log::trace!("Reply: {:?}", String::from_utf8_lossy(&outbound));
                tcp.write_all(&outbound).await?;
                outbound.clear();
            }
        }
    }
}
