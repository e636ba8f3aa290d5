//! # Transports
//!
//! The byte channel underneath the protocol. A transport is ordered and
//! reliable, but the far end may pad the stream with idle filler bytes.
//!
//! Two implementations are provided:
//!
//! - [TcpTransport]: a socket, typically to a network bridge in front of the FPGA UART
//! - [SerialTransport]: a tty put into raw mode at a fixed baud rate
//!
//! ## Example Usage
//!
//! ```ignore
//! use hexbus_client::transport::SerialTransport;
//!
//! let port = SerialTransport::open("/dev/ttyUSB1", 1_000_000)?;
//! let bus = hexbus_client::HexBus::new(port);
//! ```
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    os::{
        fd::{AsFd, BorrowedFd},
        unix::fs::OpenOptionsExt,
    },
    path::Path,
    time::Duration,
};

use nix::{
    errno::Errno,
    fcntl::OFlag,
    poll::{PollFd, PollFlags, PollTimeout, poll},
    sys::termios::{
        self, BaudRate, ControlFlags, FlushArg, SetArg, SpecialCharacterIndices,
    },
};

/// Byte channel capabilities the protocol engine relies on.
pub trait Transport {
    /// Write some bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Block until at least one byte is available and read it into `buf`.
    /// Returns 0 when the far end closed the connection.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Whether a read would return without blocking.
    fn available(&mut self) -> io::Result<bool>;

    /// Wait up to `timeout` for incoming data. Returns whether data is available.
    fn wait(&mut self, timeout: Duration) -> io::Result<bool>;

    fn close(&mut self) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn available(&mut self) -> io::Result<bool> {
        (**self).available()
    }

    fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        (**self).wait(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

fn poll_readable(fd: BorrowedFd<'_>, timeout: PollTimeout) -> io::Result<bool> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, timeout) {
        Ok(ready) => Ok(ready > 0),
        Err(Errno::EINTR) => Ok(false),
        Err(errno) => Err(errno.into()),
    }
}

fn poll_timeout(timeout: Duration) -> PollTimeout {
    PollTimeout::from(u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX))
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is closed")
}

/// Hexbus over a TCP socket.
#[derive(Debug)]
pub struct TcpTransport {
    tcp: TcpStream,
    closed: bool,
}

impl TcpTransport {
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<TcpTransport> {
        let tcp = TcpStream::connect(addr)?;
        tcp.set_nodelay(true)?;
        if let Ok(peer) = tcp.peer_addr() {
            log::info!("Connected to {}", peer);
        }
        Ok(TcpTransport { tcp, closed: false })
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        if self.closed {
            Err(not_connected())
        } else {
            Ok(&mut self.tcp)
        }
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream()?.write(buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream()?.read(buf)
    }

    fn available(&mut self) -> io::Result<bool> {
        poll_readable(self.stream()?.as_fd(), PollTimeout::ZERO)
    }

    fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        poll_readable(self.stream()?.as_fd(), poll_timeout(timeout))
    }

    fn close(&mut self) -> io::Result<()> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        match self.tcp.shutdown(Shutdown::Both) {
            Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err),
            _ => Ok(()),
        }
    }
}

/// Hexbus over a serial port.
#[derive(Debug)]
pub struct SerialTransport {
    tty: Option<File>,
}

fn baud_rate(baud: u32) -> io::Result<BaudRate> {
    Ok(match baud {
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        460800 => BaudRate::B460800,
        500000 => BaudRate::B500000,
        921600 => BaudRate::B921600,
        1000000 => BaudRate::B1000000,
        1500000 => BaudRate::B1500000,
        2000000 => BaudRate::B2000000,
        3000000 => BaudRate::B3000000,
        4000000 => BaudRate::B4000000,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {}", other),
            ));
        }
    })
}

impl SerialTransport {
    pub fn open(path: impl AsRef<Path>, baud: u32) -> io::Result<SerialTransport> {
        let device_path = path.as_ref();
        log::debug!("Opening serial port: {}", device_path.display());
        let tty = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NOCTTY.bits())
            .open(device_path)?;

        let mut settings = termios::tcgetattr(tty.as_fd())?;
        termios::cfmakeraw(&mut settings);
        termios::cfsetspeed(&mut settings, baud_rate(baud)?)?;
        settings.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
        // Block until at least one byte arrives, no inter-byte timer
        settings.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        settings.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(tty.as_fd(), SetArg::TCSANOW, &settings)?;
        termios::tcflush(tty.as_fd(), FlushArg::TCIOFLUSH)?;
        log::info!("Serial port {} open at {} baud", device_path.display(), baud);

        Ok(SerialTransport { tty: Some(tty) })
    }

    fn tty(&mut self) -> io::Result<&mut File> {
        self.tty.as_mut().ok_or_else(not_connected)
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tty()?.write(buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.tty()?.read(buf)
    }

    fn available(&mut self) -> io::Result<bool> {
        poll_readable(self.tty()?.as_fd(), PollTimeout::ZERO)
    }

    fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        poll_readable(self.tty()?.as_fd(), poll_timeout(timeout))
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(tty) = self.tty.take() {
            log::debug!("Closing serial port");
            drop(tty);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{net::TcpListener, thread};

    use super::*;

    #[test]
    fn rejects_unknown_baud_rates() {
        assert!(baud_rate(115200).is_ok());
        assert_eq!(
            baud_rate(12345).unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
    }

    #[test]
    fn tcp_available_and_wait() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let remote = thread::spawn(move || {
            let (mut tcp, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(50));
            tcp.write_all(b"K\n").unwrap();
            thread::sleep(Duration::from_millis(200));
        });

        let mut transport = TcpTransport::connect(addr).unwrap();
        assert!(!transport.available().unwrap());
        assert!(transport.wait(Duration::from_secs(5)).unwrap());
        let mut buf = [0u8; 8];
        let n = transport.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"K\n");

        transport.close().unwrap();
        transport.close().unwrap();
        assert_eq!(
            transport.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        remote.join().unwrap();
    }
}
