//! # Hexbus Command Line Tool
//!
//! Reads and writes FPGA registers over a hexbus link, either through a serial
//! port or a TCP bridge, and waits for device interrupts.
//!
//! The `emulate` subcommand runs a software device instead: a TCP server backed
//! by an in-memory register file, useful for trying out host tooling without
//! hardware.
use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use clap_num::maybe_hex;
use env_logger::Env;
use hexbus_client::{
    Builder, HexBus, Word,
    transport::{SerialTransport, TcpTransport, Transport},
};
use hexbus_server::{device::RegisterFile, server};

const DEFAULT_BAUD: u32 = 1_000_000;

#[derive(Args, Clone)]
struct Link {
    /// Connect to a TCP bridge, e.g. 192.168.1.10:8363
    #[arg(short, long, conflicts_with = "serial")]
    tcp: Option<String>,

    /// Open a serial port, e.g. /dev/ttyUSB1
    #[arg(short, long)]
    serial: Option<PathBuf>,

    #[arg(short, long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Allow this many unacknowledged writes in flight
    #[arg(long, default_value = "1")]
    window: usize,
}

#[derive(Subcommand, Clone)]
enum Command {
    /// Read registers and print them one per line
    Read {
        #[arg(value_parser = maybe_hex::<Word>)]
        address: Word,
        #[arg(default_value = "1")]
        count: usize,
        /// Read the same register repeatedly instead of consecutive ones
        #[arg(short, long)]
        fixed: bool,
    },
    /// Write registers
    Write {
        #[arg(value_parser = maybe_hex::<Word>)]
        address: Word,
        #[arg(required = true, value_parser = maybe_hex::<Word>)]
        values: Vec<Word>,
        /// Write all values to the same register instead of consecutive ones
        #[arg(short, long)]
        fixed: bool,
    },
    /// Wait for the device to raise an interrupt
    Wait {
        #[arg(short, long, help = "Give up after this many milliseconds")]
        timeout_ms: Option<u64>,
    },
    /// Serve an emulated device over TCP
    Emulate {
        #[arg(short, long, default_value = "8363")]
        port: u16,

        #[arg(short, long, default_value = "127.0.0.1")]
        ip: IpAddr,

        /// Send an idle token after this many milliseconds of silence
        #[arg(long)]
        idle_ms: Option<u64>,

        /// Writes to this register raise an interrupt
        #[arg(long, value_parser = maybe_hex::<Word>)]
        interrupt_register: Option<Word>,
    },
}

#[derive(Parser)]
#[command(about = "Register access to an FPGA over the hexbus protocol", long_about = None)]
struct Cli {
    #[command(flatten)]
    link: Link,

    #[clap(subcommand)]
    command: Command,
}

fn open(link: &Link) -> Result<HexBus<Box<dyn Transport>>, Box<dyn Error>> {
    let transport: Box<dyn Transport> = match (&link.tcp, &link.serial) {
        (Some(addr), _) => {
            log::debug!("Connecting to {}", addr);
            Box::new(TcpTransport::connect(addr.as_str())?)
        }
        (None, Some(path)) => Box::new(SerialTransport::open(path, link.baud)?),
        (None, None) => return Err("specify a link with --tcp <addr> or --serial <path>".into()),
    };
    Ok(Builder::new().write_window(link.window).build(transport))
}

fn emulate(
    addr: SocketAddr,
    idle_ms: Option<u64>,
    interrupt_register: Option<Word>,
) -> Result<(), Box<dyn Error>> {
    let mut device = RegisterFile::new();
    if let Some(register) = interrupt_register {
        log::info!("Writes to {:08x} raise an interrupt", register);
        device = device.with_interrupt_register(register);
    }
    let mut builder = server::Builder::new();
    if let Some(ms) = idle_ms {
        builder = builder.idle_interval(Duration::from_millis(ms));
    }
    let mut server = builder.build(device);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        tokio::select! {
            result = server.listen(addr) => result,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down emulator");
                Ok(())
            }
        }
    })?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Emulate {
            port,
            ip,
            idle_ms,
            interrupt_register,
        } => {
            let addr = SocketAddr::new(ip, port);
            log::info!("Starting hexbus emulator on {}", addr);
            emulate(addr, idle_ms, interrupt_register)
        }
        Command::Read {
            address,
            count,
            fixed,
        } => {
            let mut bus = open(&cli.link)?;
            let words = if fixed {
                bus.read_same(address, count)?
            } else {
                bus.read_block(address, count)?
            };
            for (index, word) in words.iter().enumerate() {
                let at = if fixed {
                    address
                } else {
                    address.wrapping_add(4 * index as Word)
                };
                println!("{:08x}: {:08x}", at, word);
            }
            Ok(())
        }
        Command::Write {
            address,
            values,
            fixed,
        } => {
            let mut bus = open(&cli.link)?;
            if fixed {
                bus.write_same(address, &values)?;
            } else {
                bus.write_block(address, &values)?;
            }
            log::info!("Wrote {} word(s) at {:08x}", values.len(), address);
            Ok(())
        }
        Command::Wait { timeout_ms } => {
            let mut bus = open(&cli.link)?;
            match timeout_ms {
                Some(ms) => {
                    if bus.wait_interrupt_timeout(Duration::from_millis(ms))? {
                        println!("interrupt");
                    } else {
                        println!("timeout");
                        std::process::exit(2);
                    }
                }
                None => {
                    bus.wait_interrupt()?;
                    println!("interrupt");
                }
            }
            Ok(())
        }
    }
}
