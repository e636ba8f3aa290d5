//! End-to-end tests: the blocking client talking to the async emulator over a
//! real TCP socket.
use std::{net::SocketAddr, sync::mpsc, thread};

use hexbus_server::{
    Device,
    server::{Config, Server},
};
use tokio::net::TcpListener;

/// Start an emulator on an ephemeral localhost port in a background thread and
/// return its address. The emulator lives until the test process exits.
pub fn spawn_emulator<D>(device: D, config: Config) -> SocketAddr
where
    D: Device + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(err) => {
                log::error!("Could not start runtime: {}", err);
                return;
            }
        };
        runtime.block_on(async move {
            let listener = match TcpListener::bind("127.0.0.1:0").await {
                Ok(listener) => listener,
                Err(err) => {
                    log::error!("Could not bind emulator: {}", err);
                    return;
                }
            };
            if let Ok(addr) = listener.local_addr() {
                let _ = tx.send(addr);
            }
            let mut server = Server::new(device, config);
            if let Err(err) = server.serve(listener).await {
                log::error!("Emulator stopped: {}", err);
            }
        });
    });
    rx.recv().expect("emulator did not start")
}
