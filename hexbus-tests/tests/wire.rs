use std::{
    io::{Read, Write},
    net::TcpStream,
    time::Duration,
};

use bytes::BytesMut;
use hexbus_protocol::{Command, Tag, codec::Lexer};
use hexbus_server::{device::RegisterFile, server::Config};
use hexbus_tests::spawn_emulator;

fn exchange(tcp: &mut TcpStream, commands: &[Command], expected: &[u8]) {
    let mut out = BytesMut::new();
    for cmd in commands {
        cmd.encode(&mut out);
    }
    tcp.write_all(&out).unwrap();

    let mut reply = vec![0u8; expected.len()];
    tcp.read_exact(&mut reply).unwrap();
    assert_eq!(
        reply,
        expected,
        "got {:?}",
        String::from_utf8_lossy(&reply)
    );
}

#[test]
fn emulator_replies_on_the_wire() {
    let addr = spawn_emulator(RegisterFile::new().with_fault(0x8), Config::default());
    let mut tcp = TcpStream::connect(addr).unwrap();
    tcp.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    exchange(
        &mut tcp,
        &[
            Command::SetAddress {
                address: 0x0,
                increment: true,
            },
            Command::Write(0x1f),
            Command::Write(0),
            Command::Read,
        ],
        b"A00000000\nK\nK\nE\n",
    );
    exchange(
        &mut tcp,
        &[
            Command::SetAddress {
                address: 0x0,
                increment: false,
            },
            Command::Read,
            Command::Read,
        ],
        b"A00000001\nR1f\nR1f\n",
    );
}

#[test]
fn emulator_sends_idle_tokens() {
    let config = Config {
        idle_interval: Some(Duration::from_millis(5)),
        ..Config::default()
    };
    let addr = spawn_emulator(RegisterFile::new(), config);
    let mut tcp = TcpStream::connect(addr).unwrap();
    tcp.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let mut lexer = Lexer::new();
    let mut tags = Vec::new();
    let mut buf = [0u8; 16];
    while tags.len() < 3 {
        let n = tcp.read(&mut buf).unwrap();
        assert!(n > 0, "emulator closed the connection");
        tags.extend(
            buf[..n]
                .iter()
                .filter_map(|byte| lexer.push(*byte))
                .map(|token| token.tag),
        );
    }
    assert!(tags.iter().all(|tag| *tag == Tag::Idle));
}
