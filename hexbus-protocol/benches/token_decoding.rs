use std::hint::black_box;

use bytes::BytesMut;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use hexbus_protocol::{Command, Response, codec::Lexer};

fn read_burst(words: u32) -> BytesMut {
    let mut buf = BytesMut::new();
    Response::Address(0x0100_0000).encode(&mut buf);
    for word in 0..words {
        Response::ReadData(word.wrapping_mul(0x9e37_79b9)).encode(&mut buf);
        if word % 16 == 0 {
            buf.extend_from_slice(&[0x7f, 0xff]);
        }
    }
    buf
}

fn lexer(c: &mut Criterion) {
    let input = read_burst(4096);
    let mut group = c.benchmark_group("lexer");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function("read_burst", |b| {
        b.iter(|| {
            let mut lexer = Lexer::new();
            let mut sum = 0u32;
            for byte in black_box(&input[..]) {
                if let Some(token) = lexer.push(*byte) {
                    sum = sum.wrapping_add(token.value);
                }
            }
            sum
        })
    });
    group.finish();
}

fn encoder(c: &mut Criterion) {
    let mut buf = BytesMut::with_capacity(64 * 1024);
    c.bench_function("encode_write_burst", |b| {
        b.iter(|| {
            buf.clear();
            Command::SetAddress {
                address: black_box(0x2000),
                increment: true,
            }
            .encode(&mut buf);
            for word in 0..1024u32 {
                Command::Write(black_box(word)).encode(&mut buf);
            }
            buf.len()
        })
    });
}

criterion_group!(benches, lexer, encoder);
criterion_main!(benches);
