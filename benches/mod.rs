#![feature(test)]
extern crate test;

use vlp16_parser::vlp16;
use vlp16_parser::packet::PACKET_SIZE;

use test::Bencher;

fn packet() -> Vec<u8> {
    let mut buf = vec![0u8; PACKET_SIZE];
    for (i, block) in buf[..1200].chunks_exact_mut(100).enumerate() {
        block[0] = 0xFF;
        block[1] = 0xEE;
        let azimuth = 35_900 + 20*i as u16;
        block[2..4].copy_from_slice(&(azimuth % 36000).to_le_bytes());
        for (j, b) in block[4..].iter_mut().enumerate() {
            *b = j as u8;
        }
    }
    buf[1204] = 0x37;
    buf[1205] = 0x22;
    buf
}

#[bench]
fn bench_vlp16_decode(b: &mut Bencher) {
    let buf = packet();
    b.iter(|| {
        let points = vlp16::decode(test::black_box(&buf)).unwrap();
        test::black_box(points);
    });
}
