use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chip8::prelude::*;

/// Draws a glyph across the screen forever, exercising arithmetic,
/// skips, calls and sprite collisions.
#[rustfmt::skip]
const SCROLL: &[u8] = &[
    0x60, 0x00, // 0x200: LD v0, 0
    0x61, 0x00, // 0x202: LD v1, 0
    0x62, 0x00, // 0x204: LD v2, 0
    0xF2, 0x29, // 0x206: LD F, v2
    0x22, 0x14, // 0x208: CALL 0x214
    0x72, 0x01, // 0x20A: ADD v2, 1
    0x70, 0x05, // 0x20C: ADD v0, 5
    0x71, 0x03, // 0x20E: ADD v1, 3
    0x12, 0x06, // 0x210: JP 0x206
    0x00, 0x00, // 0x212:
    0xD0, 0x15, // 0x214: DRW v0, v1, 5
    0x00, 0xEE, // 0x216: RET
];

fn criterion_benchmark(c: &mut Criterion) {
    {
        let mut vm = Chip8Vm::new(Chip8Conf {
            speed: 1000,
            ..Default::default()
        });
        vm.load_bytecode(SCROLL).unwrap();

        c.bench_function("scroll cycle", |b| b.iter(|| black_box(vm.cycle())));
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
