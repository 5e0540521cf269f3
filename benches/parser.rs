//! Parser benchmarks

use std::cell::Cell;

use charwise::commands::{command_set, motor_command, ping, single_command, MotorFields};
use charwise::{Grammar, NodeId};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn build<'a>(grammar: &mut Grammar<'a>, fields: &'a MotorFields, count: &'a Cell<u64>) -> NodeId {
    let p = ping(grammar, move || count.set(count.get() + 1)).unwrap();
    let s = single_command(grammar, "stop", b's', move || count.set(count.get() + 1)).unwrap();
    let go = motor_command(grammar, fields, move |_| count.set(count.get() + 1)).unwrap();
    command_set(grammar, &[p, s, go], true).unwrap()
}

fn bench_stream(c: &mut Criterion, name: &str, input: &[u8]) {
    let mut group = c.benchmark_group("command_set");
    group.throughput(Throughput::Bytes(input.len() as u64));

    let fields = MotorFields::default();
    let count = Cell::new(0);
    let mut grammar = Grammar::new();
    let top = build(&mut grammar, &fields, &count);

    group.bench_function(name, |b| {
        b.iter(|| {
            for &byte in black_box(input) {
                grammar.consume(top, byte);
            }
            black_box(count.get())
        })
    });

    group.finish();
}

fn bench_motor_commands(c: &mut Criterion) {
    let input = "G 12 200.5 +1000\nG 3 99999.125 -42\n".repeat(500);
    bench_stream(c, "motor_commands", input.as_bytes());
}

fn bench_short_commands(c: &mut Criterion) {
    let input = "#\ns\n".repeat(2000);
    bench_stream(c, "short_commands", input.as_bytes());
}

fn bench_garbage(c: &mut Criterion) {
    // Rejections build diagnostics, so this is the slow path
    let input = "G 1x\nhello world\nG 1000 1.0 +1\n".repeat(300);
    bench_stream(c, "garbage", input.as_bytes());
}

criterion_group!(
    benches,
    bench_motor_commands,
    bench_short_commands,
    bench_garbage
);
criterion_main!(benches);
