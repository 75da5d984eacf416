use std::env;
use std::io;
use std::time::Instant;

use ring_recorder::{
    levels, record, record_compare, record_data, trace_enter, trace_exit, Context, EntranceState,
    IoSink, NodeDefaults, Recorder, RecorderConfig, RegistryBuilder,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const BENCH_ITERATIONS: usize = 200_000;

fn main() -> io::Result<()> {
    let (writer, _guard) = tracing_appender::non_blocking(io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(writer)
        .init();

    match env::args().nth(1).as_deref() {
        Some("bench") => bench(),
        _ => demo(),
    }
}

fn build_recorder() -> (Recorder, ring_recorder::LogId, ring_recorder::LogId) {
    let mut builder = RegistryBuilder::new();
    let net = builder.module("net", NodeDefaults::default());
    let tcp = builder
        .group(
            net,
            "tcp",
            NodeDefaults {
                entrance: EntranceState::Enabled,
                ..NodeDefaults::default()
            },
        )
        .unwrap_or(net);
    let recorder = Recorder::new_or_disabled(RecorderConfig::default(), builder.build());
    (recorder, net, tcp)
}

/// Records a short session and replays it to stdout.
fn demo() -> io::Result<()> {
    let (recorder, net, tcp) = build_recorder();
    info!(enabled = recorder.is_enabled(), "recording demo session");

    trace_enter!(recorder, tcp, "tcp_connect");
    record!(recorder, net, levels::WARNING, "link %s up at %u Mbit/s", "eth0", 100u32);
    record!(recorder, tcp, levels::DEBUG, "syn sent, seq=%#010x", 0x1f2e3du32);
    recorder.context_switch(ring_recorder::CallSite::new(file!(), line!()), Context::interrupt(3));
    record!(recorder, tcp, levels::ERROR, "peer %s reset after %d ms", "10.0.0.7", 1250);
    trace_exit!(recorder, tcp, "tcp_connect");

    let sent = [0x45u8, 0x00, 0x00, 0x3c, 0x1c, 0x46, 0x40, 0x00, 0x40, 0x06, 0xb1, 0xe6];
    let mut received = sent;
    received[9] = 0x11;
    record_data!(recorder, net, levels::WARNING, "outgoing header", &sent);
    record_compare!(recorder, net, levels::ERROR, "header mismatch", &sent, &received);

    if let Some(usage) = recorder.usage() {
        info!(
            main_used = usage.main.used,
            quiet_used = usage.quiet.map_or(0, |q| q.used),
            "rings before replay"
        );
    }

    let mut sink = IoSink::new(io::stdout().lock());
    let mut scratch = vec![0u8; recorder.min_scratch_len()];
    let stats = recorder
        .replay(&mut sink, &mut scratch, true)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    sink.finish()?;
    info!(
        rendered = stats.rendered,
        mirrored = stats.mirrored_discarded,
        corrupt = stats.corrupt,
        "replay finished"
    );
    Ok(())
}

/// Compares deferred recording with formatting every message up front.
fn bench() -> io::Result<()> {
    let (recorder, net, _) = build_recorder();
    let description = "sensor sweep with some extra context to format";

    let start = Instant::now();
    for i in 0..BENCH_ITERATIONS {
        record!(recorder, net, levels::ERROR, "iteration=%u value=%d desc=%s", i as u32, -7, description);
    }
    let deferred = start.elapsed();

    let start = Instant::now();
    let mut total = 0usize;
    for i in 0..BENCH_ITERATIONS {
        let line = format!("iteration={} value={} desc={}", i, -7, description);
        total += std::hint::black_box(line).len();
    }
    let eager = start.elapsed();

    println!("Deferred recording: {:.3} ms", deferred.as_secs_f64() * 1000.0);
    println!("Eager formatting: {:.3} ms", eager.as_secs_f64() * 1000.0);
    println!("Formatted bytes: {}", total);
    Ok(())
}
