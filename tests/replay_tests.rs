use proptest::prelude::*;
use ring_recorder::{
    levels, record, record_compare, record_data, trace_enter, CallSite, ConfigError, Context,
    EntranceState, LogId, ManualClock, NodeDefaults, OutputSink, Recorder, RecorderConfig,
    RegistryBuilder, ReplayStats, StringSink,
};
use std::sync::Arc;

fn plain_config() -> RecorderConfig {
    RecorderConfig {
        timestamps: false,
        ..RecorderConfig::default()
    }
}

fn setup(config: RecorderConfig) -> (Recorder, LogId) {
    let mut builder = RegistryBuilder::new();
    let app = builder.module("app", NodeDefaults::default());
    (Recorder::new(config, builder.build()).unwrap(), app)
}

fn drain(recorder: &Recorder, include_quiet: bool) -> (String, ReplayStats) {
    let mut sink = StringSink::new();
    let mut scratch = vec![0u8; recorder.min_scratch_len()];
    let stats = recorder
        .replay(&mut sink, &mut scratch, include_quiet)
        .unwrap();
    (sink.into_string(), stats)
}

/// Message text after the `file:line: ` prefix.
fn message(line: &str) -> &str {
    line.split_once(": ").unwrap().1
}

fn messages(out: &str) -> Vec<&str> {
    out.lines().map(message).collect()
}

#[test]
fn test_three_messages_across_rings() {
    let (recorder, app) = setup(plain_config());
    record!(recorder, app, levels::WARNING, "first %d", 1);
    record!(recorder, app, levels::ERROR, "second %s", "two");
    record!(recorder, app, levels::NOTICE, "third");

    let (out, stats) = drain(&recorder, true);
    assert_eq!(messages(&out), ["first 1", "second two", "third"]);
    assert_eq!(
        stats,
        ReplayStats {
            rendered: 3,
            mirrored_discarded: 2,
            corrupt: 0,
        }
    );

    let lines: Vec<_> = out.lines().collect();
    assert!(lines[0].starts_with("00000  WARNING tests/replay_tests.rs:"));
    assert!(lines[1].starts_with("00001  ERROR   "));
    // Quiet-only records carry the next main number and a `q` marker.
    assert!(lines[2].starts_with("00002q NOTICE  "));
}

#[derive(Default)]
struct CountingSink {
    calls: usize,
}

impl OutputSink for CountingSink {
    fn write_str(&mut self, _text: &str) {
        self.calls += 1;
    }
}

fn severity_sequence(recorder: &Recorder, app: LogId) {
    record!(recorder, app, levels::INFO, "informational");
    record!(recorder, app, levels::WARNING, "warning");
    record!(recorder, app, levels::ERROR, "error");
}

#[test]
fn test_increasing_severity_with_and_without_quiet_replay() {
    let (recorder, app) = setup(plain_config());
    severity_sequence(&recorder, app);
    let (out, _) = drain(&recorder, true);
    assert_eq!(messages(&out), ["informational", "warning", "error"]);

    let (recorder, app) = setup(plain_config());
    severity_sequence(&recorder, app);
    let (out, _) = drain(&recorder, false);
    assert_eq!(messages(&out), ["warning", "error"]);
}

#[test]
fn test_empty_replay_makes_no_sink_calls() {
    let (recorder, app) = setup(plain_config());
    let mut sink = CountingSink::default();
    let mut scratch = vec![0u8; recorder.min_scratch_len()];
    recorder.replay(&mut sink, &mut scratch, true).unwrap();
    assert_eq!(sink.calls, 0);

    record!(recorder, app, levels::ERROR, "one");
    recorder.replay(&mut sink, &mut scratch, true).unwrap();
    assert!(sink.calls > 0);
    let after_first = sink.calls;
    recorder.replay(&mut sink, &mut scratch, true).unwrap();
    assert_eq!(sink.calls, after_first);
}

#[test]
fn test_main_only_replay_then_merged_replay_shows_mirror_once() {
    let (recorder, app) = setup(plain_config());
    record!(recorder, app, levels::ERROR, "visible");
    record!(recorder, app, levels::DEBUG, "background");

    let (out, stats) = drain(&recorder, false);
    assert_eq!(messages(&out), ["visible"]);
    assert_eq!(stats.rendered, 1);
    assert!(recorder.usage().unwrap().quiet.unwrap().used > 0);

    // The quiet copy of "visible" was already shown and is skipped.
    let (out, stats) = drain(&recorder, true);
    assert_eq!(messages(&out), ["background"]);
    assert_eq!(stats.mirrored_discarded, 1);
}

#[test]
fn test_idle_main_ring_still_replays_first() {
    let (recorder, app) = setup(plain_config());
    record!(recorder, app, levels::ERROR, "first");
    // Far more quiet records than the two byte counter can tell apart.
    for i in 0..40_000u32 {
        record!(recorder, app, levels::DEBUG, "bg %u", i);
    }

    let (out, stats) = drain(&recorder, true);
    assert_eq!(stats.corrupt, 0);
    let lines = messages(&out);
    assert_eq!(lines[0], "first");
    let values: Vec<u32> = lines[1..]
        .iter()
        .map(|m| m.trim_start_matches("bg ").parse().unwrap())
        .collect();
    assert!(!values.is_empty());
    assert!(values.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*values.last().unwrap(), 39_999);
}

#[test]
fn test_quiet_record_a_full_counter_cycle_later_is_kept() {
    // One byte counters: the 256th quiet record shares the stored counter
    // of the main record.
    let config = RecorderConfig {
        main_capacity: 64,
        quiet_capacity: 48,
        max_record_len: 40,
        max_data_len: 8,
        timestamps: false,
        ..RecorderConfig::default()
    };
    let (recorder, app) = setup(config);
    recorder.set_quiet_level(app, levels::DEBUG);
    recorder.set_level(app, levels::ERROR);
    record!(recorder, app, levels::ERROR, "main");
    for i in 0..256u32 {
        record!(recorder, app, levels::DEBUG, "q%u", i);
    }
    let (out, stats) = drain(&recorder, true);
    let lines = messages(&out);
    assert_eq!(lines[0], "main");
    assert_eq!(*lines.last().unwrap(), "q255");
    // Only the true mirror of "main" is discarded.
    assert_eq!(stats.mirrored_discarded, 0);
}

#[test]
fn test_replay_is_destructive() {
    let (recorder, app) = setup(plain_config());
    record!(recorder, app, levels::ERROR, "once");
    let (first, _) = drain(&recorder, true);
    assert_eq!(messages(&first), ["once"]);

    let (second, stats) = drain(&recorder, true);
    assert!(second.is_empty());
    assert_eq!(stats, ReplayStats::default());
}

#[test]
fn test_merge_preserves_issue_order() {
    let (recorder, app) = setup(plain_config());
    let mut expected = Vec::new();
    for i in 0..30u32 {
        let level = match i % 3 {
            0 => levels::ERROR,
            1 => levels::DEBUG,
            _ => levels::INFO,
        };
        recorder.log(
            app,
            level,
            CallSite::new(file!(), line!()),
            "step %u".into(),
            &[i.into()],
        );
        expected.push(format!("step {i}"));
    }
    let (out, stats) = drain(&recorder, true);
    assert_eq!(messages(&out), expected);
    assert_eq!(stats.mirrored_discarded, 10);
}

#[test]
fn test_merge_across_counter_wrap() {
    // Small enough for one byte counters.
    let config = RecorderConfig {
        main_capacity: 64,
        quiet_capacity: 48,
        max_record_len: 40,
        max_data_len: 8,
        timestamps: false,
        ..RecorderConfig::default()
    };
    let (recorder, app) = setup(config);
    for i in 0..300u32 {
        let level = if i % 2 == 0 { levels::ERROR } else { levels::DEBUG };
        record!(recorder, app, level, "n=%u", i);
    }
    let (out, stats) = drain(&recorder, true);
    assert_eq!(stats.corrupt, 0);
    let values: Vec<u32> = messages(&out)
        .iter()
        .map(|m| m.trim_start_matches("n=").parse().unwrap())
        .collect();
    assert!(!values.is_empty());
    assert_eq!(*values.last().unwrap(), 299);
    assert!(values.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_printf_conversions() {
    let (recorder, app) = setup(plain_config());
    record!(
        recorder,
        app,
        levels::ERROR,
        "[%5d|%-4u|%03x|%#X|%o|%c|%.3s|%%|%5.1s]",
        -42,
        7u32,
        10u32,
        255u32,
        8u32,
        'z',
        "abcdef",
        "xy"
    );
    record!(recorder, app, levels::ERROR, "[%hhd %hu %lld]", 0x1FFi32, 70000u32, -5_000_000_000i64);
    record!(recorder, app, levels::ERROR, "[%*d|%-*d|%.*s]", 4, 1, 3, 2, 2, "hello");
    record!(recorder, app, levels::ERROR, "[%s|%p|%p]", None::<&str>, std::ptr::null::<u8>(), 0x1000 as *const u8);
    record!(recorder, app, levels::ERROR, "[%f|%d]", 3);

    let (out, _) = drain(&recorder, false);
    assert_eq!(
        messages(&out),
        [
            "[  -42|7   |00a|0XFF|10|z|abc|%|    x]",
            "[-1 4464 -5000000000]",
            "[   1|2  |he]",
            "[(null)|(nil)|0x1000]",
            "[%f|3]",
        ]
    );
}

#[test]
fn test_long_string_is_truncated_and_cut() {
    let (recorder, app) = setup(plain_config());
    let long = "a".repeat(500);
    record!(recorder, app, levels::ERROR, "%s %d", &long, 5);

    let (out, _) = drain(&recorder, false);
    let msg = message(out.lines().next().unwrap());
    assert!(msg.starts_with("aaaa"));
    assert!(msg.ends_with("a <cut>"));
    assert!(msg.len() < 160);
}

#[test]
fn test_truncated_last_string_is_marked() {
    let (recorder, app) = setup(plain_config());
    let long = "a".repeat(500);
    record!(recorder, app, levels::ERROR, "%s", &long);

    let (out, _) = drain(&recorder, false);
    let msg = message(out.lines().next().unwrap());
    assert!(msg.starts_with("aaaa"));
    assert!(msg.ends_with("a<cut>"));
}

#[test]
fn test_string_width_and_precision_count_bytes() {
    let (recorder, app) = setup(plain_config());
    record!(recorder, app, levels::ERROR, "[%6s|%.3s|%-4s|%3c]", "héllo", "héllo", "é", 0xE9u32);
    let (out, _) = drain(&recorder, false);
    assert_eq!(messages(&out), ["[héllo|hé|é  |  \u{FFFD}]"]);
}

#[test]
fn test_runtime_strings_are_copied() {
    let (recorder, app) = setup(plain_config());
    {
        let mut name = String::from("sensor");
        name.push_str("-7");
        record!(recorder, app, levels::ERROR, "name=%s", &name);
    }
    let (out, _) = drain(&recorder, false);
    assert_eq!(messages(&out), ["name=sensor-7"]);
}

#[test]
fn test_full_string_table_falls_back_to_copies() {
    let config = RecorderConfig {
        string_table_capacity: 1,
        ..plain_config()
    };
    let (recorder, app) = setup(config);
    record!(recorder, app, levels::ERROR, "alpha %d", 1);
    record!(recorder, app, levels::ERROR, "beta %s", "two");
    let (out, _) = drain(&recorder, false);
    assert_eq!(messages(&out), ["alpha 1", "beta two"]);
}

#[test]
fn test_forced_copy_renders_the_same() {
    let config = RecorderConfig {
        force_string_copy: true,
        ..plain_config()
    };
    let (recorder, app) = setup(config);
    record!(recorder, app, levels::ERROR, "copy %s", "me");
    let (out, _) = drain(&recorder, false);
    assert_eq!(messages(&out), ["copy me"]);
}

#[test]
fn test_data_blob_hex_rows() {
    let (recorder, app) = setup(plain_config());
    let frame: Vec<u8> = (0x41..0x41 + 20).collect();
    record_data!(recorder, app, levels::ERROR, "frame", frame.as_slice());

    let (out, _) = drain(&recorder, false);
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(message(lines[0]), "frame");
    assert_eq!(
        lines[1],
        "  0000: 41 42 43 44 45 46 47 48 49 4a 4b 4c 4d 4e 4f 50  |ABCDEFGHIJKLMNOP|"
    );
    assert_eq!(lines[2], format!("  0010: 51 52 53 54{}  |QRST|", "   ".repeat(12)));
}

#[test]
fn test_data_blob_longer_than_limit_is_truncated() {
    let config = RecorderConfig {
        max_data_len: 16,
        ..plain_config()
    };
    let (recorder, app) = setup(config);
    let blob = [0xEEu8; 40];
    record_data!(recorder, app, levels::ERROR, "big", &blob);

    let (out, _) = drain(&recorder, false);
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(message(lines[0]), "big (truncated)");
    assert_eq!(lines.len(), 2);
}

#[test]
fn test_compare_shows_differing_bytes() {
    let (recorder, app) = setup(plain_config());
    let expected: [u8; 16] = std::array::from_fn(|i| i as u8);
    let mut actual = expected;
    actual[3] = 0xAA;
    actual[9] = 0xBB;
    record_compare!(recorder, app, levels::ERROR, "buffers", &expected, &actual);

    let (out, _) = drain(&recorder, false);
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(message(lines[0]), "buffers");
    assert_eq!(
        lines[1],
        "  0000: 00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f  |................|"
    );
    assert_eq!(
        lines[2],
        "     ~: -- -- -- aa -- -- -- -- -- bb -- -- -- -- -- --  |   .     .      |"
    );
}

#[test]
fn test_static_blob_is_referenced() {
    static TABLE: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];
    let (recorder, app) = setup(plain_config());
    recorder.log_data(
        app,
        levels::ERROR,
        CallSite::new(file!(), line!()),
        "const".into(),
        ring_recorder::LogBytes::Static(&TABLE),
    );
    let (out, _) = drain(&recorder, false);
    assert!(out.contains("  0000: de ad be ef"));
}

#[test]
fn test_enter_exit_and_context_switch_rendering() {
    let (recorder, app) = setup(plain_config());
    recorder.set_entrance(app, EntranceState::Enabled);
    trace_enter!(recorder, app, "do_work");
    recorder.context_switch(CallSite::new(file!(), line!()), Context::interrupt(5));

    let (out, _) = drain(&recorder, true);
    let lines: Vec<_> = out.lines().collect();
    assert!(lines[0].contains("ENTER "));
    assert_eq!(message(lines[0]), "-> do_work");
    assert!(lines[1].contains("SWITCH "));
    assert_eq!(message(lines[1]), "switch to I5");
}

#[test]
fn test_timestamp_and_context_prefix() {
    let clock = Arc::new(ManualClock::new(1234));
    let config = RecorderConfig {
        timestamps: true,
        context_tracking: true,
        ..RecorderConfig::default()
    };
    let (recorder, app) = setup(config);
    let recorder = recorder
        .with_clock(Arc::clone(&clock))
        .with_context_source(|| Context::interrupt(3));

    record!(recorder, app, levels::ERROR, "stamped");
    clock.advance(10);
    record!(recorder, app, levels::ERROR, "later");

    let (out, _) = drain(&recorder, false);
    let lines: Vec<_> = out.lines().collect();
    assert!(lines[0].starts_with("00000  [      1234] I3 ERROR   "));
    assert!(lines[1].starts_with("00001  [      1244] I3 ERROR   "));
}

#[test]
fn test_scratch_must_hold_a_record() {
    let (recorder, _) = setup(plain_config());
    let mut sink = StringSink::new();
    let mut scratch = [0u8; 10];
    assert_eq!(
        recorder.replay(&mut sink, &mut scratch, true),
        Err(ConfigError::ScratchTooSmall(10, 160))
    );
}

proptest! {
    #[test]
    fn prop_arguments_render_like_format(
        a in any::<i32>(),
        b in any::<u32>(),
        c in any::<i64>(),
        s in "[a-zA-Z0-9 ]{0,24}",
        ch in proptest::char::range('!', '~'),
    ) {
        let (recorder, app) = setup(plain_config());
        record!(recorder, app, levels::ERROR, "a=%-6d| b=%x c=%lld s=%s ch=%c", a, b, c, s.as_str(), ch);
        let (out, stats) = drain(&recorder, true);
        prop_assert_eq!(stats.rendered, 1);
        let expected = format!("a={a:<6}| b={b:x} c={c} s={s} ch={ch}");
        prop_assert_eq!(message(out.lines().next().unwrap()), expected.as_str());
    }
}
