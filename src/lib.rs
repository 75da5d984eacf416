//! # Ring Recorder
//!
//! A deferred-formatting recorder for firmware-style logging:
//!
//! * **Cheap log calls**: arguments are encoded as compact tagged bytes, never
//!   formatted, and static strings are stored as short table references
//! * **Bounded memory**: records live in fixed-size rings; the oldest whole
//!   records are evicted to make room
//! * **Two histories**: a main ring for what a human should see and a quiet
//!   ring holding a lower-threshold background trail for post-mortem work
//!
//! ## Key Features
//!
//! * Hierarchical per-identifier levels (module, group, item) with
//!   compiled-out levels and a runtime override
//! * Function enter/exit tracing and context-switch markers
//! * Hex dumps and byte-wise comparisons of data blobs
//! * Replay that merges both rings in causal order, printf-compatible output
//! * Pluggable lock, clock, context source and output sink
//!
//! ## Main Components
//!
//! * [`Recorder`]: the write path, level control and ring ownership
//! * [`Replayer`]: drains rings and renders records through an [`OutputSink`]
//! * [`LevelRegistry`]: identifier tree and runtime levels
//! * [`StringTable`]: intern table for `'static` strings and blobs
//! * [`efficient_clock`]: low-overhead timestamp sources
//!
//! ## Quick Start
//!
//! ```
//! use ring_recorder::{levels, record, record_data, NodeDefaults, Recorder, RecorderConfig};
//! use ring_recorder::{RegistryBuilder, StringSink};
//!
//! let mut builder = RegistryBuilder::new();
//! let net = builder.module("net", NodeDefaults::default());
//! let recorder = Recorder::new(RecorderConfig::default(), builder.build()).unwrap();
//!
//! record!(recorder, net, levels::ERROR, "link %u down after %d ms", 2u32, 1500);
//! record_data!(recorder, net, levels::WARNING, "last frame", b"\x01\x02\x03");
//!
//! let mut sink = StringSink::new();
//! let mut scratch = vec![0u8; recorder.min_scratch_len()];
//! let stats = recorder.replay(&mut sink, &mut scratch, true).unwrap();
//! assert_eq!(stats.rendered, 2);
//! ```

pub mod args;
pub mod config;
pub mod context;
pub mod efficient_clock;
pub mod error;
pub mod format_spec;
pub mod level_registry;
pub mod output_sink;
pub mod record_encoder;
pub mod recorder;
pub mod replayer;
pub mod ring_store;
pub mod string_table;
pub mod wire;

pub use args::{Arg, CallSite, LogBytes, LogStr};
pub use config::RecorderConfig;
pub use context::{Context, ContextKind, ContextSource, FixedContext};
pub use efficient_clock::{Clock, CycleClock, ManualClock};
pub use error::{ConfigError, DecodeError};
pub use level_registry::{
    levels, EntranceState, LevelNode, LevelRegistry, LevelState, LogId, NodeDefaults, NodeKind,
    RegistryBuilder,
};
pub use output_sink::{IoSink, LogFacadeSink, OutputSink, StringSink};
pub use recorder::{Recorder, Usage};
pub use replayer::{RecordDecoder, RecordHeader, ReplayOptions, ReplayStats, Replayer};
pub use ring_store::{RecordMeta, RingStore, RingUsage};
pub use string_table::StringTable;
