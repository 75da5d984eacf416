use parking_lot::lock_api::{Mutex, RawMutex};
use tracing::{debug, warn};

use crate::args::{Arg, CallSite, LogBytes, LogStr};
use crate::config::RecorderConfig;
use crate::context::{Context, ContextSource, FixedContext};
use crate::efficient_clock::{Clock, CycleClock};
use crate::error::ConfigError;
use crate::level_registry::{EntranceState, LevelNode, LevelRegistry, LevelState, LogId, LEVEL_NAMES};
use crate::record_encoder::{Header, RecordBuf, RecordEncoder};
use crate::ring_store::{RingStore, RingUsage};
use crate::string_table::StringTable;
use crate::wire::{finish_record, RecordKind, RecordLayout, LEVEL_MAX, PREFIX_ROOM};

/// Core implementation of the deferred recorder.
///
/// A `Recorder` owns everything the write path touches: the level table,
/// the quiet and main rings, and the two record counters. All of it sits
/// behind one lock whose raw type is a parameter, so firmware can plug in a
/// lock that masks interrupts instead of one that parks threads.
///
/// Log calls are cheap: a call that does not clear either threshold returns
/// after a table lookup, and an admitted call encodes its arguments into a
/// compact record without formatting any text. Text is produced later, off
/// the hot path, by a [`Replayer`](crate::Replayer).
///
/// # Rings
///
/// * The **main ring** holds records meant for a human.
/// * The **quiet ring** keeps a background history, including messages below
///   the main threshold, for post-mortem inspection.
///
/// A record that clears both thresholds is written to the quiet ring first
/// and then copied byte for byte into the main ring. Both copies carry the
/// same global counter and sequence number, which is how replay recognizes
/// the pair.
///
/// # Examples
///
/// ```
/// # use ring_recorder::{Recorder, RecorderConfig, RegistryBuilder, NodeDefaults, StringSink, record};
/// # use ring_recorder::levels;
/// let mut builder = RegistryBuilder::new();
/// let app = builder.module("app", NodeDefaults::default());
/// let recorder = Recorder::new(RecorderConfig::default(), builder.build()).unwrap();
///
/// record!(recorder, app, levels::ERROR, "sensor %d failed: %s", 3, "timeout");
///
/// let mut sink = StringSink::new();
/// let mut scratch = vec![0u8; recorder.min_scratch_len()];
/// recorder.replay(&mut sink, &mut scratch, false).unwrap();
/// assert!(sink.as_str().contains("sensor 3 failed: timeout"));
/// ```
pub struct Recorder<R: RawMutex = parking_lot::RawMutex> {
    shared: Option<Shared<R>>,
}

struct Shared<R: RawMutex> {
    engine: Mutex<R, Engine>,
    table: StringTable,
    config: RecorderConfig,
    layout: RecordLayout,
    clock: Box<dyn Clock>,
    context: Box<dyn ContextSource>,
}

/// Mutable state guarded by the recorder's lock.
pub(crate) struct Engine {
    pub(crate) registry: LevelRegistry,
    pub(crate) main: RingStore,
    pub(crate) quiet: Option<RingStore>,
    /// Issue order of the next record; what the replay merge sorts by.
    sequence: u64,
    global: u32,
    main_count: u32,
    level_override: Option<u8>,
    scratch: Box<[u8]>,
}

/// Which ring(s) a record goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Quiet,
    Main,
    Both,
}

impl Route {
    fn from_flags(main: bool, quiet: bool) -> Option<Self> {
        match (main, quiet) {
            (true, true) => Some(Route::Both),
            (true, false) => Some(Route::Main),
            (false, true) => Some(Route::Quiet),
            (false, false) => None,
        }
    }

    /// Whether the record counts towards the main stream numbering.
    fn visible(self) -> bool {
        self != Route::Quiet
    }
}

enum Body<'a> {
    Args(&'a [Arg<'a>]),
    Data(&'a [LogBytes<'a>]),
    Empty,
}

/// Occupancy of both rings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub main: RingUsage,
    pub quiet: Option<RingUsage>,
}

const CONTEXT_SWITCH_FORMAT: &str = "switch to %c%u";

impl Engine {
    fn route_message(&self, id: LogId, level: u8) -> Option<Route> {
        let node = self.registry.node(id)?;
        let state = self.registry.state(id)?;
        if level == 0 || level > LEVEL_MAX || !node.is_compiled(level) {
            return None;
        }
        let main_threshold = self.level_override.unwrap_or(state.level);
        Route::from_flags(
            level <= main_threshold,
            self.quiet.is_some() && level <= state.quiet_level,
        )
    }

    fn route_entrance(&self, id: LogId) -> Option<Route> {
        let state = self.registry.state(id)?;
        let has_quiet = self.quiet.is_some();
        match state.entrance {
            EntranceState::Disabled => None,
            EntranceState::Quiet => has_quiet.then_some(Route::Quiet),
            EntranceState::Enabled => Some(if has_quiet { Route::Both } else { Route::Main }),
        }
    }

    fn route_context_switch(&self) -> Option<Route> {
        Some(if self.quiet.is_some() { Route::Quiet } else { Route::Main })
    }
}

impl Recorder<parking_lot::RawMutex> {
    /// Creates a recorder guarded by a `parking_lot` mutex.
    ///
    /// # Errors
    ///
    /// Returns the first problem [`RecorderConfig::validate`] finds.
    pub fn new(config: RecorderConfig, registry: LevelRegistry) -> Result<Self, ConfigError> {
        Self::with_lock(config, registry)
    }

    /// Like [`Recorder::new`], but an invalid configuration yields a recorder
    /// on which every call is a silent no-op.
    pub fn new_or_disabled(config: RecorderConfig, registry: LevelRegistry) -> Self {
        Self::with_lock(config, registry).unwrap_or_else(|err| {
            warn!(%err, "recorder configuration rejected; recording disabled");
            Self::disabled()
        })
    }
}

impl<R: RawMutex> Recorder<R> {
    /// Creates a recorder guarded by the raw lock `R`.
    pub fn with_lock(config: RecorderConfig, registry: LevelRegistry) -> Result<Self, ConfigError> {
        config.validate()?;
        let layout = config.layout();
        let engine = Engine {
            registry,
            main: RingStore::with_record_floor(config.main_capacity, layout.min_record_len()),
            quiet: (config.quiet_capacity > 0)
                .then(|| RingStore::with_record_floor(config.quiet_capacity, layout.min_record_len())),
            sequence: 0,
            global: 0,
            main_count: 0,
            level_override: None,
            scratch: vec![0u8; config.max_record_len + PREFIX_ROOM].into_boxed_slice(),
        };
        debug!(
            main = config.main_capacity,
            quiet = config.quiet_capacity,
            max_record = config.max_record_len,
            counter_bytes = layout.counter.bytes(),
            "recorder created"
        );
        Ok(Self {
            shared: Some(Shared {
                engine: Mutex::new(engine),
                table: StringTable::new(config.string_table_capacity),
                config,
                layout,
                clock: Box::new(CycleClock::new()),
                context: Box::new(FixedContext::default()),
            }),
        })
    }

    /// A recorder that records nothing.
    pub fn disabled() -> Self {
        Self { shared: None }
    }

    /// Replaces the timestamp source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        if let Some(shared) = self.shared.as_mut() {
            shared.clock = Box::new(clock);
        }
        self
    }

    /// Replaces the source of the context stamped into headers.
    pub fn with_context_source(mut self, source: impl ContextSource + 'static) -> Self {
        if let Some(shared) = self.shared.as_mut() {
            shared.context = Box::new(source);
        }
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.is_some()
    }

    pub fn config(&self) -> Option<&RecorderConfig> {
        self.shared.as_ref().map(|s| &s.config)
    }

    pub fn layout(&self) -> Option<RecordLayout> {
        self.shared.as_ref().map(|s| s.layout)
    }

    /// Smallest scratch buffer [`Recorder::replay`] accepts.
    pub fn min_scratch_len(&self) -> usize {
        self.shared.as_ref().map_or(0, |s| s.config.min_scratch_len())
    }

    // ---- write path ----

    /// Records a formatted message.
    ///
    /// Nothing happens if `id` is unknown, `level` was compiled out, or
    /// `level` is above both the main and the quiet threshold of `id`.
    pub fn log(&self, id: LogId, level: u8, site: CallSite, format: LogStr<'_>, args: &[Arg<'_>]) {
        self.write(
            |e| e.route_message(id, level),
            RecordKind::Plain(level),
            site,
            format,
            Body::Args(args),
        );
    }

    /// Records a titled byte blob, rendered as hex rows on replay.
    pub fn log_data(&self, id: LogId, level: u8, site: CallSite, title: LogStr<'_>, data: LogBytes<'_>) {
        self.write(
            |e| e.route_message(id, level),
            RecordKind::Data(level),
            site,
            title,
            Body::Data(&[data]),
        );
    }

    /// Records two blobs to be rendered as a byte-wise difference.
    pub fn log_compare(
        &self,
        id: LogId,
        level: u8,
        site: CallSite,
        title: LogStr<'_>,
        expected: LogBytes<'_>,
        actual: LogBytes<'_>,
    ) {
        self.write(
            |e| e.route_message(id, level),
            RecordKind::Compare(level),
            site,
            title,
            Body::Data(&[expected, actual]),
        );
    }

    /// Records entry into `function`, subject to the entrance state of `id`.
    pub fn enter(&self, id: LogId, site: CallSite, function: &'static str) {
        self.write(
            |e| e.route_entrance(id),
            RecordKind::Enter,
            site,
            LogStr::Static(function),
            Body::Empty,
        );
    }

    /// Records exit from `function`, subject to the entrance state of `id`.
    pub fn exit(&self, id: LogId, site: CallSite, function: &'static str) {
        self.write(
            |e| e.route_entrance(id),
            RecordKind::Exit,
            site,
            LogStr::Static(function),
            Body::Empty,
        );
    }

    /// Marks a switch to another execution context. Goes to the quiet ring
    /// when there is one.
    pub fn context_switch(&self, site: CallSite, to: Context) {
        self.write(
            |e| e.route_context_switch(),
            RecordKind::ContextSwitch,
            site,
            LogStr::Static(CONTEXT_SWITCH_FORMAT),
            Body::Args(&[Arg::Char(to.kind.letter() as u8), Arg::Uint(to.id as u64)]),
        );
    }

    fn write(
        &self,
        route_for: impl FnOnce(&Engine) -> Option<Route>,
        kind: RecordKind,
        site: CallSite,
        format: LogStr<'_>,
        body: Body<'_>,
    ) {
        let Some(shared) = self.shared.as_ref() else {
            return;
        };
        let mut guard = shared.engine.lock();
        let Some(route) = route_for(&*guard) else {
            return;
        };

        let layout = shared.layout;
        let header = Header {
            kind,
            line: site.line,
            timestamp: if layout.timestamps { shared.clock.now() } else { 0 },
            context: if layout.context { shared.context.current() } else { Context::default() },
            file: LogStr::Static(site.file),
            format,
        };
        let encoder = RecordEncoder::new(layout, &shared.table, shared.config.force_string_copy);

        let Engine {
            main,
            quiet,
            sequence,
            global,
            main_count,
            scratch,
            ..
        } = &mut *guard;
        let (first, second) = match (route, quiet.as_mut()) {
            (Route::Main, _) | (Route::Both, None) => (main, None),
            (Route::Quiet, Some(q)) => (q, None),
            (Route::Both, Some(q)) => (q, Some(main)),
            (Route::Quiet, None) => return,
        };

        // Worst case is reserved before encoding so encoding cannot fail.
        let Some(handle) = first.reserve(layout.max_record_len) else {
            return;
        };
        let mut buf = RecordBuf::new(&mut scratch[PREFIX_ROOM..PREFIX_ROOM + layout.max_body_len()]);
        let Some(stored_format) = encoder.encode_header(&mut buf, &header) else {
            return;
        };
        let complete = match body {
            Body::Args(args) => encoder.encode_args(&mut buf, stored_format, args),
            Body::Data(blobs) => encoder.encode_data(&mut buf, blobs, shared.config.max_data_len),
            Body::Empty => true,
        };
        let body_len = buf.len();

        let seq = *sequence;
        *sequence += 1;
        let stamp_global = *global;
        *global = layout.counter.advance(*global);
        let stamp_main = *main_count;
        if route.visible() {
            *main_count = layout.counter.advance(*main_count);
        }
        layout.patch_counters(&mut scratch[PREFIX_ROOM..], stamp_global, stamp_main);

        let range = finish_record(scratch, body_len);
        let record = &scratch[range];
        if !first.commit(handle, record, seq) {
            warn!(len = record.len(), "record larger than its reservation; dropped");
            return;
        }
        if let Some(second) = second {
            if let Some(handle) = second.reserve(record.len()) {
                second.commit(handle, record, seq);
            }
        }
        if !complete {
            debug!(global = stamp_global, "record truncated to fit");
        }
    }

    // ---- control surface ----

    /// Compiled configuration of `id`.
    pub fn node(&self, id: LogId) -> Option<LevelNode> {
        self.with_engine(|e| e.registry.node(id).cloned()).flatten()
    }

    pub fn state(&self, id: LogId) -> Option<LevelState> {
        self.with_engine(|e| e.registry.state(id)).flatten()
    }

    /// Looks up an identifier by dotted path, e.g. `"net.tcp.rx"`.
    pub fn find(&self, path: &str) -> Option<LogId> {
        self.with_engine(|e| e.registry.find(path)).flatten()
    }

    /// Sets the whole state of `id` and everything beneath it.
    pub fn set_state(&self, id: LogId, state: LevelState) -> bool {
        self.with_engine(|e| e.registry.set_state(id, state)).unwrap_or(false)
    }

    pub fn set_level(&self, id: LogId, level: u8) -> bool {
        self.with_engine(|e| e.registry.set_level(id, level)).unwrap_or(false)
    }

    pub fn set_quiet_level(&self, id: LogId, level: u8) -> bool {
        self.with_engine(|e| e.registry.set_quiet_level(id, level)).unwrap_or(false)
    }

    pub fn set_entrance(&self, id: LogId, entrance: EntranceState) -> bool {
        self.with_engine(|e| e.registry.set_entrance(id, entrance)).unwrap_or(false)
    }

    /// Restores every identifier's compiled defaults and drops any override.
    pub fn reset_levels(&self) {
        self.with_engine(|e| {
            e.registry.reset();
            e.level_override = None;
        });
    }

    /// Temporarily forces the main threshold of every identifier.
    /// `None` returns to the configured levels.
    pub fn set_level_override(&self, level: Option<u8>) {
        self.with_engine(|e| e.level_override = level.map(|l| l.min(LEVEL_MAX)));
    }

    pub fn level_override(&self) -> Option<u8> {
        self.with_engine(|e| e.level_override).flatten()
    }

    pub fn level_names() -> &'static [&'static str] {
        &LEVEL_NAMES
    }

    pub fn usage(&self) -> Option<Usage> {
        self.with_engine(|e| Usage {
            main: e.main.usage(),
            quiet: e.quiet.as_ref().map(RingStore::usage),
        })
    }

    /// Empties both rings and restarts both counters.
    pub fn clear(&self) {
        self.with_engine(|e| {
            e.main.clear();
            if let Some(q) = e.quiet.as_mut() {
                q.clear();
            }
            e.global = 0;
            e.main_count = 0;
        });
    }

    /// Raw bytes of the main and quiet rings, oldest first.
    pub fn ring_contents(&self) -> Option<(Vec<u8>, Option<Vec<u8>>)> {
        self.with_engine(|e| (e.main.contents(), e.quiet.as_ref().map(RingStore::contents)))
    }

    pub(crate) fn with_engine<T>(&self, f: impl FnOnce(&mut Engine) -> T) -> Option<T> {
        let shared = self.shared.as_ref()?;
        let mut guard = shared.engine.lock();
        Some(f(&mut guard))
    }

    pub(crate) fn decode_parts(&self) -> Option<(RecordLayout, &StringTable, &RecorderConfig)> {
        self.shared.as_ref().map(|s| (s.layout, &s.table, &s.config))
    }
}

/// Records a printf-style message.
///
/// The format must be a string literal; it is stored as a reference into the
/// recorder's string table rather than copied.
///
/// # Examples
///
/// ```
/// # use ring_recorder::{Recorder, RecorderConfig, RegistryBuilder, NodeDefaults, record, levels};
/// # let mut builder = RegistryBuilder::new();
/// # let net = builder.module("net", NodeDefaults::default());
/// # let recorder = Recorder::new(RecorderConfig::default(), builder.build()).unwrap();
/// record!(recorder, net, levels::WARNING, "link down");
/// record!(recorder, net, levels::ERROR, "retry %u of %u", 2u32, 5u32);
/// ```
#[macro_export]
macro_rules! record {
    ($recorder:expr, $id:expr, $level:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $recorder.log(
            $id,
            $level,
            $crate::CallSite::new(file!(), line!()),
            $crate::LogStr::Static($fmt),
            &[$($crate::Arg::from($arg)),*],
        )
    };
}

/// Records a titled byte blob.
#[macro_export]
macro_rules! record_data {
    ($recorder:expr, $id:expr, $level:expr, $title:literal, $data:expr) => {
        $recorder.log_data(
            $id,
            $level,
            $crate::CallSite::new(file!(), line!()),
            $crate::LogStr::Static($title),
            $crate::LogBytes::from($data),
        )
    };
}

/// Records two blobs for a byte-wise comparison.
#[macro_export]
macro_rules! record_compare {
    ($recorder:expr, $id:expr, $level:expr, $title:literal, $expected:expr, $actual:expr) => {
        $recorder.log_compare(
            $id,
            $level,
            $crate::CallSite::new(file!(), line!()),
            $crate::LogStr::Static($title),
            $crate::LogBytes::from($expected),
            $crate::LogBytes::from($actual),
        )
    };
}

/// Records entry into the named function.
#[macro_export]
macro_rules! trace_enter {
    ($recorder:expr, $id:expr, $function:literal) => {
        $recorder.enter($id, $crate::CallSite::new(file!(), line!()), $function)
    };
}

/// Records exit from the named function.
#[macro_export]
macro_rules! trace_exit {
    ($recorder:expr, $id:expr, $function:literal) => {
        $recorder.exit($id, $crate::CallSite::new(file!(), line!()), $function)
    };
}
