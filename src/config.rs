use crate::error::ConfigError;
use crate::wire::{CounterWidth, RecordLayout, MAX_RECORD_LEN};

/// Smallest record budget accepted: the widest fixed header plus a handful
/// of bytes for string references.
pub const MIN_RECORD_LEN: usize = 32;

/// Sizes and optional header fields of a recorder.
///
/// These mirror the build-time constants of a firmware image. They are fixed
/// for the lifetime of a recorder and determine the record layout, so the
/// replayer always decodes with the same settings the encoder used.
///
/// # Examples
///
/// ```
/// # use ring_recorder::RecorderConfig;
/// let config = RecorderConfig {
///     main_capacity: 8 * 1024,
///     quiet_capacity: 0, // no background history
///     ..RecorderConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Bytes in the main ring.
    pub main_capacity: usize,
    /// Bytes in the quiet ring; zero disables it.
    pub quiet_capacity: usize,
    /// Upper bound on one record, length prefix included.
    pub max_record_len: usize,
    /// Upper bound on one data blob.
    pub max_data_len: usize,
    /// Number of `'static` strings and blobs that can be referenced by index.
    pub string_table_capacity: usize,
    /// Copy every string into the record, even `'static` ones.
    pub force_string_copy: bool,
    /// Store a 32 bit timestamp in each header.
    pub timestamps: bool,
    /// Store the calling context (task or interrupt) in each header.
    pub context_tracking: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            main_capacity: 4096,
            quiet_capacity: 2048,
            max_record_len: 160,
            max_data_len: 64,
            string_table_capacity: 256,
            force_string_copy: false,
            timestamps: true,
            context_tracking: false,
        }
    }
}

impl RecorderConfig {
    /// Checks the sizes against each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.max_record_len < MIN_RECORD_LEN {
            return Err(ConfigError::RecordTooSmall(self.max_record_len, MIN_RECORD_LEN));
        }
        if self.max_record_len > MAX_RECORD_LEN {
            return Err(ConfigError::RecordTooLarge(self.max_record_len, MAX_RECORD_LEN));
        }
        if self.max_record_len > self.main_capacity {
            return Err(ConfigError::RecordExceedsRing {
                record: self.max_record_len,
                ring: "main",
                capacity: self.main_capacity,
            });
        }
        if self.quiet_capacity > 0 && self.max_record_len > self.quiet_capacity {
            return Err(ConfigError::RecordExceedsRing {
                record: self.max_record_len,
                ring: "quiet",
                capacity: self.quiet_capacity,
            });
        }
        if self.max_data_len == 0 || self.max_data_len >= self.max_record_len {
            return Err(ConfigError::DataLength(self.max_data_len, self.max_record_len));
        }
        if self.string_table_capacity > u16::MAX as usize + 1 {
            return Err(ConfigError::TableTooLarge(self.string_table_capacity));
        }
        Ok(())
    }

    /// The record layout these settings produce.
    pub fn layout(&self) -> RecordLayout {
        RecordLayout {
            counter: CounterWidth::for_capacity(self.main_capacity + self.quiet_capacity),
            timestamps: self.timestamps,
            context: self.context_tracking,
            table_ref_bytes: if self.string_table_capacity <= 0x100 { 1 } else { 2 },
            max_record_len: self.max_record_len,
        }
    }

    /// Smallest scratch buffer a replay accepts.
    pub fn min_scratch_len(&self) -> usize {
        self.max_record_len
    }
}
