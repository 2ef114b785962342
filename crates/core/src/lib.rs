pub mod batch;
pub mod config;
pub mod converter;
pub mod encoder;
pub mod tags;
pub mod testing;

pub use batch::{
    scan_tree, BatchCoordinator, BatchError, BatchEvent, BatchReport, ConversionTask,
    FormatPolicy, JobQueue, LogEntry, LogKind, ProgressReport, QueueItem,
};
pub use config::{load_config, load_config_from_str, validate_config, AppConfig, ConfigError};
pub use converter::{ConvertError, ConvertReport, Converter};
pub use encoder::{
    create_encoder, Encoder, EncoderCapabilities, EncoderError, FfmpegEncoder, QaacEncoder,
    Transcoder,
};
pub use tags::{LoftyTagStore, TagError, TagKey, TagSet, TagStore, TagValue};
