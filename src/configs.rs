use crate::error::KafviewError;
use crate::error::Result;
use crate::message::PayloadEncoding;
use clap::crate_version;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use clap::Command;
use log::LevelFilter;
use serde::Deserialize;
use std::str::FromStr;
use strum::Display;
use strum::EnumString;

pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 20 * 1024;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Requested encoding for a key or value. `None` lets the deserializer detect it.
pub type EncodingHint = Option<PayloadEncoding>;

pub fn parse_encoding_hint(value: &str) -> Result<EncodingHint> {
    if value == "auto" {
        return Ok(None);
    }
    PayloadEncoding::from_str(value)
        .map(Some)
        .map_err(|_| KafviewError::InvalidArgument(format!("Cannot parse {} as encoding", value)))
}

/// Process-wide settings that apply to every consume request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub max_deserialization_payload_size: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            max_deserialization_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeRequest {
    pub troubleshoot:        bool,
    pub include_raw_payload: bool,
    pub key_deserializer:    EncodingHint,
    pub value_deserializer:  EncodingHint,
    pub max_workers:         usize,
}

impl Default for ConsumeRequest {
    fn default() -> Self {
        ConsumeRequest {
            troubleshoot: false,
            include_raw_payload: false,
            key_deserializer: None,
            value_deserializer: None,
            max_workers: DEFAULT_WORKERS,
        }
    }
}

#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeserializationOptions {
    pub max_payload_size: usize,
    pub troubleshoot:     bool,
    pub include_raw_data: bool,
    pub key_encoding:     EncodingHint,
    pub value_encoding:   EncodingHint,
}

impl DeserializationOptions {
    pub fn new(console: &ConsoleConfig, request: &ConsumeRequest) -> Self {
        DeserializationOptions {
            max_payload_size: console.max_deserialization_payload_size,
            troubleshoot: request.troubleshoot,
            include_raw_data: request.include_raw_payload,
            key_encoding: request.key_deserializer,
            value_encoding: request.value_deserializer,
        }
    }
}

impl Default for DeserializationOptions {
    fn default() -> Self { DeserializationOptions::new(&ConsoleConfig::default(), &ConsumeRequest::default()) }
}

/// Optional YAML file, e.g.
///
/// ```yaml
/// max_deserialization_payload_size: 40960
/// workers: 8
/// channel_capacity: 500
/// ```
#[rustfmt::skip]
#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineFileConfig {
    pub max_deserialization_payload_size: Option<usize>,
    pub workers:                          Option<usize>,
    pub channel_capacity:                 Option<usize>,
}

impl PipelineFileConfig {
    /// Read YAML config from file path. `~` and environment variables are expanded.
    pub fn from_config_file(path: &str) -> Result<Self> {
        let expanded = shellexpand::full(path).map_err(|e| KafviewError::InvalidArgument(e.to_string()))?;
        let path = expanded.into_owned();
        let content = std::fs::read_to_string(&path).map_err(|source| KafviewError::ConfigRead { path: path.clone(), source })?;
        Self::from_yaml(&path, &content)
    }

    fn from_yaml(path: &str, content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|source| KafviewError::ConfigParse { path: path.to_owned(), source })
    }
}

pub fn input() -> Arg<'static> {
    Arg::new("input")
        .short('i')
        .long("input")
        .takes_value(true)
        .help("JSON-lines file with raw records, stdin when omitted")
}
pub fn workers() -> Arg<'static> { Arg::new("workers").short('w').long("workers").takes_value(true).value_parser(value_parser!(usize)).help("Number of pipeline workers") }
pub fn channel_capacity() -> Arg<'static> {
    Arg::new("channel-capacity")
        .long("channel-capacity")
        .takes_value(true)
        .value_parser(value_parser!(usize))
        .help("Capacity of the job and result queues")
}
pub fn key_encoding() -> Arg<'static> { Arg::new("key-encoding").long("key-encoding").takes_value(true).default_value("auto").help("Key encoding, or auto") }
pub fn value_encoding() -> Arg<'static> { Arg::new("value-encoding").long("value-encoding").takes_value(true).default_value("auto").help("Value encoding, or auto") }
pub fn max_payload_size() -> Arg<'static> {
    Arg::new("max-payload-size")
        .long("max-payload-size")
        .takes_value(true)
        .value_parser(value_parser!(usize))
        .help("Payloads above this many bytes are not deserialized")
}
pub fn troubleshoot() -> Arg<'static> { Arg::new("troubleshoot").long("troubleshoot").action(ArgAction::SetTrue).help("Attach deserializer diagnostics to every field") }
pub fn include_raw() -> Arg<'static> { Arg::new("include-raw").long("include-raw").action(ArgAction::SetTrue).help("Attach the raw key and value bytes") }
pub fn replay_subcommand() -> Command<'static> {
    Command::new("replay")
        .short_flag('R')
        .about("Run recorded raw records through the pipeline and print the resulting messages as JSON lines")
        .args(vec![
            input(),
            workers(),
            channel_capacity(),
            key_encoding(),
            value_encoding(),
            max_payload_size(),
            troubleshoot(),
            include_raw(),
        ])
}
pub fn get_arg_matches() -> Command<'static> {
    Command::new("kafview")
        .version(crate_version!())
        .author("Jiangkun Qiu <qiujiangkun@foxmail.com>")
        .about("browse kafka records")
        .subcommand(replay_subcommand())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log")
                .long("log")
                .help("Configure the logging format: Off, Error, Warn, Info, Debug, Trace")
                .takes_value(true),
        )
        .arg(Arg::new("config").short('c').long("config").help("YAML pipeline config file").takes_value(true))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum WorkingMode {
    #[default]
    Unspecified,
    Replay,
}

#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayConfig {
    pub input:            Option<String>,
    pub channel_capacity: usize,
    pub console:          ConsoleConfig,
    pub request:          ConsumeRequest,
}

impl ReplayConfig {
    pub fn from_matches(matches: &ArgMatches, file: &PipelineFileConfig) -> Result<ReplayConfig> {
        let max_payload_size = matches
            .get_one::<usize>("max-payload-size")
            .copied()
            .or(file.max_deserialization_payload_size)
            .unwrap_or(DEFAULT_MAX_PAYLOAD_SIZE);
        let max_workers = matches.get_one::<usize>("workers").copied().or(file.workers).unwrap_or(DEFAULT_WORKERS);
        let channel_capacity = matches
            .get_one::<usize>("channel-capacity")
            .copied()
            .or(file.channel_capacity)
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        if channel_capacity == 0 {
            return Err(KafviewError::InvalidArgument("channel capacity must be at least 1".to_owned()));
        }
        let key_deserializer = parse_encoding_hint(matches.get_one::<String>("key-encoding").map(|x| x.as_str()).unwrap_or("auto"))?;
        let value_deserializer = parse_encoding_hint(matches.get_one::<String>("value-encoding").map(|x| x.as_str()).unwrap_or("auto"))?;

        Ok(ReplayConfig {
            input: matches.get_one::<String>("input").cloned(),
            channel_capacity,
            console: ConsoleConfig {
                max_deserialization_payload_size: max_payload_size,
            },
            request: ConsumeRequest {
                troubleshoot: matches.get_one::<bool>("troubleshoot").copied().unwrap_or(false),
                include_raw_payload: matches.get_one::<bool>("include-raw").copied().unwrap_or(false),
                key_deserializer,
                value_deserializer,
                max_workers,
            },
        })
    }
}

#[rustfmt::skip]
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub working_mode: WorkingMode,
    pub replay:       Option<ReplayConfig>,
    pub log_level:    LevelFilter,
}

impl AppConfig {
    pub fn from_args(args: Vec<&str>) -> Result<Self> {
        let matches = get_arg_matches().get_matches_from(args);
        let kafview_log_env = std::env::var("KAFVIEW_LOG").ok();
        let log_level = match matches.get_one::<String>("log").or(kafview_log_env.as_ref()) {
            Some(level) => LevelFilter::from_str(level).map_err(|_| KafviewError::InvalidArgument(format!("Cannot parse {} as log level", level)))?,
            None => LevelFilter::Warn,
        };
        let file = match matches.get_one::<String>("config") {
            Some(path) => PipelineFileConfig::from_config_file(path)?,
            None => PipelineFileConfig::default(),
        };

        let mut this = AppConfig {
            working_mode: WorkingMode::Unspecified,
            replay: None,
            log_level,
        };
        match matches.subcommand() {
            Some(("replay", matches)) => {
                this.working_mode = WorkingMode::Replay;
                this.replay = Some(ReplayConfig::from_matches(matches, &file)?);
            },
            _ => unreachable!(),
        }

        Ok(this)
    }
}
