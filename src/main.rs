#![deny(unsafe_code)]

#[macro_use]
extern crate log;

mod modes;

use chrono::DateTime;
use chrono::Local;
use env_logger::fmt::Formatter;
use env_logger::Builder;
use env_logger::Target;
use kafview::configs::AppConfig;
use kafview::configs::WorkingMode;
use kafview::error::KafviewError;
use log::LevelFilter;
use log::Record;
use std::io::Write;
use std::thread;

pub fn setup_logger(log_thread: bool, rust_log: LevelFilter) {
    let output_format = move |formatter: &mut Formatter, record: &Record| {
        let thread_name = if log_thread {
            format!("(t: {}) ", thread::current().name().unwrap_or("unknown"))
        } else {
            "".to_string()
        };

        let local_time: DateTime<Local> = Local::now();
        let time_str = local_time.format("%H:%M:%S%.3f").to_string();
        writeln!(formatter, "{} {}{} - {} - {}", time_str, thread_name, record.level(), record.target(), record.args())
    };

    let mut builder = Builder::new();
    builder.format(output_format).filter(None, rust_log);
    builder.target(Target::Stderr);
    builder.init();
}

#[tokio::main]
async fn main() -> Result<(), KafviewError> {
    let args = std::env::args().collect::<Vec<String>>();
    let config = AppConfig::from_args(args.iter().map(|x| x.as_str()).collect())?;
    setup_logger(true, config.log_level);

    info!("Starting {}", config.working_mode);

    match config.working_mode {
        WorkingMode::Replay => modes::run_async_replay(config).await?,
        WorkingMode::Unspecified => {},
    }
    Ok(())
}
