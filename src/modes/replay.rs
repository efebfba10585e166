use chrono::TimeZone;
use chrono::Utc;
use futures::StreamExt;
use kafview::builtin::AdmitAll;
use kafview::builtin::BestEffortDeserializer;
use kafview::configs::AppConfig;
use kafview::configs::DeserializationOptions;
use kafview::error::KafviewError;
use kafview::pool::result_stream;
use kafview::pool::WorkerPool;
use kafview::record::CompressionKind;
use kafview::record::RawRecord;
use kafview::record::RecordAttrs;
use kafview::record::RecordHeader;
use kafview::worker::PipelineContext;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::io::BufWriter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One line of replay input.
#[rustfmt::skip]
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReplayRecord {
    #[serde(default)]
    partition:     i32,
    offset:        i64,
    /// Milliseconds since the unix epoch.
    #[serde(default)]
    timestamp:     i64,
    #[serde(default)]
    key:           String,
    #[serde(default)]
    value:         String,
    /// Raw key bytes, takes precedence over `key`.
    #[serde(default)]
    key_bytes:     Option<Vec<u8>>,
    #[serde(default)]
    value_bytes:   Option<Vec<u8>>,
    #[serde(default)]
    headers:       Vec<ReplayHeader>,
    #[serde(default)]
    control:       bool,
    #[serde(default)]
    transactional: bool,
    #[serde(default)]
    compression:   CompressionKind,
    /// Record batch attribute bits, take precedence over `control`, `transactional` and `compression`.
    #[serde(default)]
    attributes:    Option<u16>,
}

#[rustfmt::skip]
#[derive(Debug, Deserialize)]
struct ReplayHeader {
    key:   String,
    value: String,
}

impl ReplayRecord {
    fn into_raw_record(self) -> Result<RawRecord, KafviewError> {
        let timestamp = Utc
            .timestamp_millis_opt(self.timestamp)
            .single()
            .ok_or_else(|| KafviewError::InvalidArgument(format!("Timestamp {} is out of range", self.timestamp)))?;
        Ok(RawRecord {
            partition: self.partition,
            offset: self.offset,
            timestamp,
            key: self.key_bytes.unwrap_or_else(|| self.key.into_bytes()),
            value: self.value_bytes.unwrap_or_else(|| self.value.into_bytes()),
            headers: self
                .headers
                .into_iter()
                .map(|h| RecordHeader {
                    key: h.key,
                    value: h.value.into_bytes(),
                })
                .collect(),
            attrs: match self.attributes {
                Some(bits) => RecordAttrs::from_batch_attributes(bits),
                None => RecordAttrs {
                    is_control: self.control,
                    is_transactional: self.transactional,
                    compression: self.compression,
                },
            },
        })
    }
}

async fn feed_records<R: AsyncBufRead + Unpin>(reader: R, jobs: mpsc::Sender<RawRecord>, cancel: CancellationToken) -> Result<usize, KafviewError> {
    let mut lines = reader.lines();
    let mut line_no = 0;
    let mut fed = 0;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record: ReplayRecord = serde_json::from_str(&line).map_err(|source| KafviewError::RecordParse { line: line_no, source })?;
        let record = record.into_raw_record()?;
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = jobs.send(record) => {
                if sent.is_err() {
                    break;
                }
            },
        }
        fed += 1;
    }
    Ok(fed)
}

pub async fn run_async_replay(config: AppConfig) -> Result<(), KafviewError> {
    let replay = config
        .replay
        .ok_or_else(|| KafviewError::InvalidArgument("Must specify replay config".to_owned()))?;
    let options = DeserializationOptions::new(&replay.console, &replay.request);
    let ctx = Arc::new(PipelineContext::new(Arc::new(BestEffortDeserializer), Arc::new(AdmitAll), options));

    let (jobs_tx, jobs_rx) = mpsc::channel(replay.channel_capacity);
    let (results_tx, results_rx) = mpsc::channel(replay.channel_capacity);
    let cancel = CancellationToken::new();
    let pool = WorkerPool::spawn(ctx, jobs_rx, results_tx, replay.request.max_workers, cancel.clone())?;

    let feeder = match &replay.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            tokio::spawn(feed_records(BufReader::new(file), jobs_tx, cancel.clone()))
        },
        None => tokio::spawn(feed_records(BufReader::new(tokio::io::stdin()), jobs_tx, cancel.clone())),
    };

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping workers");
            interrupt.cancel();
        }
    });

    let mut stdout = BufWriter::new(tokio::io::stdout());
    let messages = result_stream(results_rx);
    futures::pin_mut!(messages);
    while let Some(message) = messages.next().await {
        let line = serde_json::to_string(&message)?;
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }
    stdout.flush().await?;

    let summary = pool.join().await;
    let fed = feeder.await.map_err(anyhow::Error::from)??;
    info!("Replayed {} records with {} workers", fed, summary.total());
    Ok(())
}
