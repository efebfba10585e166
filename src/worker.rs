use crate::builtin::JsonCanonicalizer;
use crate::configs::DeserializationOptions;
use crate::interface::CanonicalSerializer;
use crate::interface::DeserializedRecord;
use crate::interface::FilterArguments;
use crate::interface::MessageFilter;
use crate::interface::RecordDeserializer;
use crate::message::MessageHeader;
use crate::message::TopicMessage;
use crate::normalize::normalize_field;
use crate::record::classify;
use crate::record::RawRecord;
use crate::record::RecordHeader;
use crate::record::RecordKind;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Collaborators and options shared read-only by every worker of a pool.
#[rustfmt::skip]
pub struct PipelineContext {
    pub deserializer:  Arc<dyn RecordDeserializer>,
    pub filter:        Arc<dyn MessageFilter>,
    pub canonicalizer: Arc<dyn CanonicalSerializer>,
    pub options:       DeserializationOptions,
}

impl PipelineContext {
    pub fn new(deserializer: Arc<dyn RecordDeserializer>, filter: Arc<dyn MessageFilter>, options: DeserializationOptions) -> Self {
        PipelineContext {
            deserializer,
            filter,
            canonicalizer: Arc::new(JsonCanonicalizer),
            options,
        }
    }

    pub fn with_canonicalizer(mut self, canonicalizer: Arc<dyn CanonicalSerializer>) -> Self {
        self.canonicalizer = canonicalizer;
        self
    }
}

/// Receiving end of the job queue, shared by all workers. Every record goes to exactly one worker.
#[derive(Clone)]
pub struct JobSource {
    inner: Arc<Mutex<mpsc::Receiver<RawRecord>>>,
}

impl JobSource {
    pub fn new(jobs: mpsc::Receiver<RawRecord>) -> Self {
        JobSource {
            inner: Arc::new(Mutex::new(jobs)),
        }
    }

    /// Waits for the next record. `None` once the queue is closed and empty.
    pub async fn next(&self) -> Option<RawRecord> { self.inner.lock().await.recv().await }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The job queue was closed and fully consumed.
    Drained,
    Cancelled,
    /// Nobody is reading results anymore.
    SinkClosed,
    /// Record processing panicked.
    Crashed,
}

#[rustfmt::skip]
pub struct Worker {
    id:      usize,
    ctx:     Arc<PipelineContext>,
    jobs:    JobSource,
    results: mpsc::Sender<TopicMessage>,
    cancel:  CancellationToken,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<PipelineContext>, jobs: JobSource, results: mpsc::Sender<TopicMessage>, cancel: CancellationToken) -> Self {
        Worker {
            id,
            ctx,
            jobs,
            results,
            cancel,
        }
    }

    pub async fn run(self) -> WorkerExit {
        let exit = self.run_loop().await;
        debug!("message worker {} stopped: {:?}", self.id, exit);
        exit
    }

    async fn run_loop(&self) -> WorkerExit {
        loop {
            let record = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return WorkerExit::Cancelled,
                job = self.jobs.next() => match job {
                    Some(record) => record,
                    None => return WorkerExit::Drained,
                },
            };

            let (partition, offset) = (record.partition, record.offset);
            let message = match AssertUnwindSafe(process_record(&self.ctx, record)).catch_unwind().await {
                Ok(message) => message,
                Err(panic) => {
                    error!(
                        "recovered from panic in message worker {} (partition: {}, offset: {}): {}",
                        self.id,
                        partition,
                        offset,
                        panic_message(&*panic)
                    );
                    return WorkerExit::Crashed;
                },
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return WorkerExit::Cancelled,
                sent = self.results.send(message) => {
                    if sent.is_err() {
                        return WorkerExit::SinkClosed;
                    }
                },
            }
        }
    }
}

/// Turns one raw record into the message shown downstream.
pub async fn process_record(ctx: &PipelineContext, record: RawRecord) -> TopicMessage {
    // The last record of a partition may be a control record, it is acknowledged but never admitted.
    if classify(&record) == RecordKind::Control {
        return TopicMessage::control(&record);
    }

    let DeserializedRecord { mut key, mut value } = ctx.deserializer.deserialize_record(&record, &ctx.options).await;
    let (headers_by_key, headers) = collect_headers(&record.headers);

    let outcome = ctx.filter.evaluate(&FilterArguments {
        partition_id: record.partition,
        offset: record.offset,
        timestamp: record.timestamp,
        key: &key.deserialized_payload,
        value: &value.deserialized_payload,
        headers_by_key,
        key_schema_id: key.schema_id,
        value_schema_id: value.schema_id,
    });

    let error_message = match &outcome.error {
        Some(err) => {
            debug!("failed to check if message is ok: {}", err);
            format!(
                "Failed to check if message is ok (partition: '{}', offset: '{}'). Err: {}",
                record.partition, record.offset, err
            )
        },
        None => String::new(),
    };

    normalize_field(&mut value, outcome.value.as_ref(), ctx.canonicalizer.as_ref());
    normalize_field(&mut key, outcome.key.as_ref(), ctx.canonicalizer.as_ref());

    TopicMessage {
        partition_id: record.partition,
        offset: record.offset,
        timestamp: record.timestamp.timestamp_millis(),
        headers,
        compression: record.attrs.compression.display_name(),
        is_transactional: record.attrs.is_transactional,
        key,
        value,
        // trusted even when the filter failed
        is_message_ok: outcome.admit,
        error_message,
        message_size: record.size(),
    }
}

/// Duplicate header keys: the last one wins in the map, the list keeps all of them.
fn collect_headers(raw: &[RecordHeader]) -> (HashMap<&str, &[u8]>, Vec<MessageHeader>) {
    let mut by_key = HashMap::with_capacity(raw.len());
    let mut headers = Vec::with_capacity(raw.len());
    for header in raw {
        by_key.insert(header.key.as_str(), header.value.as_slice());
        headers.push(MessageHeader::from(header));
    }
    (by_key, headers)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
