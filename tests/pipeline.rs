use chrono::TimeZone;
use chrono::Utc;
use futures::StreamExt;
use kafview::builtin::AdmitAll;
use kafview::builtin::BestEffortDeserializer;
use kafview::builtin::FnFilter;
use kafview::configs::DeserializationOptions;
use kafview::error::FilterError;
use kafview::interface::CanonicalSerializer;
use kafview::interface::FilterArguments;
use kafview::interface::FilterOutcome;
use kafview::interface::MessageFilter;
use kafview::message::DeserializedField;
use kafview::message::DeserializedPayload;
use kafview::message::PayloadEncoding;
use kafview::message::TopicMessage;
use kafview::pool::result_stream;
use kafview::pool::PoolSummary;
use kafview::pool::WorkerPool;
use kafview::record::RawRecord;
use kafview::record::RecordAttrs;
use kafview::worker::PipelineContext;
use serde_json::json;
use serde_json::Value;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn data_record(partition: i32, offset: i64, key: &str, value: &str) -> RawRecord {
    RawRecord {
        partition,
        offset,
        timestamp: Utc.timestamp_millis_opt(1_700_000_000_000 + offset).unwrap(),
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
        headers: vec![],
        attrs: RecordAttrs::default(),
    }
}

fn control_record(partition: i32, offset: i64, key: &str, value: &str) -> RawRecord {
    RawRecord {
        attrs: RecordAttrs {
            is_control: true,
            is_transactional: true,
            ..RecordAttrs::default()
        },
        ..data_record(partition, offset, key, value)
    }
}

fn context(filter: impl MessageFilter + 'static, options: DeserializationOptions) -> Arc<PipelineContext> {
    Arc::new(PipelineContext::new(Arc::new(BestEffortDeserializer), Arc::new(filter), options))
}

async fn run_records(ctx: Arc<PipelineContext>, records: Vec<RawRecord>, workers: usize) -> (Vec<TopicMessage>, PoolSummary) {
    let (jobs_tx, jobs_rx) = mpsc::channel(records.len().max(1));
    let (results_tx, results_rx) = mpsc::channel(records.len().max(1));
    let pool = WorkerPool::spawn(ctx, jobs_rx, results_tx, workers, CancellationToken::new()).unwrap();
    for record in records {
        jobs_tx.send(record).await.unwrap();
    }
    drop(jobs_tx);
    let messages: Vec<TopicMessage> = result_stream(results_rx).collect().await;
    (messages, pool.join().await)
}

async fn run_one(ctx: Arc<PipelineContext>, record: RawRecord) -> TopicMessage {
    let (mut messages, summary) = run_records(ctx, vec![record], 1).await;
    assert_eq!(summary.drained, 1);
    assert_eq!(messages.len(), 1);
    messages.remove(0)
}

#[tokio::test]
async fn control_record_emits_position_only() {
    let msg = run_one(context(AdmitAll, DeserializationOptions::default()), control_record(3, 100, "", "")).await;
    assert_eq!(msg.partition_id, 3);
    assert_eq!(msg.offset, 100);
    assert!(!msg.is_message_ok);
    assert_eq!(msg.message_size, 0);
    assert!(msg.headers.is_empty());
    assert_eq!(msg.key, DeserializedField::default());
    assert_eq!(msg.value, DeserializedField::default());
}

#[tokio::test]
async fn control_record_skips_filter_and_counts_bytes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let filter = FnFilter::new(move |_args: &FilterArguments<'_>| {
        seen.fetch_add(1, Ordering::SeqCst);
        FilterOutcome::admit()
    });
    let msg = run_one(context(filter, DeserializationOptions::default()), control_record(0, 7, "abc", "de")).await;
    assert_eq!(msg.message_size, 5);
    assert!(!msg.is_message_ok);
    assert!(!msg.is_transactional);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn json_rewrite_is_canonicalized() {
    let filter = FnFilter::new(|args: &FilterArguments<'_>| {
        assert_eq!(args.value, &DeserializedPayload::Structured(json!({"a": 1})));
        FilterOutcome::admit().with_value(json!({"a": 2}))
    });
    let msg = run_one(context(filter, DeserializationOptions::default()), data_record(0, 1, "", r#"{"a":1}"#)).await;
    assert_eq!(msg.value.encoding, PayloadEncoding::Json);
    assert_eq!(msg.value.normalized_payload, serde_json::to_vec(&json!({"a": 2})).unwrap());
    assert_eq!(msg.value.deserialized_payload, DeserializedPayload::Structured(json!({"a": 1})));
    assert!(msg.is_message_ok);
    assert!(msg.error_message.is_empty());
}

#[tokio::test]
async fn key_rewrite_is_canonicalized_independently() {
    let filter = FnFilter::new(|_args: &FilterArguments<'_>| FilterOutcome::admit().with_key(json!(["id", 9])).with_value(json!("ignored")));
    let msg = run_one(context(filter, DeserializationOptions::default()), data_record(0, 1, r#"["id",1]"#, "plain")).await;
    assert_eq!(msg.key.normalized_payload, br#"["id",9]"#.to_vec());
    assert_eq!(msg.value.encoding, PayloadEncoding::Text);
    assert_eq!(msg.value.normalized_payload, b"plain".to_vec());
}

struct RejectingSerializer;

impl CanonicalSerializer for RejectingSerializer {
    fn to_canonical_bytes(&self, _value: &Value) -> anyhow::Result<Vec<u8>> { Err(anyhow::anyhow!("schema mismatch")) }
}

#[tokio::test]
async fn failed_canonicalization_keeps_decoded_payload() {
    let filter = FnFilter::new(|_args: &FilterArguments<'_>| FilterOutcome::admit().with_value(json!({"a": 2})));
    let ctx = PipelineContext::new(Arc::new(BestEffortDeserializer), Arc::new(filter), DeserializationOptions::default())
        .with_canonicalizer(Arc::new(RejectingSerializer));
    let msg = run_one(Arc::new(ctx), data_record(0, 1, "", r#"{"a":1}"#)).await;
    assert_eq!(msg.value.encoding, PayloadEncoding::Json);
    assert_eq!(msg.value.normalized_payload, br#"{"a":1}"#.to_vec());
    assert!(msg.is_message_ok);
    assert!(msg.error_message.is_empty());
}

#[tokio::test]
async fn rewrite_of_text_value_is_ignored() {
    let filter = FnFilter::new(|_args: &FilterArguments<'_>| FilterOutcome::admit().with_value(json!({"replaced": true})));
    let options = DeserializationOptions {
        value_encoding: Some(PayloadEncoding::Text),
        ..DeserializationOptions::default()
    };
    let msg = run_one(context(filter, options), data_record(0, 1, "", r#"{"a":1}"#)).await;
    assert_eq!(msg.value.encoding, PayloadEncoding::Text);
    assert_eq!(msg.value.normalized_payload, br#"{"a":1}"#.to_vec());
}

#[tokio::test]
async fn filter_error_is_reported_with_position() {
    let filter = FnFilter::new(|_args: &FilterArguments<'_>| FilterOutcome::failed(false, FilterError::Script("boom".to_owned())));
    let msg = run_one(context(filter, DeserializationOptions::default()), data_record(3, 100, "k", "v")).await;
    assert!(!msg.is_message_ok);
    assert!(msg.error_message.contains("boom"), "{}", msg.error_message);
    assert!(msg.error_message.contains("partition: '3'"), "{}", msg.error_message);
    assert!(msg.error_message.contains("offset: '100'"), "{}", msg.error_message);
    assert_eq!(msg.message_size, 2);
}

#[tokio::test]
async fn failed_filter_keeps_returned_admit_value() {
    let filter = FnFilter::new(|_args: &FilterArguments<'_>| FilterOutcome::failed(true, FilterError::Timeout(Duration::from_millis(400))));
    let msg = run_one(context(filter, DeserializationOptions::default()), data_record(1, 2, "", "v")).await;
    assert!(msg.is_message_ok);
    assert!(!msg.error_message.is_empty());
}

#[tokio::test]
async fn message_size_ignores_deserialization_outcome() {
    let filter = FnFilter::new(|_args: &FilterArguments<'_>| FilterOutcome::failed(false, FilterError::Script("nope".to_owned())));
    let options = DeserializationOptions {
        max_payload_size: 3,
        ..DeserializationOptions::default()
    };
    let msg = run_one(context(filter, options), data_record(0, 1, "key", "a much longer value")).await;
    assert!(msg.value.is_payload_too_large);
    assert_eq!(msg.message_size, 22);
}

#[tokio::test]
async fn filter_sees_schema_ids_and_position() {
    let filter = FnFilter::new(|args: &FilterArguments<'_>| {
        if args.partition_id == 5 && args.offset == 8 && args.value_schema_id == Some(1) && args.key_schema_id.is_none() {
            FilterOutcome::admit()
        } else {
            FilterOutcome::reject()
        }
    });
    let options = DeserializationOptions {
        value_encoding: Some(PayloadEncoding::JsonSchema),
        ..DeserializationOptions::default()
    };
    let mut record = data_record(5, 8, "k", "");
    record.value = vec![0, 0, 0, 0, 1];
    record.value.extend_from_slice(b"{}");
    let msg = run_one(context(filter, options), record).await;
    assert!(msg.is_message_ok);
    assert_eq!(msg.value.schema_id, Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_record_is_emitted_once() {
    let records = (0..200).map(|offset| data_record((offset % 4) as i32, offset, "", "{}")).collect();
    let (messages, summary) = run_records(context(AdmitAll, DeserializationOptions::default()), records, 4).await;
    assert_eq!(summary, PoolSummary {
        drained: 4,
        ..PoolSummary::default()
    });
    let mut offsets: Vec<i64> = messages.iter().map(|m| m.offset).collect();
    offsets.sort_unstable();
    assert_eq!(offsets, (0..200).collect::<Vec<_>>());
    assert!(messages.iter().all(|m| m.partition_id == (m.offset % 4) as i32));
}

#[tokio::test]
async fn cancel_unblocks_workers_stuck_on_emit() {
    let (jobs_tx, jobs_rx) = mpsc::channel(16);
    let (results_tx, mut results_rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let pool = WorkerPool::spawn(context(AdmitAll, DeserializationOptions::default()), jobs_rx, results_tx, 3, cancel.clone()).unwrap();
    for offset in 0..10 {
        jobs_tx.send(data_record(0, offset, "", "v")).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    cancel.cancel();
    let summary = tokio::time::timeout(Duration::from_secs(5), pool.join()).await.expect("workers did not stop");
    assert_eq!(summary, PoolSummary {
        cancelled: 3,
        ..PoolSummary::default()
    });

    let mut emitted = Vec::new();
    while let Some(message) = results_rx.recv().await {
        emitted.push(message);
    }
    assert_eq!(emitted.len(), 1);
    drop(jobs_tx);
}

#[tokio::test]
async fn cancel_stops_idle_workers() {
    let (_jobs_tx, jobs_rx) = mpsc::channel::<RawRecord>(1);
    let (results_tx, _results_rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let pool = WorkerPool::spawn(context(AdmitAll, DeserializationOptions::default()), jobs_rx, results_tx, 4, cancel.clone()).unwrap();
    cancel.cancel();
    let summary = tokio::time::timeout(Duration::from_secs(5), pool.join()).await.expect("workers did not stop");
    assert_eq!(summary.cancelled, 4);
}

#[tokio::test]
async fn panicking_record_takes_down_one_worker_only() {
    let filter = FnFilter::new(|args: &FilterArguments<'_>| {
        if args.offset == 13 {
            panic!("poison record");
        }
        FilterOutcome::admit()
    });
    let records = (0..20).map(|offset| data_record(0, offset, "", "v")).collect();
    let (messages, summary) = run_records(context(filter, DeserializationOptions::default()), records, 3).await;
    assert_eq!(summary, PoolSummary {
        drained: 2,
        crashed: 1,
        ..PoolSummary::default()
    });
    let mut offsets: Vec<i64> = messages.iter().map(|m| m.offset).collect();
    offsets.sort_unstable();
    assert_eq!(offsets, (0..20).filter(|o| *o != 13).collect::<Vec<_>>());
}
