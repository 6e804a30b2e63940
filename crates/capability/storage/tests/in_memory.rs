use chrono::{TimeZone, Utc};
use domain::{ConfigFingerprint, PartitionKey, Sample, SampleBatch, SampleValue};
use plc_storage::{InMemorySampleStore, SampleQuery, SampleStore, StoreError};

#[tokio::test]
async fn append_and_query_partition() {
    let store = InMemorySampleStore::new();
    let fp = ConfigFingerprint::from_hex("00000000deadbeef").expect("hex");
    let ts = Utc
        .with_ymd_and_hms(2024, 6, 1, 0, 0, 1)
        .single()
        .expect("timestamp");
    let batch = SampleBatch::new(
        ts,
        vec![
            Sample::good("a", SampleValue::I64(7)),
            Sample::bad("b", "timeout"),
        ],
    );

    assert_eq!(store.append(&fp, &batch).await.expect("append"), 2);
    let key = PartitionKey::new(fp, batch.date());
    assert_eq!(store.rows(&key), 2);

    let partitions = store.list_partitions().await.expect("list");
    assert_eq!(partitions.len(), 1);
    assert_eq!(partitions[0].id, key.id());

    let rows = store
        .query(
            &key,
            &SampleQuery {
                tag: Some("b".to_string()),
                ..SampleQuery::default()
            },
        )
        .await
        .expect("query");
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].quality);
}

#[tokio::test]
async fn unknown_partition_is_reported() {
    let store = InMemorySampleStore::new();
    let key = PartitionKey::new(
        ConfigFingerprint::from_hex("0000000000000001").expect("hex"),
        chrono::NaiveDate::from_ymd_opt(2024, 6, 1).expect("date"),
    );
    let err = store
        .query(&key, &SampleQuery::default())
        .await
        .expect_err("unknown");
    assert!(matches!(err, StoreError::UnknownPartition(_)));

    store.provision(&key).await.expect("provision");
    assert!(store
        .query(&key, &SampleQuery::default())
        .await
        .expect("empty")
        .is_empty());
}
