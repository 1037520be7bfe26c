//! The root crate re-exports enough to write, replay and render a log

use kglog::render::format_fact;
use kglog::{
    codec, Command, FactStore, FileLog, FileLogReader, InsertFact, InsertTxCommand, KgObject,
    KidOrOffset, LogStream, LogWriter, NoopLatency, Replica, ReplicaConfig, TxDecisionCommand,
    FIRST_LOG_INDEX,
};
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_write_replay_render() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kg.log");

    let mut writer = LogWriter::new(FileLog::open(&path).unwrap());
    writer
        .append(&Command::InsertTx(InsertTxCommand {
            facts: vec![InsertFact {
                fact_id_offset: 0,
                subject: KidOrOffset::offset(1),
                predicate: KidOrOffset::kid(7),
                object: KgObject::string("Alice"),
            }],
        }))
        .unwrap();
    writer
        .append(&Command::TxDecision(TxDecisionCommand { tx: 1, commit: true }))
        .unwrap();

    let store = Arc::new(FactStore::new());
    let mut replica =
        Replica::new(ReplicaConfig::default(), Arc::clone(&store), NoopLatency).unwrap();
    let mut reader = FileLogReader::open(&path, FIRST_LOG_INDEX).unwrap();
    replica.run(&mut reader).unwrap();

    let facts = store.facts_as_of(2).unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(
        format_fact(1, &facts[0]),
        "@1 kid:1000 kid:1001 kid:7 \"Alice\""
    );
}

#[test]
fn test_inspect_kinds() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kg.log");

    let mut writer = LogWriter::new(FileLog::open(&path).unwrap());
    writer.append(&Command::Skipped).unwrap();
    writer.append_raw(vec![0x7f]).unwrap();

    let mut reader = FileLogReader::open(&path, FIRST_LOG_INDEX).unwrap();
    let mut kinds = Vec::new();
    while let Some(record) = reader.next_record().unwrap() {
        let tag = codec::peek_kind(&record.payload).unwrap();
        kinds.push(codec::kind_name(tag));
    }
    assert_eq!(kinds, vec![Some("skipped"), None]);
}
