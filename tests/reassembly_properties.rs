// Integration tests for order-independent reassembly
// Run with: cargo test --test reassembly_properties

use chunkrelay::chunking::{begin_send, ApplyResult, ReassemblyTable, RejectReason};
use chunkrelay::{Chunk, TransferKey};

/// Deterministic Fisher-Yates shuffle driven by a small xorshift generator
fn shuffle<T>(items: &mut [T], mut seed: u64) {
    for i in (1..items.len()).rev() {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let j = (seed % (i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

fn split(data: &[u8], chunk_size: usize) -> Vec<Chunk> {
    begin_send(data.to_vec(), "payload.bin", "application/octet-stream", chunk_size)
        .unwrap()
        .map(|r| r.unwrap().0)
        .collect()
}

#[test]
fn test_round_trip_any_delivery_order() {
    for &(len, chunk_size) in &[(0usize, 16usize), (1, 16), (16, 16), (17, 16), (1000, 7), (4096, 1024)] {
        let source = pattern(len);
        for seed in 1..6u64 {
            let mut chunks = split(&source, chunk_size);
            shuffle(&mut chunks, seed * 7919 + len as u64);

            let table = ReassemblyTable::default();
            let mut completed = Vec::new();
            for chunk in &chunks {
                if let ApplyResult::Completed(file) = table.apply_chunk(chunk) {
                    completed.push(file);
                }
            }

            assert_eq!(completed.len(), 1, "len={} chunk_size={} seed={}", len, chunk_size, seed);
            assert_eq!(completed[0].data, source);
        }
    }
}

#[test]
fn test_duplicates_never_double_count() {
    let source = pattern(500);
    let chunks = split(&source, 100);
    let table = ReassemblyTable::default();
    let key = chunks[0].key();

    table.apply_chunk(&chunks[3]);
    table.apply_chunk(&chunks[3]);
    table.apply_chunk(&chunks[3]);

    let progress = table.progress(&key).unwrap();
    assert_eq!(progress.received_chunks, 1);
    assert_eq!(progress.bytes_received, 100);
}

#[test]
fn test_completion_exactly_once_with_duplicates_and_reordering() {
    let source = pattern(10_000);
    let mut deliveries = split(&source, 512);
    let copies = deliveries.clone();
    deliveries.extend(copies.iter().cloned());
    deliveries.extend(copies.into_iter().step_by(3));
    shuffle(&mut deliveries, 42);

    let table = ReassemblyTable::default();
    let mut completions = 0;
    let mut last_received = 0;
    for chunk in &deliveries {
        match table.apply_chunk(chunk) {
            ApplyResult::Completed(file) => {
                completions += 1;
                assert_eq!(file.data, source);
            }
            ApplyResult::Progressed { .. } => {
                let received = table.progress(&chunk.key()).unwrap().received_chunks;
                assert!(received >= last_received, "received count went backwards");
                last_received = received;
            }
            ApplyResult::Ignored(_) => {}
            ApplyResult::Rejected(reason) => panic!("unexpected rejection {:?}", reason),
        }
    }
    assert_eq!(completions, 1);
}

#[test]
fn test_mismatch_rejection_keeps_count() {
    let table = ReassemblyTable::default();
    let first = Chunk::new("dup", "a", "x", 0, 4, vec![1u8]).unwrap();
    let impostor = Chunk::new("dup", "b", "y", 1, 2, vec![2u8]).unwrap();
    let key = TransferKey::new(None, "dup");

    table.apply_chunk(&first);
    let result = table.apply_chunk(&impostor);

    assert!(matches!(
        result,
        ApplyResult::Rejected(RejectReason::TotalChunksMismatch { expected: 4, actual: 2, .. })
    ));
    assert_eq!(table.progress(&key).unwrap().received_chunks, 1);
}

#[test]
fn test_scenario_150000_bytes_in_order_2_0_1() {
    let source = pattern(150_000);
    let chunks = split(&source, 65_536);
    assert_eq!(chunks.len(), 3);
    assert_eq!(
        chunks.iter().map(|c| c.payload().len()).collect::<Vec<_>>(),
        vec![65_536, 65_536, 18_928]
    );

    let table = ReassemblyTable::default();

    match table.apply_chunk(&chunks[2]) {
        ApplyResult::Progressed { fraction, .. } => assert!((fraction - 1.0 / 3.0).abs() < 1e-9),
        other => panic!("expected progress, got {:?}", other),
    }
    match table.apply_chunk(&chunks[0]) {
        ApplyResult::Progressed { fraction, .. } => assert!((fraction - 2.0 / 3.0).abs() < 1e-9),
        other => panic!("expected progress, got {:?}", other),
    }
    match table.apply_chunk(&chunks[1]) {
        ApplyResult::Completed(file) => {
            assert_eq!(file.len(), 150_000);
            assert_eq!(file.data, source);
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[test]
fn test_scenario_empty_file() {
    let chunks = split(&[], 65_536);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].payload().is_empty());

    let table = ReassemblyTable::default();
    match table.apply_chunk(&chunks[0]) {
        ApplyResult::Completed(file) => assert!(file.is_empty()),
        other => panic!("expected completion, got {:?}", other),
    }
}

#[test]
fn test_scenario_duplicate_final_chunk_after_completion() {
    let chunks = split(&pattern(300), 100);
    let table = ReassemblyTable::default();

    for chunk in &chunks[..2] {
        assert!(matches!(table.apply_chunk(chunk), ApplyResult::Progressed { .. }));
    }
    assert!(matches!(table.apply_chunk(&chunks[2]), ApplyResult::Completed(_)));
    assert!(matches!(table.apply_chunk(&chunks[2]), ApplyResult::Ignored(_)));
    assert_eq!(table.in_flight(), 0);
}

#[test]
fn test_interleaved_transfers_are_independent() {
    let a = pattern(3000);
    let b: Vec<u8> = pattern(2000).into_iter().rev().collect();
    let mut deliveries = split(&a, 256);
    deliveries.extend(split(&b, 256));
    shuffle(&mut deliveries, 7);

    let table = ReassemblyTable::default();
    let mut done = Vec::new();
    for chunk in &deliveries {
        if let ApplyResult::Completed(file) = table.apply_chunk(chunk) {
            done.push(file.data);
        }
        // malformed input in between must not disturb either transfer
        table.apply_message(b"{\"type\":\"filechunk\",\"fileId\":\"x\"}");
    }

    assert_eq!(done.len(), 2);
    assert!(done.contains(&a));
    assert!(done.contains(&b));
}

fn binary_message(total_chunks: u64, payload_len: usize) -> Vec<u8> {
    let header = format!(
        r#"{{"type":"filechunk","fileId":"hostile","name":"h","mimeType":"x","chunkIndex":0,"totalChunks":{}}}"#,
        total_chunks
    );
    let mut raw = b"CRLY\x01".to_vec();
    raw.extend_from_slice(&(header.len() as u32).to_be_bytes());
    raw.extend_from_slice(header.as_bytes());
    raw.resize(raw.len() + payload_len, 0xEE);
    raw
}

#[test]
fn test_hostile_messages_rejected_and_table_keeps_working() {
    let table = ReassemblyTable::default();
    let hostile = [
        binary_message(u32::MAX as u64, 0),
        binary_message(u64::MAX, 0),
        binary_message(1, chunkrelay::common::types::MAX_CHUNK_SIZE + 1),
    ];

    for raw in &hostile {
        assert!(matches!(
            table.apply_message(raw),
            ApplyResult::Rejected(RejectReason::MalformedChunk(_))
        ));
    }
    assert_eq!(table.in_flight(), 0);

    match table.apply_message(&binary_message(1, 3)) {
        ApplyResult::Completed(file) => assert_eq!(file.data, vec![0xEE; 3]),
        other => panic!("unexpected {:?}", other),
    }
}
