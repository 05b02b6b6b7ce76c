mod common;

use common::*;
use fossil_kernel::proof::{Evidence, FossilResult};
use fossil_kernel::types::Digest;
use fossil_node::config::FossilizerConfig;
use fossil_node::emitter::{IdentityTransformer, Transformer};
use fossil_node::errors::TransformError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_five_fossils_single_batch() {
    let f = fossilizer(FossilizerConfig {
        interval: Duration::from_millis(100),
        ..Default::default()
    })
    .await;
    let mut rx = subscribe(&f);
    let (cancel, handle) = start(&f).await;

    let fossils = fixtures("abcde");
    submit_all(&f, &fossils).await;
    let results = collect(&mut rx, 5).await;

    let paths = five_leaf_paths();
    let root = results[0].evidence.proof.batch().root;
    let ts = results[0].evidence.proof.batch().timestamp;
    for (i, r) in results.iter().enumerate() {
        assert_eq!(r.data, fossils[i].0);
        assert_eq!(r.meta, fossils[i].1);
        assert_eq!(r.evidence.backend, "batch");
        assert_eq!(r.evidence.provider, "batch");

        let proof = r.evidence.proof.batch();
        assert_eq!(proof.root, root);
        assert_eq!(proof.timestamp, ts);
        assert_eq!(proof.path, paths[i]);
        assert!(proof.verify(&r.data));
    }

    stop(cancel, handle).await;
}

#[tokio::test]
async fn test_max_leaves_rotation() {
    let f = fossilizer(FossilizerConfig {
        interval: Duration::from_millis(200),
        max_leaves: 4,
        ..Default::default()
    })
    .await;
    let mut rx = subscribe(&f);
    let (cancel, handle) = start(&f).await;

    let mut fossils = fixtures("abcd");
    fossils.extend(fixtures("abc"));
    submit_all(&f, &fossils).await;

    let results = collect(&mut rx, 7).await;
    assert_eq!(batch_sizes(&results), vec![4, 3]);
    assert_ne!(
        results[0].evidence.proof.batch().root,
        results[6].evidence.proof.batch().root
    );
    for r in &results {
        assert!(r.evidence.proof.batch().verify(&r.data));
    }

    stop(cancel, handle).await;
}

#[tokio::test]
async fn test_interval_rotation() {
    let interval = Duration::from_millis(100);
    let f = fossilizer(FossilizerConfig {
        interval,
        ..Default::default()
    })
    .await;
    let mut rx = subscribe(&f);
    let (cancel, handle) = start(&f).await;

    let mut results = Vec::new();
    for (letters, n) in [("abc", 3), ("abcd", 4), ("abc", 3)] {
        submit_all(&f, &fixtures(letters)).await;
        tokio::time::sleep(interval * 10).await;
        results.extend(collect(&mut rx, n).await);
    }

    assert_eq!(batch_sizes(&results), vec![3, 4, 3]);
    stop(cancel, handle).await;
}

#[tokio::test]
async fn test_empty_tick_emits_nothing() {
    let f = fossilizer(FossilizerConfig {
        interval: Duration::from_millis(20),
        ..Default::default()
    })
    .await;
    let mut rx = subscribe(&f);
    let (cancel, handle) = start(&f).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());

    stop(cancel, handle).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_custom_transformer_invoked() {
    let f = fossilizer(FossilizerConfig {
        interval: Duration::from_millis(100),
        ..Default::default()
    })
    .await;
    let mut rx = subscribe(&f);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    f.set_transformer(Some(Arc::new(
        move |evidence: Evidence, data: &Digest, meta: &[u8]| {
            counter.fetch_add(1, Ordering::SeqCst);
            IdentityTransformer.transform(evidence, data, meta)
        },
    )));

    let (cancel, handle) = start(&f).await;
    submit_all(&f, &fixtures("abcde")).await;
    let results = collect(&mut rx, 5).await;

    assert!(calls.load(Ordering::SeqCst) >= 5);
    assert_eq!(results.len(), 5);
    stop(cancel, handle).await;
}

#[tokio::test]
async fn test_failing_transformer_isolated_to_its_leaf() {
    let f = fossilizer(FossilizerConfig {
        interval: Duration::from_secs(3600),
        max_leaves: 5,
        ..Default::default()
    })
    .await;
    let mut rx = subscribe(&f);
    f.set_transformer(Some(Arc::new(
        |evidence: Evidence, data: &Digest, meta: &[u8]| -> Result<FossilResult, TransformError> {
            if meta == b"test c" {
                return Err(TransformError::new("rejected"));
            }
            IdentityTransformer.transform(evidence, data, meta)
        },
    )));

    let (cancel, handle) = start(&f).await;
    submit_all(&f, &fixtures("abcde")).await;
    let results = collect(&mut rx, 4).await;

    let metas: Vec<&[u8]> = results.iter().map(|r| r.meta.as_slice()).collect();
    assert_eq!(
        metas,
        vec![&b"test a"[..], &b"test b"[..], &b"test d"[..], &b"test e"[..]]
    );
    for r in &results {
        assert!(r.evidence.proof.batch().verify(&r.data));
    }

    stop(cancel, handle).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_stop_batch_commits_pending_on_shutdown() {
    let f = fossilizer(FossilizerConfig {
        interval: Duration::from_secs(3600),
        ..Default::default()
    })
    .await;
    let mut rx = subscribe(&f);
    let (cancel, handle) = start(&f).await;

    submit_all(&f, &fixtures("abc")).await;
    assert!(rx.try_recv().is_err());

    stop(cancel, handle).await;
    let results = collect(&mut rx, 3).await;
    assert_eq!(batch_sizes(&results), vec![3]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_without_stop_batch_nothing_emitted_on_shutdown() {
    let f = fossilizer(FossilizerConfig {
        interval: Duration::from_secs(3600),
        stop_batch: false,
        ..Default::default()
    })
    .await;
    let mut rx = subscribe(&f);
    let (cancel, handle) = start(&f).await;

    submit_all(&f, &fixtures("abc")).await;
    stop(cancel, handle).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_multiple_subscribers_receive_everything() {
    let f = fossilizer(FossilizerConfig {
        interval: Duration::from_secs(3600),
        max_leaves: 3,
        ..Default::default()
    })
    .await;
    let mut first = subscribe(&f);
    let mut second = subscribe(&f);
    let (cancel, handle) = start(&f).await;

    submit_all(&f, &fixtures("abc")).await;
    let a = collect(&mut first, 3).await;
    let b = collect(&mut second, 3).await;
    assert_eq!(a, b);

    stop(cancel, handle).await;
}

async fn max_concurrent_batches(max_sim_batches: usize) -> usize {
    let f = fossilizer(FossilizerConfig {
        interval: Duration::from_secs(3600),
        max_leaves: 1,
        max_sim_batches,
        ..Default::default()
    })
    .await;
    let mut rx = subscribe(&f);

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    {
        let active = active.clone();
        let peak = peak.clone();
        f.set_transformer(Some(Arc::new(
            move |evidence: Evidence, data: &Digest, meta: &[u8]| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                active.fetch_sub(1, Ordering::SeqCst);
                IdentityTransformer.transform(evidence, data, meta)
            },
        )));
    }

    let (cancel, handle) = start(&f).await;
    let fossils: Vec<_> = (0..8)
        .map(|i| (sha(&format!("leaf {}", i)), Vec::new()))
        .collect();
    submit_all(&f, &fossils).await;

    let results = collect(&mut rx, 8).await;
    let roots: HashSet<_> = results
        .iter()
        .map(|r| r.evidence.proof.batch().root)
        .collect();
    assert_eq!(roots.len(), 8);

    stop(cancel, handle).await;
    peak.load(Ordering::SeqCst)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bounded_concurrency() {
    assert_eq!(max_concurrent_batches(1).await, 1);
    let peak = max_concurrent_batches(2).await;
    assert!((1..=2).contains(&peak), "peak {}", peak);
}
