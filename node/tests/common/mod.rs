#![allow(dead_code)]

use fossil_kernel::merkle::{hash_pair, MerkleNodeHashes, MerklePath};
use fossil_kernel::proof::FossilResult;
use fossil_kernel::types::Digest;
use fossil_node::config::FossilizerConfig;
use fossil_node::errors::FossilizerError;
use fossil_node::fossilizer::Fossilizer;
use fossil_node::telemetry::NoopMetrics;
use sha2::{Digest as _, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const RESULT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn sha(s: &str) -> Digest {
    Digest::try_from(Sha256::digest(s.as_bytes()).as_slice()).unwrap()
}

/// `(SHA256(x), "test x")` for every char of `letters`.
pub fn fixtures(letters: &str) -> Vec<(Digest, Vec<u8>)> {
    letters
        .chars()
        .map(|c| (sha(&c.to_string()), format!("test {}", c).into_bytes()))
        .collect()
}

fn step(left: Digest, right: Digest) -> MerkleNodeHashes {
    MerkleNodeHashes {
        left,
        right,
        parent: hash_pair(&left, &right),
    }
}

/// Paths of the five-leaf tree over a..e, leaf first. `e` is an orphan that
/// pairs at the top.
pub fn five_leaf_paths() -> Vec<MerklePath> {
    let l: Vec<Digest> = fixtures("abcde").into_iter().map(|(d, _)| d).collect();
    let f = step(l[0], l[1]);
    let g = step(l[2], l[3]);
    let h = step(f.parent, g.parent);
    let i = step(h.parent, l[4]);
    vec![
        MerklePath(vec![f, h, i]),
        MerklePath(vec![f, h, i]),
        MerklePath(vec![g, h, i]),
        MerklePath(vec![g, h, i]),
        MerklePath(vec![i]),
    ]
}

pub async fn fossilizer(config: FossilizerConfig) -> Arc<Fossilizer> {
    Arc::new(
        Fossilizer::with_metrics(config, Arc::new(NoopMetrics))
            .await
            .unwrap(),
    )
}

pub fn subscribe(f: &Fossilizer) -> mpsc::Receiver<FossilResult> {
    let (tx, rx) = mpsc::channel(1024);
    f.attach_event_channel(tx);
    rx
}

pub async fn start(
    f: &Arc<Fossilizer>,
) -> (CancellationToken, JoinHandle<Result<(), FossilizerError>>) {
    let cancel = CancellationToken::new();
    let handle = {
        let f = f.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { f.start(cancel).await })
    };
    f.started().await.unwrap();
    (cancel, handle)
}

pub async fn stop(cancel: CancellationToken, handle: JoinHandle<Result<(), FossilizerError>>) {
    cancel.cancel();
    let res = handle.await.unwrap();
    assert!(matches!(res, Err(FossilizerError::Cancelled)), "{:?}", res);
}

pub async fn submit_all(f: &Fossilizer, fossils: &[(Digest, Vec<u8>)]) {
    for (data, meta) in fossils {
        f.fossilize(*data, meta.clone()).await.unwrap();
    }
}

pub async fn collect(rx: &mut mpsc::Receiver<FossilResult>, n: usize) -> Vec<FossilResult> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        match tokio::time::timeout(RESULT_TIMEOUT, rx.recv()).await {
            Ok(Some(r)) => out.push(r),
            Ok(None) => panic!("result channel closed after {} results", out.len()),
            Err(_) => panic!("timed out after {} of {} results", out.len(), n),
        }
    }
    out
}

/// Sizes of consecutive runs of results sharing a root.
pub fn batch_sizes(results: &[FossilResult]) -> Vec<usize> {
    let mut sizes: Vec<usize> = Vec::new();
    let mut last: Option<Digest> = None;
    for r in results {
        let root = r.evidence.proof.batch().root;
        if last == Some(root) {
            if let Some(n) = sizes.last_mut() {
                *n += 1;
            }
        } else {
            sizes.push(1);
            last = Some(root);
        }
    }
    sizes
}

/// Poll `cond` until it holds or the timeout elapses.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + RESULT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

pub fn pending_files(dir: &Path) -> usize {
    fossil_node::journal::list_pending(dir).unwrap().len()
}
