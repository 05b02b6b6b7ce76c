use anyhow::{Context, Result};
use clap::Parser;
use fossil_kernel::proof::{FossilResult, Proof};
use fossil_kernel::types::Digest;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Check fossil evidence emitted as JSON lines", long_about = None)]
struct Args {
    /// File of JSON results, one per line (`-` for stdin)
    results: PathBuf,

    /// Every result must commit to this root (hex)
    #[arg(long)]
    root: Option<String>,
}

#[derive(Serialize, Debug, Default)]
struct Summary {
    checked: usize,
    verified: usize,
    failed: usize,
    roots: BTreeSet<String>,
}

/// Why one result does not hold, if it doesn't.
fn check(result: &FossilResult, expected_root: Option<&Digest>) -> Result<(), String> {
    let proof = result.evidence.proof.batch();

    proof.path.validate().map_err(|e| format!("malformed path: {}", e))?;
    proof
        .path
        .verify(&result.data, &proof.root)
        .map_err(|e| format!("leaf {} not under root {}: {}", result.data, proof.root, e))?;

    if let Some(root) = expected_root {
        if &proof.root != root {
            return Err(format!("root {} differs from expected {}", proof.root, root));
        }
    }
    if let Proof::BcBatch(bc) = &result.evidence.proof {
        if bc.txid.0.is_empty() {
            return Err("empty transaction id".to_string());
        }
    }
    Ok(())
}

fn open(path: &PathBuf) -> Result<Box<dyn BufRead>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    Ok(Box::new(BufReader::new(file)))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let expected_root = args
        .root
        .as_deref()
        .map(Digest::from_hex)
        .transpose()
        .context("Invalid --root")?;

    let mut summary = Summary::default();
    for (n, line) in open(&args.results)?.lines().enumerate() {
        let line = line.context("Failed to read results")?;
        if line.trim().is_empty() {
            continue;
        }
        summary.checked += 1;

        let outcome = serde_json::from_str::<FossilResult>(&line)
            .map_err(|e| format!("not a result: {}", e))
            .and_then(|r| {
                check(&r, expected_root.as_ref())?;
                Ok(r)
            });

        match outcome {
            Ok(result) => {
                summary.verified += 1;
                summary.roots.insert(result.evidence.proof.batch().root.to_hex());
            }
            Err(reason) => {
                summary.failed += 1;
                eprintln!("line {}: {}", n + 1, reason);
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.failed > 0 {
        anyhow::bail!("{} of {} results failed verification", summary.failed, summary.checked);
    }
    Ok(())
}
