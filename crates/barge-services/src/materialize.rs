//! Write a retrieved DAG out as a file.
//!
//! Depth-first in link order: a node's inline data, then each child in
//! turn. Raw leaves contribute their bytes. The file appears atomically:
//! write to a temp file, then rename.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use barge_core::{dag, ContentHash};

use crate::store::BlockStore;

/// Materialize the DAG under `root` to `path`. Returns bytes written.
pub fn materialize(store: &BlockStore, root: ContentHash, path: &Path) -> Result<u64> {
    let tmp_path = temp_path(path);
    let written = match write_tree(store, root, &tmp_path) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
    };

    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "failed to rename {} to {}",
            tmp_path.display(),
            path.display()
        )
    })?;

    tracing::info!(path = %path.display(), bytes = written, "output written");
    Ok(written)
}

fn write_tree(store: &BlockStore, root: ContentHash, tmp_path: &Path) -> Result<u64> {
    let file = fs::File::create(tmp_path)
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;
    let mut out = BufWriter::new(file);
    let mut written = 0u64;

    // Children pushed in reverse so they pop in link order.
    let mut stack = vec![root];
    while let Some(hash) = stack.pop() {
        let Some(block) = store.get(&hash) else {
            bail!("block {hash} missing from store");
        };
        let node = dag::decode(&block).with_context(|| format!("block {hash} failed to decode"))?;

        out.write_all(&node.data).context("failed to write output")?;
        written += node.data.len() as u64;
        stack.extend(node.links.iter().rev().map(|l| l.hash));
    }

    let file = out.into_inner().context("failed to flush output")?;
    file.sync_all().context("failed to sync output to disk")?;
    Ok(written)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".barge-tmp");
    path.with_file_name(name)
}
