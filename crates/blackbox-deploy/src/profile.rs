//! Resource profiles: one text file per GPU class carrying a utilization ceiling.
//!
//! A profile is opaque apart from a single directive:
//!
//! ```text
//! max_gpu_utilization: 0.5
//! ```
//!
//! Every other line is passed through untouched when a profile is cloned.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use blackbox_core::GpuClass;

use crate::error::Soft;

pub const CEILING_KEY: &str = "max_gpu_utilization:";
pub const DEFAULT_CEILING: f64 = 0.5;

/// Maps GPU classes to profile files under one directory.
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    profiles_dir: PathBuf,
}

impl ProfileResolver {
    pub fn new(profiles_dir: impl Into<PathBuf>) -> Self {
        Self {
            profiles_dir: profiles_dir.into(),
        }
    }

    /// `<dir>/<class>.yaml`, or the default class's file when that does not exist.
    /// The result is absolute so it can be mounted into a container.
    pub fn resolve(&self, class: &GpuClass) -> PathBuf {
        let candidate = self.profiles_dir.join(format!("{class}.yaml"));
        let path = if candidate.is_file() {
            candidate
        } else {
            debug!(class = %class, "no profile for class, using {}", GpuClass::DEFAULT);
            self.profiles_dir.join(format!("{}.yaml", GpuClass::DEFAULT))
        };
        absolutize(path)
    }
}

pub fn absolutize(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

/// Read the ceiling from a profile file. Never fails; see [`parse_ceiling`].
pub async fn read_ceiling(path: &Path) -> Soft<f64> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => parse_ceiling(&content),
        Err(e) => Soft::fallback(
            DEFAULT_CEILING,
            format!("cannot read profile {}: {e}", path.display()),
        ),
    }
}

/// Extract the ceiling from profile text.
///
/// Uses the first directive line. A trailing `#` comment is ignored. Missing
/// directives, unparseable values, and values outside 0.0–1.0 yield
/// [`DEFAULT_CEILING`].
pub fn parse_ceiling(content: &str) -> Soft<f64> {
    let Some(line) = content
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with(CEILING_KEY))
    else {
        return Soft::fallback(DEFAULT_CEILING, "profile has no max_gpu_utilization");
    };

    let raw = line[CEILING_KEY.len()..]
        .split('#')
        .next()
        .unwrap_or_default()
        .trim();
    match raw.parse::<f64>() {
        Ok(v) if (0.0..=1.0).contains(&v) => Soft::exact(v),
        Ok(v) => Soft::fallback(DEFAULT_CEILING, format!("ceiling {v} outside 0.0-1.0")),
        Err(_) => Soft::fallback(DEFAULT_CEILING, format!("unparseable ceiling `{raw}`")),
    }
}

/// Clone profile text with the directive set to `target`.
///
/// Only the first directive line changes; its indentation and line ending are
/// kept. When the base has no directive, one is appended.
pub fn rewrite_ceiling(content: &str, target: f64) -> String {
    let mut out = String::with_capacity(content.len() + 32);
    let mut replaced = false;

    for line in content.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        let trimmed = body.trim_start();
        if !replaced && trimmed.starts_with(CEILING_KEY) {
            let indent = &body[..body.len() - trimmed.len()];
            out.push_str(indent);
            out.push_str(&format!("{CEILING_KEY} {target}"));
            out.push_str(&line[body.len()..]);
            replaced = true;
        } else {
            out.push_str(line);
        }
    }

    if !replaced {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{CEILING_KEY} {target}\n"));
    }
    out
}

const SCRATCH_HASH_LEN: usize = 12;

/// Write a scratch profile derived from `base` with a new ceiling.
///
/// The file name carries the container name and a content hash. Earlier
/// scratch profiles of the same container are removed, so the directory
/// holds at most one per container.
pub async fn write_scratch_profile(
    base: &Path,
    target: f64,
    container_name: &str,
    scratch_dir: &Path,
) -> std::io::Result<PathBuf> {
    let content = tokio::fs::read_to_string(base).await?;
    let rewritten = rewrite_ceiling(&content, target);

    let digest = hex::encode(Sha256::digest(rewritten.as_bytes()));
    let file_name = format!(
        "optimized_{container_name}_{}.yaml",
        &digest[..SCRATCH_HASH_LEN]
    );
    let path = scratch_dir.join(&file_name);

    tokio::fs::create_dir_all(scratch_dir).await?;
    tokio::fs::write(&path, rewritten).await?;
    debug!(path = %path.display(), target, "wrote scratch profile");

    prune_scratch_profiles(scratch_dir, container_name, &file_name).await;
    Ok(absolutize(path))
}

/// Remove scratch profiles of `container_name` other than `keep`.
/// Failures are logged; a leftover file is harmless.
async fn prune_scratch_profiles(scratch_dir: &Path, container_name: &str, keep: &str) {
    let mut entries = match tokio::fs::read_dir(scratch_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %scratch_dir.display(), error = %e, "cannot list scratch profiles");
            return;
        }
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name == keep || !is_scratch_profile_of(name, container_name) {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => debug!(file = name, "removed stale scratch profile"),
            Err(e) => warn!(file = name, error = %e, "cannot remove stale scratch profile"),
        }
    }
}

/// `optimized_<container_name>_<hash>.yaml`, with the hash exactly as written.
fn is_scratch_profile_of(file_name: &str, container_name: &str) -> bool {
    file_name
        .strip_prefix("optimized_")
        .and_then(|rest| rest.strip_prefix(container_name))
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(".yaml"))
        .is_some_and(|hash| {
            hash.len() == SCRATCH_HASH_LEN && hash.bytes().all(|b| b.is_ascii_hexdigit())
        })
}
