//! Stamps `--version` with the source revision and build day.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use time::OffsetDateTime;

fn main() {
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");

    let manifest_dir = env::var_os("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .unwrap_or_default();
    let repo = manifest_dir
        .ancestors()
        .find(|dir| dir.join(".git").exists());
    if let Some(repo) = repo {
        // HEAD moves on checkout, the index on commit and staging.
        println!("cargo:rerun-if-changed={}", repo.join(".git/HEAD").display());
        println!("cargo:rerun-if-changed={}", repo.join(".git/index").display());
    }

    let revision = repo.and_then(describe).unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=GIT_SHA={revision}");
    println!("cargo:rustc-env=BUILD_DATE={}", build_day());
}

/// Short revision, suffixed with `+` when the tree has local edits.
fn describe(repo: &Path) -> Option<String> {
    let out = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["describe", "--always", "--dirty=+", "--abbrev=10"])
        .output()
        .ok()
        .filter(|out| out.status.success())?;
    let revision = String::from_utf8(out.stdout).ok()?;
    let revision = revision.trim();
    (!revision.is_empty()).then(|| revision.to_string())
}

/// Calendar day (UTC) of the build; `SOURCE_DATE_EPOCH` pins it for packaging.
fn build_day() -> String {
    env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .unwrap_or_else(OffsetDateTime::now_utc)
        .date()
        .to_string()
}
