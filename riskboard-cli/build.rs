// Injects RISKBOARD_VERSION from `git describe`, falling back to the crate
// version when git or tags are unavailable.

use std::process::Command;

fn main() {
    let version = git_version().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=RISKBOARD_VERSION={}", version);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/tags");
}

fn git_version() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let described = String::from_utf8(output.stdout).ok()?;
    let described = described.trim();
    if described.is_empty() {
        return None;
    }

    // "v0.3.0" or "v0.3.0-4-gabc123[-dirty]" -> release part only
    if let Some(tagged) = described.strip_prefix('v') {
        let release = tagged.split('-').next().unwrap_or(tagged);
        return Some(release.to_string());
    }

    // untagged: "abc123" or "abc123-dirty"
    Some(format!("{}-{}", env!("CARGO_PKG_VERSION"), described))
}
