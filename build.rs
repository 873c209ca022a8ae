// Embeds the git commit the binary was built from, for `--version`.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");

    let commit = std::env::var("GITHUB_SHA")
        .ok()
        .or_else(git_head)
        .unwrap_or_else(|| "unknown".to_string());

    println!(
        "cargo:rustc-env=GIT_COMMIT={}",
        commit.chars().take(12).collect::<String>()
    );
}

fn git_head() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
