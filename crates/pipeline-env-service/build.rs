use std::env;
use std::process::{Command, Stdio};

/// Stamps the git commit and the build time into the binary, as the
/// `BUILD_COMMIT` and `BUILD_TIME` environment variables at compile time.
///
/// Both can be given explicitly through the same variables, which is useful
/// when the crate is built outside of its git checkout. Otherwise the commit
/// comes from `git rev-parse HEAD` (`"0"` if that fails) and the build time
/// is the current time.
fn main() {
    let commit = env::var("BUILD_COMMIT")
        .ok()
        .filter(|commit| !commit.is_empty())
        .or_else(git_commit)
        .unwrap_or_else(|| "0".to_string());
    let build_time = env::var("BUILD_TIME")
        .ok()
        .filter(|time| !time.is_empty())
        .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string());

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=BUILD_COMMIT");
    println!("cargo:rerun-if-env-changed=BUILD_TIME");
    println!("cargo:rustc-env=BUILD_COMMIT={commit}");
    println!("cargo:rustc-env=BUILD_TIME={build_time}");
}

fn git_commit() -> Option<String> {
    let output = Command::new("git")
        .arg("rev-parse")
        .arg("HEAD")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let commit = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!commit.is_empty()).then_some(commit)
}
