use std::process::Command;

fn git_short_sha() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");

    let version = match git_short_sha() {
        Some(sha) => format!("{}+{sha}", env!("CARGO_PKG_VERSION")),
        None => format!("{}+dev", env!("CARGO_PKG_VERSION")),
    };
    println!("cargo:rustc-env=WORKBENCH_BUILD_VERSION={version}");
}
