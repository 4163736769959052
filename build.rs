use std::env::consts::{ARCH, OS};
use std::process::Command;

fn main() -> anyhow::Result<()> {
    // Build a version string to use in the user-agent and `--version` flag for the CLI.
    #[cfg(debug_assertions)]
    const BUILD_TYPE: &str = "debug";
    #[cfg(not(debug_assertions))]
    const BUILD_TYPE: &str = "release";

    let version_string = format!(
        "{} ({}:{}{}, {}, {}/{})",
        env!("CARGO_PKG_VERSION"),
        git_output(&["rev-parse", "--abbrev-ref", "HEAD"]).unwrap_or_else(|| "unknown".into()),
        git_output(&["log", "-1", "--pretty=format:%h"]).unwrap_or_else(|| "unknown".into()),
        if is_working_tree_clean() { "" } else { "+" },
        BUILD_TYPE,
        OS,
        ARCH
    );

    println!("cargo:rustc-env=METABASIC_VERSION={}", version_string);
    Ok(())
}

// Builds from a source tarball have no git metadata, so every git call is
// allowed to fail.
fn git_output(args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let s = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    (!s.is_empty()).then_some(s)
}

fn is_working_tree_clean() -> bool {
    Command::new("git")
        .args(["diff", "--quiet", "--exit-code"])
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .status()
        .map(|s| s.code() == Some(0))
        .unwrap_or(true)
}
