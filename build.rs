//! Build script to stamp the binary with the source revision

use std::process::Command;

fn main() {
    // Short hash, suffixed with -dirty for uncommitted changes
    let output = Command::new("git").args(["describe", "--always", "--dirty"]).output();

    let revision = match output {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout).trim().to_string(),
        _ => String::from("unknown"),
    };

    println!("cargo:rustc-env=GIT_HASH={}", revision);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
}
