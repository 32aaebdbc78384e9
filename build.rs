// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::Command;

fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    // built doesn't know about the git describe version without the git2 feature
    let git_version = git_output(&["describe", "--match", "v[0-9]*", "--tags", "HEAD"])
        .map(|v| v.trim_start_matches('v').to_string())
        .or_else(|| git_output(&["rev-parse", "--short", "HEAD"]));
    let git_dirty = git_output(&["diff-index", "--name-only", "HEAD", "--"])
        .map(|v| !v.is_empty())
        .unwrap_or_default();

    write_git_info(git_version, git_dirty);
}

fn git_output(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|v| v.trim().to_string())
}

fn write_git_info(git_version: Option<String>, git_dirty: bool) {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("git_built.rs");
    let mut f = File::create(&dest_path).unwrap();

    writeln!(f, "// Git information generated at build time").unwrap();
    match git_version {
        Some(version) => writeln!(
            f,
            "pub const GIT_VERSION: Option<&'static str> = Some(\"{version}\");"
        ),
        None => writeln!(f, "pub const GIT_VERSION: Option<&'static str> = None;"),
    }
    .unwrap();
    writeln!(
        f,
        "pub const GIT_DIRTY: Option<bool> = {};",
        if git_dirty { "Some(true)" } else { "None" }
    )
    .unwrap();
}
