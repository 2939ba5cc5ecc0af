#![cfg(unix)]

mod common;

use common::{Sandbox, FAILING_MKSLIDES, FAKE_MKSLIDES, HANGING_MKSLIDES};
use mkslides_server::{BuildRequest, CancelToken, Config, ErrorKind, SlideGenerator};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn generator(sandbox: &Sandbox, tool: &str, timeout_ms: u64) -> SlideGenerator {
    SlideGenerator::new(
        Config::default()
            .with_mkslides_bin(sandbox.tool(tool))
            .with_temp_root(sandbox.work_root())
            .with_timeout_ms(timeout_ms),
    )
}

#[test]
fn test_successful_build_lists_output_files() {
    let sandbox = Sandbox::new();
    let out = sandbox.output_dir("site");
    let generator = generator(&sandbox, FAKE_MKSLIDES, 10_000);

    let request = BuildRequest::new("# A\n\n---\n\n# B").with_output_dir(&out);
    let result = generator.generate_slides(&request);

    assert!(result.success, "build failed: {:?}", result);
    assert_eq!(result.exit_code, Some(0));
    assert!(result.error.is_none());
    assert!(result.stdout.contains("Documentation built"));
    assert_eq!(result.output_dir.as_deref(), Some(out.as_path()));

    let html: Vec<_> = result
        .output_files
        .iter()
        .filter(|p| p.extension().map_or(false, |e| e == "html"))
        .collect();
    assert!(!html.is_empty(), "no html in {:?}", result.output_files);
    assert!(result.output_files.iter().all(|p| p.is_absolute() && p.starts_with(&out)));

    let mut sorted = result.output_files.clone();
    sorted.sort();
    assert_eq!(sorted, result.output_files);

    let index = fs::read_to_string(out.join("index.html")).unwrap();
    assert!(index.contains("# A\n\n---\n\n# B"));
    assert!(sandbox.leftover_workspaces().is_empty());
}

#[test]
fn test_tool_runs_inside_workspace_with_merged_config() {
    let sandbox = Sandbox::new();
    let out = sandbox.output_dir("site");
    let generator = generator(&sandbox, FAKE_MKSLIDES, 10_000);

    let request = BuildRequest::new("# A")
        .with_output_dir(&out)
        .with_theme("white")
        .with_revealjs_options(json!({ "transition": "zoom" }));
    let result = generator.generate_slides(&request);
    assert!(result.success, "build failed: {:?}", result);

    let cwd = fs::read_to_string(out.join("cwd.txt")).unwrap();
    let cwd = cwd.trim();
    assert!(cwd.contains("mkslides-"), "unexpected cwd {}", cwd);
    assert!(!std::path::Path::new(cwd).exists());

    let used: Value = serde_yaml_ng::from_str(&fs::read_to_string(out.join("used-config.yml")).unwrap()).unwrap();
    assert_eq!(used["slides"]["theme"], json!("white"));
    assert_eq!(used["slides"]["highlight_theme"], json!("monokai"));
    assert_eq!(used["revealjs"]["transition"], json!("zoom"));
    assert_eq!(used["revealjs"]["history"], json!(true));
}

#[test]
fn test_config_override_is_written_verbatim() {
    let sandbox = Sandbox::new();
    let out = sandbox.output_dir("site");
    let generator = generator(&sandbox, FAKE_MKSLIDES, 10_000);

    let override_doc = json!({ "slides": { "theme": "league" }, "revealjs": { "controls": false } });
    let request = BuildRequest::new("# A")
        .with_output_dir(&out)
        .with_config_override(override_doc.clone())
        .with_theme("white");
    let result = generator.generate_slides(&request);
    assert!(result.success, "build failed: {:?}", result);

    let used: Value = serde_yaml_ng::from_str(&fs::read_to_string(out.join("used-config.yml")).unwrap()).unwrap();
    assert_eq!(used, override_doc);
}

#[test]
fn test_strict_mode_failure_reports_diagnostics() {
    let sandbox = Sandbox::new();
    let out = sandbox.output_dir("site");
    let generator = generator(&sandbox, FAKE_MKSLIDES, 10_000);

    let markdown = "# A\n\n![diagram](missing.png)";

    let relaxed = generator.generate_slides(&BuildRequest::new(markdown).with_output_dir(&out));
    assert!(relaxed.success, "non-strict build failed: {:?}", relaxed);

    let strict = generator.generate_slides(&BuildRequest::new(markdown).with_output_dir(&out).with_strict(true));
    assert!(!strict.success);
    assert_eq!(strict.exit_code, Some(1));
    assert!(strict.stderr.contains("Aborted with 1 warnings in strict mode!"));
    assert!(strict.output_files.is_empty());
    assert_eq!(strict.error_kind(), Some(ErrorKind::Build));
    assert!(sandbox.leftover_workspaces().is_empty());
}

#[test]
fn test_build_failure_cleans_up_workspace() {
    let sandbox = Sandbox::new();
    let generator = generator(&sandbox, FAILING_MKSLIDES, 10_000);

    let before = sandbox.leftover_workspaces();
    let result = generator.generate_slides(&BuildRequest::new("# A").with_output_dir(sandbox.output_dir("site")));
    let after = sandbox.leftover_workspaces();

    assert!(!result.success);
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.stderr, "ERROR - Config value 'slides': unknown theme\n");
    assert_eq!(before, after);
}

#[test]
fn test_missing_tool_is_reported_distinctly() {
    let sandbox = Sandbox::new();
    let generator = SlideGenerator::new(
        Config::default()
            .with_mkslides_bin(sandbox.dir.path().join("bin").join("no-such-mkslides").to_string_lossy())
            .with_temp_root(sandbox.work_root()),
    );

    let result = generator.generate_slides(&BuildRequest::new("# A").with_output_dir(sandbox.output_dir("site")));

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::ToolNotFound));
    assert_eq!(result.exit_code, None);
    assert!(sandbox.leftover_workspaces().is_empty());
}

#[test]
fn test_hanging_tool_times_out() {
    let sandbox = Sandbox::new();
    let generator = generator(&sandbox, HANGING_MKSLIDES, 300);

    let start = Instant::now();
    let result = generator.generate_slides(&BuildRequest::new("# A").with_output_dir(sandbox.output_dir("site")));
    let elapsed = start.elapsed();

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));
    assert_eq!(result.exit_code, None);
    assert!(elapsed < Duration::from_secs(10), "took {:?}", elapsed);
    assert!(sandbox.leftover_workspaces().is_empty());
}

/// True once `pid` is gone or only a zombie
#[cfg(target_os = "linux")]
fn process_is_dead(pid: &str) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .map_or(true, |rest| rest.trim_start().starts_with('Z')),
        Err(_) => true,
    }
}

#[cfg(target_os = "linux")]
#[test]
fn test_timeout_kills_processes_forked_by_the_tool() {
    let sandbox = Sandbox::new();
    let pid_file = sandbox.dir.path().join("grandchild.pid");
    let wrapper = format!("#!/bin/sh\nsleep 30 &\necho $! > '{}'\nwait\n", pid_file.display());
    let generator = generator(&sandbox, &wrapper, 500);

    let result = generator.generate_slides(&BuildRequest::new("# A").with_output_dir(sandbox.output_dir("site")));
    assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));

    let pid = fs::read_to_string(&pid_file).unwrap();
    let pid = pid.trim();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !process_is_dead(pid) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    assert!(process_is_dead(pid), "sleep {} outlived the timed out build", pid);
}

#[test]
fn test_cancellation_kills_tool_and_cleans_up() {
    let sandbox = Sandbox::new();
    let generator = generator(&sandbox, HANGING_MKSLIDES, 60_000);
    let token = CancelToken::new();

    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            token.cancel();
        })
    };

    let start = Instant::now();
    let result = generator
        .generate_slides_with_cancel(&BuildRequest::new("# A").with_output_dir(sandbox.output_dir("site")), &token);
    canceller.join().unwrap();

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(sandbox.leftover_workspaces().is_empty());
}

#[test]
fn test_already_cancelled_request_does_not_run() {
    let sandbox = Sandbox::new();
    let generator = generator(&sandbox, FAKE_MKSLIDES, 10_000);
    let token = CancelToken::new();
    token.cancel();

    let out = sandbox.output_dir("site");
    let result = generator.generate_slides_with_cancel(&BuildRequest::new("# A").with_output_dir(&out), &token);

    assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));
    assert!(!out.join("index.html").exists());
    assert!(sandbox.leftover_workspaces().is_empty());
}

#[test]
fn test_concurrent_builds_use_distinct_workspaces() {
    let sandbox = Sandbox::new();
    let generator = Arc::new(generator(&sandbox, FAKE_MKSLIDES, 30_000));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let generator = Arc::clone(&generator);
            let out = sandbox.output_dir(&format!("site-{}", i));
            thread::spawn(move || {
                let result = generator.generate_slides(&BuildRequest::new(format!("# Deck {}", i)).with_output_dir(&out));
                assert!(result.success, "build {} failed: {:?}", i, result);
                fs::read_to_string(out.join("cwd.txt")).unwrap().trim().to_string()
            })
        })
        .collect();

    let workspaces: HashSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(workspaces.len(), 8);
    assert!(sandbox.leftover_workspaces().is_empty());
}

#[test]
fn test_default_output_dir_comes_from_config() {
    let sandbox = Sandbox::new();
    let out = sandbox.output_dir("default-site");
    let mut config = Config::default()
        .with_mkslides_bin(sandbox.tool(FAKE_MKSLIDES))
        .with_temp_root(sandbox.work_root());
    config.default_output_dir = out.clone();

    let result = SlideGenerator::new(config).generate_slides(&BuildRequest::new("# A"));

    assert!(result.success, "build failed: {:?}", result);
    assert!(out.join("index.html").exists());
}

#[test]
fn test_unusable_workspace_root_is_reported_as_workspace_error() {
    let sandbox = Sandbox::new();
    let not_a_dir = sandbox.dir.path().join("not-a-dir");
    fs::write(&not_a_dir, "occupied").unwrap();

    let generator = SlideGenerator::new(
        Config::default()
            .with_mkslides_bin(sandbox.tool(FAKE_MKSLIDES))
            .with_temp_root(&not_a_dir),
    );
    let out = sandbox.output_dir("site");
    let result = generator.generate_slides(&BuildRequest::new("# A").with_output_dir(&out));

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::Workspace));
    assert_eq!(result.exit_code, None);
    assert!(result.output_files.is_empty());
    assert!(!out.join("index.html").exists());
}

#[test]
#[ignore] // Requires the real mkslides tool on PATH
fn test_real_mkslides_builds_two_slides() {
    let sandbox = Sandbox::new();
    let out = sandbox.output_dir("site");
    let generator = SlideGenerator::new(Config::default().with_temp_root(sandbox.work_root()));

    let result = generator.generate_slides(&BuildRequest::new("# A\n\n---\n\n# B").with_output_dir(&out));

    assert!(result.success, "mkslides failed: {}", result.stderr);
    assert!(result.index_html().is_some());
    assert!(sandbox.leftover_workspaces().is_empty());
}
