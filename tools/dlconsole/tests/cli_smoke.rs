use assert_cmd::cargo::cargo_bin_cmd;

fn fixture(path: &str) -> String {
    format!("{}/tests/fixtures/{path}", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn help_lists_download_flags() {
    let mut cmd = cargo_bin_cmd!("dlconsole");
    cmd.arg("--help");
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");

    assert!(stdout.contains("--preset"));
    assert!(stdout.contains("--sub-lang"));
    assert!(stdout.contains("--headless"));
}

#[test]
fn zero_follow_tolerance_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("dlconsole");
    cmd.current_dir(temp.path())
        .arg("https://example.com/v")
        .arg("--headless")
        .arg("--config")
        .arg(fixture("configs/zero-tolerance.toml"));
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("invalid config"));
}

#[test]
fn missing_config_path_exits_nonzero() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("dlconsole");
    cmd.current_dir(temp.path())
        .arg("https://example.com/v")
        .arg("--config")
        .arg(fixture("configs/missing.toml"));
    cmd.assert().failure();
}

#[test]
fn missing_url_is_reported() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("dlconsole");
    cmd.current_dir(temp.path()).arg("--headless");
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("URL is empty"));
}

#[test]
fn missing_tool_binary_is_a_launch_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("cfg.toml");
    std::fs::write(
        &config,
        "[tools]\nyt_dlp_path = \"dlconsole-no-such-downloader\"\n",
    )
    .expect("config");
    let mut cmd = cargo_bin_cmd!("dlconsole");
    cmd.current_dir(temp.path())
        .arg("https://example.com/v")
        .arg("--headless")
        .arg("--config")
        .arg(&config);
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("launch failed"));
}

#[cfg(unix)]
#[test]
fn headless_run_streams_progress_and_fires_completion() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("dlconsole");
    cmd.current_dir(temp.path())
        .arg("--headless")
        .arg("--config")
        .arg(fixture("configs/shell-tool.toml"))
        .arg("--")
        .arg("-c")
        .arg(
            "printf '[download] Destination: /tmp/a.mp4\\n\
             [download]  50.0%% of 1.00MiB at 1.00MiB/s ETA 00:01\\r\
             [download] 100%% of 1.00MiB in 00:00:01 at 1.00MiB/s\\n'",
        );
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");

    assert!(stdout.contains("phase=downloading message=[download] Destination: /tmp/a.mp4"));
    assert!(stdout.contains("ETA 00:01"));
    assert!(stdout.contains("message=Download complete: a.mp4"));
    assert!(stdout.contains("message=exited with code 0"));
    assert!(temp.path().join(".cache/dlconsole/console.jsonl").exists());
}

#[cfg(unix)]
#[test]
fn headless_run_propagates_the_tool_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("dlconsole");
    cmd.current_dir(temp.path())
        .arg("--headless")
        .arg("--config")
        .arg(fixture("configs/shell-tool.toml"))
        .arg("--")
        .arg("-c")
        .arg("echo 'ERROR: unsupported URL' >&2; exit 3");
    let out = cmd.assert().code(3);
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("message=ERROR: unsupported URL"));
}
