/// Integration tests for the Strata CLI
/// Tests cover: put/get, version listing, exact reads, deletion, fail-over on
/// corruption, persistence across restarts, configuration via environment
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// Helper to run CLI commands with extra environment and capture stdout
fn run_cli_with_env(store_dir: &Path, env: &[(&str, &str)], command: &str) -> String {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cli"));
    cmd.env("STRATA_DIR", store_dir.to_str().unwrap())
        .env("STRATA_SYNC", "false")
        .env_remove("STRATA_ALGORITHM")
        .env_remove("STRATA_VERIFY")
        .env_remove("STRATA_FAIL_MISSING");
    for (key, value) in env {
        cmd.env(key, value);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");

    {
        let stdin = child.stdin.as_mut().expect("Failed to open stdin");
        // writes fail if the CLI already exited on a startup error
        let _ = stdin.write_all(command.as_bytes());
        let _ = stdin.write_all(b"EXIT\n");
    }

    let output = child.wait_with_output().expect("Failed to read output");
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn run_cli_command(store_dir: &Path, command: &str) -> String {
    run_cli_with_env(store_dir, &[], command)
}

/// Version ids printed by successful PUTs, in order.
fn committed_versions(output: &str) -> Vec<String> {
    output
        .split("> ")
        .filter_map(|chunk| chunk.trim().strip_prefix("OK "))
        .map(|id| id.trim().to_string())
        .collect()
}

#[test]
fn test_basic_put_get() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "PUT key1 value1\nGET key1\n");

    assert_eq!(committed_versions(&output).len(), 1);
    assert!(output.contains("value1"));
}

#[test]
fn test_get_returns_newest_version() {
    let dir = tempdir().unwrap();
    let commands = "PUT cfg first\nPUT cfg second\nPUT cfg third\nGET cfg\n";
    let output = run_cli_command(dir.path(), commands);

    let last_get = output.rsplit("> ").nth(1).unwrap();
    assert_eq!(last_get.trim(), "third");
}

#[test]
fn test_value_with_spaces() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "PUT motd hello big world\nGET motd\n");
    assert!(output.contains("hello big world"));
}

#[test]
fn test_missing_key_is_nil() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "GET nothing\nVERSIONS nothing\n");
    assert!(output.contains("(nil)"));
    assert!(output.contains("(empty)"));
}

#[test]
fn test_versions_listing() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "PUT k a\nPUT k bb\nPUT k ccc\nVERSIONS k\n");

    let ids = committed_versions(&output);
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids must increase: {:?}", ids);
    assert!(output.contains(&format!("{} 1", ids[0])));
    assert!(output.contains(&format!("{} 3", ids[2])));
    assert!(output.contains("(3 versions)"));
}

#[test]
fn test_get_exact_version() {
    let dir = tempdir().unwrap();
    let first = run_cli_command(dir.path(), "PUT k oldval\nPUT k newval\n");
    let ids = committed_versions(&first);

    let output = run_cli_command(dir.path(), &format!("GET k {}\nGET k 1\n", ids[0]));
    assert!(output.contains("oldval"));
    assert!(!output.contains("newval"));
    assert!(output.contains("(nil)"));
}

#[test]
fn test_delete_version() {
    let dir = tempdir().unwrap();
    let first = run_cli_command(dir.path(), "PUT k keep\nPUT k drop\n");
    let ids = committed_versions(&first);

    let commands = format!("DELETE k {}\nGET k\nDELETE k {}\nVERSIONS k\n", ids[1], ids[1]);
    let output = run_cli_command(dir.path(), &commands);

    assert!(output.contains("OK"));
    assert!(output.contains("keep"));
    assert!(output.contains("(nil)"), "second delete should report missing");
    assert!(output.contains("(1 versions)"));
}

#[test]
fn test_get_falls_back_on_corruption() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "PUT k good\nPUT k evil\n");
    let ids = committed_versions(&output);

    // flip the newest data file so its checksum no longer matches
    fs::write(dir.path().join("k").join(&ids[1]), b"EVIL").unwrap();

    let output = run_cli_command(dir.path(), &format!("GET k\nGET k {}\n", ids[1]));
    assert!(output.contains("good"));
    assert!(output.contains("checksum mismatch"));
}

#[test]
fn test_all_versions_corrupted() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "PUT k one\nPUT k two\n");
    for id in committed_versions(&output) {
        fs::write(dir.path().join("k").join(format!("{}.fnv128a", id)), b"bad").unwrap();
    }

    let output = run_cli_command(dir.path(), "GET k\n");
    assert!(output.contains("no valid version found after 2 attempt(s)"));
}

#[test]
fn test_verify_disabled_returns_raw_data() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "PUT k clean\n");
    let ids = committed_versions(&output);
    fs::write(dir.path().join("k").join(&ids[0]), b"dirty").unwrap();

    let output = run_cli_with_env(dir.path(), &[("STRATA_VERIFY", "false")], "GET k\n");
    assert!(output.contains("verify=false"));
    assert!(output.contains("dirty"));
}

#[test]
fn test_algorithm_from_env() {
    let dir = tempdir().unwrap();
    let output = run_cli_with_env(
        dir.path(),
        &[("STRATA_ALGORITHM", "sha256")],
        "PUT k data\nALGORITHMS\n",
    );
    let ids = committed_versions(&output);

    assert!(output.contains("sha256 *"));
    let digest = fs::read(dir.path().join("k").join(format!("{}.sha256", ids[0]))).unwrap();
    assert_eq!(digest.len(), 32);

    // readable from a store using the default algorithm
    let output = run_cli_command(dir.path(), "GET k\n");
    assert!(output.contains("data"));
}

#[test]
fn test_unknown_algorithm_fails_startup() {
    let dir = tempdir().unwrap();
    let output = run_cli_with_env(dir.path(), &[("STRATA_ALGORITHM", "md4")], "PUT k v\n");
    assert!(!output.contains("Strata started"));
}

#[test]
fn test_fail_missing_dir() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent");
    let output = run_cli_with_env(&missing, &[("STRATA_FAIL_MISSING", "true")], "PUT k v\n");
    assert!(!output.contains("Strata started"));
    assert!(!missing.exists());
}

#[test]
fn test_invalid_key_rejected() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "PUT ../escape v\nPUT a/b v\n");
    assert_eq!(output.matches("ERR put failed: invalid key").count(), 2);
}

#[test]
fn test_usage_errors() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "PUT onlykey\nGET\nDELETE k\nFROB\n");
    assert!(output.contains("ERR usage: PUT key value"));
    assert!(output.contains("ERR usage: GET key [nanos]"));
    assert!(output.contains("ERR usage: DELETE key nanos"));
    assert!(output.contains("unknown command: FROB"));
}

#[test]
fn test_stats_output() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "PUT x 1\nGET x\nSTATS\n");
    assert!(output.contains("commits: 1"));
    assert!(output.contains("reader_calls: 1"));
}

#[test]
fn test_quit_command() {
    let dir = tempdir().unwrap();
    let output = run_cli_command(dir.path(), "PUT foo bar\nQUIT\n");
    assert!(output.contains("OK"));
    assert!(output.contains("bye"));
}

#[test]
fn test_persistence_across_restarts() {
    let dir = tempdir().unwrap();
    run_cli_with_env(dir.path(), &[("STRATA_SYNC", "true")], "PUT persist_key persist_value\n");

    let output = run_cli_command(dir.path(), "GET persist_key\nVERSIONS persist_key\n");
    assert!(output.contains("persist_value"));
    assert!(output.contains("(1 versions)"));
}

#[test]
fn test_large_value() {
    let dir = tempdir().unwrap();
    let large_value = "x".repeat(5000);
    let output = run_cli_command(dir.path(), &format!("PUT big {}\nGET big\n", large_value));
    assert!(output.contains(&large_value));
}
