use assert_cmd::Command;
use fastpass_core::{hash_file, CompileCache, StateSnapshot};
use fastpass_test_helpers::{fixtures, FakeLoader, TestProject};
use predicates::prelude::*;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

fn fastpass_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("fastpass"));
    cmd.env_remove("FASTPASS_CACHE_DIR")
        .env_remove("FASTPASS_CONFIG")
        .env_remove("FASTPASS_FRAMEWORK_DEV");
    cmd
}

fn stdout_lines(output: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(output)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Export a snapshot where page.ts imports util.ts and spec.ts imports page.ts
fn write_chain_snapshot(project: &TestProject) -> (PathBuf, [PathBuf; 3]) {
    let util = project.write("util.ts", fixtures::math_source());
    let page = project.write("page.ts", fixtures::math_source());
    let spec = project.write("login.spec.ts", fixtures::spec_source());

    let mut cache = project.cache();
    let mut loader = FakeLoader::new();
    loader.load(&mut cache, &spec, &[page.clone()]);
    loader.load(&mut cache, &page, &[util.clone()]);
    loader.load(&mut cache, &util, &[]);

    let snapshot_path = project.root().join("state.json");
    fs::write(&snapshot_path, cache.serialize().to_json().unwrap()).unwrap();
    (snapshot_path, [util, page, spec])
}

// ============================================================================
// HASH AND PATH TESTS
// ============================================================================

#[test]
fn test_hash_matches_library() {
    let project = TestProject::new();
    let file = project.write("a.ts", fixtures::spec_source());
    let expected = hash_file(&file, "").unwrap();

    fastpass_cmd()
        .arg("hash")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::starts_with(expected))
        .stdout(predicate::str::contains("a.ts"));
}

#[test]
fn test_hash_salt_changes_output() {
    let project = TestProject::new();
    let file = project.write("a.ts", fixtures::spec_source());
    let salted = hash_file(&file, "target=es2020").unwrap();

    fastpass_cmd()
        .args(["hash", "--salt", "target=es2020"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::starts_with(salted));
}

#[test]
fn test_hash_missing_file_fails() {
    fastpass_cmd()
        .args(["hash", "/definitely/not/here.ts"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to hash"));
}

#[test]
fn test_path_prints_sharded_locations() {
    let project = TestProject::new();
    let cache_dir = project.cache_dir();

    let output = fastpass_cmd()
        .arg("--cache-dir")
        .arg(&cache_dir)
        .args(["path", "tests/login.spec.ts", "ab12cd"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let lines = stdout_lines(&output.stdout);
    assert_eq!(
        lines,
        vec![
            cache_dir.join("ab/loginspec_ab12cd.js").display().to_string(),
            cache_dir.join("ab/loginspec_ab12cd.map").display().to_string(),
        ]
    );
}

#[test]
fn test_path_rejects_invalid_hash() {
    fastpass_cmd()
        .args(["--cache-dir", "/tmp/unused", "path", "a.ts", "../x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid content hash"));
}

// ============================================================================
// INFO AND CLEAN TESTS
// ============================================================================

#[test]
fn test_info_on_missing_root() {
    let project = TestProject::new();

    fastpass_cmd()
        .arg("--cache-dir")
        .arg(project.cache_dir())
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("not created yet"))
        .stdout(predicate::str::contains("Entries: 0"));
}

#[test]
fn test_info_counts_entries() {
    let project = TestProject::new();
    let a = project.write("a.ts", fixtures::spec_source());
    let b = project.write("b.ts", fixtures::math_source());
    let mut cache = project.cache();
    let mut loader = FakeLoader::new();
    loader.load(&mut cache, &a, &[]);
    loader.load(&mut cache, &b, &[]);

    fastpass_cmd()
        .arg("--cache-dir")
        .arg(project.cache_dir())
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries: 2"))
        .stdout(predicate::str::contains("Source maps: 2"));
}

#[test]
fn test_info_json() {
    let project = TestProject::new();
    let file = project.write("a.ts", fixtures::spec_source());
    FakeLoader::new().load(&mut project.cache(), &file, &[]);

    let output = fastpass_cmd()
        .arg("--cache-dir")
        .arg(project.cache_dir())
        .args(["info", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["entries"], 1);
    assert_eq!(value["shards"], 1);
    assert_eq!(value["exists"], true);
}

#[test]
fn test_clean_removes_root() {
    let project = TestProject::new();
    let file = project.write("a.ts", fixtures::spec_source());
    FakeLoader::new().load(&mut project.cache(), &file, &[]);
    assert!(project.cache_dir().exists());

    fastpass_cmd()
        .arg("--cache-dir")
        .arg(project.cache_dir())
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));
    assert!(!project.cache_dir().exists());

    fastpass_cmd()
        .arg("--cache-dir")
        .arg(project.cache_dir())
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to clean"));
}

// ============================================================================
// CONFIGURATION TESTS
// ============================================================================

#[test]
fn test_config_file_in_working_directory() {
    let project = TestProject::new();
    let configured = project.root().join("from-config");
    fs::write(
        project.root().join("fastpass.yaml"),
        format!("cacheDir: {}\n", configured.display()),
    )
    .unwrap();

    fastpass_cmd()
        .current_dir(project.root())
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains(configured.display().to_string()));
}

#[test]
fn test_env_overrides_config_and_flag_overrides_env() {
    let project = TestProject::new();
    let config_path = project.root().join("custom.yaml");
    fs::write(&config_path, "cacheDir: /from/config\n").unwrap();
    let from_env = project.root().join("from-env");
    let from_flag = project.root().join("from-flag");

    fastpass_cmd()
        .env("FASTPASS_CACHE_DIR", &from_env)
        .arg("--config")
        .arg(&config_path)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains(from_env.display().to_string()));

    fastpass_cmd()
        .env("FASTPASS_CACHE_DIR", &from_env)
        .arg("--config")
        .arg(&config_path)
        .arg("--cache-dir")
        .arg(&from_flag)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains(from_flag.display().to_string()));
}

#[test]
fn test_dev_mode_flags_reach_effective_config() {
    let project = TestProject::new();
    let shim = project.root().join("coverage/shim.js");
    let framework = project.root().join("framework");

    let output = fastpass_cmd()
        .arg("--cache-dir")
        .arg(project.cache_dir())
        .arg("--framework-dev")
        .arg("--framework-root")
        .arg(&framework)
        .arg("--coverage-shim")
        .arg(&shim)
        .args(["info", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let config = &value["config"];
    assert_eq!(config["frameworkDevMode"], true);
    assert_eq!(config["frameworkRoot"], framework.display().to_string());
    assert_eq!(config["coverageShim"], shim.display().to_string());
}

#[test]
fn test_missing_config_file_fails() {
    fastpass_cmd()
        .args(["--config", "/no/such/fastpass.yaml", "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

// ============================================================================
// AFFECTED TESTS
// ============================================================================

#[test]
fn test_affected_is_single_hop_by_default() {
    let project = TestProject::new();
    let (snapshot, [util, page, spec]) = write_chain_snapshot(&project);

    let output = fastpass_cmd()
        .arg("--cache-dir")
        .arg(project.cache_dir())
        .arg("affected")
        .arg("--snapshot")
        .arg(&snapshot)
        .arg(&util)
        .output()
        .unwrap();
    assert!(output.status.success());

    let lines = stdout_lines(&output.stdout);
    assert!(lines.contains(&util.display().to_string()));
    assert!(lines.contains(&page.display().to_string()));
    assert!(!lines.contains(&spec.display().to_string()));
}

#[test]
fn test_affected_transitive_reaches_spec() {
    let project = TestProject::new();
    let (snapshot, [util, page, spec]) = write_chain_snapshot(&project);

    let output = fastpass_cmd()
        .arg("--cache-dir")
        .arg(project.cache_dir())
        .arg("affected")
        .arg("--transitive")
        .arg("--snapshot")
        .arg(&snapshot)
        .arg(&util)
        .output()
        .unwrap();
    assert!(output.status.success());

    let lines = stdout_lines(&output.stdout);
    assert_eq!(lines.len(), 3);
    for path in [&util, &page, &spec] {
        assert!(lines.contains(&path.display().to_string()));
    }
}

#[test]
fn test_affected_resolves_relative_paths() {
    let project = TestProject::new();
    let (snapshot, [_, page, _]) = write_chain_snapshot(&project);

    fastpass_cmd()
        .current_dir(project.path(""))
        .arg("--cache-dir")
        .arg(project.cache_dir())
        .arg("affected")
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("util.ts")
        .assert()
        .success()
        .stdout(predicate::str::contains(page.display().to_string()));
}

#[test]
fn test_affected_folds_parent_components() {
    let project = TestProject::new();
    let (snapshot, [util, page, _]) = write_chain_snapshot(&project);
    let tests_dir = project.root().join("tests");
    fs::create_dir_all(&tests_dir).unwrap();

    let output = fastpass_cmd()
        .current_dir(&tests_dir)
        .arg("--cache-dir")
        .arg(project.cache_dir())
        .arg("affected")
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("../src/./util.ts")
        .output()
        .unwrap();
    assert!(output.status.success());

    let lines = stdout_lines(&output.stdout);
    assert!(lines.contains(&util.display().to_string()));
    assert!(lines.contains(&page.display().to_string()));
}

#[test]
fn test_affected_trusts_snapshot_records() {
    let project = TestProject::new();
    let framework = project.root().join("framework");
    let spec = project.write("a.spec.ts", fixtures::spec_source());
    let internal = framework.join("runner.js");

    let snapshot = StateSnapshot {
        external_dependencies: vec![(spec.clone(), vec![internal.clone()])],
        ..StateSnapshot::default()
    };
    let snapshot_path = project.root().join("state.json");
    fs::write(&snapshot_path, snapshot.to_json().unwrap()).unwrap();

    // records merged from a snapshot are not re-filtered
    fastpass_cmd()
        .arg("--cache-dir")
        .arg(project.cache_dir())
        .arg("--framework-dev")
        .arg("--framework-root")
        .arg(&framework)
        .arg("affected")
        .arg("--snapshot")
        .arg(&snapshot_path)
        .arg(&internal)
        .assert()
        .success()
        .stdout(predicate::str::contains(spec.display().to_string()));
}

#[test]
fn test_affected_rejects_malformed_snapshot() {
    let project = TestProject::new();
    let snapshot_path = project.root().join("state.json");
    fs::write(&snapshot_path, "{\"fileDependencies\": 7}").unwrap();

    fastpass_cmd()
        .arg("--cache-dir")
        .arg(project.cache_dir())
        .arg("affected")
        .arg("--snapshot")
        .arg(&snapshot_path)
        .arg("a.ts")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed snapshot"));
}

#[test]
fn test_affected_requires_changed_files() {
    fastpass_cmd()
        .args(["affected", "--snapshot", "state.json"])
        .assert()
        .failure();
}

// ============================================================================
// WATCH TESTS
// ============================================================================

#[test]
fn test_watch_missing_snapshot_fails_before_watching() {
    let project = TestProject::new();

    fastpass_cmd()
        .arg("--cache-dir")
        .arg(project.cache_dir())
        .arg("watch")
        .arg("--snapshot")
        .arg(project.root().join("missing.json"))
        .arg(project.root())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read snapshot"));
}

/// Kills the watcher when the test ends, even on a failed assertion
struct WatchProcess {
    child: Child,
    lines: mpsc::Receiver<String>,
}

impl WatchProcess {
    fn spawn(project: &TestProject, snapshot: &Path) -> Self {
        let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin!("fastpass"))
            .env_remove("FASTPASS_CACHE_DIR")
            .env_remove("FASTPASS_CONFIG")
            .arg("--cache-dir")
            .arg(project.cache_dir())
            .arg("watch")
            .arg("--snapshot")
            .arg(snapshot)
            .arg(project.path(""))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        let stdout = child.stdout.take().unwrap();
        let (tx, lines) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self { child, lines }
    }

    /// Collect output until a line satisfies `done` or the timeout expires
    fn wait_for(&self, timeout: Duration, done: impl Fn(&str) -> bool) -> Vec<String> {
        let deadline = Instant::now() + timeout;
        let mut seen = Vec::new();
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            match self.lines.recv_timeout(remaining) {
                Ok(line) => {
                    let finished = done(&line);
                    seen.push(line);
                    if finished {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        seen
    }
}

impl Drop for WatchProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn write_import_snapshot(project: &TestProject) -> (PathBuf, PathBuf, PathBuf) {
    let util = project.write("util.ts", fixtures::math_source());
    let spec = project.write("login.spec.ts", fixtures::spec_source());

    let mut cache = project.cache();
    FakeLoader::new().load(&mut cache, &spec, &[util.clone()]);

    let snapshot_path = project.root().join("state.json");
    fs::write(&snapshot_path, cache.serialize().to_json().unwrap()).unwrap();
    (snapshot_path, util, spec)
}

#[test]
fn test_watch_reports_in_place_write() {
    let project = TestProject::new();
    let (snapshot, util, spec) = write_import_snapshot(&project);
    let watch = WatchProcess::spawn(&project, &snapshot);

    let started = watch.wait_for(Duration::from_secs(10), |l| l.starts_with("Watching"));
    assert!(started.iter().any(|l| l.starts_with("Watching")), "{started:?}");
    std::thread::sleep(Duration::from_millis(200));

    fs::write(&util, "export const add = (a: number, b: number) => a + b;\n").unwrap();

    let expected = format!("affects {}", spec.display());
    let output = watch.wait_for(Duration::from_secs(10), |l| l.trim() == expected);
    assert!(output.iter().any(|l| l.trim() == expected), "{output:?}");
}

#[test]
fn test_watch_reports_rename_over_tracked_file() {
    let project = TestProject::new();
    let (snapshot, util, spec) = write_import_snapshot(&project);
    let watch = WatchProcess::spawn(&project, &snapshot);

    let started = watch.wait_for(Duration::from_secs(10), |l| l.starts_with("Watching"));
    assert!(started.iter().any(|l| l.starts_with("Watching")), "{started:?}");
    std::thread::sleep(Duration::from_millis(200));

    // save the way vim and "safe write" editors do
    let swap = project.path(".util.ts.swp");
    fs::write(&swap, "export const add = (a: number, b: number) => a + b;\n").unwrap();
    fs::rename(&swap, &util).unwrap();

    let expected = format!("affects {}", spec.display());
    let output = watch.wait_for(Duration::from_secs(10), |l| l.trim() == expected);
    assert!(
        output.iter().any(|l| l.trim() == expected),
        "dependents of {} not reported: {output:?}",
        util.display()
    );
    let changed_util = format!("Changed: {}", util.display());
    assert!(output.iter().any(|l| l.trim() == changed_util), "{output:?}");
}

#[test]
fn test_snapshot_written_by_library_is_readable() {
    let project = TestProject::new();
    let (snapshot, _) = write_chain_snapshot(&project);

    let json = fs::read_to_string(snapshot).unwrap();
    let mut cache = CompileCache::new(project.cache_dir());
    cache.merge(StateSnapshot::from_json(&json).unwrap());
    assert_eq!(cache.len(), 3);
    assert!(Path::new(&cache.entries().next().unwrap().1.code_path).exists());
}
