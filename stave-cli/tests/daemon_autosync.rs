use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use stave_core::{config, IndexFilter};
use tempfile::TempDir;

fn stave_bin() -> PathBuf {
    PathBuf::from(assert_cmd::cargo::cargo_bin!("stave"))
}

fn stave(home: &Path, args: &[&str]) -> Option<serde_json::Value> {
    let output = Command::new(stave_bin())
        .env("HOME", home)
        .env("USERPROFILE", home)
        .args(args)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    serde_json::from_slice(&output.stdout).ok()
}

struct DaemonProcess {
    child: Child,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(home: PathBuf) -> Self {
        let child = Command::new(stave_bin())
            .env("HOME", &home)
            .env("USERPROFILE", &home)
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");
        Self { child, home }
    }

    fn stop(&mut self) {
        let _ = stave(&self.home, &["daemon", "stop"]);

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn wait_for<F>(timeout: Duration, mut ready: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if ready() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

fn unit_uris(home: &Path) -> Vec<String> {
    stave(home, &["daemon", "units"])
        .and_then(|payload| {
            payload["units"].as_array().map(|units| {
                units
                    .iter()
                    .filter_map(|unit| unit["uri"].as_str().map(str::to_owned))
                    .collect()
            })
        })
        .unwrap_or_default()
}

#[test]
fn daemon_picks_up_new_and_deleted_files() {
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let root = fs::canonicalize(workspace.path()).expect("canonical");
    fs::write(root.join("A.groovy"), "class A {}").expect("write");
    config::init_at(
        root.clone(),
        IndexFilter::unrestricted(),
        Vec::new(),
        home.path(),
    )
    .expect("init config");

    let _daemon = DaemonProcess::start(home.path().to_path_buf());
    assert!(
        wait_for(Duration::from_secs(10), || unit_uris(home.path()).len() == 1),
        "daemon never indexed the initial file"
    );

    fs::write(root.join("B.groovy"), "class B {}").expect("write");
    assert!(
        wait_for(Duration::from_secs(10), || {
            unit_uris(home.path())
                .iter()
                .any(|uri| uri.ends_with("/B.groovy"))
        }),
        "watcher never added the new file"
    );

    fs::remove_file(root.join("A.groovy")).expect("remove");
    assert!(
        wait_for(Duration::from_secs(10), || {
            let uris = unit_uris(home.path());
            uris.len() == 1 && uris[0].ends_with("/B.groovy")
        }),
        "watcher never pruned the deleted file"
    );

    let status = stave(home.path(), &["daemon", "status"]).expect("status");
    assert_eq!(status["running"], true);
    assert!(status["passes"].as_u64().unwrap_or(0) >= 3);
}

#[test]
fn classpath_command_rebuilds_daemon_model() {
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let root = fs::canonicalize(workspace.path()).expect("canonical");
    fs::write(root.join("A.groovy"), "class A {}").expect("write");
    let jar = root.join("lib.jar");
    fs::write(&jar, "jar").expect("write jar");
    config::init_at(
        root.clone(),
        IndexFilter::unrestricted(),
        Vec::new(),
        home.path(),
    )
    .expect("init config");

    let _daemon = DaemonProcess::start(home.path().to_path_buf());
    assert!(
        wait_for(Duration::from_secs(10), || unit_uris(home.path()).len() == 1),
        "daemon never indexed the initial file"
    );
    let before = stave(home.path(), &["daemon", "units"]).expect("units");

    let jar_arg = jar.display().to_string();
    let summary =
        stave(home.path(), &["daemon", "classpath", jar_arg.as_str()]).expect("classpath");
    assert_eq!(summary["rebuilt"], true);
    assert_eq!(summary["units"], 1);

    let after = stave(home.path(), &["daemon", "units"]).expect("units");
    assert_ne!(after["fingerprint"], before["fingerprint"]);
}
