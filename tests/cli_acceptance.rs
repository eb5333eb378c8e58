/// Acceptance tests for the batchcache command line
///
/// Houdini is replaced by a small shell script speaking the bridge protocol,
/// so these run anywhere a POSIX shell is available.
mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

use common::TestStudio;

/// batchcache binary isolated from any config on the machine
fn batchcache(studio: &TestStudio) -> Command {
    let mut cmd = Command::new(std::env!("CARGO_BIN_EXE_batchcache"));
    cmd.current_dir(studio.path())
        .env("HOME", studio.path())
        .env("BATCHCACHE_LOG_FORMAT", "compact")
        .env_remove("BATCHCACHE_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_plan_shows_merged_scenes() {
    let studio = TestStudio::new();
    let job = studio.write(
        "job.csv",
        "shot.hip, sequential, /obj/a, /obj/b\nfx.hip, parallel, /obj/c\nshot.hip, parallel, /obj/d\n",
    );

    batchcache(&studio)
        .arg("plan")
        .arg(&job)
        .assert()
        .success()
        .stdout(predicate::str::contains("shot.hip\n  1. sequential (2): /obj/a, /obj/b\n  2. parallel (1): /obj/d"))
        .stdout(predicate::str::contains("2 scene(s), 3 batch(es), 4 unit(s)"));
}

#[test]
fn test_plan_rejected_row_exits_two() {
    let studio = TestStudio::new();
    let job = studio.write("job.csv", "shot.hip, whenever, /obj/a\nshot.hip, parallel, /obj/b\n");

    batchcache(&studio)
        .arg("plan")
        .arg(&job)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("1 rejected"))
        .stderr(predicate::str::contains("whenever"));
}

#[test]
fn test_merge_writes_output_file() {
    let studio = TestStudio::new();
    let job = studio.write(
        "job.csv",
        "shot.hip, parallel, /obj/a, /obj/b\nshot.hip, parallel, /obj/b, /obj/c\n\nshot.hip\n",
    );
    let output = studio.path().join("merged.csv");

    batchcache(&studio)
        .arg("merge")
        .arg(&job)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "shot.hip,parallel,/obj/a,/obj/b,/obj/c\n"
    );
}

#[test]
fn test_merge_to_stdout_quotes_commas() {
    let studio = TestStudio::new();
    let job = studio.write("job.csv", "\"shots/a,b.hip\", sequential, /obj/a\n");

    batchcache(&studio)
        .arg("merge")
        .arg(&job)
        .assert()
        .success()
        .stdout("\"shots/a,b.hip\",sequential,/obj/a\n");
}

#[test]
fn test_missing_job_file_fails() {
    let studio = TestStudio::new();

    batchcache(&studio)
        .arg("no-such-job.csv")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read job file"));
}

#[test]
fn test_empty_job_succeeds_without_houdini() {
    let studio = TestStudio::new();
    let job = studio.write("job.csv", "\n\n");

    batchcache(&studio)
        .arg("run")
        .arg(&job)
        .arg("--config-hython")
        .arg("definitely-not-hython")
        .assert()
        .success();
}

#[test]
fn test_missing_bridge_script_exits_two() {
    let studio = TestStudio::new();
    let scene = studio.scene("shot.hip");
    let job = studio.write("job.csv", &format!("{}, sequential, /obj/a\n", scene));

    batchcache(&studio)
        .arg(&job)
        .arg("--config-bridge-script")
        .arg(studio.path().join("nowhere.py"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Bridge script not found"));
}

#[test]
fn test_config_generate_and_validate() {
    let studio = TestStudio::new();

    let generated = batchcache(&studio)
        .args(["config", "generate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[polling]"))
        .get_output()
        .stdout
        .clone();

    let path = studio.path().join("batchcache.toml");
    fs::write(&path, generated).unwrap();

    batchcache(&studio)
        .args(["config", "validate"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file is valid"));
}

#[test]
fn test_config_show_reads_discovered_file() {
    let studio = TestStudio::new();
    studio.write(
        "batchcache.toml",
        "[execution]\nmax_parallel_units = 7\n\n[polling]\ninterval = \"2s\"\n",
    );

    batchcache(&studio)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("max_parallel_units = 7"))
        .stdout(predicate::str::contains("poll_interval      = 2s"));
}

#[test]
fn test_config_validate_rejects_bad_duration() {
    let studio = TestStudio::new();
    let path = studio.write("bad.toml", "[polling]\nstall_timeout = \"forever\"\n");

    batchcache(&studio)
        .args(["config", "validate"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("stall_timeout"));
}

#[cfg(unix)]
#[test]
fn test_run_against_fake_bridge() {
    let studio = TestStudio::new();
    let scene = studio.scene("shot.hip");
    let template = studio.bgeo_template("sim", 1);
    let prefix = studio.path().join("cache").join("sim.");

    let bridge = studio.write(
        "bridge.sh",
        &format!(
            r#"
[ "$1" = "serve" ] || exit 3
while IFS= read -r line; do
  case "$line" in
    *'"op":"load"'*) echo '{{"status":"ok"}}' ;;
    *'/obj/missing'*) echo '{{"status":"not_found","message":"/obj/missing"}}' ;;
    *'"op":"probe"'*) echo '{{"status":"ok","parameters":{{"output_template":"{template}","file_type":0,"start_frame":1,"end_frame":3}}}}' ;;
    *'"op":"trigger"'*)
      ( for f in 0001 0002 0003; do printf data > "{prefix}$f.bgeo.sc"; done ) &
      echo '{{"status":"ok"}}' ;;
    *'"op":"quit"'*) echo '{{"status":"ok"}}'; exit 0 ;;
    *) echo '{{"status":"error","message":"unknown"}}' ;;
  esac
done
"#,
            template = template,
            prefix = prefix.display()
        ),
    );
    let job = studio.write(
        "job.csv",
        &format!("{}, sequential, /obj/sim, /obj/missing\n", scene),
    );

    batchcache(&studio)
        .arg("run")
        .arg(&job)
        .arg("--config-hython")
        .arg("sh")
        .arg("--config-bridge-script")
        .arg(&bridge)
        .arg("--config-poll-interval")
        .arg("20ms")
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Cached /obj/sim"))
        .stdout(predicate::str::contains("Failed /obj/missing"))
        .stdout(predicate::str::contains("1 unit(s) failed"));

    assert!(studio.bgeo_frame("sim", 3).exists());
}

#[cfg(unix)]
#[test]
fn test_second_interrupt_exits_while_bridge_hangs() {
    use std::process::{Command as StdCommand, Stdio};
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    let studio = TestStudio::new();
    let scene = studio.scene("stuck.hip");
    let bridge = studio.write("bridge.sh", "while read -r line; do sleep 60; done\n");
    let job = studio.write("job.csv", &format!("{}, sequential, /obj/a\n", scene));

    let mut child = StdCommand::new(std::env!("CARGO_BIN_EXE_batchcache"))
        .current_dir(studio.path())
        .env("HOME", studio.path())
        .env_remove("BATCHCACHE_CONFIG")
        .arg("run")
        .arg(&job)
        .arg("--config-hython")
        .arg("sh")
        .arg("--config-bridge-script")
        .arg(&bridge)
        .arg("--config-request-timeout")
        .arg("off")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let interrupt = |pid: u32| {
        StdCommand::new("kill")
            .args(["-INT", &pid.to_string()])
            .status()
            .unwrap();
    };

    sleep(Duration::from_secs(1));
    interrupt(child.id());
    sleep(Duration::from_millis(300));
    assert!(child.try_wait().unwrap().is_none(), "first Ctrl-C must not exit");
    interrupt(child.id());

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("batchcache did not exit after the second Ctrl-C");
        }
        sleep(Duration::from_millis(50));
    };
    assert_eq!(status.code(), Some(130));
}
