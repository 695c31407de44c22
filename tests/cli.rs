use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::Builder;
use tempfile::NamedTempFile;

fn write_scene() -> NamedTempFile {
    let scene = r#"<scene>
  <object>
    <name>ground</name>
    <mesh>plane</mesh>
    <scale>20</scale>
  </object>
  <object>
    <name>box</name>
    <mesh>cube</mesh>
    <position>0 1 0</position>
    <scale>2</scale>
    <color>200 50 50</color>
  </object>
  <camera>
    <position>0 5 10</position>
    <target>0 0 0</target>
  </camera>
  <shadows>
    <algorithm>pcss</algorithm>
    <pattern>rotated</pattern>
    <samples>12</samples>
    <resolution>256</resolution>
  </shadows>
</scene>
"#;
    let mut tmp = Builder::new()
        .suffix(".xml")
        .tempfile()
        .expect("temp scene");
    tmp.write_all(scene.as_bytes()).expect("write scene");
    tmp
}

fn penumbra() -> Command {
    Command::cargo_bin("penumbra").expect("binary exists")
}

#[test]
fn summary_reports_objects_and_pick() {
    let scene = write_scene();
    let mut cmd = penumbra();
    cmd.arg(scene.path())
        .args(["--summary-only", "--size", "160x120", "--pick", "80,60"]);
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 2 object(s)"))
        .stdout(contains("Shadows: pcss, rotated pattern, 12 sample(s)"))
        .stdout(contains("shadow map 256x256"))
        .stdout(contains(" - [0] ground:"))
        .stdout(contains(" - [1] box:"))
        .stdout(contains("Picked: box (id 1)"));
}

#[test]
fn pick_above_the_horizon_hits_nothing() {
    let scene = write_scene();
    let mut cmd = penumbra();
    cmd.arg(scene.path())
        .args(["--summary-only", "--size", "160x120", "--pick", "2,2"]);
    cmd.assert().success().stdout(contains("Picked: none"));
}

#[test]
fn command_line_overrides_scene_settings() {
    let scene = write_scene();
    let mut cmd = penumbra();
    cmd.arg(scene.path()).args([
        "--summary-only",
        "--size",
        "64x48",
        "--algorithm",
        "hard",
        "--pattern",
        "grid",
        "--samples",
        "500",
        "--shadow-resolution",
        "128",
    ]);
    cmd.assert()
        .success()
        .stdout(contains("Shadows: hard, grid pattern, 64 sample(s)"))
        .stdout(contains("shadow map 128x128"))
        .stdout(contains("Picked").not());
}

#[test]
fn unknown_argument_fails() {
    penumbra()
        .args(["--summary-only", "--bogus"])
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --bogus"));
}

#[test]
fn missing_scene_file_fails() {
    penumbra()
        .args(["/nonexistent/scene.xml", "--summary-only"])
        .assert()
        .failure()
        .stderr(contains("/nonexistent/scene.xml"));
}

#[test]
fn oversized_shadow_map_is_rejected() {
    penumbra()
        .args(["--summary-only", "--size", "32x24", "--shadow-resolution", "70000"])
        .assert()
        .failure()
        .stderr(contains("failed to create shadow map"));
}
