use std::path::Path;
use std::process::{Command, Output};

fn asi_loader(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_asi-loader"))
        .args(args)
        .env_remove("ASI_LOADER_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run asi-loader")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn host_with_plugins(files: &[&str]) -> tempfile::TempDir {
    let host = tempfile::tempdir().unwrap();
    let plugins = host.path().join("plugins");
    std::fs::create_dir(&plugins).unwrap();
    for name in files {
        std::fs::write(plugins.join(name), b"").unwrap();
    }
    host
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_list_prints_plugins_in_load_order() {
    let host = host_with_plugins(&["b.asi", "A.asi", "c.txt"]);
    std::fs::create_dir(host.path().join("plugins").join("d.asi")).unwrap();

    let output = asi_loader(&["list", "--host-dir", path_arg(host.path())]);
    assert!(output.status.success());
    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(lines, vec!["A.asi", "b.asi"]);
}

#[test]
fn test_list_honours_config_file() {
    let host = host_with_plugins(&[]);
    let mods = host.path().join("mods");
    std::fs::create_dir(&mods).unwrap();
    std::fs::write(mods.join("x.dll"), b"").unwrap();
    std::fs::write(mods.join("y.asi"), b"").unwrap();
    std::fs::write(
        host.path().join("asi-loader.toml"),
        "[plugins]\ndirectory = \"mods\"\nextension = \"dll\"\n",
    )
    .unwrap();

    let output = asi_loader(&["list", "--host-dir", path_arg(host.path())]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "x.dll");
}

#[test]
fn test_list_missing_plugin_dir_is_empty() {
    let host = tempfile::tempdir().unwrap();
    let output = asi_loader(&["list", "--host-dir", path_arg(host.path())]);
    assert!(output.status.success());
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_check_config() {
    let dir = tempfile::tempdir().unwrap();

    let valid = dir.path().join("valid.toml");
    std::fs::write(&valid, "[anchor]\noffset = 0x5C489\nexpected = \"E8 00 00 00 00\"\n").unwrap();
    let output = asi_loader(&["check-config", path_arg(&valid)]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("is valid"));

    let invalid = dir.path().join("invalid.toml");
    std::fs::write(&invalid, "[plugins]\nextension = \"\"\n").unwrap();
    let output = asi_loader(&["check-config", path_arg(&invalid)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Configuration Error"));
}

#[test]
fn test_load_empty_plugin_dir() {
    let host = host_with_plugins(&[]);
    let output = asi_loader(&["load", "--host-dir", path_arg(host.path())]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Load mode: Threaded"));
    assert!(out.contains("Initializers run: 0"));
    assert!(!out.contains("Diagnostics:"));
}

#[test]
fn test_load_reports_broken_plugin() {
    let host = host_with_plugins(&[]);
    std::fs::write(host.path().join("plugins").join("broken.asi"), b"not a library").unwrap();

    let output = asi_loader(&["load", "--host-dir", path_arg(host.path())]);
    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.contains("Initializers run: 0"));
    assert!(out.contains("[plugin-load]"));
    assert!(out.contains("broken.asi"));
}
