use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn kancli(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kancli"))
        .arg("--dir")
        .arg(dir)
        .args(args)
        .env_remove("KANCLI_DIR")
        .output()
        .expect("failed to run kancli")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn list_creates_default_config_on_first_run() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("board");

    let output = kancli(&dir, &["list"]);

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("To Do (0)"));
    assert!(text.contains("In Progress (0)"));
    assert!(text.contains("Done (0)"));
    let config = fs::read_to_string(dir.join("config.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&config).unwrap();
    assert_eq!(value["Lists"].as_array().unwrap().len(), 3);
    assert!(dir.join("tasks").is_dir());
}

#[test]
fn list_shows_titles_and_filters_by_column() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("board");
    fs::create_dir_all(&dir).unwrap();
    let todo = tmp.path().join("todo.md");
    let done = tmp.path().join("done.md");
    fs::write(&todo, "# Buy milk\nsemi-skimmed").unwrap();
    fs::write(&done, "# File taxes").unwrap();
    let config = serde_json::json!({
        "Lists": [
            {"items": [todo.display().to_string()]},
            {"items": []},
            {"items": [done.display().to_string()]},
        ]
    });
    fs::write(dir.join("config.json"), config.to_string()).unwrap();

    let all = stdout(&kancli(&dir, &["list"]));
    assert!(all.contains("Buy milk"));
    assert!(all.contains("File taxes"));

    let only_done = stdout(&kancli(&dir, &["list", "--column", "done"]));
    assert!(only_done.contains("Done (1)"));
    assert!(only_done.contains("File taxes"));
    assert!(!only_done.contains("Buy milk"));
}

#[test]
fn malformed_config_is_backed_up_and_regenerated() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("board");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.json"), "{not json").unwrap();

    let output = kancli(&dir, &["list"]);

    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(dir.join("config.json.bak")).unwrap(),
        "{not json"
    );
    assert!(stdout(&output).contains("To Do (0)"));
}

#[test]
fn paths_reports_the_data_directory() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("board");

    let text = stdout(&kancli(&dir, &["paths"]));

    assert!(text.contains(&dir.join("config.json").display().to_string()));
    assert!(text.contains(&dir.join("tasks").display().to_string()));
    assert!(!dir.exists());
}
