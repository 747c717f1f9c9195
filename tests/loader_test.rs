use spawntable::runtime::loader::load_task_list;
use spawntable::runtime::task::PathPair;
use std::fs;

#[test]
fn test_load_json_task_list() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("zfish.tasks");
    fs::write(&file_path, r#"[["x0_y0_z0/", "x1_y0_z0/"], ["x0_y0_z0/", "x0_y1_z0/"]]"#)
        .expect("Failed to write temp file");

    let pairs = load_task_list(&file_path).expect("Failed to load task list");

    assert_eq!(
        pairs,
        vec![
            PathPair::new("x0_y0_z0/", "x1_y0_z0/"),
            PathPair::new("x0_y0_z0/", "x0_y1_z0/"),
        ]
    );
}

#[test]
fn test_load_yaml_task_list() {
    let yaml_content = r#"
- ["volA/", "volB/"]
- - "volB/"
  - "volC/"
"#;
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("tasks.yaml");
    fs::write(&file_path, yaml_content).expect("Failed to write temp file");

    let pairs = load_task_list(&file_path).expect("Failed to load task list");

    assert_eq!(pairs, vec![PathPair::new("volA/", "volB/"), PathPair::new("volB/", "volC/")]);
}

#[test]
fn test_empty_task_list_is_valid() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("empty.tasks");
    fs::write(&file_path, "[]").expect("Failed to write temp file");

    assert!(load_task_list(&file_path).unwrap().is_empty());
}

#[test]
fn test_malformed_pair_is_rejected() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("bad.tasks");
    fs::write(&file_path, r#"[["only-one/"]]"#).expect("Failed to write temp file");

    let err = load_task_list(&file_path).unwrap_err();
    assert!(err.to_string().contains("Failed to deserialize JSON task list"));
}

#[test]
fn test_missing_task_list_names_the_file() {
    let err = load_task_list("/nonexistent/zfish.tasks").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/zfish.tasks"));
}
