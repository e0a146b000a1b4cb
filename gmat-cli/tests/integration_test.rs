//! Integration tests for gmat-cli on a small three-convolution model.

use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn gmat_cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_gmat"))
}

const LAYERS: [(&str, [usize; 2]); 3] = [
    ("conv1_weights", [8, 4]),
    ("conv2_weights", [4, 8]),
    ("conv3_weights", [2, 4]),
];

/// Write image -> conv1 -> relu -> conv2 -> conv3 with combined F32 params.
fn write_fixture(dir: &Path) -> (PathBuf, PathBuf) {
    let mut vars = vec![serde_json::json!({"name": "image", "shape": [-1, 4, 2, 2]})];
    let mut ops = Vec::new();
    let mut buffers = Vec::new();

    let mut input = "image".to_string();
    for (i, (name, [out_c, in_c])) in LAYERS.into_iter().enumerate() {
        let output = format!("conv2d_{}.tmp_0", i);
        vars.push(serde_json::json!({"name": name, "shape": [out_c, in_c, 1, 1], "persistable": true}));
        vars.push(serde_json::json!({"name": output, "shape": [-1, out_c, 2, 2]}));
        ops.push(serde_json::json!({"type": "conv2d", "inputs": [input, name], "outputs": [output]}));
        input = output;

        if i == 0 {
            vars.push(serde_json::json!({"name": "relu_0.tmp_0", "shape": [-1, out_c, 2, 2]}));
            ops.push(serde_json::json!({"type": "relu", "inputs": [input], "outputs": ["relu_0.tmp_0"]}));
            input = "relu_0.tmp_0".to_string();
        }

        let bytes: Vec<u8> = (0..out_c * in_c)
            .flat_map(|v| ((v as f32 + 1.0) * 0.01).to_le_bytes())
            .collect();
        buffers.push((name, vec![out_c, in_c, 1, 1], bytes));
    }

    let graph = serde_json::json!({
        "feed_names": ["image"],
        "fetch_names": [input],
        "vars": vars,
        "ops": ops,
    });
    let model = dir.join("model.json");
    fs::write(&model, serde_json::to_string_pretty(&graph).unwrap()).unwrap();

    let views: Vec<(&str, TensorView)> = buffers
        .iter()
        .map(|(name, shape, bytes)| (*name, TensorView::new(Dtype::F32, shape.clone(), bytes).unwrap()))
        .collect();
    let params = dir.join("params.safetensors");
    fs::write(&params, safetensors::serialize(views, None).unwrap()).unwrap();

    (model, params)
}

fn read_f32(path: &Path, name: &str) -> (Vec<usize>, Vec<f32>) {
    let data = fs::read(path).unwrap();
    let st = SafeTensors::deserialize(&data).unwrap();
    let view = st.tensor(name).unwrap();
    let values = view
        .data()
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect();
    (view.shape().to_vec(), values)
}

fn assert_success(output: &Output, what: &str) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "{} failed:\nstdout: {}\nstderr: {}", what, stdout, stderr);
}

// ==================== sparsify tests ====================

#[test]
fn test_sparsify_with_ratio() {
    let dir = TempDir::new().unwrap();
    let (model, params) = write_fixture(dir.path());
    let output_dir = dir.path().join("sparse");

    let output = gmat_cli()
        .args(["sparsify", "--model", model.to_str().unwrap()])
        .args(["--params", params.to_str().unwrap()])
        .args(["--ratio", "0.5"])
        .args(["--output", output_dir.to_str().unwrap()])
        .output()
        .expect("Failed to run gmat sparsify");
    assert_success(&output, "sparsify");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[1/3] conv1_weights"));
    assert!(stdout.contains("Sparsification complete"));

    assert!(output_dir.join("model.json").is_file());
    let (shape, values) = read_f32(&output_dir.join("params.safetensors"), "conv1_weights");
    assert_eq!(shape, vec![8, 4, 1, 1]);
    assert_eq!(values.iter().filter(|&&v| v == 0.0).count(), 16);
    // smallest magnitudes come first in the fixture
    assert!(values[..16].iter().all(|&v| v == 0.0));
}

#[test]
fn test_sparsify_with_config_file() {
    let dir = TempDir::new().unwrap();
    let (model, params) = write_fixture(dir.path());
    let config = dir.path().join("prune_config.json");
    fs::write(&config, r#"{"ratio": 0.25}"#).unwrap();
    let output_dir = dir.path().join("sparse");

    let output = gmat_cli()
        .args(["sparsify", "--model", model.to_str().unwrap()])
        .args(["--params", params.to_str().unwrap()])
        .args(["--config", config.to_str().unwrap()])
        .args(["--output", output_dir.to_str().unwrap()])
        .output()
        .expect("Failed to run gmat sparsify");
    assert_success(&output, "sparsify --config");

    let (_, values) = read_f32(&output_dir.join("params.safetensors"), "conv2_weights");
    assert_eq!(values.iter().filter(|&&v| v == 0.0).count(), 8);
}

#[test]
fn test_sparsify_requires_ratio_or_config() {
    let dir = TempDir::new().unwrap();
    let (model, _) = write_fixture(dir.path());

    let output = gmat_cli()
        .args(["sparsify", "--model", model.to_str().unwrap()])
        .output()
        .expect("Failed to run gmat sparsify");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--ratio or --config is required"), "stderr: {}", stderr);
}

#[test]
fn test_sparsify_missing_model() {
    let dir = TempDir::new().unwrap();

    let output = gmat_cli()
        .args(["sparsify", "--model", "/nonexistent/model.json", "--ratio", "0.5"])
        .args(["--output", dir.path().join("out").to_str().unwrap()])
        .output()
        .expect("Failed to run gmat sparsify");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Model file does not exist"), "stderr: {}", stderr);
}

#[test]
fn test_sparsify_abnormal_sparsity_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let (model, params) = write_fixture(dir.path());
    let output_dir = dir.path().join("sparse");

    // 32 elements at 0.3 -> 9 zeros = 0.28
    let output = gmat_cli()
        .args(["sparsify", "--model", model.to_str().unwrap()])
        .args(["--params", params.to_str().unwrap()])
        .args(["--ratio", "0.3"])
        .args(["--output", output_dir.to_str().unwrap()])
        .output()
        .expect("Failed to run gmat sparsify");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sparsity is abnormal"), "stderr: {}", stderr);
    assert!(!output_dir.exists());
}

#[test]
fn test_sparsify_generate_config() {
    let dir = TempDir::new().unwrap();
    let (model, params) = write_fixture(dir.path());

    let output = gmat_cli()
        .current_dir(dir.path())
        .args(["sparsify", "--model", model.to_str().unwrap()])
        .args(["--params", params.to_str().unwrap()])
        .arg("--generate-config")
        .output()
        .expect("Failed to run gmat sparsify");
    assert_success(&output, "sparsify --generate-config");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Found 3 sparsifiable tensor(s)"));
    assert!(stdout.contains("Generated prune_config.json"));

    let config: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("prune_config.json")).unwrap()).unwrap();
    assert_eq!(config["ratio"], 0.5);
    assert_eq!(config["rules"]["only"][0], "conv1_weights");
    assert_eq!(config["rules"]["only"].as_array().unwrap().len(), 3);
}

#[test]
fn test_sparsify_config_only_list_restricts_tensors() {
    let dir = TempDir::new().unwrap();
    let (model, params) = write_fixture(dir.path());
    let config = dir.path().join("prune_config.json");
    fs::write(&config, r#"{"ratio": 0.5, "rules": {"only": ["conv2_weights"]}}"#).unwrap();
    let output_dir = dir.path().join("sparse");

    let output = gmat_cli()
        .args(["sparsify", "--model", model.to_str().unwrap()])
        .args(["--params", params.to_str().unwrap()])
        .args(["--config", config.to_str().unwrap()])
        .args(["--output", output_dir.to_str().unwrap()])
        .output()
        .expect("Failed to run gmat sparsify");
    assert_success(&output, "sparsify with only list");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[1/1] conv2_weights"), "stdout: {}", stdout);

    let params_out = output_dir.join("params.safetensors");
    let (_, conv1) = read_f32(&params_out, "conv1_weights");
    assert!(conv1.iter().all(|&v| v != 0.0));
    let (_, conv2) = read_f32(&params_out, "conv2_weights");
    assert_eq!(conv2.iter().filter(|&&v| v == 0.0).count(), 16);
}

// ==================== prune tests ====================

#[test]
fn test_prune_with_criterion() {
    let dir = TempDir::new().unwrap();
    let (model, params) = write_fixture(dir.path());
    let output_dir = dir.path().join("pruned");

    let output = gmat_cli()
        .args(["prune", "--model", model.to_str().unwrap()])
        .args(["--params", params.to_str().unwrap()])
        .args(["--ratio", "0.5", "--criterion", "l2"])
        .args(["--output", output_dir.to_str().unwrap()])
        .output()
        .expect("Failed to run gmat prune");
    assert_success(&output, "prune");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[1/2] conv1_weights -> removed 4/8 filters"));
    assert!(stdout.contains("[2/2] conv2_weights -> removed 2/4 filters"));
    assert!(stdout.contains("Parameters: 72 -> 28"));

    let params_out = output_dir.join("params.safetensors");
    assert_eq!(read_f32(&params_out, "conv1_weights").0, vec![4, 4, 1, 1]);
    assert_eq!(read_f32(&params_out, "conv2_weights").0, vec![2, 4, 1, 1]);
    assert_eq!(read_f32(&params_out, "conv3_weights").0, vec![2, 2, 1, 1]);

    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output_dir.join("model.json")).unwrap()).unwrap();
    assert_eq!(saved["fetch_names"][0], "conv2d_2.tmp_0");
}

#[test]
fn test_prune_rejects_unknown_criterion() {
    let dir = TempDir::new().unwrap();
    let (model, _) = write_fixture(dir.path());

    let output = gmat_cli()
        .args(["prune", "--model", model.to_str().unwrap()])
        .args(["--ratio", "0.5", "--criterion", "fpgm"])
        .output()
        .expect("Failed to run gmat prune");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown criterion"), "stderr: {}", stderr);
}

#[test]
fn test_prune_generate_config() {
    let dir = TempDir::new().unwrap();
    let (model, params) = write_fixture(dir.path());

    let output = gmat_cli()
        .current_dir(dir.path())
        .args(["prune", "--model", model.to_str().unwrap()])
        .args(["--params", params.to_str().unwrap()])
        .arg("--generate-config")
        .output()
        .expect("Failed to run gmat prune");
    assert_success(&output, "prune --generate-config");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Found 3 convolution(s)"));
    assert!(stdout.contains("[3/3] conv3_weights"));

    let config: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("prune_config.json")).unwrap()).unwrap();
    assert_eq!(config["rules"]["only"][2], "conv3_weights");
}

#[test]
fn test_prune_config_only_list_restricts_filters() {
    let dir = TempDir::new().unwrap();
    let (model, params) = write_fixture(dir.path());
    let config = dir.path().join("prune_config.json");
    fs::write(
        &config,
        r#"{"ratio": 0.5, "rules": {"only": ["conv1_weights", "conv2_weights"]}}"#,
    )
    .unwrap();
    let output_dir = dir.path().join("pruned");

    let output = gmat_cli()
        .args(["prune", "--model", model.to_str().unwrap()])
        .args(["--params", params.to_str().unwrap()])
        .args(["--config", config.to_str().unwrap()])
        .args(["--output", output_dir.to_str().unwrap()])
        .output()
        .expect("Failed to run gmat prune");
    assert_success(&output, "prune with only list");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[1/1] conv1_weights -> removed 4/8 filters"), "stdout: {}", stdout);

    // conv2 is the last allowed convolution: only its input channels shrink
    let params_out = output_dir.join("params.safetensors");
    assert_eq!(read_f32(&params_out, "conv1_weights").0, vec![4, 4, 1, 1]);
    assert_eq!(read_f32(&params_out, "conv2_weights").0, vec![4, 4, 1, 1]);
    assert_eq!(read_f32(&params_out, "conv3_weights").0, vec![2, 4, 1, 1]);
}
