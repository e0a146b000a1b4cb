//! Loading and saving inference models.
//!
//! A model is a JSON program file (the serialized [`Graph`]) plus its
//! persistable parameters in SafeTensors format, either:
//! - combined: one parameter file holding every parameter, or
//! - separate: one `<param>.safetensors` file per parameter next to the model file.

use safetensors::tensor::TensorView;
use safetensors::SafeTensors;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dtype::{bytes_to_f32, f32_to_bytes, ParamDtype};
use crate::error::{Result, StorageError};
use crate::graph::{Graph, VarDesc};
use crate::scope::ParamScope;
use crate::tensor::ParamTensor;

/// File extension used for separately stored parameters.
pub const PARAM_FILE_EXT: &str = "safetensors";

/// A loaded inference model with the file names it was loaded from.
#[derive(Debug, Clone)]
pub struct InferenceModel {
    pub graph: Graph,
    pub scope: ParamScope,
    /// File name (no directory) of the model file.
    pub model_filename: String,
    /// File name of the combined parameter file, `None` for separate files.
    pub params_filename: Option<String>,
}

/// Load a model file and its parameters.
///
/// Both files are located in the model file's directory. `param_file` is
/// optional: without it every parameter is read from its own file.
pub fn load_inference_model(model_file: &Path, param_file: Option<&Path>) -> Result<InferenceModel> {
    if !model_file.is_file() {
        return Err(StorageError::MissingModelFile(model_file.to_path_buf()));
    }
    if let Some(path) = param_file {
        if !path.is_file() {
            return Err(StorageError::MissingParamFile(path.to_path_buf()));
        }
    }

    let folder = model_file.parent().unwrap_or_else(|| Path::new("."));
    let model_filename = file_name(model_file)?;
    let params_filename = param_file.map(file_name).transpose()?;

    let json = fs::read_to_string(model_file).map_err(|e| StorageError::io(model_file, e))?;
    let graph: Graph = serde_json::from_str(&json).map_err(|source| StorageError::ModelFormat {
        path: model_file.to_path_buf(),
        source,
    })?;
    graph.validate()?;

    let scope = match params_filename.as_deref() {
        Some(name) => load_combined_params(&graph, &folder.join(name))?,
        None => load_separate_params(&graph, folder)?,
    };

    info!(
        model = %model_file.display(),
        ops = graph.ops.len(),
        params = scope.len(),
        "loaded inference model"
    );

    Ok(InferenceModel {
        graph,
        scope,
        model_filename,
        params_filename,
    })
}

/// Save a model and its parameters under `save_dir`, returning the model file path.
///
/// The written graph uses the given feed and fetch names. Parameters keep
/// their original dtype.
pub fn save_inference_model(
    save_dir: &Path,
    graph: &Graph,
    scope: &ParamScope,
    feed_names: &[String],
    fetch_names: &[String],
    model_filename: &str,
    params_filename: Option<&str>,
) -> Result<PathBuf> {
    fs::create_dir_all(save_dir).map_err(|e| StorageError::io(save_dir, e))?;

    let mut program = graph.clone();
    program.feed_names = feed_names.to_vec();
    program.fetch_names = fetch_names.to_vec();
    program.validate()?;

    let params: Vec<(&str, &ParamTensor)> = program
        .params()
        .map(|var| scope.require(&var.name).map(|t| (var.name.as_str(), t)))
        .collect::<Result<_>>()?;

    match params_filename {
        Some(name) => write_safetensors(&save_dir.join(name), &params)?,
        None => {
            for &(name, tensor) in &params {
                let path = save_dir.join(format!("{}.{}", name, PARAM_FILE_EXT));
                write_safetensors(&path, &[(name, tensor)])?;
            }
        }
    }

    let model_path = save_dir.join(model_filename);
    let json = serde_json::to_string_pretty(&program).map_err(|source| StorageError::ModelFormat {
        path: model_path.clone(),
        source,
    })?;
    fs::write(&model_path, json).map_err(|e| StorageError::io(&model_path, e))?;

    info!(path = %model_path.display(), params = params.len(), "saved inference model");
    Ok(model_path)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StorageError::io(path, std::io::Error::other("path has no file name")))
}

fn load_combined_params(graph: &Graph, path: &Path) -> Result<ParamScope> {
    let data = fs::read(path).map_err(|e| StorageError::io(path, e))?;
    let st = SafeTensors::deserialize(&data).map_err(|e| StorageError::safetensors(path, e))?;

    let mut scope = ParamScope::new();
    for var in graph.params() {
        let view = st
            .tensor(&var.name)
            .map_err(|_| StorageError::MissingParameter(var.name.clone()))?;
        scope.insert(var.name.clone(), decode_tensor(var, &view)?);
    }

    let declared = scope.len();
    let stored = st.names().len();
    if stored > declared {
        warn!(
            path = %path.display(),
            unused = stored - declared,
            "parameter file holds tensors not declared by the graph"
        );
    }
    Ok(scope)
}

fn load_separate_params(graph: &Graph, folder: &Path) -> Result<ParamScope> {
    let mut scope = ParamScope::new();
    for var in graph.params() {
        let path = folder.join(format!("{}.{}", var.name, PARAM_FILE_EXT));
        if !path.is_file() {
            return Err(StorageError::MissingParameter(var.name.clone()));
        }
        let data = fs::read(&path).map_err(|e| StorageError::io(&path, e))?;
        let st = SafeTensors::deserialize(&data).map_err(|e| StorageError::safetensors(&path, e))?;
        let view = st
            .tensor(&var.name)
            .map_err(|_| StorageError::MissingParameter(var.name.clone()))?;
        debug!(param = %var.name, path = %path.display(), "loaded parameter");
        scope.insert(var.name.clone(), decode_tensor(var, &view)?);
    }
    Ok(scope)
}

fn decode_tensor(var: &VarDesc, view: &TensorView<'_>) -> Result<ParamTensor> {
    let shape = view.shape().to_vec();
    if !var.matches(&shape) {
        return Err(StorageError::ShapeMismatch {
            name: var.name.clone(),
            expected: var.shape.clone(),
            got: shape,
        });
    }

    let dtype = ParamDtype::try_from(view.dtype())?;
    let numel: usize = shape.iter().product();
    let values = bytes_to_f32(view.data(), dtype, numel)?;
    ParamTensor::with_dtype(shape, values, dtype)
}

fn write_safetensors(path: &Path, tensors: &[(&str, &ParamTensor)]) -> Result<()> {
    let encoded: Vec<(&str, ParamDtype, Vec<usize>, Vec<u8>)> = tensors
        .iter()
        .map(|&(name, t)| (name, t.dtype(), t.shape().to_vec(), f32_to_bytes(t.values(), t.dtype())))
        .collect();

    let views = encoded
        .iter()
        .map(|(name, dtype, shape, bytes)| {
            TensorView::new(dtype.to_safetensors(), shape.clone(), bytes)
                .map(|view| (*name, view))
                .map_err(|e| StorageError::safetensors(path, e))
        })
        .collect::<Result<Vec<_>>>()?;

    let bytes = safetensors::serialize(views, None).map_err(|e| StorageError::safetensors(path, e))?;
    fs::write(path, bytes).map_err(|e| StorageError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OpDesc;
    use tempfile::TempDir;

    fn sample_model() -> (Graph, ParamScope) {
        let mut graph = Graph::new(vec!["image".into()], vec!["conv2d_0.tmp_0".into()]);
        graph
            .add_var(VarDesc::activation("image", &[-1, 2, 4, 4]))
            .add_var(VarDesc::param("conv1_weights", &[3, 2, 1, 1]))
            .add_var(VarDesc::param("conv1_bias", &[3]))
            .add_var(VarDesc::activation("conv2d_0.tmp_0", &[-1, 3, 4, 4]))
            .add_op(OpDesc::new(
                "conv2d",
                ["image", "conv1_weights", "conv1_bias"],
                ["conv2d_0.tmp_0"],
            ));

        let mut scope = ParamScope::new();
        scope.insert(
            "conv1_weights",
            ParamTensor::new(vec![3, 2, 1, 1], vec![0.5, -1.0, 0.0, 2.0, 1.5, -0.25]).unwrap(),
        );
        scope.insert(
            "conv1_bias",
            ParamTensor::with_dtype(vec![3], vec![0.5, 1.0, -2.0], ParamDtype::F16).unwrap(),
        );
        (graph, scope)
    }

    // ==================== load precondition tests ====================

    #[test]
    fn test_load_missing_model_file() {
        let err = load_inference_model(Path::new("/nonexistent/model.json"), None).unwrap_err();
        assert!(matches!(err, StorageError::MissingModelFile(_)));
    }

    #[test]
    fn test_load_missing_param_file() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("model.json");
        fs::write(&model, "{}").unwrap();

        let err = load_inference_model(&model, Some(&dir.path().join("params.safetensors"))).unwrap_err();
        assert!(matches!(err, StorageError::MissingParamFile(_)));
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("model.json");
        fs::write(&model, "not valid json").unwrap();

        let err = load_inference_model(&model, None).unwrap_err();
        assert!(err.to_string().contains("Failed to parse model file"));
    }

    #[test]
    fn test_load_separate_missing_parameter() {
        let dir = TempDir::new().unwrap();
        let (graph, _) = sample_model();
        let model = dir.path().join("model.json");
        fs::write(&model, serde_json::to_string(&graph).unwrap()).unwrap();

        let err = load_inference_model(&model, None).unwrap_err();
        assert!(matches!(err, StorageError::MissingParameter(_)));
    }

    // ==================== save/load tests ====================

    #[test]
    fn test_save_load_combined() {
        let dir = TempDir::new().unwrap();
        let (graph, scope) = sample_model();

        let path = save_inference_model(
            dir.path(),
            &graph,
            &scope,
            &graph.feed_names,
            &graph.fetch_names,
            "model.json",
            Some("params.safetensors"),
        )
        .unwrap();
        assert_eq!(path, dir.path().join("model.json"));
        assert!(dir.path().join("params.safetensors").is_file());

        let loaded = load_inference_model(&path, Some(&dir.path().join("params.safetensors"))).unwrap();
        assert_eq!(loaded.graph, graph);
        assert_eq!(loaded.model_filename, "model.json");
        assert_eq!(loaded.params_filename.as_deref(), Some("params.safetensors"));
        assert_eq!(loaded.scope.get("conv1_weights"), scope.get("conv1_weights"));

        let bias = loaded.scope.get("conv1_bias").unwrap();
        assert_eq!(bias.dtype(), ParamDtype::F16);
        assert_eq!(bias.values(), &[0.5, 1.0, -2.0]);
    }

    #[test]
    fn test_save_load_separate() {
        let dir = TempDir::new().unwrap();
        let (graph, scope) = sample_model();

        let path = save_inference_model(
            dir.path(),
            &graph,
            &scope,
            &graph.feed_names,
            &graph.fetch_names,
            "__model__",
            None,
        )
        .unwrap();
        assert!(dir.path().join("conv1_weights.safetensors").is_file());
        assert!(dir.path().join("conv1_bias.safetensors").is_file());

        let loaded = load_inference_model(&path, None).unwrap();
        assert!(loaded.params_filename.is_none());
        assert_eq!(loaded.scope, scope);
    }

    #[test]
    fn test_save_overrides_feed_and_fetch() {
        let dir = TempDir::new().unwrap();
        let (mut graph, scope) = sample_model();
        graph.add_var(VarDesc::activation("feed", &[-1, 2, 4, 4]));

        let path = save_inference_model(
            dir.path(),
            &graph,
            &scope,
            &["feed".to_string()],
            &["conv2d_0.tmp_0".to_string()],
            "model.json",
            Some("params.safetensors"),
        )
        .unwrap();

        let saved: Graph = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved.feed_names, vec!["feed"]);
    }

    #[test]
    fn test_save_requires_all_params() {
        let dir = TempDir::new().unwrap();
        let (graph, mut scope) = sample_model();
        scope.remove("conv1_bias");

        let err = save_inference_model(
            dir.path(),
            &graph,
            &scope,
            &graph.feed_names,
            &graph.fetch_names,
            "model.json",
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("conv1_bias"));
        assert!(!dir.path().join("model.json").exists());
    }

    #[test]
    fn test_load_shape_mismatch() {
        let dir = TempDir::new().unwrap();
        let (mut graph, scope) = sample_model();
        save_inference_model(
            dir.path(),
            &graph,
            &scope,
            &graph.feed_names,
            &graph.fetch_names,
            "model.json",
            Some("params.safetensors"),
        )
        .unwrap();

        // Declare a different shape than what was stored
        graph.var_mut("conv1_bias").unwrap().shape = vec![4];
        fs::write(dir.path().join("model.json"), serde_json::to_string(&graph).unwrap()).unwrap();

        let err = load_inference_model(
            &dir.path().join("model.json"),
            Some(&dir.path().join("params.safetensors")),
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::ShapeMismatch { .. }));
    }
}
