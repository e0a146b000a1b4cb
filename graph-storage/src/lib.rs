//! Graph Storage - inference graphs and their parameters.
//!
//! Explicit, caller-owned replacements for a framework's program and
//! weight scope:
//! - [`Graph`]: ordered operations over declared variables, with feed/fetch names
//! - [`ParamScope`]: parameter name -> [`ParamTensor`] mapping
//! - [`load_inference_model`] / [`save_inference_model`]: JSON program file
//!   plus SafeTensors parameters (combined or one file per parameter)
//!
//! # Usage
//! ```ignore
//! use graph_storage::{load_inference_model, save_inference_model};
//!
//! let model = load_inference_model(Path::new("mobilenet/model.json"), None)?;
//! // ... mutate model.scope ...
//! save_inference_model(
//!     Path::new("pruned"),
//!     &model.graph,
//!     &model.scope,
//!     &model.graph.feed_names,
//!     &model.graph.fetch_names,
//!     &model.model_filename,
//!     model.params_filename.as_deref(),
//! )?;
//! ```

pub mod dtype;
pub mod error;
pub mod graph;
pub mod io;
pub mod scope;
pub mod tensor;

// Re-exports
pub use dtype::{bytes_to_f32, f32_to_bytes, ParamDtype};
pub use error::{Result, StorageError};
pub use graph::{Graph, InputRef, OpDesc, VarDesc};
pub use io::{load_inference_model, save_inference_model, InferenceModel, PARAM_FILE_EXT};
pub use scope::ParamScope;
pub use tensor::ParamTensor;
