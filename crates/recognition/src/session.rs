//! ONNX Runtime sessions shared by the detection, landmark and embedding
//! stages.

use crate::error::{RecognitionError, Result};
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

/// Execution settings common to every model
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub execution_provider: String,
    pub device_id: i32,
    pub intra_threads: usize,
}

impl From<&crate::config::RecognitionConfig> for SessionOptions {
    fn from(config: &crate::config::RecognitionConfig) -> Self {
        Self {
            execution_provider: config.execution_provider.clone(),
            device_id: config.device_id,
            intra_threads: config.intra_threads,
        }
    }
}

/// A loaded model; inference is serialized through a mutex
pub struct OnnxModel {
    name: &'static str,
    path: PathBuf,
    provider: String,
    session: Mutex<Session>,
}

impl OnnxModel {
    pub fn load(name: &'static str, path: &Path, options: &SessionOptions) -> Result<Self> {
        if !path.exists() {
            return Err(RecognitionError::Model(format!(
                "{} model not found at {}",
                name,
                path.display()
            )));
        }

        let (session, provider) = create_session(path, options)?;
        tracing::info!(
            "Initialized {} model - path: {}, provider: {}, device: {}",
            name,
            path.display(),
            provider,
            options.device_id
        );

        Ok(Self {
            name,
            path: path.to_path_buf(),
            provider,
            session: Mutex::new(session),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn execution_provider(&self) -> &str {
        &self.provider
    }

    /// Run the model on a single input tensor and return the first output
    /// whose name is listed in `output_names` (in order of preference)
    pub fn run(&self, input: Array<f32, IxDyn>, output_names: &[&str]) -> Result<Array<f32, IxDyn>> {
        let input_tensor = Value::from_array(input)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RecognitionError::Model(format!("Failed to lock {} session: {}", self.name, e)))?;

        let inference_start = Instant::now();
        let outputs = session.run(ort::inputs![input_tensor])?;
        let inference_time = inference_start.elapsed();

        let output_value = output_names
            .iter()
            .find_map(|name| outputs.get(*name))
            .ok_or_else(|| {
                RecognitionError::Model(format!(
                    "No {} output tensor found (tried {:?})",
                    self.name, output_names
                ))
            })?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;

        let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())
            .map_err(|e| RecognitionError::Model(format!("Bad {} output shape: {}", self.name, e)))?;

        telemetry::metrics::INFERENCE_TIME
            .with_label_values(&[self.name, &self.provider])
            .observe(inference_time.as_secs_f64());

        Ok(output)
    }
}

/// Create ONNX session with execution provider fallback
fn create_session(model_path: &Path, options: &SessionOptions) -> Result<(Session, String)> {
    match options.execution_provider.to_uppercase().as_str() {
        "TENSORRT" => {
            tracing::info!("Attempting TensorRT for {}", model_path.display());
            let result = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(options.intra_threads)?
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_device_id(options.device_id)
                        .build(),
                    CUDAExecutionProvider::default()
                        .with_device_id(options.device_id)
                        .build(),
                    CPUExecutionProvider::default().build(),
                ])?
                .commit_from_file(model_path);

            match result {
                Ok(session) => Ok((session, "TensorRT".to_string())),
                Err(e) => {
                    tracing::warn!("TensorRT failed, trying CUDA: {}", e);
                    try_cuda(model_path, options)
                }
            }
        }
        "CUDA" => try_cuda(model_path, options),
        _ => try_cpu(model_path, options),
    }
}

fn try_cuda(model_path: &Path, options: &SessionOptions) -> Result<(Session, String)> {
    tracing::info!("Attempting CUDA for {}", model_path.display());
    let result = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(options.intra_threads)?
        .with_execution_providers([
            CUDAExecutionProvider::default()
                .with_device_id(options.device_id)
                .build(),
            CPUExecutionProvider::default().build(),
        ])?
        .commit_from_file(model_path);

    match result {
        Ok(session) => Ok((session, "CUDA".to_string())),
        Err(e) => {
            tracing::warn!("CUDA failed, using CPU: {}", e);
            try_cpu(model_path, options)
        }
    }
}

fn try_cpu(model_path: &Path, options: &SessionOptions) -> Result<(Session, String)> {
    tracing::info!("Using CPU for {}", model_path.display());
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(options.intra_threads)?
        .commit_from_file(model_path)?;
    Ok((session, "CPU".to_string()))
}
