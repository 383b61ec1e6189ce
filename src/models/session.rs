use crate::config::OnnxConfig;
use crate::image::{InputTensor, INPUT_SHAPE};
use crate::taxonomy::RankLevel;
use crate::utils::error::InsectError;
use crate::Result;
use ndarray::ArrayD;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

/// 模型输出约定，在加载时根据模型元数据确定一次
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputLayout {
    /// 每个层级一个具名输出，按 `RankLevel` 顺序保存对应的输出名
    Named { outputs: Vec<(RankLevel, String)> },
    /// 单个组合输出，形状 `(batch, 4, max_classes)`
    Stacked { output: String },
}

impl OutputLayout {
    /// 根据输出名列表选择约定：多输出且四个层级都能按名称匹配时用具名约定，否则退回到第一个输出
    pub fn resolve(output_names: &[String]) -> Option<Self> {
        if output_names.len() > 1 {
            let matched: Vec<(RankLevel, String)> = RankLevel::ALL
                .into_iter()
                .filter_map(|rank| {
                    output_names
                        .iter()
                        .find(|name| RankLevel::from_name(name) == Some(rank))
                        .map(|name| (rank, name.clone()))
                })
                .collect();

            if matched.len() == RankLevel::ALL.len() {
                return Some(OutputLayout::Named { outputs: matched });
            }

            tracing::debug!(
                "Only {} of 4 rank outputs matched by name in {:?}, falling back to stacked layout",
                matched.len(),
                output_names
            );
        }

        output_names.first().map(|name| OutputLayout::Stacked {
            output: name.clone(),
        })
    }

    /// 前向计算需要取回的输出名
    pub fn output_names(&self) -> Vec<&str> {
        match self {
            OutputLayout::Named { outputs } => outputs.iter().map(|(_, n)| n.as_str()).collect(),
            OutputLayout::Stacked { output } => vec![output.as_str()],
        }
    }
}

/// 一次前向计算取回的 f32 输出，按输出名索引
#[derive(Debug, Clone, Default)]
pub struct ModelOutputs {
    tensors: HashMap<String, ArrayD<f32>>,
}

impl ModelOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn with(mut self, name: impl Into<String>, tensor: ArrayD<f32>) -> Self {
        self.insert(name, tensor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.tensors.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tensors.keys().map(String::as_str).collect()
    }
}

/// 模型执行后端。
///
/// `forward` 必须对并发调用安全；不支持并发的后端需在内部串行化。
pub trait ModelBackend: Send + Sync {
    fn layout(&self) -> &OutputLayout;

    fn forward(&self, tensor: &InputTensor) -> Result<ModelOutputs>;
}

/// 基于 ONNX Runtime 的分类模型会话
pub struct ModelSession {
    // ort 的 run 需要 &mut，并发调用在此串行化
    session: Mutex<Session>,
    input_name: String,
    layout: OutputLayout,
}

impl ModelSession {
    /// 从内存中的模型字节加载
    pub fn from_memory(model_bytes: &[u8], onnx_config: &OnnxConfig) -> Result<Self> {
        if model_bytes.is_empty() {
            return Err(InsectError::Initialization("Model blob is empty".to_string()));
        }

        tracing::info!("Loading classification model ({} bytes)", model_bytes.len());

        let session = build_session(model_bytes, onnx_config)
            .map_err(|e| InsectError::Initialization(format!("Failed to create ONNX session: {}", e)))?;

        Self::from_session(session)
    }

    fn from_session(session: Session) -> Result<Self> {
        // 动态发现输入名称
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| InsectError::Initialization("Model declares no inputs".to_string()))?;

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        for (i, name) in output_names.iter().enumerate() {
            tracing::debug!("Model output[{}]: '{}'", i, name);
        }

        let layout = OutputLayout::resolve(&output_names)
            .ok_or_else(|| InsectError::Initialization("Model declares no outputs".to_string()))?;

        tracing::info!("Model input: '{}', output layout: {:?}", input_name, layout);

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            layout,
        })
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }
}

impl ModelBackend for ModelSession {
    fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    fn forward(&self, tensor: &InputTensor) -> Result<ModelOutputs> {
        if tensor.shape() != INPUT_SHAPE {
            return Err(InsectError::ShapeMismatch(format!(
                "Model expects input {:?}, got {:?}",
                INPUT_SHAPE,
                tensor.shape()
            )));
        }

        let input = Tensor::from_array(tensor.as_array().clone())
            .map_err(|e| InsectError::Inference(format!("Failed to build input tensor: {}", e)))?;

        let mut result = ModelOutputs::new();
        {
            let mut session = self.session.lock();
            let outputs = session
                .run(inputs![self.input_name.as_str() => input])
                .map_err(|e| InsectError::Inference(format!("Model execution failed: {}", e)))?;

            for name in self.layout.output_names() {
                match outputs.get(name) {
                    Some(value) => match value.try_extract_array::<f32>() {
                        Ok(array) => result.insert(name, array.into_owned()),
                        // 非 f32 数值输出：交给执行器按层级跳过
                        Err(e) => tracing::warn!("Output '{}' is not an f32 tensor: {}", name, e),
                    },
                    None => {
                        let available: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
                        tracing::warn!(
                            "Output '{}' missing from run result. Available outputs: {:?}",
                            name,
                            available
                        );
                    }
                }
            }
        }

        Ok(result)
    }
}

fn build_session(model_bytes: &[u8], onnx_config: &OnnxConfig) -> ort::Result<Session> {
    Session::builder()?
        .with_optimization_level(optimization_level(onnx_config.optimization_level))?
        .with_intra_threads(onnx_config.intra_threads)?
        .commit_from_memory(model_bytes)
}

fn optimization_level(level: i32) -> GraphOptimizationLevel {
    match level {
        i32::MIN..=0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}
