use crate::config::{Config, OnnxConfig};
use crate::image::ImagePreprocessor;
use crate::inference::{InferenceExecutor, PostProcessor, PredictionResult};
use crate::models::{ModelBackend, ModelSession, OutputLayout};
use crate::taxonomy::{RankLevel, TaxonomyIndex};
use crate::utils::error::InsectError;
use crate::Result;
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// 引擎生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

/// 加载完成后只读共享的资源
struct Loaded {
    backend: Arc<dyn ModelBackend>,
    taxonomy: Arc<TaxonomyIndex>,
}

struct Lifecycle {
    state: EngineState,
    // 每次开始加载递增，等待者据此判断自己等待的那次加载是否结束
    attempt: u64,
    // 失败加载的错误，等待者拿到同类型的副本
    last_failure: Option<InsectError>,
}

/// 分类引擎：图像字节 → 四个层级的预测。
///
/// 由调用方持有（通常放在 `Arc` 中共享）。`initialize` 至多同时进行一次真实加载，
/// 并发调用者等待并共享这次加载的结果；失败后允许再次调用重试，成功后不再重新加载。
/// `classify` 只会看到完全构建好的模型与分类表。
pub struct InferenceEngine {
    onnx_config: OnnxConfig,
    lifecycle: Mutex<Lifecycle>,
    loaded_cv: Condvar,
    loaded: OnceCell<Loaded>,
}

impl InferenceEngine {
    pub fn new(onnx_config: OnnxConfig) -> Self {
        Self {
            onnx_config,
            lifecycle: Mutex::new(Lifecycle {
                state: EngineState::Uninitialized,
                attempt: 0,
                last_failure: None,
            }),
            loaded_cv: Condvar::new(),
            loaded: OnceCell::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// 最近一次失败加载的错误信息
    pub fn last_error(&self) -> Option<String> {
        self.lifecycle
            .lock()
            .last_failure
            .as_ref()
            .map(ToString::to_string)
    }

    /// 从内存中的模型与分类表文档初始化
    pub fn initialize(&self, model_blob: &[u8], taxonomy_document: &str) -> Result<()> {
        let onnx_config = self.onnx_config.clone();
        self.initialize_with(|| {
            // 先建分类表：文档错误无需付出加载模型的代价
            let taxonomy = TaxonomyIndex::from_json_str(taxonomy_document)?;
            let session = ModelSession::from_memory(model_blob, &onnx_config)?;
            Ok((Arc::new(session) as Arc<dyn ModelBackend>, taxonomy))
        })
    }

    /// 从配置中的模型与分类表路径初始化
    pub fn initialize_from_config(&self, config: &Config) -> Result<()> {
        let model_path = config.model_path();
        let taxonomy_path = config.taxonomy_path();
        let onnx_config = self.onnx_config.clone();

        self.initialize_with(|| {
            let taxonomy = TaxonomyIndex::from_path(&taxonomy_path)?;

            tracing::info!("Loading classification model from: {}", model_path.display());
            let model_blob = std::fs::read(&model_path).map_err(|e| {
                InsectError::Initialization(format!(
                    "Failed to read model {}: {}",
                    model_path.display(),
                    e
                ))
            })?;
            let session = ModelSession::from_memory(&model_blob, &onnx_config)?;

            Ok((Arc::new(session) as Arc<dyn ModelBackend>, taxonomy))
        })
    }

    /// 用任意加载函数初始化，`load` 在同一时刻至多执行一次
    pub fn initialize_with<F>(&self, load: F) -> Result<()>
    where
        F: FnOnce() -> Result<(Arc<dyn ModelBackend>, TaxonomyIndex)>,
    {
        {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.state {
                EngineState::Ready => return Ok(()),
                EngineState::Loading => {
                    let attempt = lifecycle.attempt;
                    while lifecycle.state == EngineState::Loading && lifecycle.attempt == attempt {
                        self.loaded_cv.wait(&mut lifecycle);
                    }
                    return match lifecycle.state {
                        EngineState::Ready => Ok(()),
                        _ => Err(lifecycle
                            .last_failure
                            .as_ref()
                            .map(InsectError::shared_copy)
                            .unwrap_or_else(|| {
                                InsectError::Initialization(
                                    "concurrent initialization failed".to_string(),
                                )
                            })),
                    };
                }
                EngineState::Uninitialized | EngineState::Failed => {
                    lifecycle.state = EngineState::Loading;
                    lifecycle.attempt += 1;
                    tracing::info!("Initializing inference engine (attempt {})", lifecycle.attempt);
                }
            }
        }

        let start = Instant::now();
        // 加载过程 panic 也必须离开 Loading 并唤醒等待者
        let outcome = panic::catch_unwind(AssertUnwindSafe(load)).unwrap_or_else(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Err(InsectError::Initialization(format!(
                "Loader panicked: {}",
                reason
            )))
        });

        let mut lifecycle = self.lifecycle.lock();
        let result = match outcome {
            Ok((backend, taxonomy)) => {
                let loaded = Loaded {
                    backend,
                    taxonomy: Arc::new(taxonomy),
                };
                if self.loaded.set(loaded).is_err() {
                    // 状态机保证只会成功一次
                    let err = InsectError::Internal("engine resources already installed".to_string());
                    lifecycle.state = EngineState::Failed;
                    lifecycle.last_failure = Some(err.shared_copy());
                    Err(err)
                } else {
                    lifecycle.state = EngineState::Ready;
                    lifecycle.last_failure = None;
                    tracing::info!(
                        "Inference engine ready in {:.3}s",
                        start.elapsed().as_secs_f32()
                    );
                    Ok(())
                }
            }
            Err(e) => {
                tracing::error!("Inference engine initialization failed: {}", e);
                lifecycle.state = EngineState::Failed;
                lifecycle.last_failure = Some(e.shared_copy());
                Err(e)
            }
        };

        self.loaded_cv.notify_all();
        result
    }

    fn loaded(&self) -> Result<&Loaded> {
        self.loaded.get().ok_or_else(|| {
            InsectError::Initialization(format!(
                "Inference engine is not ready (state: {:?})",
                self.state()
            ))
        })
    }

    /// 对图像字节分类：预处理 → 前向计算 → 后处理
    pub fn classify(&self, image_bytes: &[u8]) -> Result<PredictionResult> {
        let loaded = self.loaded()?;
        let start = Instant::now();

        let tensor = ImagePreprocessor::prepare(image_bytes)?;
        let raw_scores = InferenceExecutor::run(loaded.backend.as_ref(), &tensor, &loaded.taxonomy)?;
        let result = PostProcessor::resolve(&raw_scores, &loaded.taxonomy)?;

        tracing::info!(
            "Classification completed: levels={}, time={:.3}s",
            result.len(),
            start.elapsed().as_secs_f32()
        );

        Ok(result)
    }

    /// 读取文件后分类
    pub fn classify_path(&self, path: impl AsRef<Path>) -> Result<PredictionResult> {
        self.loaded()?;
        let bytes = std::fs::read(path.as_ref())?;
        self.classify(&bytes)
    }

    pub fn taxonomy(&self) -> Option<Arc<TaxonomyIndex>> {
        self.loaded.get().map(|l| Arc::clone(&l.taxonomy))
    }

    pub fn output_layout(&self) -> Option<OutputLayout> {
        self.loaded.get().map(|l| l.backend.layout().clone())
    }

    /// 引擎统计信息
    pub fn stats(&self) -> EngineStats {
        let taxonomy = self.taxonomy();
        EngineStats {
            state: self.state(),
            schema_key: taxonomy.as_ref().map(|t| t.schema_key()),
            class_counts: taxonomy.map(|t| {
                RankLevel::ALL
                    .into_iter()
                    .map(|rank| (rank, t.class_count(rank)))
                    .collect()
            }),
            output_layout: self.output_layout(),
            intra_threads: self.onnx_config.intra_threads,
            optimization_level: self.onnx_config.optimization_level,
        }
    }
}

/// 引擎统计信息
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub state: EngineState,
    pub schema_key: Option<&'static str>,
    pub class_counts: Option<Vec<(RankLevel, usize)>>,
    pub output_layout: Option<OutputLayout>,
    pub intra_threads: usize,
    pub optimization_level: i32,
}
