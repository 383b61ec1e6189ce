use anyhow::Result;
use std::path::PathBuf;

/// 默认模型文件名
pub const DEFAULT_MODEL_FILE: &str = "insect_model.onnx";

/// 默认分类表文件名
pub const DEFAULT_TAXONOMY_FILE: &str = "hierarchy_map.json";

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 模型文件目录
    pub models_dir: PathBuf,

    /// 显式指定的模型路径（覆盖 models_dir 下的默认文件）
    pub model_file: Option<PathBuf>,

    /// 显式指定的分类表路径
    pub taxonomy_file: Option<PathBuf>,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别 (0-3)
    pub optimization_level: i32,
}

impl Default for OnnxConfig {
    fn default() -> Self {
        Self {
            intra_threads: (num_cpus::get() * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

impl ServerConfig {
    fn for_mode(dev_mode: bool) -> Self {
        Self {
            request_timeout: if dev_mode { 300 } else { 60 }, // 开发模式更长超时
            max_request_size: 50 * 1024 * 1024,               // 50MB
        }
    }
}

impl Config {
    pub fn new(
        bind_addr: String,
        models_dir: String,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        let workers = workers.unwrap_or_else(num_cpus::get);
        if workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }

        Ok(Self {
            bind_addr,
            models_dir: PathBuf::from(models_dir),
            model_file: None,
            taxonomy_file: None,
            workers,
            dev_mode,
            onnx_config: OnnxConfig::default(),
            server_config: ServerConfig::for_mode(dev_mode),
        })
    }

    pub fn with_model_file(mut self, path: Option<PathBuf>) -> Self {
        self.model_file = path;
        self
    }

    pub fn with_taxonomy_file(mut self, path: Option<PathBuf>) -> Self {
        self.taxonomy_file = path;
        self
    }

    /// 获取分类模型路径
    pub fn model_path(&self) -> PathBuf {
        self.model_file
            .clone()
            .unwrap_or_else(|| self.models_dir.join(DEFAULT_MODEL_FILE))
    }

    /// 获取分类表路径
    pub fn taxonomy_path(&self) -> PathBuf {
        self.taxonomy_file
            .clone()
            .unwrap_or_else(|| self.models_dir.join(DEFAULT_TAXONOMY_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_asset_paths() {
        let config = Config::new("127.0.0.1:5005".into(), "models".into(), Some(2), false).unwrap();
        assert_eq!(config.model_path(), PathBuf::from("models/insect_model.onnx"));
        assert_eq!(config.taxonomy_path(), PathBuf::from("models/hierarchy_map.json"));
        assert_eq!(config.workers, 2);
        assert_eq!(config.server_config.request_timeout, 60);
    }

    #[test]
    fn test_explicit_paths_override() {
        let config = Config::new("127.0.0.1:5005".into(), "models".into(), None, true)
            .unwrap()
            .with_model_file(Some(PathBuf::from("/opt/m.onnx")))
            .with_taxonomy_file(Some(PathBuf::from("/opt/taxa.json")));
        assert_eq!(config.model_path(), PathBuf::from("/opt/m.onnx"));
        assert_eq!(config.taxonomy_path(), PathBuf::from("/opt/taxa.json"));
        assert_eq!(config.server_config.request_timeout, 300);
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(Config::new("0.0.0.0:5005".into(), "models".into(), Some(0), false).is_err());
    }

    #[test]
    fn test_onnx_defaults() {
        let onnx = OnnxConfig::default();
        assert!(onnx.intra_threads >= 1);
        assert_eq!(onnx.optimization_level, 3);
    }
}
