use crate::taxonomy::RankLevel;
use crate::utils::error::InsectError;
use crate::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// 分类表文档中可能承载记录映射的顶层键，按优先级排列
pub const SCHEMA_KEYS: [&str; 2] = ["hierarchy_map", "full_taxa_map"];

/// 单条叶子分类记录，仅在构建索引时使用
#[derive(Debug, Deserialize)]
struct TaxonomyRecord {
    #[serde(alias = "ordre")]
    order: String,
    #[serde(alias = "famille")]
    family: String,
    #[serde(alias = "genre")]
    genus: String,
    #[serde(alias = "espece")]
    species: String,
}

impl TaxonomyRecord {
    fn label(&self, rank: RankLevel) -> &str {
        match rank {
            RankLevel::Order => &self.order,
            RankLevel::Family => &self.family,
            RankLevel::Genus => &self.genus,
            RankLevel::Species => &self.species,
        }
    }
}

/// 每个层级一份按字典序升序排列、去重的标签表。
///
/// 标签在表中的位置就是模型在该层级上的类别下标。构建完成后不可变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyIndex {
    labels: [Vec<String>; 4],
    schema_key: &'static str,
}

impl TaxonomyIndex {
    /// 从文件加载分类表
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading taxonomy from: {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            InsectError::Initialization(format!(
                "Failed to read taxonomy {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json_str(&content)
    }

    pub fn from_json_str(document: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(document)
            .map_err(|e| InsectError::Schema(format!("Taxonomy is not valid JSON: {}", e)))?;
        Self::build(&value)
    }

    /// 从已解析的文档构建索引。
    ///
    /// 所有记录都校验通过后才返回索引，任何一条记录缺字段都会使整体失败。
    pub fn build(document: &Value) -> Result<Self> {
        let root = document
            .as_object()
            .ok_or_else(|| InsectError::Schema("Taxonomy root must be a JSON object".to_string()))?;

        let present: Vec<&'static str> = SCHEMA_KEYS
            .iter()
            .copied()
            .filter(|key| root.contains_key(*key))
            .collect();

        let schema_key = *present.first().ok_or_else(|| {
            InsectError::Schema(format!(
                "Taxonomy has none of the expected keys {:?}; found {:?}",
                SCHEMA_KEYS,
                root.keys().collect::<Vec<_>>()
            ))
        })?;

        if present.len() > 1 {
            tracing::warn!(
                "Taxonomy contains several schema keys {:?}; using '{}' only, the others are ignored",
                present,
                schema_key
            );
        }

        let records = root[schema_key].as_object().ok_or_else(|| {
            InsectError::Schema(format!("'{}' must map record keys to objects", schema_key))
        })?;

        let mut sets: [BTreeSet<String>; 4] = Default::default();

        for (key, value) in records {
            let record = TaxonomyRecord::deserialize(value)
                .map_err(|e| InsectError::Schema(format!("Record '{}': {}", key, e)))?;

            for rank in RankLevel::ALL {
                sets[rank.index()].insert(record.label(rank).to_string());
            }
        }

        let labels = sets.map(|set| set.into_iter().collect::<Vec<_>>());

        if let Some(rank) = RankLevel::ALL.into_iter().find(|r| labels[r.index()].is_empty()) {
            return Err(InsectError::Schema(format!(
                "'{}' contains no records, label set for {} would be empty",
                schema_key, rank
            )));
        }

        tracing::info!(
            "Taxonomy '{}' indexed: {} records, orders={}, families={}, genera={}, species={}",
            schema_key,
            records.len(),
            labels[0].len(),
            labels[1].len(),
            labels[2].len(),
            labels[3].len()
        );

        Ok(Self { labels, schema_key })
    }

    pub fn labels(&self, rank: RankLevel) -> &[String] {
        &self.labels[rank.index()]
    }

    pub fn label(&self, rank: RankLevel, index: usize) -> Option<&str> {
        self.labels[rank.index()].get(index).map(String::as_str)
    }

    pub fn class_count(&self, rank: RankLevel) -> usize {
        self.labels[rank.index()].len()
    }

    /// 实际使用的顶层键
    pub fn schema_key(&self) -> &'static str {
        self.schema_key
    }
}
