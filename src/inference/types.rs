use crate::taxonomy::RankLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 各层级的原始分数向量（已截断到该层级的类别数）
pub type RawScores = BTreeMap<RankLevel, Vec<f32>>;

/// 单个层级的预测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelPrediction {
    /// 预测标签
    pub label: String,
    /// 预测标签在该层级标签表中的下标
    pub index: usize,
    /// softmax 后该标签的概率 (0.0 - 1.0)
    pub confidence: f32,
    /// 分布的香农熵（自然对数），0 表示完全确定
    pub entropy: f32,
}

/// 一次分类的完整结果，每个层级至多一项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionResult {
    levels: BTreeMap<RankLevel, LevelPrediction>,
}

impl PredictionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rank: RankLevel, prediction: LevelPrediction) {
        self.levels.insert(rank, prediction);
    }

    pub fn get(&self, rank: RankLevel) -> Option<&LevelPrediction> {
        self.levels.get(&rank)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// 按 目 → 科 → 属 → 种 的顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (RankLevel, &LevelPrediction)> {
        self.levels.iter().map(|(rank, p)| (*rank, p))
    }

    /// 是否四个层级都有结果
    pub fn is_complete(&self) -> bool {
        RankLevel::ALL.iter().all(|rank| self.levels.contains_key(rank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_rank_map() {
        let mut result = PredictionResult::new();
        result.insert(
            RankLevel::Genus,
            LevelPrediction {
                label: "Apis".to_string(),
                index: 0,
                confidence: 0.5,
                entropy: 0.25,
            },
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["genus"]["label"], "Apis");
        assert_eq!(json["genus"]["index"], 0);
        assert!(!result.is_complete());
    }

    #[test]
    fn test_iterates_in_rank_order() {
        let mut result = PredictionResult::new();
        for rank in [RankLevel::Species, RankLevel::Order, RankLevel::Family] {
            result.insert(
                rank,
                LevelPrediction {
                    label: rank.to_string(),
                    index: 0,
                    confidence: 1.0,
                    entropy: 0.0,
                },
            );
        }
        let ranks: Vec<RankLevel> = result.iter().map(|(r, _)| r).collect();
        assert_eq!(
            ranks,
            vec![RankLevel::Order, RankLevel::Family, RankLevel::Species]
        );
    }
}
