use serde::{Deserialize, Serialize};
use std::fmt;

/// 分类层级，顺序固定：目 → 科 → 属 → 种
///
/// 该顺序即组合输出张量 `(batch, 4, max_classes)` 第二维的下标顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankLevel {
    Order,
    Family,
    Genus,
    Species,
}

impl RankLevel {
    pub const ALL: [RankLevel; 4] = [
        RankLevel::Order,
        RankLevel::Family,
        RankLevel::Genus,
        RankLevel::Species,
    ];

    pub fn index(self) -> usize {
        match self {
            RankLevel::Order => 0,
            RankLevel::Family => 1,
            RankLevel::Genus => 2,
            RankLevel::Species => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RankLevel::Order => "order",
            RankLevel::Family => "family",
            RankLevel::Genus => "genus",
            RankLevel::Species => "species",
        }
    }

    /// 早期模型与分类表使用的法语名称
    pub fn french_name(self) -> &'static str {
        match self {
            RankLevel::Order => "ordre",
            RankLevel::Family => "famille",
            RankLevel::Genus => "genre",
            RankLevel::Species => "espece",
        }
    }

    /// 根据名称（英文或法语，不区分大小写）解析层级
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|rank| {
            name.eq_ignore_ascii_case(rank.as_str()) || name.eq_ignore_ascii_case(rank.french_name())
        })
    }
}

impl fmt::Display for RankLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_order() {
        for (i, rank) in RankLevel::ALL.iter().enumerate() {
            assert_eq!(rank.index(), i);
        }
        assert!(RankLevel::Order < RankLevel::Species);
    }

    #[test]
    fn test_from_name_accepts_aliases() {
        assert_eq!(RankLevel::from_name("genus"), Some(RankLevel::Genus));
        assert_eq!(RankLevel::from_name("Famille"), Some(RankLevel::Family));
        assert_eq!(RankLevel::from_name(" ESPECE "), Some(RankLevel::Species));
        assert_eq!(RankLevel::from_name("kingdom"), None);
    }

    #[test]
    fn test_serializes_lowercase() {
        let json = serde_json::to_string(&RankLevel::Species).unwrap();
        assert_eq!(json, "\"species\"");
    }
}
