use crate::image::InputTensor;
use crate::inference::RawScores;
use crate::models::{ModelBackend, ModelOutputs, OutputLayout};
use crate::taxonomy::{RankLevel, TaxonomyIndex};
use crate::utils::error::InsectError;
use crate::Result;
use ndarray::{ArrayD, Axis, Ix3};

/// 驱动一次前向计算，并把模型输出整理成各层级的原始分数
pub struct InferenceExecutor;

impl InferenceExecutor {
    pub fn run(
        backend: &dyn ModelBackend,
        tensor: &InputTensor,
        taxonomy: &TaxonomyIndex,
    ) -> Result<RawScores> {
        let outputs = backend.forward(tensor)?;
        Self::extract(backend.layout(), &outputs, taxonomy)
    }

    /// 按加载时确定的输出约定提取分数
    pub fn extract(
        layout: &OutputLayout,
        outputs: &ModelOutputs,
        taxonomy: &TaxonomyIndex,
    ) -> Result<RawScores> {
        match layout {
            OutputLayout::Named { outputs: named } => Self::extract_named(named, outputs, taxonomy),
            OutputLayout::Stacked { output } => Self::extract_stacked(output, outputs, taxonomy),
        }
    }

    /// 具名输出：单个层级异常只跳过该层级
    fn extract_named(
        named: &[(RankLevel, String)],
        outputs: &ModelOutputs,
        taxonomy: &TaxonomyIndex,
    ) -> Result<RawScores> {
        let mut scores = RawScores::new();

        for (rank, name) in named {
            let Some(tensor) = outputs.get(name) else {
                tracing::warn!("No value for {} output '{}', skipping level", rank, name);
                continue;
            };

            let Some(vector) = as_vector(tensor) else {
                tracing::warn!(
                    "{} output '{}' has shape {:?}, expected [n] or [1, n]; skipping level",
                    rank,
                    name,
                    tensor.shape()
                );
                continue;
            };

            let count = taxonomy.class_count(*rank);
            if vector.len() < count {
                tracing::warn!(
                    "{} output '{}' has {} scores but taxonomy lists {} classes; skipping level",
                    rank,
                    name,
                    vector.len(),
                    count
                );
                continue;
            }

            scores.insert(*rank, vector[..count].to_vec());
        }

        if scores.is_empty() {
            return Err(InsectError::Inference(format!(
                "None of the named outputs produced usable scores (got {:?})",
                outputs.names()
            )));
        }

        Ok(scores)
    }

    /// 组合输出 `(batch, 4, max_classes)`：取第一个样本，第 i 行对应第 i 个层级，截断到类别数
    fn extract_stacked(
        name: &str,
        outputs: &ModelOutputs,
        taxonomy: &TaxonomyIndex,
    ) -> Result<RawScores> {
        let tensor = outputs.get(name).ok_or_else(|| {
            InsectError::Inference(format!(
                "Output '{}' not found. Available outputs: {:?}",
                name,
                outputs.names()
            ))
        })?;

        let stacked = tensor.view().into_dimensionality::<Ix3>().map_err(|_| {
            InsectError::Inference(format!(
                "Output '{}' must be (batch, 4, max_classes), got {:?}",
                name,
                tensor.shape()
            ))
        })?;

        let (batch, levels, max_classes) = stacked.dim();
        if batch == 0 || levels != RankLevel::ALL.len() {
            return Err(InsectError::Inference(format!(
                "Output '{}' must be (batch >= 1, 4, max_classes), got {:?}",
                name,
                tensor.shape()
            )));
        }

        let first = stacked.index_axis(Axis(0), 0);
        let mut scores = RawScores::new();

        for rank in RankLevel::ALL {
            let count = taxonomy.class_count(rank);
            if count > max_classes {
                return Err(InsectError::ShapeMismatch(format!(
                    "{} has {} classes but output '{}' only carries {} scores per level",
                    rank, count, name, max_classes
                )));
            }

            let row = first.index_axis(Axis(0), rank.index());
            scores.insert(rank, row.iter().take(count).copied().collect());
        }

        Ok(scores)
    }
}

/// 接受 `[n]` 或 `[1, n]` 形状
fn as_vector(tensor: &ArrayD<f32>) -> Option<Vec<f32>> {
    match tensor.shape() {
        [_] => Some(tensor.iter().copied().collect()),
        [1, _] => Some(tensor.iter().copied().collect()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, Array3, IxDyn};
    use serde_json::json;

    fn taxonomy(species: usize) -> TaxonomyIndex {
        let mut records = serde_json::Map::new();
        for i in 0..species {
            records.insert(
                format!("r{i}"),
                json!({
                    "order": format!("O{}", i % 2),
                    "family": format!("F{}", i % 3),
                    "genus": format!("G{}", i % 5),
                    "species": format!("S{:02}", i),
                }),
            );
        }
        TaxonomyIndex::build(&json!({ "hierarchy_map": records })).unwrap()
    }

    fn named_layout() -> OutputLayout {
        OutputLayout::Named {
            outputs: RankLevel::ALL
                .into_iter()
                .map(|r| (r, r.as_str().to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_stacked_truncates_to_class_count() {
        let taxonomy = taxonomy(30);
        let stacked = Array3::<f32>::from_shape_fn((1, 4, 50), |(_, l, c)| (l * 100 + c) as f32);
        let outputs = ModelOutputs::new().with("logits", stacked.into_dyn());
        let layout = OutputLayout::Stacked {
            output: "logits".to_string(),
        };

        let scores = InferenceExecutor::extract(&layout, &outputs, &taxonomy).unwrap();
        assert_eq!(scores[&RankLevel::Order].len(), 2);
        assert_eq!(scores[&RankLevel::Family].len(), 3);
        assert_eq!(scores[&RankLevel::Genus].len(), 5);
        assert_eq!(scores[&RankLevel::Species].len(), 30);
        assert_eq!(scores[&RankLevel::Species][0], 300.0);
        assert_eq!(scores[&RankLevel::Species][29], 329.0);
    }

    #[test]
    fn test_stacked_uses_first_batch_entry() {
        let taxonomy = taxonomy(4);
        let stacked = Array3::<f32>::from_shape_fn((2, 4, 4), |(b, _, _)| b as f32);
        let outputs = ModelOutputs::new().with("out", stacked.into_dyn());
        let layout = OutputLayout::Stacked {
            output: "out".to_string(),
        };

        let scores = InferenceExecutor::extract(&layout, &outputs, &taxonomy).unwrap();
        assert!(scores.values().flatten().all(|&v| v == 0.0));
    }

    #[test]
    fn test_stacked_wrong_rank_is_inference_error() {
        let taxonomy = taxonomy(4);
        let outputs = ModelOutputs::new().with("out", Array::zeros(IxDyn(&[1, 16])));
        let layout = OutputLayout::Stacked {
            output: "out".to_string(),
        };
        assert!(matches!(
            InferenceExecutor::extract(&layout, &outputs, &taxonomy),
            Err(InsectError::Inference(_))
        ));

        let outputs = ModelOutputs::new().with("out", Array::zeros(IxDyn(&[1, 3, 16])));
        assert!(matches!(
            InferenceExecutor::extract(&layout, &outputs, &taxonomy),
            Err(InsectError::Inference(_))
        ));
    }

    #[test]
    fn test_stacked_too_few_classes() {
        let taxonomy = taxonomy(30);
        let outputs = ModelOutputs::new().with("out", Array::zeros(IxDyn(&[1, 4, 10])));
        let layout = OutputLayout::Stacked {
            output: "out".to_string(),
        };
        assert!(matches!(
            InferenceExecutor::extract(&layout, &outputs, &taxonomy),
            Err(InsectError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_named_accepts_flat_and_batched_vectors() {
        let taxonomy = taxonomy(6);
        let outputs = ModelOutputs::new()
            .with("order", Array::from_elem(IxDyn(&[2]), 1.0))
            .with("family", Array::from_elem(IxDyn(&[1, 3]), 2.0))
            .with("genus", Array::from_elem(IxDyn(&[8]), 3.0))
            .with("species", Array::from_elem(IxDyn(&[1, 6]), 4.0));

        let scores = InferenceExecutor::extract(&named_layout(), &outputs, &taxonomy).unwrap();
        assert_eq!(scores.len(), 4);
        assert_eq!(scores[&RankLevel::Genus], vec![3.0; 5]);
        assert_eq!(scores[&RankLevel::Species], vec![4.0; 6]);
    }

    #[test]
    fn test_named_skips_malformed_level() {
        let taxonomy = taxonomy(6);
        let outputs = ModelOutputs::new()
            .with("order", Array::zeros(IxDyn(&[2])))
            .with("family", Array::zeros(IxDyn(&[2, 2, 3])))
            .with("species", Array::zeros(IxDyn(&[6])));

        let scores = InferenceExecutor::extract(&named_layout(), &outputs, &taxonomy).unwrap();
        assert!(scores.contains_key(&RankLevel::Order));
        assert!(!scores.contains_key(&RankLevel::Family));
        assert!(!scores.contains_key(&RankLevel::Genus));
        assert!(scores.contains_key(&RankLevel::Species));
    }

    #[test]
    fn test_named_with_nothing_usable_fails() {
        let taxonomy = taxonomy(6);
        let outputs = ModelOutputs::new().with("order", Array::zeros(IxDyn(&[3, 3])));
        assert!(matches!(
            InferenceExecutor::extract(&named_layout(), &outputs, &taxonomy),
            Err(InsectError::Inference(_))
        ));
    }
}
