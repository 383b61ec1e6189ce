//! 原始分数 → 概率、置信度与不确定度。
//!
//! 各层级独立处理，不检查层级之间的从属关系（预测的属不一定属于预测的科）。

use crate::inference::{LevelPrediction, PredictionResult, RawScores};
use crate::taxonomy::{RankLevel, TaxonomyIndex};
use crate::utils::error::InsectError;
use crate::Result;

pub struct PostProcessor;

impl PostProcessor {
    pub fn resolve(raw_scores: &RawScores, taxonomy: &TaxonomyIndex) -> Result<PredictionResult> {
        let mut result = PredictionResult::new();

        for (&rank, logits) in raw_scores {
            let prediction = Self::resolve_level(rank, logits, taxonomy)?;
            tracing::debug!(
                "{}: {} (idx={}, confidence={:.4}, entropy={:.4})",
                rank,
                prediction.label,
                prediction.index,
                prediction.confidence,
                prediction.entropy
            );
            result.insert(rank, prediction);
        }

        Ok(result)
    }

    fn resolve_level(
        rank: RankLevel,
        logits: &[f32],
        taxonomy: &TaxonomyIndex,
    ) -> Result<LevelPrediction> {
        let count = taxonomy.class_count(rank);
        if logits.len() < count {
            return Err(InsectError::ShapeMismatch(format!(
                "{} has {} scores for {} classes",
                rank,
                logits.len(),
                count
            )));
        }
        // 只有前 count 个分数有意义
        let logits = &logits[..count];

        if let Some(bad) = logits.iter().position(|v| !v.is_finite()) {
            return Err(InsectError::Inference(format!(
                "{} score at index {} is not finite: {}",
                rank, bad, logits[bad]
            )));
        }

        let probs = softmax(logits);
        let index = argmax(&probs).ok_or_else(|| {
            InsectError::ShapeMismatch(format!("{} has an empty score vector", rank))
        })?;
        let label = taxonomy.label(rank, index).ok_or_else(|| {
            InsectError::Internal(format!("{} index {} outside label set", rank, index))
        })?;

        Ok(LevelPrediction {
            label: label.to_string(),
            index,
            confidence: probs[index],
            entropy: entropy(&probs),
        })
    }
}

/// 数值稳定的 softmax：先减去最大值再取指数
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = logits.iter().map(|&x| (x as f64 - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| (e / total) as f32).collect()
}

/// 最大值下标，相同值取最小下标
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// 香农熵 `-Σ p·ln(p)`，p = 0 的项不参与
pub fn entropy(probs: &[f32]) -> f32 {
    let h: f64 = probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| {
            let p = p as f64;
            -p * p.ln()
        })
        .sum();
    h.max(0.0) as f32
}
