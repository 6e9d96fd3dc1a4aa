//! Rank and score fusion for client-side hybrid search
//!
//! Reciprocal Rank Fusion here is normalized so a candidate ranked first by
//! both signals scores exactly 1.0:
//! `score = (1/(k + rank_vec) + 1/(k + rank_bm25)) / (2/(k + 1))`.

/// 1-based rank of each score, best first. Ties keep input order.
pub fn rank_positions(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0; scores.len()];
    for (position, index) in order.into_iter().enumerate() {
        ranks[index] = position + 1;
    }
    ranks
}

/// Normalized RRF score for one candidate's vector and BM25 ranks.
pub fn rrf_score(vector_rank: usize, bm25_rank: usize, k: f32) -> f32 {
    let raw = 1.0 / (k + vector_rank as f32) + 1.0 / (k + bm25_rank as f32);
    raw / (2.0 / (k + 1.0))
}

/// Fuse two parallel score lists by their ranks.
pub fn rrf_fuse(vector: &[f32], bm25: &[f32], k: f32) -> Vec<f32> {
    let vector_ranks = rank_positions(vector);
    let bm25_ranks = rank_positions(bm25);
    vector_ranks
        .into_iter()
        .zip(bm25_ranks)
        .map(|(rv, rb)| rrf_score(rv, rb, k))
        .collect()
}

/// Min-max normalize into `[0, 1]`.
///
/// A constant list maps to 1.0 where positive and 0.0 otherwise.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    scores
        .iter()
        .map(|&s| {
            if range <= f32::EPSILON {
                if s > 0.0 { 1.0 } else { 0.0 }
            } else {
                (s - min) / range
            }
        })
        .collect()
}

/// Weighted fusion of min-max normalized vector and BM25 scores.
///
/// `alpha` and `beta` are renormalized to sum to one; if both are zero the
/// signals are weighted equally.
pub fn weighted_fuse(vector: &[f32], bm25: &[f32], alpha: f32, beta: f32) -> Vec<f32> {
    let total = alpha + beta;
    let (wa, wb) = if total > 0.0 {
        (alpha / total, beta / total)
    } else {
        (0.5, 0.5)
    };

    min_max_normalize(vector)
        .into_iter()
        .zip(min_max_normalize(bm25))
        .map(|(v, b)| wa * v + wb * b)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_positions_descending_stable() {
        assert_eq!(rank_positions(&[0.2, 0.9, 0.5]), vec![3, 1, 2]);
        assert_eq!(rank_positions(&[0.5, 0.5, 0.1]), vec![1, 2, 3]);
        assert!(rank_positions(&[]).is_empty());
    }

    #[test]
    fn test_rrf_top_rank_is_one() {
        assert!((rrf_score(1, 1, 60.0) - 1.0).abs() < 1e-6);
        assert!(rrf_score(2, 2, 60.0) < 1.0);
    }

    #[test]
    fn test_rrf_hand_computed() {
        // (#1, #3) against (#2, #2) at k = 60
        let first_third = rrf_score(1, 3, 60.0);
        let second_second = rrf_score(2, 2, 60.0);

        let expected_first_third = (1.0 / 61.0 + 1.0 / 63.0) / (2.0 / 61.0);
        let expected_second_second = (1.0 / 62.0 + 1.0 / 62.0) / (2.0 / 61.0);
        assert!((first_third - expected_first_third).abs() < 1e-5);
        assert!((second_second - expected_second_second).abs() < 1e-5);
        assert!((first_third - 0.984_127).abs() < 1e-5);
        assert!((second_second - 0.983_871).abs() < 1e-5);
        assert!(
            first_third > second_second,
            "1/61 + 1/63 exceeds 2/62, so (#1, #3) must win"
        );
    }

    #[test]
    fn test_rrf_fuse_parallel_lists() {
        let fused = rrf_fuse(&[0.9, 0.1], &[0.0, 2.0], 60.0);
        assert_eq!(fused.len(), 2);
        assert!((fused[0] - fused[1]).abs() < 1e-6, "(1,2) and (2,1) fuse equally");
    }

    #[test]
    fn test_min_max_normalize() {
        assert_eq!(min_max_normalize(&[1.0, 3.0, 2.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(min_max_normalize(&[0.4, 0.4]), vec![1.0, 1.0]);
        assert_eq!(min_max_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_weighted_fuse_respects_weights() {
        let fused = weighted_fuse(&[1.0, 0.0], &[0.0, 1.0], 0.4, 0.6);
        assert!((fused[0] - 0.4).abs() < 1e-6);
        assert!((fused[1] - 0.6).abs() < 1e-6);

        let even = weighted_fuse(&[1.0, 0.0], &[0.0, 1.0], 0.0, 0.0);
        assert!((even[0] - 0.5).abs() < 1e-6);
    }
}
