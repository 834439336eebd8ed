//! Per-epoch segment sampling and batching

use ndarray::{s, stack, Array2, Array3, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};

/// A batch of aligned segments from both domains
#[derive(Debug)]
pub struct SegmentBatch {
    /// Domain A segments [batch, coded_dim, n_frames]
    pub a: Array3<f64>,
    /// Domain B segments [batch, coded_dim, n_frames]
    pub b: Array3<f64>,
}

/// Equal-length pools of fixed-length segments, paired by position
#[derive(Debug, Clone)]
pub struct SampledSegments {
    a: Vec<Array2<f64>>,
    b: Vec<Array2<f64>>,
}

impl SampledSegments {
    /// Number of segment pairs
    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// Number of full batches
    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.len() / batch_size.max(1)
    }

    /// Iterate over full batches; a trailing partial batch is dropped.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = Result<SegmentBatch>> + '_ {
        let batch_size = batch_size.max(1);
        (0..self.num_batches(batch_size)).map(move |i| {
            let range = i * batch_size..(i + 1) * batch_size;
            Ok(SegmentBatch {
                a: stack_segments(&self.a[range.clone()])?,
                b: stack_segments(&self.b[range])?,
            })
        })
    }
}

fn stack_segments(segments: &[Array2<f64>]) -> Result<Array3<f64>> {
    let views: Vec<ArrayView2<f64>> = segments.iter().map(|s| s.view()).collect();
    stack(Axis(0), &views).map_err(|e| Error::dataset(format!("cannot stack segments: {}", e)))
}

/// Draw one random `n_frames` segment per eligible utterance of each domain.
///
/// Utterances are [coded_dim, frames]; those shorter than `n_frames` are
/// skipped. Eligible indices are shuffled per domain and both pools are
/// truncated to the shorter one.
pub fn sample_train_data(
    dataset_a: &[Array2<f64>],
    dataset_b: &[Array2<f64>],
    n_frames: usize,
    rng: &mut StdRng,
) -> Result<SampledSegments> {
    if n_frames == 0 {
        return Err(Error::dataset("n_frames must be at least 1"));
    }

    let mut eligible_a = eligible(dataset_a, n_frames);
    let mut eligible_b = eligible(dataset_b, n_frames);
    if eligible_a.is_empty() || eligible_b.is_empty() {
        return Err(Error::dataset(format!(
            "no utterance has at least {} frames (domain A: {}, domain B: {})",
            n_frames,
            eligible_a.len(),
            eligible_b.len()
        )));
    }

    eligible_a.shuffle(rng);
    eligible_b.shuffle(rng);
    let num_samples = eligible_a.len().min(eligible_b.len());

    let mut a = Vec::with_capacity(num_samples);
    let mut b = Vec::with_capacity(num_samples);
    for (&idx_a, &idx_b) in eligible_a.iter().zip(&eligible_b).take(num_samples) {
        a.push(random_segment(&dataset_a[idx_a], n_frames, rng));
        b.push(random_segment(&dataset_b[idx_b], n_frames, rng));
    }

    Ok(SampledSegments { a, b })
}

fn eligible(dataset: &[Array2<f64>], n_frames: usize) -> Vec<usize> {
    dataset
        .iter()
        .enumerate()
        .filter(|(_, u)| u.ncols() >= n_frames)
        .map(|(i, _)| i)
        .collect()
}

fn random_segment(utterance: &Array2<f64>, n_frames: usize, rng: &mut StdRng) -> Array2<f64> {
    let start = rng.gen_range(0..=utterance.ncols() - n_frames);
    utterance.slice(s![.., start..start + n_frames]).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn utterance(dim: usize, frames: usize, offset: f64) -> Array2<f64> {
        Array2::from_shape_fn((dim, frames), |(d, t)| offset + d as f64 * 1000.0 + t as f64)
    }

    #[test]
    fn test_segments_have_fixed_shape() {
        let a = vec![utterance(4, 50, 0.0), utterance(4, 80, 0.0), utterance(4, 30, 0.0)];
        let b = vec![utterance(4, 40, 0.5), utterance(4, 100, 0.5)];
        let mut rng = StdRng::seed_from_u64(0);

        let segments = sample_train_data(&a, &b, 32, &mut rng).unwrap();
        assert_eq!(segments.len(), 2);
        for batch in segments.batches(1) {
            let batch = batch.unwrap();
            assert_eq!(batch.a.shape(), &[1, 4, 32]);
            assert_eq!(batch.b.shape(), &[1, 4, 32]);
        }
    }

    #[test]
    fn test_segments_are_contiguous() {
        let a = vec![utterance(2, 64, 0.0)];
        let b = vec![utterance(2, 64, 0.0)];
        let mut rng = StdRng::seed_from_u64(3);

        let segments = sample_train_data(&a, &b, 16, &mut rng).unwrap();
        let seg = &segments.a[0];
        for t in 1..16 {
            assert_eq!(seg[[0, t]] - seg[[0, t - 1]], 1.0);
        }
        assert_eq!(seg[[1, 0]] - seg[[0, 0]], 1000.0);
    }

    #[test]
    fn test_short_utterances_excluded() {
        let a = vec![utterance(2, 10, 0.0), utterance(2, 64, 7.0)];
        let b = vec![utterance(2, 64, 0.0), utterance(2, 64, 0.0)];
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..10 {
            let segments = sample_train_data(&a, &b, 32, &mut rng).unwrap();
            assert_eq!(segments.len(), 1);
            // Only the 64-frame utterance (offset 7) can be drawn for domain A
            assert_eq!(segments.a[0][[0, 0]].fract(), 0.0);
            assert!(segments.a[0][[0, 0]] >= 7.0);
        }
    }

    #[test]
    fn test_empty_pool_is_error() {
        let a = vec![utterance(2, 10, 0.0)];
        let b = vec![utterance(2, 64, 0.0)];
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(sample_train_data(&a, &b, 32, &mut rng), Err(Error::Dataset(_))));
    }

    #[test]
    fn test_same_seed_same_segments() {
        let a: Vec<_> = (0..5).map(|i| utterance(3, 60 + i * 7, i as f64 * 0.1)).collect();
        let b: Vec<_> = (0..4).map(|i| utterance(3, 70 + i * 5, i as f64 * 0.1)).collect();

        let first = sample_train_data(&a, &b, 24, &mut StdRng::seed_from_u64(42)).unwrap();
        let second = sample_train_data(&a, &b, 24, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(first.a, second.a);
        assert_eq!(first.b, second.b);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_partial_batch_dropped() {
        let a: Vec<_> = (0..5).map(|_| utterance(2, 40, 0.0)).collect();
        let b: Vec<_> = (0..5).map(|_| utterance(2, 40, 0.0)).collect();
        let mut rng = StdRng::seed_from_u64(9);

        let segments = sample_train_data(&a, &b, 20, &mut rng).unwrap();
        assert_eq!(segments.num_batches(2), 2);
        let batches: Vec<_> = segments.batches(2).map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].a.shape(), &[2, 2, 20]);
    }
}
