
use ndarray::prelude::*;

use crate::corpus::Side;
use crate::model::Cbow;

/// Upper bound on the sample count behind the running statistics.
pub const MAX_SAMPLE_COUNT: usize = 100_000;

/// Running first and second moments of context vectors for one language.
#[derive(Clone, Debug)]
pub struct RunningMoments {
    mean: Array1<f32>,
    cov: Array2<f32>,
    count: usize,
    updated: bool,
}

impl RunningMoments {
    fn new(dim: usize) -> Self {
        Self {
            mean: Array1::zeros(dim),
            cov: Array2::zeros((dim, dim)),
            count: 0,
            updated: false,
        }
    }

    /// Folds in `sum`, the sum of `n` context vectors.
    fn update(&mut self, sum: Array1<f32>, n: usize) {
        let prior = self.count as f32;
        let total = prior + n as f32;

        // `blended` is what the new mean is divided out of; the covariance
        // deviation is measured against it rather than against `sum` alone.
        let blended = sum + &(prior * &self.mean);
        self.mean = &blended / total;

        let diff = (&self.mean - &blended).insert_axis(Axis(1));
        let outer = diff.dot(&diff.t());
        self.cov = (outer + &(prior * &self.cov)) / total;

        self.count = MAX_SAMPLE_COUNT.min(self.count + n);
        self.updated = true;
    }

    pub fn mean(&self) -> ArrayView1<'_, f32> {
        self.mean.view()
    }

    pub fn cov(&self) -> ArrayView2<'_, f32> {
        self.cov.view()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }
}

/// Moment-matching penalty between the context vectors of the two languages.
///
/// The statistics are plain numbers copied out of the model, so the penalty
/// shows up in the reported loss but carries no gradient.
#[derive(Clone, Debug)]
pub struct DistributionLoss {
    stats: [RunningMoments; 2],
    lambda_m: f32,
    lambda_v: f32,
}

impl DistributionLoss {

    pub fn new(dim: usize, lambda_m: f32, lambda_v: f32) -> Self {
        Self {
            stats: [RunningMoments::new(dim), RunningMoments::new(dim)],
            lambda_m,
            lambda_v,
        }
    }

    pub fn stats(&self, side: Side) -> &RunningMoments {
        &self.stats[side.index()]
    }

    /// Updates the statistics of `side` from one context window: the sum of
    /// its `2 * window` context vectors counts as that many samples.
    pub fn update_stats(&mut self, model: &Cbow, window: ArrayView1<'_, usize>, side: Side) {
        let sum = model.window_sum(window);
        self.stats[side.index()].update(sum, window.len());
    }

    /// Updates `side` from the first window of `contexts`, then returns the
    /// penalty, or `None` while either language has never been updated.
    pub fn compute(&mut self, model: &Cbow, contexts: ArrayView2<'_, usize>, side: Side) -> Option<f32> {
        if contexts.nrows() > 0 {
            self.update_stats(model, contexts.row(0), side);
        }

        let [src, trg] = &self.stats;
        if !(src.updated && trg.updated) {
            return None;
        }

        let mean_gap = (&src.mean - &trg.mean).mapv(|x| x * x).sum();
        let cov_gap = (&src.cov - &trg.cov).mapv(|x| x * x).sum();
        Some(self.lambda_m * mean_gap / 2.0 + self.lambda_v * cov_gap / 2.0)
    }
}


#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::array;

    fn toy() -> Cbow {
        let x = array![[1.0, 0.0], [0.0, 1.0], [2.0, 2.0], [-1.0, 3.0]];
        Cbow::from_tables(x.clone(), x)
    }

    #[test]
    fn no_penalty_until_both_languages_seen() {
        let model = toy();
        let mut loss = DistributionLoss::new(2, 0.2, 0.1);
        let contexts = array![[0, 1], [2, 3]];

        assert_eq!(loss.compute(&model, contexts.view(), Side::Source), None);
        assert_eq!(loss.compute(&model, contexts.view(), Side::Source), None);
        assert!(loss.stats(Side::Source).is_updated());
        assert!(!loss.stats(Side::Target).is_updated());

        let value = loss.compute(&model, array![[2, 3]].view(), Side::Target).unwrap();
        assert!(value > 0.0);
    }

    #[test]
    fn first_update_is_mean_of_window() {
        let model = toy();
        let mut loss = DistributionLoss::new(2, 0.2, 0.1);
        loss.update_stats(&model, array![0, 2].view(), Side::Target);

        let stats = loss.stats(Side::Target);
        // sum = [3, 2] over two samples
        assert_eq!(stats.mean(), array![1.5, 1.0]);
        // deviation from the sum: [-1.5, -1.0]
        assert_eq!(stats.cov(), array![[1.125, 0.75], [0.75, 0.5]]);
        assert_eq!(stats.count(), 2);
    }

    #[test]
    fn second_update_follows_the_recurrence() {
        let model = toy();
        let mut loss = DistributionLoss::new(2, 0.2, 0.1);
        loss.update_stats(&model, array![0, 2].view(), Side::Source);
        loss.update_stats(&model, array![1, 3].view(), Side::Source);

        // sum = [-1, 4]; blended = [-1, 4] + 2 * [1.5, 1] = [2, 6]; mean = [0.5, 1.5]
        // deviation = [0.5, 1.5] - [2, 6] = [-1.5, -4.5]
        // cov = (outer + 2 * [[1.125, .75], [.75, .5]]) / 4
        let stats = loss.stats(Side::Source);
        assert_eq!(stats.mean(), array![0.5, 1.5]);
        let expected = array![[(2.25 + 2.25) / 4.0, (6.75 + 1.5) / 4.0], [(6.75 + 1.5) / 4.0, (20.25 + 1.0) / 4.0]];
        for (a, b) in stats.cov().iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5, "{} != {}", a, b);
        }
        assert_eq!(stats.count(), 4);
    }

    #[test]
    fn batch_statistics_come_from_its_first_window() {
        let model = toy();
        let mut from_batch = DistributionLoss::new(2, 0.2, 0.1);
        from_batch.compute(&model, array![[0, 2], [1, 3]].view(), Side::Source);

        let mut from_window = DistributionLoss::new(2, 0.2, 0.1);
        from_window.update_stats(&model, array![0, 2].view(), Side::Source);

        let (a, b) = (from_batch.stats(Side::Source), from_window.stats(Side::Source));
        assert_eq!(a.mean(), b.mean());
        assert_eq!(a.cov(), b.cov());
        assert_eq!(a.count(), 2);
    }

    #[test]
    fn identical_statistics_cost_nothing() {
        let model = toy();
        let mut loss = DistributionLoss::new(2, 0.2, 0.1);
        let window = array![[1, 3]];
        loss.compute(&model, window.view(), Side::Source);
        assert_eq!(loss.compute(&model, window.view(), Side::Target), Some(0.0));
    }

    #[test]
    fn penalty_weights_each_moment() {
        let model = toy();
        let mut loss = DistributionLoss::new(2, 0.2, 0.1);
        loss.compute(&model, array![[0, 0]].view(), Side::Source);
        let value = loss.compute(&model, array![[1, 1]].view(), Side::Target).unwrap();

        // means [1, 0] vs [0, 1]; deviations [-1, 0] and [0, -1] over two
        // samples give cov_src = [[.5, 0], [0, 0]] and cov_trg = [[0, 0], [0, .5]]
        let expected = 0.2 * 2.0 / 2.0 + 0.1 * 0.5 / 2.0;
        assert!((value - expected).abs() < 1e-6);
    }

    #[test]
    fn sample_count_saturates() {
        let model = toy();
        let mut loss = DistributionLoss::new(2, 0.2, 0.1);
        let window = array![0, 1, 2, 3];
        for _ in 0..30_000 {
            loss.update_stats(&model, window.view(), Side::Source);
            assert!(loss.stats(Side::Source).count() <= MAX_SAMPLE_COUNT);
        }
        assert_eq!(loss.stats(Side::Source).count(), MAX_SAMPLE_COUNT);
    }
}
