
use std::collections::HashMap;
use std::ops::Range;

use ndarray::prelude::*;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::corpus::Side;
use crate::error::{Error, Result};
use crate::model::{log_sigmoid, sigmoid, Cbow, Table};
use crate::optim::Gradients;

/// Exponent applied to raw counts before normalising.
pub const SMOOTHING: f32 = 0.75;

/// Smoothed unigram distribution over one language's id slice.
#[derive(Clone, Debug)]
struct Prior {
    offset: usize,
    probs: Array1<f32>,
    sampler: WeightedIndex<f32>,
}

impl Prior {
    fn new(freq: &[u64], lang: &str, range: Range<usize>) -> Result<Prior> {
        let empty = || Error::EmptyPrior { lang: lang.to_owned(), start: range.start, end: range.end };
        let counts = freq.get(range.clone()).ok_or_else(empty)?;

        let mut probs: Array1<f32> = counts.iter().map(|&c| (c as f32).powf(SMOOTHING)).collect();
        let total = probs.sum();
        if !(total > 0.0) {
            return Err(empty());
        }
        probs /= total;
        let sampler = WeightedIndex::new(probs.iter())?;

        Ok(Self { offset: range.start, probs, sampler })
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.offset + self.sampler.sample(rng)
    }
}

/// Negative-sampling objective where every positive pair is contrasted with
/// `sample_size` negatives from its own language and `sample_size` from the
/// other one.
#[derive(Clone, Debug)]
pub struct NegativeSamplingLoss {
    priors: [Prior; 2],
    sample_size: usize,
}

impl NegativeSamplingLoss {

    /// Builds per-language priors from the counts in `freq` (indexed by id)
    /// restricted to the recorded id range of `src` and `trg`.
    pub fn new(freq: &[u64], ranges: &HashMap<String, Range<usize>>, src: &str, trg: &str, sample_size: usize) -> Result<NegativeSamplingLoss> {
        let prior = |lang: &str| -> Result<Prior> {
            let range = ranges.get(lang).ok_or_else(|| Error::UnknownLanguage(lang.to_owned()))?;
            Prior::new(freq, lang, range.clone())
        };
        Ok(Self {
            priors: [prior(src)?, prior(trg)?],
            sample_size,
        })
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Probabilities over the slice of `side`, and the id of its first entry.
    pub fn prior(&self, side: Side) -> (usize, ArrayView1<'_, f32>) {
        let prior = &self.priors[side.index()];
        (prior.offset, prior.probs.view())
    }

    /// `batch_size` rows of negatives: first `sample_size` from the language
    /// of `side`, then `sample_size` from the other language. Draws are
    /// independent and with replacement.
    pub fn sample_negatives<R: Rng + ?Sized>(&self, batch_size: usize, side: Side, rng: &mut R) -> Array2<usize> {
        let k = self.sample_size;
        let mono = &self.priors[side.index()];
        let cross = &self.priors[side.other().index()];

        // whole-batch blocks, drawn mono first
        let mono_ids: Vec<usize> = (0..batch_size * k).map(|_| mono.draw(rng)).collect();
        let cross_ids: Vec<usize> = (0..batch_size * k).map(|_| cross.draw(rng)).collect();

        let mut negatives = Array2::<usize>::zeros((batch_size, 2 * k));
        for (b, mut row) in negatives.rows_mut().into_iter().enumerate() {
            for j in 0..k {
                row[j] = mono_ids[b * k + j];
                row[k + j] = cross_ids[b * k + j];
            }
        }
        negatives
    }

    /// Mean log-likelihood of the batch under freshly drawn negatives.
    /// Gradients of the returned value are added to `grads`.
    pub fn compute<R: Rng + ?Sized>(&self, model: &Cbow, contexts: ArrayView2<'_, usize>, targets: ArrayView1<'_, usize>, side: Side, rng: &mut R, grads: &mut Gradients) -> f32 {
        let negatives = self.sample_negatives(contexts.nrows(), side, rng);
        self.compute_with_negatives(model, contexts, targets, negatives.view(), grads)
    }

    /// `(Σ ln σ(pos) + Σ ln σ(-neg)) / B` for the given negatives, with its
    /// gradients with respect to every table row it touched.
    pub fn compute_with_negatives(&self, model: &Cbow, contexts: ArrayView2<'_, usize>, targets: ArrayView1<'_, usize>, negatives: ArrayView2<'_, usize>, grads: &mut Gradients) -> f32 {
        let batch_size = contexts.nrows();
        if batch_size == 0 {
            return 0.0;
        }
        let scale = 1.0 / batch_size as f32;

        let pooled = model.pool(contexts);
        let pos = model.score_pooled(pooled.view(), targets);
        let neg = model.score_negatives_pooled(pooled.view(), negatives);

        let loss = pos.iter().map(|&s| log_sigmoid(s)).sum::<f32>()
            + neg.iter().map(|&s| log_sigmoid(-s)).sum::<f32>();

        // d/ds ln σ(s) = σ(-s) and d/ds ln σ(-s) = -σ(s)
        let target_table = model.table(Table::Target);
        let mut d_pooled = Array2::<f32>::zeros(pooled.raw_dim());
        for b in 0..batch_size {
            let c = pooled.row(b);
            let mut d_c = d_pooled.row_mut(b);

            let g = scale * sigmoid(-pos[b]);
            grads.accumulate(Table::Target, targets[b], (&c * g).view());
            d_c.scaled_add(g, &target_table.row(targets[b]));

            for (&id, &s) in negatives.row(b).iter().zip(neg.row(b)) {
                let h = -scale * sigmoid(s);
                grads.accumulate(Table::Target, id, (&c * h).view());
                d_c.scaled_add(h, &target_table.row(id));
            }
        }

        // mean pooling spreads each context gradient evenly over the window
        let width = contexts.ncols() as f32;
        for (ids, d_c) in contexts.rows().into_iter().zip(d_pooled.rows()) {
            let d_row = &d_c / width;
            for &id in ids {
                grads.accumulate(Table::Context, id, d_row.view());
            }
        }

        loss * scale
    }
}
