

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use ndarray_rand::rand::seq::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use crate::batch::{generate_batch, Batch};
use crate::config::TrainParams;
use crate::corpus::{Corpus, Sentence, Side};
use crate::distribution::DistributionLoss;
use crate::error::{Error, Result};
use crate::model::Cbow;
use crate::optim::{Gradients, Sgd};
use crate::sampling::NegativeSamplingLoss;


pub struct Train {
    model: Cbow,
    loss_func: NegativeSamplingLoss,
    loss_func_dist: DistributionLoss,
    optimizer: Sgd,
    grads: Gradients,
    rng: StdRng,
}

/// Summary of one pass over both corpora.
#[derive(Clone, Debug, PartialEq)]
pub struct EpochReport {
    pub iteration: usize,
    pub loss: f64,
    pub steps: usize,
    pub elapsed: Duration,
}

struct DisplayProgress {
    epoch_loss: f64, // summed over every update of the epoch
    steps: usize,    // number of updates applied
    bar: ProgressBar,
}

impl DisplayProgress {

    fn new(verbose: bool) -> Self {
        let bar = if verbose {
            ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr())
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {pos} steps, {msg}") {
            bar.set_style(style);
        }
        Self {
            epoch_loss: 0.0,
            steps: 0,
            bar,
        }
    }

    fn reset(&mut self) {
        self.epoch_loss = 0.0;
        self.steps = 0;
        self.bar.reset();
    }

    fn record(&mut self, loss: f32) {
        self.epoch_loss += loss as f64;
        self.steps += 1;
        self.bar.inc(1);
        self.bar.set_message(format!("loss = {:.4}", self.epoch_loss));
    }
}

impl Train {

    pub fn new(model: Cbow, loss_func: NegativeSamplingLoss, loss_func_dist: DistributionLoss, learning_rate: f32, rng: StdRng) -> Train {
        Self {
            model,
            loss_func,
            loss_func_dist,
            optimizer: Sgd::new(learning_rate),
            grads: Gradients::new(),
            rng,
        }
    }

    pub fn model(&self) -> &Cbow {
        &self.model
    }

    /// One optimizer update on a batch from `side`; returns the loss value.
    fn step(&mut self, batch: &Batch, side: Side) -> f32 {
        self.grads.zero_grad();

        let mut loss = self.loss_func.compute(
            &self.model,
            batch.contexts.view(),
            batch.targets.view(),
            side,
            &mut self.rng,
            &mut self.grads,
        );
        // the alignment term stays out of the loss until both languages have statistics
        if let Some(loss_d) = self.loss_func_dist.compute(&self.model, batch.contexts.view(), side) {
            loss += loss_d;
        }

        self.optimizer.step(&mut self.model, &self.grads);
        loss
    }

    /// Runs `params.n_iters` epochs. Each epoch shuffles both corpora in place
    /// and steps through source and target batches side by side until both
    /// are exhausted.
    pub fn train(&mut self, sents_src: &mut [Sentence], sents_trg: &mut [Sentence], params: &TrainParams, verbose: bool) -> Vec<EpochReport> {

        let mut progress = DisplayProgress::new(verbose);
        let mut reports = Vec::with_capacity(params.n_iters);

        for iteration in 0..params.n_iters {

            let start = Instant::now();
            progress.reset();

            sents_src.shuffle(&mut self.rng);
            let mut batches_src = generate_batch(sents_src, params.window_size, params.batch_size);
            sents_trg.shuffle(&mut self.rng);
            let mut batches_trg = generate_batch(sents_trg, params.window_size, params.batch_size);

            loop {
                let batch_src = batches_src.next();
                let batch_trg = batches_trg.next();
                if batch_src.is_none() && batch_trg.is_none() {
                    break;
                }

                for (batch, side) in [(batch_src, Side::Source), (batch_trg, Side::Target)] {
                    if let Some(batch) = batch {
                        let loss = self.step(&batch, side);
                        progress.record(loss);
                    }
                }
            }

            let elapsed = start.elapsed();
            println!("[{}] loss = {:.4}, time = {:.2}", iteration + 1, progress.epoch_loss, elapsed.as_secs_f64());
            debug!("epoch {} applied {} updates", iteration + 1, progress.steps);

            reports.push(EpochReport {
                iteration: iteration + 1,
                loss: progress.epoch_loss,
                steps: progress.steps,
                elapsed,
            });
        }
        progress.bar.finish_and_clear();

        reports
    }

    /// Builds the model and both losses from a fully read corpus, then trains.
    pub fn run(corpus: &Corpus, sents_src: &mut [Sentence], sents_trg: &mut [Sentence], src: &str, trg: &str, params: &TrainParams, verbose: bool) -> Result<(Train, Vec<EpochReport>)> {

        if corpus.window_size() != params.window_size {
            return Err(Error::Config(format!(
                "corpus was read with window {} but training uses {}", corpus.window_size(), params.window_size
            )));
        }

        let mut rng = StdRng::seed_from_u64(params.random_seed);
        let model = Cbow::new(corpus.get_vocabsize(), params.embedding_dim, &mut rng);
        let loss_func = NegativeSamplingLoss::new(corpus.freq(), corpus.vocab_ranges(), src, trg, params.sample_size)?;
        let loss_func_dist = DistributionLoss::new(params.embedding_dim, params.lambda_m, params.lambda_v);

        let mut trainer = Train::new(model, loss_func, loss_func_dist, params.learning_rate, rng);
        let reports = trainer.train(sents_src, sents_trg, params, verbose);
        Ok((trainer, reports))
    }

}
