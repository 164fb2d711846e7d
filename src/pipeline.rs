// imports
use crate::config::files_handling::{self, CompressedText, OpenText, WordVectors};
use crate::config::Params;
use crate::corpus::Corpus;
use crate::train::{EpochReport, Train};

use std::error::Error;
use std::time::Instant;
use log::{info, warn};

pub struct Pipeline {}

impl Pipeline {

    // runs the main procedure on parsed arguments -
    // -> reading both corpora into one vocabulary
    // -> training, then saving the context vectors

    pub fn run_with(params: &Params) -> Result<Vec<EpochReport>, Box<dyn Error>> {
        Pipeline::run_with_opener(params, &CompressedText)
    }

    pub fn run_with_opener<O: OpenText>(params: &Params, opener: &O) -> Result<Vec<EpochReport>, Box<dyn Error>> {

        params.validate()?;
        if params.verbose {
            info!("{}", params);
        }
        if params.cuda {
            warn!("CUDA was requested but this build trains on the CPU");
        }

        // load data
        let timer = Instant::now();
        let mut corpus = Corpus::new(params.train.window_size, params.verbose);
        let mut sents_src = corpus.read_all(opener, &params.src.path, &params.src.lang)?;
        let mut sents_trg = corpus.read_all(opener, &params.trg.path, &params.trg.lang)?;
        corpus.set_i2w();
        info!(
            "read {} + {} sentences, vocabulary of {} in {:.2} seconds",
            sents_src.len(), sents_trg.len(), corpus.get_vocabsize(), timer.elapsed().as_secs_f64()
        );

        // train
        let (trainer, reports) = Train::run(
            &corpus,
            &mut sents_src,
            &mut sents_trg,
            &params.src.lang,
            &params.trg.lang,
            &params.train,
            params.verbose,
        )?;

        // save vectors
        let embs = trainer.model().export();
        if params.verbose {
            info!("Save embeddings to {}", params.output.display());
        }
        files_handling::save_output(&params.output, WordVectors { words: corpus.i2w(), vectors: embs })?;
        if let Some(path) = &params.save_npy {
            files_handling::save_output(path, embs)?;
        }

        Ok(reports)
    }

}
