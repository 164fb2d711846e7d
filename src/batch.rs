use ndarray::{Array1, Array2};
use crate::corpus::Sentence;

/// `batch_size` (context, target) pairs. Row `i` of `contexts` holds the
/// `window` ids left of `targets[i]` followed by the `window` ids right of it.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub contexts: Array2<usize>,
    pub targets: Array1<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Slides a window over each sentence and hands out full batches only; pairs
/// left over at the end are dropped.
pub struct BatchGenerator<'a> {
    sentences: &'a [Sentence],
    window: usize,
    batch_size: usize,
    sent: usize,
    pos: usize,
    contexts: Vec<usize>,
    targets: Vec<usize>,
}

pub fn generate_batch(sentences: &[Sentence], window: usize, batch_size: usize) -> BatchGenerator<'_> {
    BatchGenerator {
        sentences,
        window,
        batch_size,
        sent: 0,
        pos: window,
        contexts: Vec::with_capacity(batch_size * 2 * window),
        targets: Vec::with_capacity(batch_size),
    }
}

impl Iterator for BatchGenerator<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.batch_size == 0 {
            return None;
        }
        let window = self.window;

        while let Some(sentence) = self.sentences.get(self.sent) {
            // center positions run over [window, len - window)
            if self.pos + window >= sentence.len() {
                self.sent += 1;
                self.pos = window;
                continue;
            }

            let pos = self.pos;
            self.contexts.extend_from_slice(&sentence[pos - window..pos]);
            self.contexts.extend_from_slice(&sentence[pos + 1..pos + window + 1]);
            self.targets.push(sentence[pos]);
            self.pos += 1;

            if self.targets.len() >= self.batch_size {
                let width = 2 * window;
                let contexts = std::mem::take(&mut self.contexts);
                let targets = std::mem::take(&mut self.targets);
                return Some(Batch {
                    contexts: Array2::from_shape_fn((targets.len(), width), |(i, j)| contexts[i * width + j]),
                    targets: Array1::from(targets),
                });
            }
        }

        None
    }
}
