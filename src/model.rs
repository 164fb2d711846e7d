
use ndarray::prelude::*;
use ndarray::Zip;
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::Rng;

/// The two lookup tables of the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    /// Rows averaged over a window; these are the exported word vectors.
    Context,
    /// Rows scored against a pooled context.
    Target,
}

/// Continuous bag-of-words model over the whole bilingual vocabulary.
#[derive(Clone, Debug)]
pub struct Cbow {
    embeddings_x: Array2<f32>,
    embeddings_y: Array2<f32>,
}

impl Cbow {

    pub fn new<R: Rng + ?Sized>(vocab_size: usize, embedding_dim: usize, rng: &mut R) -> Cbow {
        let scale = embedding_dim as f32;
        Self {
            embeddings_x: Array::random_using((vocab_size, embedding_dim), Uniform::new(-0.5f32, 0.5), rng) / scale,
            embeddings_y: Array::random_using((vocab_size, embedding_dim), Uniform::new(-0.5f32, 0.5), rng) / scale,
        }
    }

    /// Builds a model around existing tables of equal shape.
    pub fn from_tables(embeddings_x: Array2<f32>, embeddings_y: Array2<f32>) -> Cbow {
        assert_eq!(embeddings_x.dim(), embeddings_y.dim(), "context and target tables differ in shape");
        Self { embeddings_x, embeddings_y }
    }

    pub fn vocab_size(&self) -> usize {
        self.embeddings_x.nrows()
    }

    pub fn dim(&self) -> usize {
        self.embeddings_x.ncols()
    }

    pub fn table(&self, table: Table) -> ArrayView2<'_, f32> {
        match table {
            Table::Context => self.embeddings_x.view(),
            Table::Target => self.embeddings_y.view(),
        }
    }

    pub fn table_mut(&mut self, table: Table) -> ArrayViewMut2<'_, f32> {
        match table {
            Table::Context => self.embeddings_x.view_mut(),
            Table::Target => self.embeddings_y.view_mut(),
        }
    }

    /// Mean of the context-side rows of each window, shape `(B, dim)`.
    pub fn pool(&self, contexts: ArrayView2<'_, usize>) -> Array2<f32> {
        let n = contexts.ncols() as f32;
        let mut pooled = Array2::<f32>::zeros((contexts.nrows(), self.dim()));
        Zip::from(pooled.rows_mut()).and(contexts.rows()).for_each(|mut row, ids| {
            for &id in ids {
                row += &self.embeddings_x.row(id);
            }
            row /= n;
        });
        pooled
    }

    /// Sum of the context-side rows of a single window.
    pub fn window_sum(&self, window: ArrayView1<'_, usize>) -> Array1<f32> {
        let mut sum = Array1::<f32>::zeros(self.dim());
        for &id in window {
            sum += &self.embeddings_x.row(id);
        }
        sum
    }

    /// Positive-pair scores for already pooled contexts.
    pub fn score_pooled(&self, pooled: ArrayView2<'_, f32>, targets: ArrayView1<'_, usize>) -> Array1<f32> {
        let mut scores = Array1::<f32>::zeros(pooled.nrows());
        Zip::from(&mut scores).and(pooled.rows()).and(targets).for_each(|s, c, &t| {
            *s = c.dot(&self.embeddings_y.row(t));
        });
        scores
    }

    /// Scores of every pooled context against its own row of target ids.
    pub fn score_negatives_pooled(&self, pooled: ArrayView2<'_, f32>, negatives: ArrayView2<'_, usize>) -> Array2<f32> {
        let mut scores = Array2::<f32>::zeros(negatives.raw_dim());
        Zip::from(scores.rows_mut()).and(pooled.rows()).and(negatives.rows()).for_each(|mut out, c, ids| {
            for (s, &id) in out.iter_mut().zip(ids) {
                *s = c.dot(&self.embeddings_y.row(id));
            }
        });
        scores
    }

    /// Dot product of each pooled context with its target, shape `(B,)`.
    pub fn score(&self, contexts: ArrayView2<'_, usize>, targets: ArrayView1<'_, usize>) -> Array1<f32> {
        self.score_pooled(self.pool(contexts).view(), targets)
    }

    /// Dot products of each pooled context with its `K` negatives, shape `(B, K)`.
    pub fn score_negatives(&self, contexts: ArrayView2<'_, usize>, negatives: ArrayView2<'_, usize>) -> Array2<f32> {
        self.score_negatives_pooled(self.pool(contexts).view(), negatives)
    }

    /// The context-side table, offered as the learned word vectors.
    pub fn export(&self) -> ArrayView2<'_, f32> {
        self.embeddings_x.view()
    }
}

pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `ln(sigmoid(x))` without overflow for large `|x|`.
pub fn log_sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        -(-x).exp().ln_1p()
    } else {
        x - x.exp().ln_1p()
    }
}


#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn toy() -> Cbow {
        let x = array![[1.0, 0.0], [0.0, 1.0], [2.0, 2.0], [-1.0, 3.0]];
        let y = array![[1.0, 1.0], [0.5, -1.0], [0.0, 2.0], [3.0, 0.0]];
        Cbow::from_tables(x, y)
    }

    #[test]
    fn scores_use_mean_pooled_contexts() {
        let model = toy();
        let contexts = array![[0, 1], [2, 3]];
        let pooled = model.pool(contexts.view());
        assert_eq!(pooled, array![[0.5, 0.5], [0.5, 2.5]]);

        let scores = model.score(contexts.view(), array![0, 3].view());
        assert_eq!(scores, array![1.0, 1.5]);

        let neg = model.score_negatives(contexts.view(), array![[1, 2, 3], [0, 0, 1]].view());
        assert_eq!(neg.dim(), (2, 3));
        assert_eq!(neg, array![[-0.25, 1.0, 1.5], [3.0, 3.0, -2.25]]);

        assert_eq!(model.window_sum(array![1, 2, 2].view()), array![4.0, 5.0]);
    }

    #[test]
    fn init_is_small_and_seeded() {
        let a = Cbow::new(10, 8, &mut StdRng::seed_from_u64(1));
        let b = Cbow::new(10, 8, &mut StdRng::seed_from_u64(1));
        assert_eq!(a.export(), b.export());
        assert_eq!(a.export().dim(), (10, 8));
        assert!(a.export().iter().all(|v| v.abs() <= 0.5 / 8.0));
        assert_ne!(a.table(Table::Context), a.table(Table::Target));
    }

    #[test]
    fn log_sigmoid_is_stable() {
        assert!((log_sigmoid(0.0) - 0.5f32.ln()).abs() < 1e-6);
        assert!(log_sigmoid(-200.0).is_finite());
        assert!((log_sigmoid(-200.0) + 200.0).abs() < 1e-3);
        assert_eq!(log_sigmoid(200.0), 0.0);
        assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-6);
    }
}
