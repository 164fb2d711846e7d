use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::ops::AddAssign;

use ndarray::{Array1, ArrayView1};

use crate::model::{Cbow, Table};

/// Row-sparse gradients for both embedding tables. Contributions to the same
/// row are summed.
#[derive(Debug, Default)]
pub struct Gradients {
    context: BTreeMap<usize, Array1<f32>>,
    target: BTreeMap<usize, Array1<f32>>,
}

impl Gradients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zero_grad(&mut self) {
        self.context.clear();
        self.target.clear();
    }

    pub fn accumulate(&mut self, table: Table, id: usize, grad: ArrayView1<'_, f32>) {
        match self.rows_mut(table).entry(id) {
            Entry::Vacant(e) => {
                e.insert(grad.to_owned());
            }
            Entry::Occupied(mut e) => e.get_mut().add_assign(&grad),
        }
    }

    pub fn get(&self, table: Table, id: usize) -> Option<&Array1<f32>> {
        self.rows(table).get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_empty() && self.target.is_empty()
    }

    fn rows(&self, table: Table) -> &BTreeMap<usize, Array1<f32>> {
        match table {
            Table::Context => &self.context,
            Table::Target => &self.target,
        }
    }

    fn rows_mut(&mut self, table: Table) -> &mut BTreeMap<usize, Array1<f32>> {
        match table {
            Table::Context => &mut self.context,
            Table::Target => &mut self.target,
        }
    }
}

/// Plain stochastic gradient descent on the touched rows.
#[derive(Clone, Copy, Debug)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }

    pub fn step(&self, model: &mut Cbow, grads: &Gradients) {
        for table in [Table::Context, Table::Target] {
            let mut weights = model.table_mut(table);
            for (&id, grad) in grads.rows(table) {
                weights.row_mut(id).scaled_add(-self.learning_rate, grad);
            }
        }
    }
}
