use super::config::OptimizerKind;
use nalgebra::DMatrix;

/// Per-tensor optimizer state: momentum (or first-moment) buffer, plus the
/// second-moment buffer for Adam.
#[derive(Debug, Clone)]
struct Slot {
    first: DMatrix<f64>,
    second: Option<DMatrix<f64>>,
}

/// Applies the configured update rule to the model's tensors, owning all
/// running optimizer state (momentum/moment buffers). One optimizer belongs
/// to exactly one trainer; nothing else mutates parameters.
#[derive(Debug, Clone)]
pub struct Optimizer {
    kind: OptimizerKind,
    learning_rate: f64,
    slots: Vec<Slot>,
    steps: u64,
}

impl Optimizer {
    pub fn new(kind: OptimizerKind, learning_rate: f64) -> Self {
        Self {
            kind,
            learning_rate,
            slots: Vec::new(),
            steps: 0,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Shrinks the learning rate in place (instability backoff).
    pub fn scale_learning_rate(&mut self, factor: f64) {
        self.learning_rate *= factor;
    }

    /// Applies one update. `params` and `grads` must be the model's tensors
    /// and their gradients in the same canonical order; buffers are lazily
    /// initialized on the first call.
    pub fn step(&mut self, mut params: Vec<&mut DMatrix<f64>>, grads: &[&DMatrix<f64>]) {
        debug_assert_eq!(params.len(), grads.len());
        if self.slots.is_empty() {
            let needs_second = matches!(self.kind, OptimizerKind::Adam { .. });
            self.slots = grads
                .iter()
                .map(|g| Slot {
                    first: DMatrix::zeros(g.nrows(), g.ncols()),
                    second: needs_second.then(|| DMatrix::zeros(g.nrows(), g.ncols())),
                })
                .collect();
        }
        self.steps += 1;

        match self.kind {
            OptimizerKind::Sgd { momentum } => {
                for (slot, (param, grad)) in self
                    .slots
                    .iter_mut()
                    .zip(params.iter_mut().zip(grads.iter()))
                {
                    if momentum == 0.0 {
                        **param -= self.learning_rate * *grad;
                    } else {
                        slot.first = momentum * &slot.first + *grad;
                        **param -= self.learning_rate * &slot.first;
                    }
                }
            }
            OptimizerKind::Adam {
                beta1,
                beta2,
                epsilon,
            } => {
                let t = self.steps as i32;
                let first_correction = 1.0 - beta1.powi(t);
                let second_correction = 1.0 - beta2.powi(t);
                for (slot, (param, grad)) in self
                    .slots
                    .iter_mut()
                    .zip(params.iter_mut().zip(grads.iter()))
                {
                    slot.first = beta1 * &slot.first + (1.0 - beta1) * *grad;
                    let second = slot.second.as_mut().expect("adam carries second moments");
                    *second = beta2 * &*second + (1.0 - beta2) * grad.map(|g| g * g);
                    for i in 0..param.nrows() {
                        for j in 0..param.ncols() {
                            let m_hat = slot.first[(i, j)] / first_correction;
                            let v_hat = second[(i, j)] / second_correction;
                            (*param)[(i, j)] -=
                                self.learning_rate * m_hat / (v_hat.sqrt() + epsilon);
                        }
                    }
                }
            }
        }
    }
}
