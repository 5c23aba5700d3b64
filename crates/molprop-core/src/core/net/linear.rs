use super::ops::{add_row_broadcast, column_sums};
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// A dense affine transformation `y = x * w + b` with weights stored as an
/// `input x output` matrix and the bias as a `1 x output` row.
///
/// The struct doubles as its own gradient container: a zeroed
/// `LinearParams` of the same shape accumulates `dW`/`db` during the
/// backward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearParams {
    pub w: DMatrix<f64>,
    pub b: DMatrix<f64>,
}

impl LinearParams {
    /// Glorot-normal initialization for the weights, zero bias.
    pub fn init<R: Rng>(input: usize, output: usize, rng: &mut R) -> Self {
        let std_dev = (2.0 / (input + output) as f64).sqrt();
        let normal = Normal::new(0.0, std_dev).expect("finite standard deviation");
        Self {
            w: DMatrix::from_fn(input, output, |_, _| normal.sample(rng)),
            b: DMatrix::zeros(1, output),
        }
    }

    /// All-zero parameters of the given shape.
    pub fn zeros(input: usize, output: usize) -> Self {
        Self {
            w: DMatrix::zeros(input, output),
            b: DMatrix::zeros(1, output),
        }
    }

    /// A zeroed gradient container matching this layer's shapes.
    pub fn zeros_like(&self) -> Self {
        Self {
            w: DMatrix::zeros(self.w.nrows(), self.w.ncols()),
            b: DMatrix::zeros(1, self.b.ncols()),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.w.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.w.ncols()
    }

    /// Computes `x * w + b` for a row-per-sample input.
    pub fn forward(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let mut y = x * &self.w;
        add_row_broadcast(&mut y, &self.b);
        y
    }

    /// Accumulates `dW`/`db` into `grads` and returns the gradient with
    /// respect to the input, given the forward input `x` and the gradient
    /// `d_out` of the loss with respect to the output.
    pub fn backward(
        &self,
        x: &DMatrix<f64>,
        d_out: &DMatrix<f64>,
        grads: &mut LinearParams,
    ) -> DMatrix<f64> {
        grads.w += x.transpose() * d_out;
        grads.b += column_sums(d_out);
        d_out * self.w.transpose()
    }
}
