// External imports
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::Backend;
use burn::tensor::{activation, Tensor};
use serde::{Deserialize, Serialize};

// Internal imports
use super::step_2_lstm_cell::LSTM;
use crate::constants::{DEFAULT_DENSE_UNITS, DEFAULT_DROPOUT, DEFAULT_HIDDEN_SIZE};

/// Layer sizes of the forecasting network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArchitecture {
    pub input_size: usize,
    pub hidden_size: usize,
    pub dropout: f64,
    /// Width of the intermediate dense layer; 0 disables it
    pub dense_units: usize,
}

impl ModelArchitecture {
    pub fn new(input_size: usize) -> Self {
        Self {
            input_size,
            hidden_size: DEFAULT_HIDDEN_SIZE,
            dropout: DEFAULT_DROPOUT,
            dense_units: DEFAULT_DENSE_UNITS,
        }
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_dense_units(mut self, dense_units: usize) -> Self {
        self.dense_units = dense_units;
        self
    }
}

/// TimeSeriesLstm architecture for forecasting
///
/// Two stacked LSTM layers, each followed by dropout, then an optional ReLU
/// dense layer and a linear projection to one scaled value.
#[derive(Module, Debug)]
pub struct TimeSeriesLstm<B: Backend> {
    input_size: usize,
    hidden_size: usize,
    lstm1: LSTM<B>,
    dropout1: Dropout,
    lstm2: LSTM<B>,
    dropout2: Dropout,
    dense: Option<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> TimeSeriesLstm<B> {
    /// Create a new TimeSeriesLstm model with freshly initialised weights
    pub fn new(architecture: &ModelArchitecture, device: &B::Device) -> Self {
        let hidden_size = architecture.hidden_size;

        let lstm1 = LSTM::new(architecture.input_size, hidden_size, device);
        let lstm2 = LSTM::new(hidden_size, hidden_size, device);
        let dropout1 = DropoutConfig::new(architecture.dropout).init();
        let dropout2 = DropoutConfig::new(architecture.dropout).init();

        let (dense, output_in) = if architecture.dense_units > 0 {
            (
                Some(LinearConfig::new(hidden_size, architecture.dense_units).init(device)),
                architecture.dense_units,
            )
        } else {
            (None, hidden_size)
        };
        let output = LinearConfig::new(output_in, 1).init(device);

        Self {
            input_size: architecture.input_size,
            hidden_size,
            lstm1,
            dropout1,
            lstm2,
            dropout2,
            dense,
            output,
        }
    }

    /// Getter for input_size
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Confirms every loaded weight matches `architecture`
    ///
    /// Sizes stored on the module come from the architecture, not from the
    /// weight record, so a record saved for other sizes loads without error
    /// and only fails inside `forward`.
    pub fn check_weights(&self, architecture: &ModelArchitecture) -> Result<(), String> {
        self.lstm1.check_weights().map_err(|e| format!("lstm1: {}", e))?;
        self.lstm2.check_weights().map_err(|e| format!("lstm2: {}", e))?;

        let hidden = architecture.hidden_size;
        let output_in = match (&self.dense, architecture.dense_units) {
            (None, 0) => hidden,
            (Some(dense), units) if units > 0 => {
                let dims = dense.weight.val().dims();
                if dims != [hidden, units] {
                    return Err(format!("dense weights are {:?}, expected {:?}", dims, [hidden, units]));
                }
                units
            }
            (Some(_), _) => return Err("dense layer present but disabled in architecture".to_string()),
            (None, units) => return Err(format!("dense layer of {} units is missing", units)),
        };

        let dims = self.output.weight.val().dims();
        if dims != [output_in, 1] {
            return Err(format!("output weights are {:?}, expected {:?}", dims, [output_in, 1]));
        }
        Ok(())
    }

    /// Forward pass: `[batch, seq, features]` to `[batch, 1]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let sequence = self.dropout1.forward(self.lstm1.forward(x));
        let sequence = self.dropout2.forward(self.lstm2.forward(sequence));

        // Only the last time step feeds the head
        let [batch_size, seq_len, hidden] = sequence.dims();
        let last = sequence
            .narrow(1, seq_len - 1, 1)
            .reshape([batch_size, hidden]);

        let features = match &self.dense {
            Some(dense) => activation::relu(dense.forward(last)),
            None => last,
        };
        self.output.forward(features)
    }
}

/// Mean squared error over a batch
pub fn mse_loss<B: Backend>(predictions: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let diff = predictions - targets;
    (diff.clone() * diff).mean()
}

/// Mean absolute error over a batch
pub fn mae<B: Backend>(predictions: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    (predictions - targets).abs().mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_shape_with_and_without_dense() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::zeros([4, 6, 3], &device);

        let arch = ModelArchitecture::new(3).with_hidden_size(8).with_dense_units(5);
        let model = TimeSeriesLstm::<TestBackend>::new(&arch, &device);
        assert_eq!(model.forward(x.clone()).dims(), [4, 1]);

        let arch = arch.with_dense_units(0);
        let model = TimeSeriesLstm::<TestBackend>::new(&arch, &device);
        assert_eq!(model.forward(x).dims(), [4, 1]);
        assert_eq!(model.input_size(), 3);
    }

    #[test]
    fn test_mse_and_mae() {
        let device = Default::default();
        let pred = Tensor::<TestBackend, 1>::from_floats([1.0, 3.0].as_slice(), &device).reshape([2, 1]);
        let target = Tensor::<TestBackend, 1>::from_floats([0.0, 1.0].as_slice(), &device).reshape([2, 1]);
        let loss: f32 = mse_loss(pred.clone(), target.clone()).into_scalar();
        let abs: f32 = mae(pred, target).into_scalar();
        assert!((loss - 2.5).abs() < 1e-6);
        assert!((abs - 1.5).abs() < 1e-6);
    }
}
