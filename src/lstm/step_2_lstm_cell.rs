// External imports
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{activation, backend::Backend, Tensor};

/// Single unidirectional LSTM layer unrolled over the time axis
#[derive(Module, Debug)]
pub struct LSTM<B: Backend> {
    input_size: usize,
    hidden_size: usize,

    // Input, forget, cell and output gates combined: [in, 4 * hidden]
    input_weights: Linear<B>,
    hidden_weights: Linear<B>,
}

impl<B: Backend> LSTM<B> {
    /// Create a new LSTM layer
    pub fn new(input_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        let gate_size = 4 * hidden_size;
        let input_weights = LinearConfig::new(input_size, gate_size).init(device);
        let hidden_weights = LinearConfig::new(hidden_size, gate_size)
            .with_bias(false)
            .init(device);

        Self {
            input_size,
            hidden_size,
            input_weights,
            hidden_weights,
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Confirms the gate weights match the sizes this layer was built with
    pub fn check_weights(&self) -> Result<(), String> {
        let gate_size = 4 * self.hidden_size;
        let input = self.input_weights.weight.val().dims();
        if input != [self.input_size, gate_size] {
            return Err(format!(
                "input weights are {:?}, expected {:?}",
                input,
                [self.input_size, gate_size]
            ));
        }
        let hidden = self.hidden_weights.weight.val().dims();
        if hidden != [self.hidden_size, gate_size] {
            return Err(format!(
                "hidden weights are {:?}, expected {:?}",
                hidden,
                [self.hidden_size, gate_size]
            ));
        }
        match &self.input_weights.bias {
            Some(bias) if bias.val().dims() == [gate_size] => Ok(()),
            Some(bias) => Err(format!(
                "gate bias is {:?}, expected [{}]",
                bias.val().dims(),
                gate_size
            )),
            None => Err("gate bias is missing".to_string()),
        }
    }

    /// Forward pass: `[batch, seq, input]` to the hidden sequence `[batch, seq, hidden]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let device = x.device();
        let [batch_size, seq_len, _] = x.dims();

        // Initial hidden and cell states (zeros)
        let mut h = Tensor::<B, 2>::zeros([batch_size, self.hidden_size], &device);
        let mut c = Tensor::<B, 2>::zeros([batch_size, self.hidden_size], &device);
        let mut outputs = Vec::with_capacity(seq_len);

        for t in 0..seq_len {
            let x_t = x
                .clone()
                .narrow(1, t, 1)
                .reshape([batch_size, self.input_size]);

            let gates = self.input_weights.forward(x_t) + self.hidden_weights.forward(h);

            let i_gate = gates.clone().narrow(1, 0, self.hidden_size);
            let f_gate = gates.clone().narrow(1, self.hidden_size, self.hidden_size);
            let g_gate = gates.clone().narrow(1, 2 * self.hidden_size, self.hidden_size);
            let o_gate = gates.narrow(1, 3 * self.hidden_size, self.hidden_size);

            let i = activation::sigmoid(i_gate);
            let f = activation::sigmoid(f_gate);
            let g = activation::tanh(g_gate);
            let o = activation::sigmoid(o_gate);

            c = f * c + i * g;
            h = o * activation::tanh(c.clone());

            outputs.push(h.clone().unsqueeze_dim::<3>(1));
        }

        Tensor::cat(outputs, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let lstm = LSTM::<TestBackend>::new(3, 5, &device);
        let x = Tensor::<TestBackend, 3>::zeros([2, 7, 3], &device);
        assert_eq!(lstm.forward(x).dims(), [2, 7, 5]);
    }

    #[test]
    fn test_check_weights_catches_foreign_record() {
        let device = Default::default();
        let wide = LSTM::<TestBackend>::new(3, 6, &device);
        assert!(wide.check_weights().is_ok());

        let narrow = LSTM::<TestBackend>::new(3, 4, &device).load_record(wide.into_record());
        let err = narrow.check_weights().unwrap_err();
        assert!(err.contains("input weights"), "{}", err);
    }

    #[test]
    fn test_hidden_state_is_bounded() {
        let device = Default::default();
        let lstm = LSTM::<TestBackend>::new(2, 4, &device);
        let x = Tensor::<TestBackend, 3>::ones([1, 5, 2], &device) * 100.0;
        let values = lstm.forward(x).into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.abs() <= 1.0));
    }
}
