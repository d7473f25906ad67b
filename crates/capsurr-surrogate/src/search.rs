//! Hyperparameter search space.

use capsurr_core::config::SurrogateConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::network::{Activation, LayerSpec};
use crate::optimizer::OptimizerKind;

/// One point of the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub layers: Vec<LayerSpec>,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
}

const BASELINE_LEARNING_RATE: f64 = 1e-3;

impl Hyperparameters {
    /// Fixed architecture trained with Adam at 1e-3.
    pub fn baseline(layers: Vec<LayerSpec>) -> Self {
        Self {
            layers,
            learning_rate: BASELINE_LEARNING_RATE,
            optimizer: OptimizerKind::Adam,
        }
    }

    pub fn describe(&self) -> String {
        let layers: Vec<String> = self
            .layers
            .iter()
            .map(|l| format!("{}:{}:{:.2}", l.units, l.activation, l.dropout))
            .collect();
        format!(
            "[{}] lr={:.2e} {}",
            layers.join(", "),
            self.learning_rate,
            self.optimizer
        )
    }
}

/// Ranges every trial is drawn from. Each hidden layer picks its own width,
/// activation and dropout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub min_layers: usize,
    pub max_layers: usize,
    pub min_units: usize,
    pub max_units: usize,
    pub units_step: usize,
    pub activations: Vec<Activation>,
    pub min_dropout: f64,
    pub max_dropout: f64,
    pub dropout_step: f64,
    pub min_learning_rate: f64,
    pub max_learning_rate: f64,
    pub optimizers: Vec<OptimizerKind>,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            min_layers: 2,
            max_layers: 10,
            min_units: 32,
            max_units: 512,
            units_step: 32,
            activations: vec![Activation::Relu, Activation::Tanh],
            min_dropout: 0.25,
            max_dropout: 0.75,
            dropout_step: 0.1,
            min_learning_rate: 1e-4,
            max_learning_rate: 1e-2,
            optimizers: vec![OptimizerKind::RmsProp, OptimizerKind::Adam],
        }
    }
}

impl SearchSpace {
    /// Default ranges with the layer and width bounds of `config`.
    pub fn from_config(config: &SurrogateConfig) -> Self {
        Self {
            min_layers: config.min_layers,
            max_layers: config.max_layers,
            max_units: config.max_units,
            ..Self::default()
        }
    }

    /// Width of [`SearchSpace::encode`] vectors.
    pub fn encoded_len(&self) -> usize {
        1 + 3 * self.max_layers + 2
    }

    pub fn unit_choices(&self) -> Vec<usize> {
        let step = self.units_step.max(1);
        (self.min_units..=self.max_units).step_by(step).collect()
    }

    pub fn dropout_choices(&self) -> Vec<f64> {
        if self.dropout_step <= 0.0 {
            return vec![self.min_dropout];
        }
        let span = (self.max_dropout - self.min_dropout) / self.dropout_step;
        let count = (span + 1e-9).floor() as usize;
        (0..=count)
            .map(|k| {
                let value = self.min_dropout + k as f64 * self.dropout_step;
                (value * 1e10).round() / 1e10
            })
            .collect()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Hyperparameters {
        let units = self.unit_choices();
        let dropouts = self.dropout_choices();
        let n_layers = rng.gen_range(self.min_layers..=self.max_layers.max(self.min_layers));
        let layers = (0..n_layers)
            .map(|_| LayerSpec {
                units: units[rng.gen_range(0..units.len())],
                activation: self.activations[rng.gen_range(0..self.activations.len())],
                dropout: dropouts[rng.gen_range(0..dropouts.len())],
            })
            .collect();
        let (lo, hi) = (self.min_learning_rate.ln(), self.max_learning_rate.ln());
        let learning_rate = if hi > lo {
            rng.gen_range(lo..hi)
                .exp()
                .clamp(self.min_learning_rate, self.max_learning_rate)
        } else {
            self.min_learning_rate
        };
        Hyperparameters {
            layers,
            learning_rate,
            optimizer: self.optimizers[rng.gen_range(0..self.optimizers.len())],
        }
    }

    /// Map hyperparameters into the unit cube for the Gaussian-process
    /// model. Absent layers encode as zeros.
    pub fn encode(&self, hp: &Hyperparameters) -> Vec<f64> {
        let unit = |value: f64, lo: f64, hi: f64| {
            if hi > lo {
                ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        let index_of = |pos: Option<usize>, len: usize| match pos {
            Some(i) if len > 1 => i as f64 / (len - 1) as f64,
            _ => 0.0,
        };

        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(unit(
            hp.layers.len() as f64,
            self.min_layers as f64,
            self.max_layers as f64,
        ));
        for i in 0..self.max_layers {
            match hp.layers.get(i) {
                Some(layer) => {
                    out.push(unit(
                        layer.units as f64,
                        self.min_units as f64,
                        self.max_units as f64,
                    ));
                    out.push(index_of(
                        self.activations.iter().position(|a| *a == layer.activation),
                        self.activations.len(),
                    ));
                    out.push(unit(layer.dropout, self.min_dropout, self.max_dropout));
                }
                None => out.extend([0.0, 0.0, 0.0]),
            }
        }
        out.push(unit(
            hp.learning_rate.ln(),
            self.min_learning_rate.ln(),
            self.max_learning_rate.ln(),
        ));
        out.push(index_of(
            self.optimizers.iter().position(|o| *o == hp.optimizer),
            self.optimizers.len(),
        ));
        out
    }
}
