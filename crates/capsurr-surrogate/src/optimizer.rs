//! Gradient-descent optimizers over a network's variables.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW};
use candle_optimisers::rmsprop::{ParamsRMSprop, RMSprop};
use capsurr_core::CapsurrError;
use serde::{Deserialize, Serialize};

use crate::network::Mlp;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const RMSPROP_RHO: f64 = 0.9;
const EPSILON: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    #[serde(alias = "rms_prop")]
    RmsProp,
}

impl FromStr for OptimizerKind {
    type Err = CapsurrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "rmsprop" | "rms_prop" => Ok(OptimizerKind::RmsProp),
            other => Err(CapsurrError::Config(format!("unknown optimizer '{other}'"))),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptimizerKind::Adam => "adam",
            OptimizerKind::RmsProp => "rmsprop",
        })
    }
}

enum Inner {
    Adam(AdamW),
    RmsProp(RMSprop),
}

/// Optimizer bound to the variables of one network.
pub struct Optimizer {
    kind: OptimizerKind,
    inner: Inner,
}

impl Optimizer {
    pub fn new(kind: OptimizerKind, learning_rate: f64, model: &Mlp) -> Result<Self> {
        let vars = model.vars();
        let inner = match kind {
            // no weight decay, which leaves plain Adam
            OptimizerKind::Adam => Inner::Adam(AdamW::new(
                vars,
                ParamsAdamW {
                    lr: learning_rate,
                    beta1: ADAM_BETA1,
                    beta2: ADAM_BETA2,
                    eps: EPSILON,
                    weight_decay: 0.0,
                },
            )?),
            OptimizerKind::RmsProp => Inner::RmsProp(RMSprop::new(
                vars,
                ParamsRMSprop {
                    lr: learning_rate,
                    alpha: RMSPROP_RHO,
                    eps: EPSILON,
                    ..Default::default()
                },
            )?),
        };
        Ok(Self { kind, inner })
    }

    pub fn kind(&self) -> OptimizerKind {
        self.kind
    }

    pub fn learning_rate(&self) -> f64 {
        match &self.inner {
            Inner::Adam(opt) => opt.learning_rate(),
            Inner::RmsProp(opt) => opt.learning_rate(),
        }
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        match &mut self.inner {
            Inner::Adam(opt) => opt.set_learning_rate(learning_rate),
            Inner::RmsProp(opt) => opt.set_learning_rate(learning_rate),
        }
    }

    /// Backpropagate `loss` and update the network's variables.
    pub fn step(&mut self, loss: &Tensor) -> Result<()> {
        match &mut self.inner {
            Inner::Adam(opt) => opt.backward_step(loss)?,
            Inner::RmsProp(opt) => opt.backward_step(loss)?,
        }
        Ok(())
    }
}

impl fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Optimizer")
            .field("kind", &self.kind)
            .field("learning_rate", &self.learning_rate())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{to_tensor, LayerSpec};
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn linear_fit(kind: OptimizerKind) -> (f64, f64) {
        let mut rng = StdRng::seed_from_u64(11);
        let model = Mlp::new(1, &[] as &[LayerSpec], 1, &mut rng).unwrap();
        let x = array![[-1.0], [0.0], [1.0], [2.0]];
        let y = to_tensor(&x.mapv(|v| 3.0 * v - 1.0)).unwrap();
        let x = to_tensor(&x).unwrap();
        let mut opt = Optimizer::new(kind, 0.01, &model).unwrap();
        let loss = |model: &Mlp| candle_nn::loss::mse(&model.forward(&x).unwrap(), &y).unwrap();
        let first = loss(&model).to_scalar::<f64>().unwrap();
        for _ in 0..2000 {
            opt.step(&loss(&model)).unwrap();
        }
        (first, loss(&model).to_scalar::<f64>().unwrap())
    }

    #[test]
    fn adam_fits_a_line() {
        let (first, last) = linear_fit(OptimizerKind::Adam);
        assert!(last < first * 1e-2, "{first} -> {last}");
    }

    #[test]
    fn rmsprop_fits_a_line() {
        let (first, last) = linear_fit(OptimizerKind::RmsProp);
        assert!(last < first * 1e-2, "{first} -> {last}");
    }

    #[test]
    fn learning_rate_can_be_lowered() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = Mlp::new(2, &[] as &[LayerSpec], 1, &mut rng).unwrap();
        let mut opt = Optimizer::new(OptimizerKind::RmsProp, 0.1, &model).unwrap();
        assert_eq!(opt.kind(), OptimizerKind::RmsProp);
        opt.set_learning_rate(0.01);
        assert_eq!(opt.learning_rate(), 0.01);
    }

    #[test]
    fn names_parse() {
        assert_eq!("RMSprop".parse::<OptimizerKind>().unwrap(), OptimizerKind::RmsProp);
        assert_eq!(OptimizerKind::Adam.to_string(), "adam");
        assert!("sgd".parse::<OptimizerKind>().is_err());
    }
}
