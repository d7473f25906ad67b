//! Dense feedforward network built on candle tensors.
//!
//! Parameters live in [`Var`]s so the framework's autograd and optimizers
//! can drive training. Initial weights and dropout masks are drawn from a
//! caller-provided RNG, which keeps runs reproducible for a seed.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use candle_core::{Device, Tensor, Var};
use candle_nn::{Linear, Module};
use capsurr_core::CapsurrError;
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Tanh,
    Linear,
}

impl Activation {
    fn forward(self, z: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Activation::Relu => z.relu(),
            Activation::Tanh => z.tanh(),
            Activation::Linear => Ok(z.clone()),
        }
    }
}

impl FromStr for Activation {
    type Err = CapsurrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "tanh" => Ok(Activation::Tanh),
            "linear" => Ok(Activation::Linear),
            other => Err(CapsurrError::Config(format!("unknown activation '{other}'"))),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Activation::Relu => "relu",
            Activation::Tanh => "tanh",
            Activation::Linear => "linear",
        })
    }
}

/// Shape of one hidden layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub units: usize,
    pub activation: Activation,
    /// Fraction of activations dropped during training
    pub dropout: f64,
}

/// Row-major copy of an array as a CPU tensor.
pub fn to_tensor(x: &Array2<f64>) -> Result<Tensor> {
    let data: Vec<f64> = x.iter().copied().collect();
    Ok(Tensor::from_vec(data, x.dim(), &Device::Cpu)?)
}

pub fn from_tensor(t: &Tensor) -> Result<Array2<f64>> {
    let (rows, cols) = t.dims2()?;
    let data = t.to_vec2::<f64>()?.concat();
    Ok(Array2::from_shape_vec((rows, cols), data)?)
}

/// Fully connected layer: `activation(x · Wᵀ + b)`, followed by dropout
/// while training.
struct Dense {
    /// (units, inputs)
    weight: Var,
    bias: Var,
    linear: Linear,
    activation: Activation,
    dropout: f64,
}

impl Dense {
    fn from_parts(
        inputs: usize,
        units: usize,
        weights: Vec<f64>,
        bias: Vec<f64>,
        activation: Activation,
        dropout: f64,
    ) -> Result<Self> {
        let weight = Var::from_tensor(&Tensor::from_vec(weights, (units, inputs), &Device::Cpu)?)?;
        let bias = Var::from_tensor(&Tensor::from_vec(bias, units, &Device::Cpu)?)?;
        let linear = Linear::new(weight.as_tensor().clone(), Some(bias.as_tensor().clone()));
        Ok(Self {
            weight,
            bias,
            linear,
            activation,
            dropout,
        })
    }

    /// Glorot-uniform weights and zero bias.
    fn glorot<R: Rng + ?Sized>(
        inputs: usize,
        units: usize,
        activation: Activation,
        dropout: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let limit = (6.0 / (inputs + units).max(1) as f64).sqrt();
        let weights = (0..inputs * units)
            .map(|_| rng.gen_range(-limit..=limit))
            .collect();
        Self::from_parts(inputs, units, weights, vec![0.0; units], activation, dropout)
    }

    fn inputs(&self) -> usize {
        self.weight.dims()[1]
    }

    fn units(&self) -> usize {
        self.weight.dims()[0]
    }

    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        self.activation.forward(&self.linear.forward(x)?)
    }

    fn record(&self) -> Result<DenseRecord> {
        Ok(DenseRecord {
            inputs: self.inputs(),
            units: self.units(),
            weights: self.weight.as_tensor().flatten_all()?.to_vec1::<f64>()?,
            bias: self.bias.as_tensor().to_vec1::<f64>()?,
            activation: self.activation,
            dropout: self.dropout,
        })
    }
}

/// Inverted-dropout mask: kept units are scaled by `1 / (1 - rate)`.
fn dropout_mask<R: Rng + ?Sized>(
    rows: usize,
    units: usize,
    rate: f64,
    rng: &mut R,
) -> Result<Tensor> {
    let keep = 1.0 - rate;
    let scale = if keep > 0.0 { 1.0 / keep } else { 0.0 };
    let mask: Vec<f64> = (0..rows * units)
        .map(|_| if rng.gen::<f64>() < keep { scale } else { 0.0 })
        .collect();
    Ok(Tensor::from_vec(mask, (rows, units), &Device::Cpu)?)
}

/// Serialized form of one layer; `weights` is row-major `(units, inputs)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseRecord {
    pub inputs: usize,
    pub units: usize,
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
    pub activation: Activation,
    #[serde(default)]
    pub dropout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpRecord {
    pub layers: Vec<DenseRecord>,
}

/// Multilayer perceptron; the last layer is linear and has no dropout.
#[derive(Deserialize)]
#[serde(try_from = "MlpRecord")]
pub struct Mlp {
    layers: Vec<Dense>,
}

impl Mlp {
    pub fn new<R: Rng + ?Sized>(
        input_dim: usize,
        hidden: &[LayerSpec],
        output_dim: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut width = input_dim;
        for spec in hidden {
            layers.push(Dense::glorot(
                width,
                spec.units,
                spec.activation,
                spec.dropout,
                rng,
            )?);
            width = spec.units;
        }
        layers.push(Dense::glorot(width, output_dim, Activation::Linear, 0.0, rng)?);
        Ok(Self { layers })
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map(Dense::inputs).unwrap_or(0)
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map(Dense::units).unwrap_or(0)
    }

    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| layer.weight.elem_count() + layer.bias.elem_count())
            .sum()
    }

    /// Trainable variables, weights before bias, layer by layer.
    pub fn vars(&self) -> Vec<Var> {
        self.layers
            .iter()
            .flat_map(|layer| [layer.weight.clone(), layer.bias.clone()])
            .collect()
    }

    /// Inference pass; dropout is inactive.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut a = x.clone();
        for layer in &self.layers {
            a = layer.forward(&a)?;
        }
        Ok(a)
    }

    /// Training pass with a fresh dropout mask per layer.
    pub fn forward_train<R: Rng + ?Sized>(&self, x: &Tensor, rng: &mut R) -> Result<Tensor> {
        let rows = x.dim(0)?;
        let mut a = x.clone();
        for layer in &self.layers {
            a = layer.forward(&a)?;
            if layer.dropout > 0.0 {
                a = a.mul(&dropout_mask(rows, layer.units(), layer.dropout, rng)?)?;
            }
        }
        Ok(a)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.input_dim() {
            return Err(CapsurrError::Validation(format!(
                "network expects {} inputs, got {}",
                self.input_dim(),
                x.ncols()
            ))
            .into());
        }
        if x.nrows() == 0 {
            return Ok(Array2::zeros((0, self.output_dim())));
        }
        from_tensor(&self.forward(&to_tensor(x)?)?)
    }

    /// Detached copies of every variable, in [`Mlp::vars`] order.
    pub fn snapshot(&self) -> Result<Vec<Tensor>> {
        self.vars()
            .iter()
            .map(|var| Ok(var.as_tensor().detach().copy()?))
            .collect()
    }

    /// Load values taken by [`Mlp::snapshot`] back into the variables.
    pub fn restore(&self, snapshot: &[Tensor]) -> Result<()> {
        let vars = self.vars();
        if vars.len() != snapshot.len() {
            return Err(CapsurrError::Training(format!(
                "snapshot holds {} tensors, network has {}",
                snapshot.len(),
                vars.len()
            ))
            .into());
        }
        for (var, value) in vars.iter().zip(snapshot) {
            var.set(value)?;
        }
        Ok(())
    }

    pub fn record(&self) -> Result<MlpRecord> {
        Ok(MlpRecord {
            layers: self.layers.iter().map(Dense::record).collect::<Result<_>>()?,
        })
    }
}

impl TryFrom<MlpRecord> for Mlp {
    type Error = CapsurrError;

    fn try_from(record: MlpRecord) -> Result<Self, Self::Error> {
        let mut layers = Vec::with_capacity(record.layers.len());
        for (i, layer) in record.layers.into_iter().enumerate() {
            if layer.weights.len() != layer.inputs * layer.units || layer.bias.len() != layer.units
            {
                return Err(CapsurrError::Validation(format!(
                    "layer {i} does not match its {}x{} shape",
                    layer.units, layer.inputs
                )));
            }
            if let Some(width) = layers.last().map(Dense::units) {
                if width != layer.inputs {
                    return Err(CapsurrError::Validation(format!(
                        "layer {i} takes {} inputs but the previous layer has {width} units",
                        layer.inputs
                    )));
                }
            }
            let dense = Dense::from_parts(
                layer.inputs,
                layer.units,
                layer.weights,
                layer.bias,
                layer.activation,
                layer.dropout,
            )
            .map_err(|err| CapsurrError::Validation(format!("layer {i}: {err:#}")))?;
            layers.push(dense);
        }
        if layers.is_empty() {
            return Err(CapsurrError::Validation("network has no layers".into()));
        }
        Ok(Self { layers })
    }
}

impl Serialize for Mlp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.record()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl fmt::Debug for Mlp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths: Vec<usize> = std::iter::once(self.input_dim())
            .chain(self.layers.iter().map(Dense::units))
            .collect();
        f.debug_struct("Mlp")
            .field("widths", &widths)
            .field("parameters", &self.parameter_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn net(rng: &mut StdRng) -> Mlp {
        let hidden = [
            LayerSpec {
                units: 4,
                activation: Activation::Tanh,
                dropout: 0.0,
            },
            LayerSpec {
                units: 3,
                activation: Activation::Relu,
                dropout: 0.0,
            },
        ];
        Mlp::new(2, &hidden, 2, rng).unwrap()
    }

    #[test]
    fn shapes_follow_layer_specs() {
        let mut rng = StdRng::seed_from_u64(1);
        let mlp = net(&mut rng);
        assert_eq!(mlp.depth(), 3);
        assert_eq!(mlp.input_dim(), 2);
        assert_eq!(mlp.output_dim(), 2);
        assert_eq!(mlp.parameter_count(), (2 * 4 + 4) + (4 * 3 + 3) + (3 * 2 + 2));
        assert_eq!(mlp.vars().len(), 6);
        let record = mlp.record().unwrap();
        assert_eq!(record.layers[2].activation, Activation::Linear);
        let out = mlp.predict(&array![[0.1, 0.2], [0.3, -0.4]]).unwrap();
        assert_eq!(out.dim(), (2, 2));
        assert!(mlp.predict(&array![[0.1]]).is_err());
        assert_eq!(mlp.predict(&Array2::zeros((0, 2))).unwrap().dim(), (0, 2));
    }

    #[test]
    fn same_seed_gives_same_weights() {
        let a = net(&mut StdRng::seed_from_u64(9)).record().unwrap();
        let b = net(&mut StdRng::seed_from_u64(9)).record().unwrap();
        let c = net(&mut StdRng::seed_from_u64(10)).record().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn backward_reaches_every_variable() {
        let mut rng = StdRng::seed_from_u64(3);
        let mlp = net(&mut rng);
        let x = to_tensor(&array![[0.5, -0.2], [0.1, 0.9], [-0.7, 0.3]]).unwrap();
        let y = to_tensor(&array![[1.0, 0.0], [0.5, -0.5], [0.0, 0.2]]).unwrap();
        let loss = candle_nn::loss::mse(&mlp.forward(&x).unwrap(), &y).unwrap();
        let grads = loss.backward().unwrap();
        for var in mlp.vars() {
            let grad = grads.get(var.as_tensor()).expect("gradient for every variable");
            assert_eq!(grad.dims(), var.dims());
        }
    }

    #[test]
    fn dropout_only_applies_while_training() {
        let mut rng = StdRng::seed_from_u64(5);
        let hidden = [LayerSpec {
            units: 64,
            activation: Activation::Relu,
            dropout: 0.5,
        }];
        let mlp = Mlp::new(3, &hidden, 1, &mut rng).unwrap();
        let x = array![[0.2, 0.4, 0.6]];
        assert_eq!(mlp.predict(&x).unwrap(), mlp.predict(&x).unwrap());
        let input = to_tensor(&x).unwrap();
        let a = from_tensor(&mlp.forward_train(&input, &mut rng).unwrap()).unwrap();
        let b = from_tensor(&mlp.forward_train(&input, &mut rng).unwrap()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn snapshot_restores_earlier_weights() {
        let mut rng = StdRng::seed_from_u64(7);
        let mlp = net(&mut rng);
        let x = array![[0.3, -0.6]];
        let before = mlp.predict(&x).unwrap();
        let saved = mlp.snapshot().unwrap();
        for var in mlp.vars() {
            let shifted = (var.as_tensor() + 1.0).unwrap();
            var.set(&shifted).unwrap();
        }
        assert_ne!(mlp.predict(&x).unwrap(), before);
        mlp.restore(&saved).unwrap();
        assert_eq!(mlp.predict(&x).unwrap(), before);
    }

    #[test]
    fn record_rejects_mismatched_layers() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut record = net(&mut rng).record().unwrap();
        record.layers[1].inputs = 5;
        record.layers[1].weights = vec![0.0; 15];
        assert!(Mlp::try_from(record.clone()).is_err());
        record.layers.clear();
        assert!(Mlp::try_from(record).is_err());
    }

    #[test]
    fn activation_names_parse() {
        assert_eq!("ReLU".parse::<Activation>().unwrap(), Activation::Relu);
        assert_eq!(Activation::Tanh.to_string(), "tanh");
        assert!("sigmoid".parse::<Activation>().is_err());
    }
}
