//! Hyperparameter tuners: random search, Gaussian-process Bayesian
//! optimization, and hyperband.
//!
//! Every trial trains freshly initialized networks on the normalized
//! training rows and scores them by the lowest validation MSE reached,
//! averaged over `executions_per_trial` seeds.

use anyhow::Result;
use capsurr_core::config::{SurrogateConfig, TunerStrategy};
use capsurr_core::CapsurrError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::Partition;
use crate::gp::{expected_improvement, GaussianProcess};
use crate::network::Mlp;
use crate::optimizer::Optimizer;
use crate::search::{Hyperparameters, SearchSpace};
use crate::train::{fit, FitOptions};

const HYPERBAND_FACTOR: usize = 3;
const BAYESIAN_CANDIDATES: usize = 200;
const BAYESIAN_XI: f64 = 0.01;
const GP_NOISE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct TunerOptions {
    pub strategy: TunerStrategy,
    pub max_trials: usize,
    pub executions_per_trial: usize,
    /// Epochs per trial for random and Bayesian search
    pub epochs: usize,
    /// Largest per-trial budget for hyperband
    pub max_epochs: usize,
    pub batch_size: usize,
    pub patience: usize,
    pub seed: u64,
}

impl TunerOptions {
    pub fn from_config(config: &SurrogateConfig) -> Self {
        Self {
            strategy: config.tuner,
            max_trials: config.max_trials,
            executions_per_trial: config.executions_per_trial,
            epochs: config.tuner_epochs,
            max_epochs: config
                .hyperband_max_epochs
                .unwrap_or(config.tuner_epochs + 15),
            batch_size: config.batch_size,
            patience: config.patience,
            seed: config.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: usize,
    pub hyperparameters: Hyperparameters,
    pub epochs: usize,
    /// Mean best validation MSE; infinite when every execution diverged
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub trials: Vec<Trial>,
    pub best: Trial,
}

pub struct Tuner<'a> {
    space: &'a SearchSpace,
    options: TunerOptions,
    train: &'a Partition,
    val: &'a Partition,
    rng: StdRng,
    trials: Vec<Trial>,
}

impl<'a> Tuner<'a> {
    pub fn new(
        space: &'a SearchSpace,
        options: TunerOptions,
        train: &'a Partition,
        val: &'a Partition,
    ) -> Self {
        let rng = StdRng::seed_from_u64(options.seed);
        Self {
            space,
            options,
            train,
            val,
            rng,
            trials: Vec::new(),
        }
    }

    pub fn run(mut self) -> Result<SearchOutcome> {
        info!(
            "starting {} search ({} execution(s) per trial)",
            self.options.strategy, self.options.executions_per_trial
        );
        match self.options.strategy {
            TunerStrategy::Random => self.random_search()?,
            TunerStrategy::Bayesian => self.bayesian_search()?,
            TunerStrategy::Hyperband => self.hyperband()?,
        }
        let best = self
            .trials
            .iter()
            .filter(|t| t.score.is_finite())
            .min_by(|a, b| a.score.total_cmp(&b.score))
            .cloned()
            .ok_or_else(|| CapsurrError::Training("every tuner trial diverged".into()))?;
        info!(
            "best trial {} with validation mse {:.6}: {}",
            best.id,
            best.score,
            best.hyperparameters.describe()
        );
        Ok(SearchOutcome {
            trials: self.trials,
            best,
        })
    }

    /// Train one configuration and record it as a trial.
    fn evaluate(&mut self, hp: &Hyperparameters, epochs: usize, early_stop: bool) -> Result<f64> {
        let id = self.trials.len();
        let executions = self.options.executions_per_trial.max(1);
        let mut total = 0.0;
        for execution in 0..executions {
            let seed = self
                .options
                .seed
                .wrapping_add((id as u64) * 1_000 + execution as u64 + 1);
            let mut init = StdRng::seed_from_u64(seed);
            let model = Mlp::new(
                self.train.x.ncols(),
                &hp.layers,
                self.train.y.ncols(),
                &mut init,
            )?;
            let mut optimizer = Optimizer::new(hp.optimizer, hp.learning_rate, &model)?;
            let fit_options = FitOptions {
                epochs,
                batch_size: self.options.batch_size,
                early_stopping: early_stop.then_some(self.options.patience.max(1)),
                plateau: None,
                seed,
            };
            match fit(&model, &mut optimizer, self.train, self.val, &fit_options) {
                Ok(history) => total += history.best_val_loss,
                Err(err) => {
                    warn!("trial {id} execution {execution} failed: {err:#}");
                    total = f64::INFINITY;
                }
            }
        }
        let score = total / executions as f64;
        info!(
            "trial {id}: {} epochs, validation mse {:.6} ({})",
            epochs,
            score,
            hp.describe()
        );
        self.trials.push(Trial {
            id,
            hyperparameters: hp.clone(),
            epochs,
            score,
        });
        Ok(score)
    }

    fn random_search(&mut self) -> Result<()> {
        for _ in 0..self.options.max_trials {
            let hp = self.space.sample(&mut self.rng);
            self.evaluate(&hp, self.options.epochs, false)?;
        }
        Ok(())
    }

    fn bayesian_search(&mut self) -> Result<()> {
        let max_trials = self.options.max_trials;
        let initial = max_trials.min((max_trials / 4).max(2));
        for _ in 0..max_trials {
            let hp = if self.trials.len() < initial {
                self.space.sample(&mut self.rng)
            } else {
                self.propose()?
            };
            self.evaluate(&hp, self.options.epochs, false)?;
        }
        Ok(())
    }

    /// Candidate with the highest expected improvement under a GP fitted to
    /// the log scores seen so far.
    fn propose(&mut self) -> Result<Hyperparameters> {
        let worst = self
            .trials
            .iter()
            .map(|t| t.score)
            .filter(|s| s.is_finite() && *s > 0.0)
            .fold(f64::NAN, f64::max);
        if worst.is_nan() {
            return Ok(self.space.sample(&mut self.rng));
        }
        let points: Vec<Vec<f64>> = self
            .trials
            .iter()
            .map(|t| self.space.encode(&t.hyperparameters))
            .collect();
        let values: Vec<f64> = self
            .trials
            .iter()
            .map(|t| {
                if t.score.is_finite() && t.score > 0.0 {
                    t.score.ln()
                } else {
                    worst.ln() + 1.0
                }
            })
            .collect();
        let best = values.iter().copied().fold(f64::INFINITY, f64::min);
        let length_scale = 0.25 * (self.space.encoded_len() as f64).sqrt();
        let gp = GaussianProcess::fit(&points, &values, length_scale, GP_NOISE)?;

        let mut chosen: Option<(f64, Hyperparameters)> = None;
        for _ in 0..BAYESIAN_CANDIDATES {
            let candidate = self.space.sample(&mut self.rng);
            let (mean, std) = gp.predict(&self.space.encode(&candidate));
            let ei = expected_improvement(mean, std, best, BAYESIAN_XI);
            if chosen.as_ref().map_or(true, |(top, _)| ei > *top) {
                chosen = Some((ei, candidate));
            }
        }
        let (ei, hp) =
            chosen.ok_or_else(|| CapsurrError::Training("no candidates drawn".into()))?;
        debug!("proposed candidate with expected improvement {ei:.4e}");
        Ok(hp)
    }

    /// Successive halving over brackets of decreasing aggressiveness.
    /// Survivors are retrained from scratch on the larger budget.
    fn hyperband(&mut self) -> Result<()> {
        let eta = HYPERBAND_FACTOR;
        let max_epochs = self.options.max_epochs.max(1);
        let mut s_max = 0u32;
        while eta.pow(s_max + 1) <= max_epochs {
            s_max += 1;
        }
        for s in (0..=s_max).rev() {
            let scale = eta.pow(s);
            let n = ((s_max + 1) as f64 / (s + 1) as f64 * scale as f64).ceil() as usize;
            let r = max_epochs as f64 / scale as f64;
            info!("hyperband bracket {s}: {n} configuration(s), {r:.1} initial epoch(s)");

            let mut configs: Vec<Hyperparameters> =
                (0..n).map(|_| self.space.sample(&mut self.rng)).collect();
            for i in 0..=s {
                let epochs = ((r * eta.pow(i) as f64).round() as usize).max(1);
                let mut scored = Vec::with_capacity(configs.len());
                for hp in configs {
                    let score = self.evaluate(&hp, epochs, true)?;
                    scored.push((score, hp));
                }
                if i == s {
                    break;
                }
                scored.sort_by(|a, b| a.0.total_cmp(&b.0));
                let keep = (n / eta.pow(i + 1)).max(1);
                configs = scored.into_iter().take(keep).map(|(_, hp)| hp).collect();
            }
        }
        Ok(())
    }
}

/// Run the configured search over `space`.
pub fn tune(
    space: &SearchSpace,
    options: TunerOptions,
    train: &Partition,
    val: &Partition,
) -> Result<SearchOutcome> {
    Tuner::new(space, options, train, val).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Activation;
    use crate::optimizer::OptimizerKind;
    use ndarray::Array2;

    fn tiny_space() -> SearchSpace {
        SearchSpace {
            min_layers: 1,
            max_layers: 2,
            min_units: 4,
            max_units: 8,
            units_step: 4,
            activations: vec![Activation::Tanh, Activation::Relu],
            min_dropout: 0.0,
            max_dropout: 0.1,
            dropout_step: 0.1,
            min_learning_rate: 1e-3,
            max_learning_rate: 1e-2,
            optimizers: vec![OptimizerKind::Adam, OptimizerKind::RmsProp],
        }
    }

    fn partition(n: usize, offset: f64) -> Partition {
        let x = Array2::from_shape_fn((n, 1), |(i, _)| (i as f64 + offset) / n as f64);
        let y = x.mapv(|v| 2.0 * v - 1.0);
        Partition { x, y }
    }

    fn options(strategy: TunerStrategy) -> TunerOptions {
        TunerOptions {
            strategy,
            max_trials: 4,
            executions_per_trial: 2,
            epochs: 3,
            max_epochs: 9,
            batch_size: 8,
            patience: 2,
            seed: 17,
        }
    }

    #[test]
    fn random_search_runs_the_trial_budget() {
        let (train, val) = (partition(24, 0.0), partition(8, 0.5));
        let outcome = tune(&tiny_space(), options(TunerStrategy::Random), &train, &val).unwrap();
        assert_eq!(outcome.trials.len(), 4);
        assert!(outcome.trials.iter().all(|t| t.epochs == 3));
        let min = outcome
            .trials
            .iter()
            .map(|t| t.score)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(outcome.best.score, min);
    }

    #[test]
    fn bayesian_search_is_reproducible() {
        let (train, val) = (partition(24, 0.0), partition(8, 0.5));
        let space = tiny_space();
        let a = tune(&space, options(TunerStrategy::Bayesian), &train, &val).unwrap();
        let b = tune(&space, options(TunerStrategy::Bayesian), &train, &val).unwrap();
        assert_eq!(a.trials.len(), 4);
        assert_eq!(a.trials, b.trials);
    }

    #[test]
    fn hyperband_grows_budgets_across_rounds() {
        let (train, val) = (partition(24, 0.0), partition(8, 0.5));
        let mut opts = options(TunerStrategy::Hyperband);
        opts.executions_per_trial = 1;
        let outcome = tune(&tiny_space(), opts, &train, &val).unwrap();
        // max_epochs 9, factor 3: brackets of 9+3+1, 5+1 and 3 trials
        assert_eq!(outcome.trials.len(), 22);
        let epochs: Vec<usize> = outcome.trials.iter().map(|t| t.epochs).collect();
        assert_eq!(&epochs[..13], &[vec![1usize; 9], vec![3; 3], vec![9]].concat()[..]);
        assert!(epochs[13..].iter().all(|e| [3, 9].contains(e)));
    }

    #[test]
    fn from_config_defaults_hyperband_budget() {
        let config = SurrogateConfig::default();
        let opts = TunerOptions::from_config(&config);
        assert_eq!(opts.max_epochs, config.tuner_epochs + 15);
        assert_eq!(opts.strategy, TunerStrategy::Bayesian);
    }
}
