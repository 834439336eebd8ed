//! Linear CycleGAN
//!
//! Each generator is a per-dimension affine map `y[d, t] = w[d] * x[d, t] + b[d]`.
//! Each discriminator scores a segment as `s(z) = sum_d u[d] * mean_t z[d, t] + c`.
//! Losses follow LSGAN, with squared-error cycle and identity terms:
//!
//! ```text
//! L_G = (s_B(G_AB(a)) - 1)^2 + (s_A(G_BA(b)) - 1)^2
//!     + cycle    * (mse(G_BA(G_AB(a)), a) + mse(G_AB(G_BA(b)), b))
//!     + identity * (mse(G_BA(a), a)       + mse(G_AB(b), b))
//!
//! L_D = 0.5 * ((s_A(a) - 1)^2 + s_A(G_BA(b))^2)
//!     + 0.5 * ((s_B(b) - 1)^2 + s_B(G_AB(a))^2)
//! ```
//!
//! Gradients are analytic; both parameter groups are updated with Adam.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use super::{CycleGanModel, Direction, LearningRates, LossWeights, StepLosses};
use crate::error::{Error, Result};
use crate::tensor_file::{write_tensors, TensorF64, TensorFile};

const FORMAT_TAG: &str = "linear-cyclegan-v1";

const W_AB: usize = 0;
const B_AB: usize = 1;
const W_BA: usize = 2;
const B_BA: usize = 3;

const U_A: usize = 0;
const C_A: usize = 1;
const U_B: usize = 2;
const C_B: usize = 3;

const GENERATOR_NAMES: [&str; 4] = [
    "generator_ab.weight",
    "generator_ab.bias",
    "generator_ba.weight",
    "generator_ba.bias",
];

const DISCRIMINATOR_NAMES: [&str; 4] = [
    "discriminator_a.weight",
    "discriminator_a.bias",
    "discriminator_b.weight",
    "discriminator_b.bias",
];

/// Configuration for [`LinearCycleGan`]
#[derive(Debug, Clone)]
pub struct LinearCycleGanConfig {
    /// Coded envelope dimension (default: 24)
    pub coded_dim: usize,
    /// Seed for parameter initialization
    pub seed: u64,
    /// Adam beta1 (default: 0.5)
    pub beta1: f64,
    /// Adam beta2 (default: 0.999)
    pub beta2: f64,
    /// Adam epsilon (default: 1e-8)
    pub epsilon: f64,
    /// Half-width of the uniform initialization noise (default: 0.01)
    pub init_scale: f64,
}

impl Default for LinearCycleGanConfig {
    fn default() -> Self {
        Self {
            coded_dim: 24,
            seed: 0,
            beta1: 0.5,
            beta2: 0.999,
            epsilon: 1e-8,
            init_scale: 0.01,
        }
    }
}

impl LinearCycleGanConfig {
    pub fn with_coded_dim(mut self, coded_dim: usize) -> Self {
        self.coded_dim = coded_dim;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Adam first and second moments for one parameter group.
#[derive(Debug, Clone)]
struct Adam {
    m: Vec<Array1<f64>>,
    v: Vec<Array1<f64>>,
}

impl Adam {
    fn new(params: &[Array1<f64>]) -> Self {
        let zeros: Vec<Array1<f64>> = params.iter().map(|p| Array1::zeros(p.len())).collect();
        Self {
            m: zeros.clone(),
            v: zeros,
        }
    }

    fn update(
        &mut self,
        params: &mut [Array1<f64>],
        grads: &[Array1<f64>],
        lr: f64,
        step: u64,
        config: &LinearCycleGanConfig,
    ) {
        let (beta1, beta2) = (config.beta1, config.beta2);
        let bias1 = 1.0 - beta1.powi(step as i32);
        let bias2 = 1.0 - beta2.powi(step as i32);

        for ((param, grad), (m, v)) in params
            .iter_mut()
            .zip(grads)
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
        {
            m.zip_mut_with(grad, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
            v.zip_mut_with(grad, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);
            for ((p, &m), &v) in param.iter_mut().zip(m.iter()).zip(v.iter()) {
                *p -= lr * (m / bias1) / ((v / bias2).sqrt() + config.epsilon);
            }
        }
    }
}

/// Linear generators and discriminators for both directions.
#[derive(Debug, Clone)]
pub struct LinearCycleGan {
    config: LinearCycleGanConfig,
    generators: Vec<Array1<f64>>,
    discriminators: Vec<Array1<f64>>,
    generator_optimizer: Adam,
    discriminator_optimizer: Adam,
    step: u64,
}

impl LinearCycleGan {
    /// Initialize generators near identity and discriminators near zero.
    pub fn new(config: LinearCycleGanConfig) -> Result<Self> {
        if config.coded_dim == 0 {
            return Err(Error::model("coded_dim must be at least 1"));
        }

        let dim = config.coded_dim;
        let scale = config.init_scale.abs();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut noise = |len: usize, center: f64| -> Array1<f64> {
            Array1::from_shape_fn(len, |_| {
                if scale > 0.0 {
                    center + rng.gen_range(-scale..scale)
                } else {
                    center
                }
            })
        };

        let generators = vec![noise(dim, 1.0), noise(dim, 0.0), noise(dim, 1.0), noise(dim, 0.0)];
        let discriminators = vec![noise(dim, 0.0), Array1::zeros(1), noise(dim, 0.0), Array1::zeros(1)];

        Ok(Self {
            generator_optimizer: Adam::new(&generators),
            discriminator_optimizer: Adam::new(&discriminators),
            config,
            generators,
            discriminators,
            step: 0,
        })
    }

    pub fn config(&self) -> &LinearCycleGanConfig {
        &self.config
    }

    /// Number of optimization steps taken, including restored ones
    pub fn step(&self) -> u64 {
        self.step
    }

    fn check_batch(&self, batch: &Array3<f64>, name: &str) -> Result<()> {
        let shape = batch.shape();
        if shape[0] == 0 || shape[2] == 0 || shape[1] != self.config.coded_dim {
            return Err(Error::model(format!(
                "{} has shape {:?}, expected [batch, {}, frames]",
                name, shape, self.config.coded_dim
            )));
        }
        Ok(())
    }

    /// Losses and gradients for one batch, without updating parameters.
    fn losses_and_gradients(
        &self,
        batch_a: &Array3<f64>,
        batch_b: &Array3<f64>,
        weights: LossWeights,
    ) -> Result<(StepLosses, Vec<Array1<f64>>, Vec<Array1<f64>>)> {
        self.check_batch(batch_a, "batch_a")?;
        self.check_batch(batch_b, "batch_b")?;
        if batch_a.shape()[0] != batch_b.shape()[0] {
            return Err(Error::model(format!(
                "batch sizes differ: {} vs {}",
                batch_a.shape()[0],
                batch_b.shape()[0]
            )));
        }

        let g = &self.generators;
        let d = &self.discriminators;
        let mut g_grads: Vec<Array1<f64>> = g.iter().map(|p| Array1::zeros(p.len())).collect();
        let mut d_grads: Vec<Array1<f64>> = d.iter().map(|p| Array1::zeros(p.len())).collect();
        let mut g_loss = 0.0;
        let mut d_loss = 0.0;

        for (a, b) in batch_a.axis_iter(Axis(0)).zip(batch_b.axis_iter(Axis(0))) {
            let fake_b = affine(a, &g[W_AB], &g[B_AB]);
            let fake_a = affine(b, &g[W_BA], &g[B_BA]);
            let cycle_a = affine(fake_b.view(), &g[W_BA], &g[B_BA]);
            let cycle_b = affine(fake_a.view(), &g[W_AB], &g[B_AB]);
            let identity_a = affine(a, &g[W_BA], &g[B_BA]);
            let identity_b = affine(b, &g[W_AB], &g[B_AB]);

            let (score_fake_b, mean_fake_b) = score(fake_b.view(), &d[U_B], d[C_B][0]);
            let (score_fake_a, mean_fake_a) = score(fake_a.view(), &d[U_A], d[C_A][0]);
            let (score_real_a, mean_a) = score(a, &d[U_A], d[C_A][0]);
            let (score_real_b, mean_b) = score(b, &d[U_B], d[C_B][0]);

            // Adversarial
            g_loss += (score_fake_b - 1.0).powi(2) + (score_fake_a - 1.0).powi(2);
            let k_b = 2.0 * (score_fake_b - 1.0);
            let k_a = 2.0 * (score_fake_a - 1.0);
            g_grads[W_AB] += &(&d[U_B] * &mean_a * k_b);
            g_grads[B_AB] += &(&d[U_B] * k_b);
            g_grads[W_BA] += &(&d[U_A] * &mean_b * k_a);
            g_grads[B_BA] += &(&d[U_A] * k_a);

            let scale = 2.0 / a.len() as f64;

            // Cycle A: w_ba * (w_ab * a + b_ab) + b_ba
            let r = &cycle_a - &a;
            g_loss += weights.cycle * mse(&r);
            let c = weights.cycle * scale;
            let r_sum = r.sum_axis(Axis(1));
            g_grads[W_BA] += &(row_dot(&r, &fake_b) * c);
            g_grads[B_BA] += &(&r_sum * c);
            g_grads[W_AB] += &(row_dot(&r, &a.to_owned()) * &g[W_BA] * c);
            g_grads[B_AB] += &(&r_sum * &g[W_BA] * c);

            // Cycle B: w_ab * (w_ba * b + b_ba) + b_ab
            let r = &cycle_b - &b;
            g_loss += weights.cycle * mse(&r);
            let r_sum = r.sum_axis(Axis(1));
            g_grads[W_AB] += &(row_dot(&r, &fake_a) * c);
            g_grads[B_AB] += &(&r_sum * c);
            g_grads[W_BA] += &(row_dot(&r, &b.to_owned()) * &g[W_AB] * c);
            g_grads[B_BA] += &(&r_sum * &g[W_AB] * c);

            // Identity
            let c = weights.identity * scale;
            let r = &identity_a - &a;
            g_loss += weights.identity * mse(&r);
            g_grads[W_BA] += &(row_dot(&r, &a.to_owned()) * c);
            g_grads[B_BA] += &(r.sum_axis(Axis(1)) * c);

            let r = &identity_b - &b;
            g_loss += weights.identity * mse(&r);
            g_grads[W_AB] += &(row_dot(&r, &b.to_owned()) * c);
            g_grads[B_AB] += &(r.sum_axis(Axis(1)) * c);

            // Discriminators
            d_loss += 0.5 * ((score_real_a - 1.0).powi(2) + score_fake_a.powi(2));
            d_loss += 0.5 * ((score_real_b - 1.0).powi(2) + score_fake_b.powi(2));
            d_grads[U_A] += &(&mean_a * (score_real_a - 1.0) + &mean_fake_a * score_fake_a);
            d_grads[C_A][0] += (score_real_a - 1.0) + score_fake_a;
            d_grads[U_B] += &(&mean_b * (score_real_b - 1.0) + &mean_fake_b * score_fake_b);
            d_grads[C_B][0] += (score_real_b - 1.0) + score_fake_b;
        }

        let n = batch_a.shape()[0] as f64;
        for grad in g_grads.iter_mut().chain(d_grads.iter_mut()) {
            grad.mapv_inplace(|v| v / n);
        }

        let losses = StepLosses {
            generator: g_loss / n,
            discriminator: d_loss / n,
        };
        Ok((losses, g_grads, d_grads))
    }
}

impl CycleGanModel for LinearCycleGan {
    fn train_step(
        &mut self,
        batch_a: &Array3<f64>,
        batch_b: &Array3<f64>,
        weights: LossWeights,
        rates: LearningRates,
    ) -> Result<StepLosses> {
        let (losses, g_grads, d_grads) = self.losses_and_gradients(batch_a, batch_b, weights)?;

        self.step += 1;
        self.generator_optimizer
            .update(&mut self.generators, &g_grads, rates.generator, self.step, &self.config);
        self.discriminator_optimizer.update(
            &mut self.discriminators,
            &d_grads,
            rates.discriminator,
            self.step,
            &self.config,
        );

        Ok(losses)
    }

    fn infer(&self, batch: &Array3<f64>, direction: Direction) -> Result<Array3<f64>> {
        self.check_batch(batch, "batch")?;
        let (w, b) = match direction {
            Direction::AToB => (&self.generators[W_AB], &self.generators[B_AB]),
            Direction::BToA => (&self.generators[W_BA], &self.generators[B_BA]),
        };

        let mut output = Array3::zeros(batch.raw_dim());
        for (mut out, x) in output.axis_iter_mut(Axis(0)).zip(batch.axis_iter(Axis(0))) {
            out.assign(&affine(x, w, b));
        }
        Ok(output)
    }

    fn save(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(name);

        let mut tensors = BTreeMap::new();
        let groups = [
            (&GENERATOR_NAMES, &self.generators, &self.generator_optimizer),
            (&DISCRIMINATOR_NAMES, &self.discriminators, &self.discriminator_optimizer),
        ];
        for (names, params, adam) in groups {
            for (i, name) in names.iter().enumerate() {
                tensors.insert(name.to_string(), TensorF64::vector(params[i].to_vec()));
                tensors.insert(format!("adam.m.{}", name), TensorF64::vector(adam.m[i].to_vec()));
                tensors.insert(format!("adam.v.{}", name), TensorF64::vector(adam.v[i].to_vec()));
            }
        }

        let metadata = HashMap::from([
            ("format".to_string(), FORMAT_TAG.to_string()),
            ("step".to_string(), self.step.to_string()),
            ("coded_dim".to_string(), self.config.coded_dim.to_string()),
        ]);
        write_tensors(&path, &tensors, Some(metadata))?;

        info!(path = %path.display(), step = self.step, "Saved checkpoint");
        Ok(path)
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(Error::checkpoint(format!("checkpoint not found: {}", path.display())));
        }

        let file = TensorFile::open(path)
            .map_err(|e| Error::checkpoint(format!("{}: {}", path.display(), e)))?;
        let metadata = file.metadata()?;

        let format = metadata.get("format").map(String::as_str);
        if format != Some(FORMAT_TAG) {
            return Err(Error::checkpoint(format!(
                "{} has format {:?}, expected {}",
                path.display(),
                format,
                FORMAT_TAG
            )));
        }

        let coded_dim: Option<usize> = metadata.get("coded_dim").and_then(|v| v.parse().ok());
        if coded_dim != Some(self.config.coded_dim) {
            return Err(Error::checkpoint(format!(
                "{} has coded_dim {:?}, model expects {}",
                path.display(),
                coded_dim,
                self.config.coded_dim
            )));
        }

        let step: u64 = metadata
            .get("step")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::checkpoint(format!("{} has no step", path.display())))?;

        let read = |name: &str, expected: usize| -> Result<Array1<f64>> {
            let t = file
                .tensor(name)
                .map_err(|e| Error::checkpoint(format!("{}: {}", name, e)))?;
            if t.shape != [expected] {
                return Err(Error::checkpoint(format!(
                    "{} has shape {:?}, expected [{}]",
                    name, t.shape, expected
                )));
            }
            Ok(Array1::from(t.data))
        };

        let restore = |names: &[&str; 4], params: &mut Vec<Array1<f64>>, adam: &mut Adam| -> Result<()> {
            for (i, name) in names.iter().enumerate() {
                let len = params[i].len();
                params[i] = read(name, len)?;
                adam.m[i] = read(&format!("adam.m.{}", name), len)?;
                adam.v[i] = read(&format!("adam.v.{}", name), len)?;
            }
            Ok(())
        };

        let mut generators = self.generators.clone();
        let mut discriminators = self.discriminators.clone();
        let mut generator_optimizer = self.generator_optimizer.clone();
        let mut discriminator_optimizer = self.discriminator_optimizer.clone();
        restore(&GENERATOR_NAMES, &mut generators, &mut generator_optimizer)?;
        restore(&DISCRIMINATOR_NAMES, &mut discriminators, &mut discriminator_optimizer)?;

        self.generators = generators;
        self.discriminators = discriminators;
        self.generator_optimizer = generator_optimizer;
        self.discriminator_optimizer = discriminator_optimizer;
        self.step = step;

        info!(path = %path.display(), step, "Restored checkpoint");
        Ok(())
    }
}

/// Per-dimension affine map over a [dim, frames] segment
fn affine(x: ArrayView2<f64>, w: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    let w = w.view().insert_axis(Axis(1));
    let b = b.view().insert_axis(Axis(1));
    &x * &w + &b
}

/// Discriminator score and the per-dimension frame means it was computed from
fn score(z: ArrayView2<f64>, u: &Array1<f64>, c: f64) -> (f64, Array1<f64>) {
    let means = z.sum_axis(Axis(1)) / z.ncols() as f64;
    (u.dot(&means) + c, means)
}

fn mse(residual: &Array2<f64>) -> f64 {
    residual.iter().map(|r| r * r).sum::<f64>() / residual.len() as f64
}

/// Row-wise inner products of two [dim, frames] arrays
fn row_dot(x: &Array2<f64>, y: &Array2<f64>) -> Array1<f64> {
    (x * y).sum_axis(Axis(1))
}
