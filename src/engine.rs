use std::iter;

use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::config::EngineConfig;
use crate::env::TabularEnv;
use crate::error::{check_shape, Error, Result};
use crate::logger::ProgressLog;
use crate::policy::TabularPolicy;
use crate::render::{Frame, Renderer};
use crate::rollout::Rollout;
use crate::stopping::StoppingRule;
use crate::value::TabularValueFun;

/// Bellman backup applied to each state's row of Q-values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backup {
    /// `max_a Q(s, a)` with a one-hot greedy policy.
    Max,
    /// Log-sum-exp of `Q(s, ·) / temperature` with a softmax policy.
    Soft { temperature: f64 },
}

impl Backup {
    /// Backed-up value of one state.
    pub fn state_value(&self, q: ArrayView1<f64>) -> f64 {
        let m = row_max(q);
        match *self {
            Backup::Max => m,
            Backup::Soft { temperature } => {
                let z: f64 = q.iter().map(|x| ((x - m) / temperature).exp()).sum();
                temperature * z.ln() + m
            }
        }
    }

    /// Action distribution of one state.
    pub fn state_policy(&self, q: ArrayView1<f64>) -> Array1<f64> {
        match *self {
            Backup::Max => {
                let mut pi = Array1::<f64>::zeros(q.len());
                if !q.is_empty() {
                    pi[first_argmax(q)] = 1.0;
                }
                pi
            }
            Backup::Soft { temperature } => {
                let m = row_max(q);
                let weights = q.mapv(|x| ((x - m) / temperature).exp());
                let z = weights.sum();
                weights / z
            }
        }
    }
}

/// Largest entry. A NaN anywhere in the row makes the result NaN.
fn row_max(q: ArrayView1<f64>) -> f64 {
    let mut m = f64::NEG_INFINITY;
    for &x in q.iter() {
        if x.is_nan() {
            return x;
        }
        if x > m {
            m = x;
        }
    }
    m
}

/// Index of the first largest entry. Ties go to the lowest index.
fn first_argmax(q: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (a, x) in q.iter().enumerate() {
        if *x > q[best] {
            best = a;
        }
    }
    best
}

/// Summary of a finished [`ValueIteration::train`] run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    /// Sweeps performed
    pub iterations: usize,
    /// False when the run stopped because `max_itr` ran out.
    pub converged: bool,
    /// Average return of every logged iteration, final pass excluded.
    pub returns: Vec<f64>,
    /// Average return of the final policy
    pub final_return: f64,
}

/// Tabular value iteration over a borrowed model.
///
/// The engine is the only writer of `value_fun` and `policy` while it lives.
/// Collaborators get shared borrows of them between sweeps.
pub struct ValueIteration<'a, E: TabularEnv> {
    env: &'a E,
    value_fun: &'a mut TabularValueFun,
    policy: &'a mut TabularPolicy,
    config: EngineConfig,
    backup: Backup,
    stopping: StoppingRule,
}

impl<'a, E: TabularEnv> ValueIteration<'a, E> {
    /// Fails on an unknown policy type or any setting or container that does
    /// not fit the model.
    pub fn new(
        env: &'a E,
        value_fun: &'a mut TabularValueFun,
        policy: &'a mut TabularPolicy,
        config: EngineConfig,
    ) -> Result<ValueIteration<'a, E>> {
        let backup = config.backup()?;
        let (n_s, n_a, _) = env.transitions().dim();
        check_shape("transitions", &[n_s, n_a, n_s], env.transitions().shape())?;
        check_shape("rewards", env.transitions().shape(), env.rewards().shape())?;
        check_shape("values", &[n_s], &[value_fun.num_states()])?;
        check_shape("policy", &[n_s, n_a], policy.probs().shape())?;
        let discount = env.discount();
        if !(0.0..1.0).contains(&discount) {
            return Err(Error::InvalidDiscount(discount));
        }
        let stopping = StoppingRule::for_env(env, config.precision);
        log::debug!(
            "value iteration over {n_s} states and {n_a} actions, {backup:?}, rmax {}",
            stopping.rmax
        );
        Ok(ValueIteration { env, value_fun, policy, config, backup, stopping })
    }

    pub fn backup(&self) -> Backup {
        self.backup
    }

    pub fn stopping_rule(&self) -> &StoppingRule {
        &self.stopping
    }

    pub fn value_fun(&self) -> &TabularValueFun {
        &*self.value_fun
    }

    pub fn policy(&self) -> &TabularPolicy {
        &*self.policy
    }

    /// `Q(s, a) = Σ_s' T[s, a, s'] (R[s, a, s'] + γ V(s'))` for the current
    /// values.
    pub fn q_values(&self) -> Array2<f64> {
        let discounted = self.value_fun.values() * self.env.discount();
        let targets = self.env.rewards() + &discounted;
        (self.env.transitions() * &targets).sum_axis(Axis(2))
    }

    /// Values after one synchronous Bellman backup. Nothing is written.
    pub fn compute_next_values(&self) -> Array1<f64> {
        self.q_values().map_axis(Axis(1), |q| self.backup.state_value(q))
    }

    /// Policy induced by the current values. Nothing is written.
    pub fn compute_next_policy(&self) -> Array2<f64> {
        let q = self.q_values();
        let mut pi = Array2::<f64>::zeros(q.raw_dim());
        for (q_s, mut pi_s) in q.rows().into_iter().zip(pi.rows_mut()) {
            pi_s.assign(&self.backup.state_policy(q_s));
        }
        pi
    }

    pub fn is_converged(&self, iteration: usize, next_v: Option<&Array1<f64>>, v: &Array1<f64>) -> bool {
        self.stopping.is_converged(iteration, next_v, v)
    }

    /// Run sweeps until the stopping rule fires or `max_itr` runs out, then
    /// leave the final values and policy in the containers.
    pub fn train<R, L, D>(&mut self, rollout: &mut R, progress: &mut L, renderer: &mut D) -> Result<TrainReport>
    where
        R: Rollout<E>,
        L: ProgressLog,
        D: Renderer<E>,
    {
        let mut itr = 0;
        let mut before_sweep: Option<Array1<f64>> = None;
        let mut videos: Vec<Frame> = Vec::new();
        let mut contours: Vec<Frame> = Vec::new();
        let mut returns = Vec::new();

        let converged = loop {
            if self.swept_to_convergence(itr, before_sweep.as_ref()) {
                break true;
            }
            if itr >= self.config.max_itr {
                break false;
            }
            if itr % self.config.log_itr == 0 {
                let render = itr % self.config.render_itr == 0 && self.config.render;
                self.refresh_policy()?;
                let outcome = rollout.rollout(self.env, &*self.policy, render, self.config.num_rollouts, itr)?;
                if render {
                    if let Some(contour) = renderer.contour(self.env, &*self.value_fun, itr, false)? {
                        contours.extend(iter::repeat(contour).take(outcome.frames.len()));
                    }
                    videos.extend(outcome.frames);
                }
                returns.push(outcome.average_return);
                log::info!("iteration {itr:>4}  average return {:>10.4}", outcome.average_return);
                progress.log_kv("Iteration", itr as f64);
                progress.log_kv("Average Returns", outcome.average_return);
                progress.dump_kvs()?;
            }
            let next_v = self.compute_next_values();
            before_sweep = Some(self.value_fun.values().clone());
            self.value_fun.update(next_v)?;
            itr += 1;
        };
        if !converged {
            log::warn!("stopped after {itr} iterations without converging");
        }

        self.refresh_policy()?;
        let contour = renderer.contour(self.env, &*self.value_fun, itr, true)?;
        let outcome = rollout.rollout(self.env, &*self.policy, self.config.render, self.config.num_rollouts, itr)?;
        progress.record_returns(&returns)?;
        if self.config.render {
            videos.extend(outcome.frames);
            contours.extend(contour);
        }
        log::info!("finished after {itr} iterations, average return {:.4}", outcome.average_return);
        progress.log_kv("Iteration", itr as f64);
        progress.log_kv("Average Returns", outcome.average_return);
        progress.dump_kvs()?;

        let fps = (4.0 / self.env.dt()) as u32;
        if !contours.is_empty() {
            renderer.write_video("contours_progress", &contours, fps)?;
        }
        if !videos.is_empty() {
            renderer.write_video("roll_outs", &videos, fps)?;
        }

        Ok(TrainReport {
            iterations: itr,
            converged,
            returns,
            final_return: outcome.average_return,
        })
    }

    fn swept_to_convergence(&self, itr: usize, before_sweep: Option<&Array1<f64>>) -> bool {
        match before_sweep {
            Some(v) => self.is_converged(itr, Some(self.value_fun.values()), v),
            None => self.is_converged(itr, None, self.value_fun.values()),
        }
    }

    fn refresh_policy(&mut self) -> Result<()> {
        let next_pi = self.compute_next_policy();
        self.policy.update(next_pi)
    }
}
