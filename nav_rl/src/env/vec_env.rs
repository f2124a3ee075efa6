//! Vectorized environments.
//!
//! A [`VecEnv`] steps a batch of environments in lockstep and resets finished
//! episodes automatically. The observation returned for a finished
//! environment is the first observation of its next episode; the last
//! observation of the finished episode is kept in [`VecStep::final_obs`].

use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::Path;
use std::thread::{self, JoinHandle};

use super::normalize::NormalizationStats;
use super::{Action, ActionSpace, EnvStep, NavEnv, StepInfo};
use super::factory::EnvFactory;
use crate::error::{Error, Result};

/// Result of stepping every environment once.
#[derive(Debug, Clone, Default)]
pub struct VecStep {
    /// Flat `[n_envs * obs_size]` observations after auto-reset.
    pub obs: Vec<f32>,
    pub rewards: Vec<f32>,
    pub terminals: Vec<bool>,
    pub truncations: Vec<bool>,
    pub infos: Vec<StepInfo>,
    /// Last observation of episodes that ended in this step.
    pub final_obs: Vec<Option<Vec<f32>>>,
}

impl VecStep {
    fn with_capacity(n_envs: usize, obs_size: usize) -> Self {
        Self {
            obs: Vec::with_capacity(n_envs * obs_size),
            rewards: Vec::with_capacity(n_envs),
            terminals: Vec::with_capacity(n_envs),
            truncations: Vec::with_capacity(n_envs),
            infos: Vec::with_capacity(n_envs),
            final_obs: Vec::with_capacity(n_envs),
        }
    }

    fn push(&mut self, step: EnvStep, next_obs: Option<Vec<f32>>) {
        self.rewards.push(step.reward);
        self.terminals.push(step.terminal);
        self.truncations.push(step.truncated);
        self.infos.push(step.info);
        match next_obs {
            Some(obs) => {
                self.obs.extend_from_slice(&obs);
                self.final_obs.push(Some(step.obs));
            }
            None => {
                self.obs.extend_from_slice(&step.obs);
                self.final_obs.push(None);
            }
        }
    }

    /// Whether environment `i` finished an episode.
    #[inline]
    pub fn done(&self, i: usize) -> bool {
        self.terminals[i] || self.truncations[i]
    }

    pub fn n_envs(&self) -> usize {
        self.rewards.len()
    }
}

/// A batch of environments stepped together.
pub trait VecEnv: Send {
    fn n_envs(&self) -> usize;

    fn obs_size(&self) -> usize;

    fn scan_size(&self) -> usize;

    fn action_space(&self) -> &ActionSpace;

    /// Reset every environment; returns flat `[n_envs * obs_size]` observations.
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Step every environment with one action each.
    fn step(&mut self, actions: &[Action]) -> Result<VecStep>;

    fn close(&mut self) -> Result<()>;

    /// Observation statistics when the batch normalizes observations.
    fn normalization(&self) -> Option<NormalizationStats> {
        None
    }

    /// Replace the observation statistics. No-op without normalization.
    fn set_normalization(&mut self, _stats: &NormalizationStats) {}

    /// Enable or disable statistics updates. No-op without normalization.
    fn set_training(&mut self, _training: bool) {}

    /// Write normalization statistics to `path`; `false` when there are none.
    fn save_normalization(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }
}

impl<V: VecEnv + ?Sized> VecEnv for Box<V> {
    fn n_envs(&self) -> usize {
        (**self).n_envs()
    }

    fn obs_size(&self) -> usize {
        (**self).obs_size()
    }

    fn scan_size(&self) -> usize {
        (**self).scan_size()
    }

    fn action_space(&self) -> &ActionSpace {
        (**self).action_space()
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        (**self).reset()
    }

    fn step(&mut self, actions: &[Action]) -> Result<VecStep> {
        (**self).step(actions)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn normalization(&self) -> Option<NormalizationStats> {
        (**self).normalization()
    }

    fn set_normalization(&mut self, stats: &NormalizationStats) {
        (**self).set_normalization(stats)
    }

    fn set_training(&mut self, training: bool) {
        (**self).set_training(training)
    }

    fn save_normalization(&self, path: &Path) -> Result<bool> {
        (**self).save_normalization(path)
    }
}

fn check_actions(n_envs: usize, actions: &[Action]) -> Result<()> {
    if actions.len() != n_envs {
        return Err(Error::Env(format!(
            "expected {} actions, got {}",
            n_envs,
            actions.len()
        )));
    }
    Ok(())
}

/// Shape shared by every environment of a batch.
#[derive(Debug, Clone)]
struct EnvShape {
    obs_size: usize,
    scan_size: usize,
    action_space: ActionSpace,
}

impl EnvShape {
    fn of(env: &dyn NavEnv) -> Self {
        Self {
            obs_size: env.obs_size(),
            scan_size: env.scan_size(),
            action_space: env.action_space().clone(),
        }
    }

    fn check_same(&self, other: &EnvShape, namespace: &str) -> Result<()> {
        if self.obs_size != other.obs_size
            || self.scan_size != other.scan_size
            || self.action_space != other.action_space
        {
            return Err(Error::Env(format!(
                "environment '{}' has a different observation or action space",
                namespace
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Sequential
// ============================================================================

/// Steps every environment on the calling thread.
pub struct SequentialVecEnv {
    envs: Vec<Box<dyn NavEnv>>,
    shape: EnvShape,
}

impl SequentialVecEnv {
    pub fn new(envs: Vec<Box<dyn NavEnv>>) -> Result<Self> {
        let first = envs
            .first()
            .ok_or_else(|| Error::invalid("n_envs", "at least one environment is required"))?;
        let shape = EnvShape::of(first.as_ref());
        for env in &envs[1..] {
            shape.check_same(&EnvShape::of(env.as_ref()), env.namespace())?;
        }
        Ok(Self { envs, shape })
    }

    /// Build every environment from its factory on this thread.
    pub fn from_factories(factories: Vec<EnvFactory>) -> Result<Self> {
        let envs = factories
            .into_iter()
            .map(|make| make())
            .collect::<Result<Vec<_>>>()?;
        Self::new(envs)
    }
}

impl VecEnv for SequentialVecEnv {
    fn n_envs(&self) -> usize {
        self.envs.len()
    }

    fn obs_size(&self) -> usize {
        self.shape.obs_size
    }

    fn scan_size(&self) -> usize {
        self.shape.scan_size
    }

    fn action_space(&self) -> &ActionSpace {
        &self.shape.action_space
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        let mut obs = Vec::with_capacity(self.envs.len() * self.shape.obs_size);
        for env in &mut self.envs {
            obs.extend(env.reset()?);
        }
        Ok(obs)
    }

    fn step(&mut self, actions: &[Action]) -> Result<VecStep> {
        check_actions(self.envs.len(), actions)?;
        let mut out = VecStep::with_capacity(self.envs.len(), self.shape.obs_size);
        for (env, action) in self.envs.iter_mut().zip(actions) {
            let step = env.step(action)?;
            let next = if step.done() { Some(env.reset()?) } else { None };
            out.push(step, next);
        }
        Ok(out)
    }

    fn close(&mut self) -> Result<()> {
        for env in &mut self.envs {
            env.close()?;
        }
        Ok(())
    }
}

// ============================================================================
// Threaded
// ============================================================================

enum Command {
    Reset,
    Step(Action),
    Close,
}

enum Reply {
    Ready(EnvShape, String),
    Obs(Vec<f32>),
    Stepped(EnvStep, Option<Vec<f32>>),
    Closed,
    Failed(String),
}

struct Worker {
    namespace: String,
    cmd_tx: Sender<Command>,
    reply_rx: Receiver<Reply>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn recv(&self) -> Result<Reply> {
        match self.reply_rx.recv()? {
            Reply::Failed(msg) => Err(Error::Env(format!("[{}] {}", self.namespace, msg))),
            reply => Ok(reply),
        }
    }
}

fn worker_loop(make: EnvFactory, cmd_rx: Receiver<Command>, reply_tx: Sender<Reply>) {
    let mut env = match make() {
        Ok(env) => env,
        Err(e) => {
            let _ = reply_tx.send(Reply::Failed(e.to_string()));
            return;
        }
    };
    let shape = EnvShape::of(env.as_ref());
    if reply_tx
        .send(Reply::Ready(shape, env.namespace().to_string()))
        .is_err()
    {
        return;
    }

    while let Ok(cmd) = cmd_rx.recv() {
        let reply = match cmd {
            Command::Reset => env.reset().map(Reply::Obs),
            Command::Step(action) => env.step(&action).and_then(|step| {
                let next = if step.done() { Some(env.reset()?) } else { None };
                Ok(Reply::Stepped(step, next))
            }),
            Command::Close => {
                let reply = env.close().map(|_| Reply::Closed);
                let _ = reply_tx.send(reply.unwrap_or_else(|e| Reply::Failed(e.to_string())));
                return;
            }
        };
        let reply = reply.unwrap_or_else(|e| Reply::Failed(e.to_string()));
        if reply_tx.send(reply).is_err() {
            return;
        }
    }
}

/// One worker thread per environment.
///
/// Environments are built inside their worker, so everything they own stays
/// on that thread. Commands are broadcast first and replies collected
/// afterwards, which lets all environments step concurrently.
pub struct ThreadedVecEnv {
    workers: Vec<Worker>,
    shape: EnvShape,
    closed: bool,
}

impl ThreadedVecEnv {
    pub fn new(factories: Vec<EnvFactory>) -> Result<Self> {
        if factories.is_empty() {
            return Err(Error::invalid("n_envs", "at least one environment is required"));
        }

        let mut workers = Vec::with_capacity(factories.len());
        for (rank, make) in factories.into_iter().enumerate() {
            let (cmd_tx, cmd_rx) = bounded(1);
            let (reply_tx, reply_rx) = bounded(1);
            let thread = thread::Builder::new()
                .name(format!("env-{}", rank))
                .spawn(move || worker_loop(make, cmd_rx, reply_tx))
                .map_err(|e| Error::Env(format!("failed to spawn env worker {}: {}", rank, e)))?;
            workers.push(Worker {
                namespace: format!("env-{}", rank),
                cmd_tx,
                reply_rx,
                thread: Some(thread),
            });
        }

        let mut shape: Option<EnvShape> = None;
        for worker in &mut workers {
            match worker.recv()? {
                Reply::Ready(worker_shape, namespace) => {
                    if let Some(shape) = &shape {
                        shape.check_same(&worker_shape, &namespace)?;
                    } else {
                        shape = Some(worker_shape);
                    }
                    worker.namespace = namespace;
                }
                _ => return Err(Error::Env("unexpected reply from env worker".into())),
            }
        }
        let shape = shape.ok_or_else(|| Error::Env("no environment workers".into()))?;

        log::debug!("started {} environment workers", workers.len());
        Ok(Self {
            workers,
            shape,
            closed: false,
        })
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for worker in &self.workers {
            let _ = worker.cmd_tx.send(Command::Close);
        }
        let mut first_error = None;
        for worker in &mut self.workers {
            // Drain until the worker acknowledges or hangs up.
            loop {
                match worker.reply_rx.recv() {
                    Ok(Reply::Closed) | Err(_) => break,
                    Ok(Reply::Failed(msg)) => {
                        first_error.get_or_insert(Error::Env(format!(
                            "[{}] {}",
                            worker.namespace, msg
                        )));
                    }
                    Ok(_) => {}
                }
            }
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl VecEnv for ThreadedVecEnv {
    fn n_envs(&self) -> usize {
        self.workers.len()
    }

    fn obs_size(&self) -> usize {
        self.shape.obs_size
    }

    fn scan_size(&self) -> usize {
        self.shape.scan_size
    }

    fn action_space(&self) -> &ActionSpace {
        &self.shape.action_space
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        for worker in &self.workers {
            worker.cmd_tx.send(Command::Reset)?;
        }
        let mut obs = Vec::with_capacity(self.workers.len() * self.shape.obs_size);
        let mut first_error = None;
        // Every worker replies exactly once, so collect all replies before failing.
        for worker in &self.workers {
            match worker.recv() {
                Ok(Reply::Obs(o)) => obs.extend(o),
                Ok(_) => {
                    first_error.get_or_insert(Error::Env("unexpected reply to reset".into()));
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(obs), Err)
    }

    fn step(&mut self, actions: &[Action]) -> Result<VecStep> {
        check_actions(self.workers.len(), actions)?;
        for (worker, action) in self.workers.iter().zip(actions) {
            worker.cmd_tx.send(Command::Step(action.clone()))?;
        }
        let mut out = VecStep::with_capacity(self.workers.len(), self.shape.obs_size);
        let mut first_error = None;
        for worker in &self.workers {
            match worker.recv() {
                Ok(Reply::Stepped(step, next)) => out.push(step, next),
                Ok(_) => {
                    first_error.get_or_insert(Error::Env("unexpected reply to step".into()));
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(out), Err)
    }

    fn close(&mut self) -> Result<()> {
        self.shutdown()
    }
}

impl Drop for ThreadedVecEnv {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("error while closing environment workers: {}", e);
        }
    }
}

/// Build the training batch: worker threads, or in-process stepping when
/// `threaded` is false.
pub fn build_vec_env(factories: Vec<EnvFactory>, threaded: bool) -> Result<Box<dyn VecEnv>> {
    if threaded {
        Ok(Box::new(ThreadedVecEnv::new(factories)?))
    } else {
        Ok(Box::new(SequentialVecEnv::from_factories(factories)?))
    }
}

#[cfg(test)]
mod tests;
