use super::*;
use crate::env::DoneReason;

/// Observation is `[id, t]`; the episode ends after `len` steps.
struct ToyEnv {
    id: usize,
    len: usize,
    t: usize,
    space: ActionSpace,
}

impl ToyEnv {
    fn boxed(id: usize, len: usize) -> Box<dyn NavEnv> {
        Box::new(Self {
            id,
            len,
            t: 0,
            space: ActionSpace::Continuous {
                low: vec![-1.0],
                high: vec![1.0],
            },
        })
    }

    fn obs(&self) -> Vec<f32> {
        vec![self.id as f32, self.t as f32]
    }
}

impl NavEnv for ToyEnv {
    fn namespace(&self) -> &str {
        "toy"
    }
    fn obs_size(&self) -> usize {
        2
    }
    fn scan_size(&self) -> usize {
        1
    }
    fn action_space(&self) -> &ActionSpace {
        &self.space
    }
    fn seed(&mut self, _seed: u64) {}
    fn reset(&mut self) -> Result<Vec<f32>> {
        self.t = 0;
        Ok(self.obs())
    }
    fn step(&mut self, action: &Action) -> Result<EnvStep> {
        let reward = match action {
            Action::Continuous(v) => v[0],
            Action::Discrete(_) => return Err(Error::Env("continuous only".into())),
        };
        self.t += 1;
        let truncated = self.t >= self.len;
        Ok(EnvStep {
            obs: self.obs(),
            reward,
            terminal: false,
            truncated,
            info: StepInfo {
                done_reason: truncated.then_some(DoneReason::Timeout),
                is_success: truncated.then_some(false),
                episode: None,
            },
        })
    }
}

fn factories(lens: &[usize]) -> Vec<EnvFactory> {
    lens.iter()
        .enumerate()
        .map(|(id, &len)| -> EnvFactory { Box::new(move || Ok(ToyEnv::boxed(id, len))) })
        .collect()
}

fn actions(n: usize, value: f32) -> Vec<Action> {
    (0..n).map(|_| Action::Continuous(vec![value])).collect()
}

fn check_auto_reset(venv: &mut dyn VecEnv) {
    assert_eq!(venv.n_envs(), 2);
    assert_eq!(venv.obs_size(), 2);
    assert_eq!(venv.reset().unwrap(), vec![0.0, 0.0, 1.0, 0.0]);

    let step = venv.step(&actions(2, 0.5)).unwrap();
    assert_eq!(step.rewards, vec![0.5, 0.5]);
    assert!(!step.done(0));
    assert!(step.done(1));
    // env 1 finished after one step and was reset
    assert_eq!(step.obs, vec![0.0, 1.0, 1.0, 0.0]);
    assert_eq!(step.final_obs[1], Some(vec![1.0, 1.0]));
    assert_eq!(step.final_obs[0], None);
    assert_eq!(step.infos[1].done_reason, Some(DoneReason::Timeout));

    let step = venv.step(&actions(2, 1.0)).unwrap();
    assert!(step.done(0) && step.done(1));
    assert_eq!(step.obs, vec![0.0, 0.0, 1.0, 0.0]);

    assert!(venv.step(&actions(1, 1.0)).is_err());
    venv.close().unwrap();
}

#[test]
fn test_sequential_auto_reset() {
    let mut venv = SequentialVecEnv::from_factories(factories(&[2, 1])).unwrap();
    check_auto_reset(&mut venv);
}

#[test]
fn test_threaded_auto_reset() {
    let mut venv = ThreadedVecEnv::new(factories(&[2, 1])).unwrap();
    check_auto_reset(&mut venv);
    // closing twice is fine
    venv.close().unwrap();
}

#[test]
fn test_threaded_reports_env_errors() {
    let mut venv = ThreadedVecEnv::new(factories(&[3, 3])).unwrap();
    venv.reset().unwrap();
    let err = venv
        .step(&[Action::Discrete(0), Action::Discrete(0)])
        .unwrap_err();
    assert!(err.to_string().contains("continuous only"));
}

#[test]
fn test_threaded_reports_construction_errors() {
    let failing: Vec<EnvFactory> = vec![
        Box::new(|| Ok(ToyEnv::boxed(0, 1))),
        Box::new(|| Err(Error::Env("no simulator".into()))),
    ];
    let err = ThreadedVecEnv::new(failing).err().unwrap();
    assert!(err.to_string().contains("no simulator"));
}

#[test]
fn test_empty_batch_is_rejected() {
    assert!(SequentialVecEnv::new(Vec::new()).is_err());
    assert!(ThreadedVecEnv::new(Vec::new()).is_err());
}

#[test]
fn test_build_vec_env() {
    let venv = build_vec_env(factories(&[1, 1, 1]), true).unwrap();
    assert_eq!(venv.n_envs(), 3);
    let venv = build_vec_env(factories(&[1]), false).unwrap();
    assert_eq!(venv.n_envs(), 1);
}
