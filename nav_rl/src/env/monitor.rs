//! Episode statistics wrapper.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::{Action, ActionSpace, EnvStep, EpisodeRecord, NavEnv};
use crate::error::{Error, Result};

/// File name of the monitor log inside its directory.
pub const MONITOR_FILE: &str = "monitor.csv";

/// Info keywords copied into every monitor row.
const INFO_KEYWORDS: [&str; 2] = ["done_reason", "is_success"];

/// Records reward, length and wall time of every finished episode.
///
/// With a log directory, one CSV row per episode is appended to
/// `monitor.csv`: `r,l,t,done_reason,is_success`.
pub struct Monitor<E: NavEnv> {
    env: E,
    start: Instant,
    episode_reward: f64,
    episode_length: usize,
    episodes: Vec<EpisodeRecord>,
    writer: Option<(PathBuf, BufWriter<File>)>,
}

impl<E: NavEnv> Monitor<E> {
    /// Wrap `env`, logging to `<log_dir>/monitor.csv` when a directory is given.
    pub fn new(env: E, log_dir: Option<&Path>) -> Result<Self> {
        let writer = match log_dir {
            Some(dir) => {
                let path = dir.join(MONITOR_FILE);
                let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
                let mut writer = BufWriter::new(file);
                let t_start = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
                writeln!(
                    writer,
                    "#{{\"t_start\": {:.3}, \"env_id\": \"{}\"}}",
                    t_start,
                    env.namespace()
                )
                .and_then(|_| writeln!(writer, "r,l,t,{}", INFO_KEYWORDS.join(",")))
                .and_then(|_| writer.flush())
                .map_err(|e| Error::io(&path, e))?;
                Some((path, writer))
            }
            None => None,
        };
        Ok(Self {
            env,
            start: Instant::now(),
            episode_reward: 0.0,
            episode_length: 0,
            episodes: Vec::new(),
            writer,
        })
    }

    /// Finished episodes so far.
    pub fn episodes(&self) -> &[EpisodeRecord] {
        &self.episodes
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    fn write_row(&mut self, record: &EpisodeRecord, step: &EnvStep) -> Result<()> {
        let Some((path, writer)) = &mut self.writer else {
            return Ok(());
        };
        let done_reason = step
            .info
            .done_reason
            .map(|r| r.code().to_string())
            .unwrap_or_default();
        let is_success = step
            .info
            .is_success
            .map(|s| u8::from(s).to_string())
            .unwrap_or_default();
        writeln!(
            writer,
            "{:.6},{},{:.6},{},{}",
            record.reward, record.length, record.time, done_reason, is_success
        )
        .and_then(|_| writer.flush())
        .map_err(|e| Error::io(path.as_path(), e))
    }
}

impl<E: NavEnv> NavEnv for Monitor<E> {
    fn namespace(&self) -> &str {
        self.env.namespace()
    }

    fn obs_size(&self) -> usize {
        self.env.obs_size()
    }

    fn scan_size(&self) -> usize {
        self.env.scan_size()
    }

    fn action_space(&self) -> &ActionSpace {
        self.env.action_space()
    }

    fn seed(&mut self, seed: u64) {
        self.env.seed(seed)
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        self.episode_reward = 0.0;
        self.episode_length = 0;
        self.env.reset()
    }

    fn step(&mut self, action: &Action) -> Result<EnvStep> {
        let mut step = self.env.step(action)?;
        self.episode_reward += step.reward as f64;
        self.episode_length += 1;
        if step.done() {
            let record = EpisodeRecord {
                reward: self.episode_reward,
                length: self.episode_length,
                time: self.start.elapsed().as_secs_f64(),
            };
            self.write_row(&record, &step)?;
            self.episodes.push(record);
            step.info.episode = Some(record);
        }
        Ok(step)
    }

    fn close(&mut self) -> Result<()> {
        if let Some((path, writer)) = &mut self.writer {
            writer.flush().map_err(|e| Error::io(path.as_path(), e))?;
        }
        self.env.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{DoneReason, StepInfo};
    use std::fs;
    use tempfile::TempDir;

    /// Ends an episode every `len` steps with reward 1 per step.
    struct CountingEnv {
        space: ActionSpace,
        len: usize,
        t: usize,
    }

    impl CountingEnv {
        fn new(len: usize) -> Self {
            Self {
                space: ActionSpace::Continuous {
                    low: vec![0.0],
                    high: vec![1.0],
                },
                len,
                t: 0,
            }
        }
    }

    impl NavEnv for CountingEnv {
        fn namespace(&self) -> &str {
            "eval_sim"
        }
        fn obs_size(&self) -> usize {
            1
        }
        fn scan_size(&self) -> usize {
            0
        }
        fn action_space(&self) -> &ActionSpace {
            &self.space
        }
        fn seed(&mut self, _seed: u64) {}
        fn reset(&mut self) -> Result<Vec<f32>> {
            self.t = 0;
            Ok(vec![0.0])
        }
        fn step(&mut self, _action: &Action) -> Result<EnvStep> {
            self.t += 1;
            let done = self.t >= self.len;
            Ok(EnvStep {
                obs: vec![self.t as f32],
                reward: 1.0,
                terminal: done,
                truncated: false,
                info: StepInfo {
                    done_reason: done.then_some(DoneReason::GoalReached),
                    is_success: done.then_some(true),
                    episode: None,
                },
            })
        }
    }

    #[test]
    fn test_records_episodes_and_writes_csv() {
        let dir = TempDir::new().unwrap();
        let mut env = Monitor::new(CountingEnv::new(3), Some(dir.path())).unwrap();
        let action = Action::Continuous(vec![0.0]);

        for _ in 0..2 {
            env.reset().unwrap();
            loop {
                let step = env.step(&action).unwrap();
                if step.done() {
                    let record = step.info.episode.unwrap();
                    assert_eq!(record.length, 3);
                    assert!((record.reward - 3.0).abs() < 1e-9);
                    break;
                }
                assert!(step.info.episode.is_none());
            }
        }
        env.close().unwrap();
        assert_eq!(env.episodes().len(), 2);

        let text = fs::read_to_string(dir.path().join(MONITOR_FILE)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("#{\"t_start\""));
        assert_eq!(lines[1], "r,l,t,done_reason,is_success");
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("3.000000,3,"));
        assert!(lines[2].ends_with(",2,1"));
    }

    #[test]
    fn test_without_log_dir() {
        let mut env = Monitor::new(CountingEnv::new(1), None).unwrap();
        env.reset().unwrap();
        let step = env.step(&Action::Continuous(vec![0.0])).unwrap();
        assert!(step.info.episode.is_some());
    }
}
