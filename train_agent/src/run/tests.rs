use std::fs;
use std::path::{Path, PathBuf};

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use clap::Parser;
use tempfile::TempDir;

use super::*;
use nav_rl::files::{read_json, write_json};
use nav_rl::metrics::PROGRESS_FILE;
use nav_rl::ppo::StopReason;

type TestBackend = Autodiff<NdArray<f32>>;

const ROBOT_MODEL: &str = r#"
bodies:
  - name: base_footprint
    footprints:
      - type: circle
        radius: 0.2
        density: 1
plugins:
  - type: DiffDrive
    name: diff_drive
  - type: Laser
    name: static_laser
    range: 8
    angle: {min: -1.5, max: 1.5, increment: 0.5}
"#;

const ACTION_SETTINGS: &str = r#"
robot:
  discrete_actions:
    - name: move_forward
      linear: 0.15
      angular: 0.0
    - name: turn_left
      linear: 0.0
      angular: 0.35
  continuous_actions:
    linear_range: [0, 0.3]
    angular_range: [-1.5, 1.5]
"#;

const CURRICULUM: &str = "1:\n  static: 0\n  dynamic: 0\n2:\n  static: 3\n  dynamic: 0\n";

/// Package and simulator setup directories with everything a run reads.
struct Workspace {
    _dir: TempDir,
    pkg: PathBuf,
    sim: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("arena_local_planner_drl");
        let sim = dir.path().join("simulator_setup");

        let presets = pkg.join("configs").join("hyperparameters");
        fs::create_dir_all(&presets).unwrap();
        let preset = Hyperparameters {
            batch_size: 32,
            m_batch_size: 16,
            train_max_steps_per_episode: 20,
            eval_max_steps_per_episode: 20,
            ..Hyperparameters::default()
        };
        write_json(&presets.join("default.json"), &preset).unwrap();
        fs::write(pkg.join("configs/default_settings.yaml"), ACTION_SETTINGS).unwrap();
        fs::write(
            pkg.join("configs/training_curriculum_map1small.yaml"),
            CURRICULUM,
        )
        .unwrap();

        fs::create_dir_all(sim.join("robot")).unwrap();
        fs::write(sim.join("robot/myrobot.model.yaml"), ROBOT_MODEL).unwrap();

        Self {
            _dir: dir,
            pkg,
            sim,
        }
    }

    fn args(&self, extra: &[&str]) -> Args {
        let mut args = Args::try_parse_from(
            ["train_agent", "--debug"].iter().chain(extra.iter()).copied(),
        )
        .unwrap();
        args.pkg_dir = self.pkg.clone();
        args.simulator_setup_dir = Some(self.sim.clone());
        args.ros_master_uri = None;
        args
    }

    /// The single agent directory created so far.
    fn agent_dir(&self) -> PathBuf {
        let mut dirs: Vec<PathBuf> = fs::read_dir(self.pkg.join("agents"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(dirs.len(), 1);
        dirs.remove(0)
    }
}

fn dir_name(dir: &Path) -> String {
    dir.file_name().unwrap().to_string_lossy().into_owned()
}

fn trained_timesteps(agent_dir: &Path) -> u64 {
    let params: Hyperparameters = read_json(&agent_dir.join("hyperparameters.json")).unwrap();
    params.n_timesteps
}

#[test]
fn test_new_agent_trains_and_saves() {
    let ws = Workspace::new();
    let args = ws.args(&["--agent", "MLP_ARENA2D", "--n", "64", "--tb", "--eval-log"]);

    let outcome =
        run::<TestBackend>(&args, Default::default(), &AtomicBool::new(false)).unwrap();
    assert_eq!(outcome.stop, StopReason::Completed);
    assert_eq!(outcome.timesteps, 64);

    let agent_dir = ws.agent_dir();
    let name = dir_name(&agent_dir);
    assert!(name.starts_with("MLP_ARENA2D_"));
    assert!(agent_dir.join(format!("{}.bin", name)).is_file());
    assert!(agent_dir.join(format!("{}.json", name)).is_file());
    assert!(agent_dir.join("vec_normalize.json").is_file());
    assert_eq!(trained_timesteps(&agent_dir), 64);

    let params: Hyperparameters = read_json(&agent_dir.join("hyperparameters.json")).unwrap();
    assert_eq!(params.agent_name, name);
    assert_eq!(params.n_steps, 32);

    let tb = ws.pkg.join("training_logs/tensorboard").join(&name);
    assert!(tb.join(PROGRESS_FILE).is_file());
    assert!(ws.pkg.join("training_logs/train_eval_log").join(&name).is_dir());
}

#[test]
fn test_resume_adds_timesteps() {
    let ws = Workspace::new();
    let args = ws.args(&["--custom-mlp", "--body", "32", "--pi", "16", "--vf", "16", "--n", "32"]);
    run::<TestBackend>(&args, Default::default(), &AtomicBool::new(false)).unwrap();

    let agent_dir = ws.agent_dir();
    let name = dir_name(&agent_dir);
    assert!(name.starts_with("MLP_B_32_P_16_V_16_relu_"));

    let args = ws.args(&["--load", &name, "--n", "32"]);
    let outcome =
        run::<TestBackend>(&args, Default::default(), &AtomicBool::new(false)).unwrap();
    assert_eq!(outcome.timesteps, 32);
    assert_eq!(trained_timesteps(&agent_dir), 64);
}

#[test]
fn test_interrupted_run_still_saves() {
    let ws = Workspace::new();
    let args = ws.args(&["--agent", "AGENT_5", "--n", "1000"]);

    let outcome = run::<TestBackend>(&args, Default::default(), &AtomicBool::new(true)).unwrap();
    assert_eq!(outcome.stop, StopReason::Interrupted);
    assert_eq!(outcome.timesteps, 0);

    let agent_dir = ws.agent_dir();
    let name = dir_name(&agent_dir);
    assert!(agent_dir.join(format!("{}.bin", name)).is_file());
    assert_eq!(trained_timesteps(&agent_dir), 0);
}

#[test]
fn test_missing_agent_to_load() {
    let ws = Workspace::new();
    let args = ws.args(&["--load", "AGENT_5_2021_03_07__09_05"]);
    let err = run::<TestBackend>(&args, Default::default(), &AtomicBool::new(false)).unwrap_err();
    assert!(format!("{:#}", err).contains("AGENT_5_2021_03_07__09_05"));
}

#[test]
fn test_batch_size_must_divide_by_envs() {
    let ws = Workspace::new();
    let args = ws.args(&["--agent", "MLP_ARENA2D", "--n-envs", "3", "--n", "32"]);
    assert!(run::<TestBackend>(&args, Default::default(), &AtomicBool::new(false)).is_err());
}
