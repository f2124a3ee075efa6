//! Robot model and action-space settings files.
//!
//! The robot model follows the flatland model format: a list of bodies with
//! footprints and a list of plugins, one of which is the laser. The action
//! settings file lists the discrete velocity commands and the continuous
//! velocity ranges of the robot.

use serde::Deserialize;
use std::path::Path;

use super::{ActionSpace, DiscreteAction};
use crate::error::{Error, Result};
use crate::files::read_yaml;

#[derive(Debug, Clone, Deserialize)]
struct Footprint {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    radius: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
struct Body {
    #[serde(default)]
    footprints: Vec<Footprint>,
}

#[derive(Debug, Clone, Deserialize)]
struct LaserAngle {
    min: f32,
    max: f32,
    increment: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct Plugin {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    range: Option<f32>,
    #[serde(default)]
    angle: Option<LaserAngle>,
}

#[derive(Debug, Clone, Deserialize)]
struct RobotModelFile {
    #[serde(default)]
    bodies: Vec<Body>,
    #[serde(default)]
    plugins: Vec<Plugin>,
}

/// Laser parameters extracted from the robot model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaserSettings {
    pub num_beams: usize,
    pub angle_min: f32,
    pub angle_max: f32,
    pub angle_increment: f32,
    pub range: f32,
}

impl LaserSettings {
    /// Angle of beam `i` in the robot frame.
    pub fn beam_angle(&self, i: usize) -> f32 {
        self.angle_min + i as f32 * self.angle_increment
    }
}

/// Parts of the robot model the environment needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotModel {
    pub laser: LaserSettings,
    pub radius: f32,
}

impl RobotModel {
    /// Default footprint radius when the model declares no circle.
    pub const DEFAULT_RADIUS: f32 = 0.3;

    pub fn load(path: &Path) -> Result<Self> {
        let file: RobotModelFile = read_yaml(path)?;
        Self::from_file(file, path)
    }

    fn from_file(file: RobotModelFile, path: &Path) -> Result<Self> {
        let laser = file
            .plugins
            .iter()
            .find(|p| p.kind == "Laser")
            .ok_or_else(|| Error::NotFound {
                what: "a Laser plugin".to_string(),
                path: path.to_path_buf(),
            })?;
        let angle = laser
            .angle
            .as_ref()
            .ok_or_else(|| Error::invalid("laser", "missing angle settings"))?;
        let range = laser
            .range
            .ok_or_else(|| Error::invalid("laser", "missing range"))?;
        if angle.increment <= 0.0 || angle.max <= angle.min || range <= 0.0 {
            return Err(Error::invalid(
                "laser",
                format!(
                    "invalid angles [{}, {}] step {} or range {}",
                    angle.min, angle.max, angle.increment, range
                ),
            ));
        }
        let num_beams = ((angle.max - angle.min) / angle.increment).round() as usize + 1;

        let radius = file
            .bodies
            .iter()
            .flat_map(|b| &b.footprints)
            .find(|f| f.kind == "circle")
            .and_then(|f| f.radius)
            .unwrap_or(Self::DEFAULT_RADIUS);

        Ok(Self {
            laser: LaserSettings {
                num_beams,
                angle_min: angle.min,
                angle_max: angle.max,
                angle_increment: angle.increment,
                range,
            },
            radius,
        })
    }
}

/// A discrete action as written in the settings file.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscreteActionSetting {
    pub name: String,
    pub linear: f32,
    pub angular: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct ContinuousActionSetting {
    linear_range: [f32; 2],
    angular_range: [f32; 2],
}

#[derive(Debug, Clone, Deserialize)]
struct RobotActionSettings {
    #[serde(default)]
    discrete_actions: Vec<DiscreteActionSetting>,
    #[serde(default)]
    continuous_actions: Option<ContinuousActionSetting>,
}

#[derive(Debug, Clone, Deserialize)]
struct ActionSettingsFile {
    robot: RobotActionSettings,
}

/// Both action spaces declared in the settings file.
#[derive(Debug, Clone)]
pub struct ActionSettings {
    pub discrete: Vec<DiscreteActionSetting>,
    pub linear_range: Option<[f32; 2]>,
    pub angular_range: Option<[f32; 2]>,
}

impl ActionSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let file: ActionSettingsFile = read_yaml(path)?;
        let continuous = file.robot.continuous_actions;
        Ok(Self {
            discrete: file.robot.discrete_actions,
            linear_range: continuous.as_ref().map(|c| c.linear_range),
            angular_range: continuous.as_ref().map(|c| c.angular_range),
        })
    }

    /// Pick the discrete or continuous action space.
    pub fn action_space(&self, discrete: bool) -> Result<ActionSpace> {
        if discrete {
            if self.discrete.is_empty() {
                return Err(Error::invalid(
                    "discrete_action_space",
                    "no discrete actions declared",
                ));
            }
            return Ok(ActionSpace::Discrete(
                self.discrete
                    .iter()
                    .map(|a| DiscreteAction {
                        name: a.name.clone(),
                        linear: a.linear,
                        angular: a.angular,
                    })
                    .collect(),
            ));
        }
        match (self.linear_range, self.angular_range) {
            (Some(lin), Some(ang)) => Ok(ActionSpace::Continuous {
                low: vec![lin[0], ang[0]],
                high: vec![lin[1], ang[1]],
            }),
            _ => Err(Error::invalid(
                "discrete_action_space",
                "no continuous action ranges declared",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MODEL: &str = r#"
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

    const ACTIONS: &str = r#"
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

    #[test]
    fn test_robot_model() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("myrobot.model.yaml");
        fs::write(&path, MODEL).unwrap();

        let model = RobotModel::load(&path).unwrap();
        assert_eq!(model.laser.num_beams, 7);
        assert_eq!(model.laser.range, 8.0);
        assert_eq!(model.radius, 0.2);
        assert!((model.laser.beam_angle(6) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_robot_model_without_laser() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.yaml");
        fs::write(&path, "plugins: []\n").unwrap();
        assert!(matches!(
            RobotModel::load(&path).unwrap_err(),
            Error::NotFound { .. }
        ));
    }

    #[test]
    fn test_action_spaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("default_settings.yaml");
        fs::write(&path, ACTIONS).unwrap();

        let settings = ActionSettings::load(&path).unwrap();
        match settings.action_space(true).unwrap() {
            ActionSpace::Discrete(actions) => {
                assert_eq!(actions.len(), 2);
                assert_eq!(actions[1].name, "turn_left");
            }
            other => panic!("expected discrete space, got {:?}", other),
        }
        assert_eq!(
            settings.action_space(false).unwrap(),
            ActionSpace::Continuous {
                low: vec![0.0, -1.5],
                high: vec![0.3, 1.5],
            }
        );
    }
}
