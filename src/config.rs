//! YAML settings, command-line overrides and live reloading.

use crate::capture::{CameraFacing, CaptureConfig};
use crate::error::SetupError;
use crate::geometry::{QuadOrientation, Rotation};
use crate::mailbox::Backpressure;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use tracing::{error, info, warn};

/// Everything a camera view is configured with.
///
/// ```yaml
/// camera:
///   facing: front
///   width: 1280
///   height: 720
///   fps: 30
/// render:
///   orientation: { rotation: 90, mirror: true, flip: false }
///   backpressure: drop_incoming
///   shader: shaders/sepia.frag
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub camera: CaptureConfig,
    pub render: RenderSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub orientation: QuadOrientation,
    pub backpressure: Backpressure,
    /// Custom fragment shader (GLSL or WGSL) replacing the built-in one
    pub shader: Option<PathBuf>,
}

impl Settings {
    pub fn from_yaml(content: &str) -> Result<Self, SetupError> {
        serde_yaml::from_str(content).map_err(|e| SetupError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, SetupError> {
        let content = fs::read_to_string(path)
            .map_err(|e| SetupError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Whether going from `self` to `other` needs the view to be rebuilt.
    ///
    /// Only the orientation can change on a running view.
    pub fn restart_required(&self, other: &Settings) -> bool {
        self.camera != other.camera
            || self.render.backpressure != other.render.backpressure
            || self.render.shader != other.render.shader
    }
}

/// Values given on the command line; they win over the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub device_index: Option<u32>,
    pub facing: Option<CameraFacing>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub rotation: Option<Rotation>,
    pub mirror: Option<bool>,
    pub flip: bool,
    pub backpressure: Option<Backpressure>,
    pub shader: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(&self, settings: &mut Settings) {
        let camera = &mut settings.camera;
        if self.device_index.is_some() {
            camera.device_index = self.device_index;
        }
        if let Some(facing) = self.facing {
            camera.facing = facing;
        }
        if let Some(width) = self.width {
            camera.width = width;
        }
        if let Some(height) = self.height {
            camera.height = height;
        }
        if let Some(fps) = self.fps {
            camera.fps = fps;
        }

        let render = &mut settings.render;
        if let Some(rotation) = self.rotation {
            render.orientation.rotation = rotation;
        }
        if let Some(mirror) = self.mirror {
            render.orientation.mirror = mirror;
        }
        if self.flip {
            render.orientation.flip = true;
        }
        if let Some(backpressure) = self.backpressure {
            render.backpressure = backpressure;
        }
        if self.shader.is_some() {
            render.shader = self.shader.clone();
        }
    }
}

/// Watches the settings file and reparses it when it changes.
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    rx: Receiver<Result<Event, notify::Error>>,
    overrides: Overrides,
    current: Settings,
}

impl ConfigWatcher {
    /// Starts watching `path`. `current` is the merged result of the last load.
    ///
    /// Returns `None` (after logging) when the file cannot be watched.
    pub fn new(path: PathBuf, overrides: Overrides, current: Settings) -> Option<Self> {
        let (tx, rx) = channel();

        let mut watcher = match RecommendedWatcher::new(tx, notify::Config::default()) {
            Ok(watcher) => watcher,
            Err(e) => {
                warn!("Failed to create config watcher: {}", e);
                return None;
            }
        };
        if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
            warn!("Failed to watch config file {:?}: {}", path, e);
            return None;
        }
        info!("Watching config file {:?} for changes", path);

        Some(Self {
            path,
            _watcher: watcher,
            rx,
            overrides,
            current,
        })
    }

    /// Drains pending file events and returns `(old, new)` if the merged
    /// settings changed. Unreadable or invalid files keep the old settings.
    pub fn check_for_changes(&mut self) -> Option<(Settings, Settings)> {
        let mut needs_reload = false;
        while let Ok(res) = self.rx.try_recv() {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Modify(_) | notify::EventKind::Create(_)
                ) {
                    needs_reload = true;
                }
            }
        }
        if !needs_reload {
            return None;
        }

        info!("Config file changed, checking for updates...");
        let mut settings = match Settings::load(&self.path) {
            Ok(settings) => settings,
            Err(e) => {
                error!("Failed to reload config: {}", e);
                return None;
            }
        };
        self.overrides.apply(&mut settings);
        if settings == self.current {
            return None;
        }
        let old = std::mem::replace(&mut self.current, settings.clone());
        Some((old, settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.camera.facing, CameraFacing::Front);
        assert!(settings.render.orientation.mirror);
        assert_eq!(settings.render.backpressure, Backpressure::DropIncoming);
    }

    #[test]
    fn test_parse_full_file() {
        let yaml = r#"
camera:
  facing: back
  device_index: 2
  width: 640
  height: 480
  fps: 15
render:
  orientation:
    rotation: 270
    mirror: false
    flip: true
  backpressure: wait_for_draw
  shader: fx/tint.frag
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.camera.facing, CameraFacing::Back);
        assert_eq!(settings.camera.device_index, Some(2));
        assert_eq!((settings.camera.width, settings.camera.height), (640, 480));
        assert_eq!(settings.camera.fps, 15);
        assert_eq!(
            settings.render.orientation,
            QuadOrientation {
                rotation: Rotation::ThreeQuarter,
                mirror: false,
                flip: true
            }
        );
        assert_eq!(settings.render.backpressure, Backpressure::WaitForDraw);
        assert_eq!(settings.render.shader, Some(PathBuf::from("fx/tint.frag")));
    }

    #[test]
    fn test_partial_orientation_keeps_defaults() {
        let settings = Settings::from_yaml("render:\n  orientation:\n    rotation: 90\n").unwrap();
        assert_eq!(settings.render.orientation.rotation, Rotation::Quarter);
        assert!(settings.render.orientation.mirror);
        assert_eq!(settings.camera, CaptureConfig::default());
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for yaml in [
            "render:\n  orientation:\n    rotation: 45\n",
            "camera:\n  facing: sideways\n",
            "render:\n  backpressure: sometimes\n",
        ] {
            assert!(matches!(Settings::from_yaml(yaml), Err(SetupError::Config(_))), "{yaml}");
        }
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = Settings::load(Path::new("/nonexistent/camquad.yaml"));
        assert!(matches!(result, Err(SetupError::Config(_))));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut settings = Settings::from_yaml("camera:\n  width: 640\n  fps: 15\n").unwrap();
        let overrides = Overrides {
            width: Some(1920),
            rotation: Some(Rotation::Half),
            mirror: Some(false),
            backpressure: Some(Backpressure::ReplacePending),
            ..Default::default()
        };
        overrides.apply(&mut settings);

        assert_eq!(settings.camera.width, 1920);
        assert_eq!(settings.camera.fps, 15);
        assert_eq!(settings.render.orientation.rotation, Rotation::Half);
        assert!(!settings.render.orientation.mirror);
        assert_eq!(settings.render.backpressure, Backpressure::ReplacePending);
    }

    #[test]
    fn test_restart_required() {
        let base = Settings::default();

        let mut turned = base.clone();
        turned.render.orientation.rotation = Rotation::Quarter;
        assert!(!base.restart_required(&turned));

        let mut bigger = base.clone();
        bigger.camera.width = 1920;
        assert!(base.restart_required(&bigger));

        let mut waiting = base.clone();
        waiting.render.backpressure = Backpressure::WaitForDraw;
        assert!(base.restart_required(&waiting));
    }
}
