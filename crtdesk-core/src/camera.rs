//! Free-fly / zoomed camera with animated transitions between the two.

use std::f32::consts::FRAC_PI_2;
use std::time::{Duration, Instant};

use glam::{EulerRot, Mat4, Quat, Vec2, Vec3, Vec4};
use tracing::{debug, info};

use crate::config::{CameraSettings, MonitorConfig};
use crate::input::InputState;
use crate::NormalizedRect;

/// Largest `f32` below one; progress reported before the deadline never reaches 1.
const PROGRESS_BEFORE_END: f32 = 1.0 - f32::EPSILON / 2.0;

pub fn ease_out_cubic(t: f32) -> f32 {
    1.0 - (1.0 - t).powi(3)
}

/// Rotation pair `(rotation_x, rotation_y)` that points the camera from `from` to `to`.
pub fn rotation_towards(from: Vec3, to: Vec3) -> (f32, f32) {
    let direction = (to - from).normalize_or_zero();
    if direction == Vec3::ZERO {
        return (0.0, 0.0);
    }
    let rotation_y = (-direction.x).atan2(-direction.z);
    let rotation_x = direction.y.clamp(-1.0, 1.0).asin();
    (rotation_x, rotation_y)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub target: Vec3,
    /// Vertical look angle, kept within `[-π/2, π/2]`.
    pub rotation_x: f32,
    pub rotation_y: f32,
}

impl CameraPose {
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let (rotation_x, rotation_y) = rotation_towards(position, target);
        Self {
            position,
            target,
            rotation_x,
            rotation_y,
        }
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.rotation_y, self.rotation_x, 0.0)
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.orientation() * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.orientation() * Vec3::Y
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation(), self.position).inverse()
    }

    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            position: self.position.lerp(other.position, t),
            target: self.target.lerp(other.target, t),
            rotation_x: self.rotation_x + (other.rotation_x - self.rotation_x) * t,
            rotation_y: self.rotation_y + (other.rotation_y - self.rotation_y) * t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    Free,
    Zoomed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Free,
    Zoomed,
    Transitioning { to: CameraMode },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomState {
    pub is_zoomed: bool,
    pub zoomed_position: Vec3,
    /// Free pose captured when zooming in, restored verbatim when zooming out.
    pub normal_position: Vec3,
    pub normal_target: Vec3,
    pub target: Vec3,
    pub saved_rotation_x: f32,
    pub saved_rotation_y: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct CameraTransition {
    pub started_at: Instant,
    pub duration: Duration,
    pub from: CameraPose,
    pub to: CameraPose,
}

impl CameraTransition {
    pub fn is_finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.duration
    }

    pub fn progress(&self, now: Instant) -> f32 {
        if self.is_finished(now) {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f64();
        let ratio = elapsed / self.duration.as_secs_f64();
        (ratio as f32).clamp(0.0, PROGRESS_BEFORE_END)
    }

    pub fn sample(&self, now: Instant) -> CameraPose {
        if self.is_finished(now) {
            return self.to;
        }
        self.from.lerp(&self.to, ease_out_cubic(self.progress(now)))
    }
}

/// What a frame update did to the camera.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameMotion {
    pub moved: bool,
    /// Wheel delta meant for the document surface; only non-zero while zoomed.
    pub document_scroll: f32,
    pub finished: Option<CameraMode>,
}

pub struct CameraControls {
    settings: CameraSettings,
    monitor: MonitorConfig,
    pose: CameraPose,
    zoom: ZoomState,
    transition: Option<CameraTransition>,
}

impl CameraControls {
    pub fn new(settings: CameraSettings, monitor: MonitorConfig) -> Self {
        let target = monitor.target();
        let pose =
            CameraPose::looking_at(monitor.camera_position_at(settings.start_distance), target);
        let zoom = ZoomState {
            is_zoomed: false,
            zoomed_position: monitor.camera_position_at(settings.zoom_distance),
            normal_position: pose.position,
            normal_target: pose.target,
            target,
            saved_rotation_x: pose.rotation_x,
            saved_rotation_y: pose.rotation_y,
        };
        Self {
            settings,
            monitor,
            pose,
            zoom,
            transition: None,
        }
    }

    pub fn pose(&self) -> &CameraPose {
        &self.pose
    }

    pub fn zoom_state(&self) -> &ZoomState {
        &self.zoom
    }

    pub fn transition(&self) -> Option<&CameraTransition> {
        self.transition.as_ref()
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    /// Mode the camera is in, or heading to while a transition runs.
    pub fn mode(&self) -> CameraMode {
        if self.zoom.is_zoomed {
            CameraMode::Zoomed
        } else {
            CameraMode::Free
        }
    }

    pub fn state(&self) -> ControlState {
        match (self.transition.is_some(), self.mode()) {
            (true, to) => ControlState::Transitioning { to },
            (false, CameraMode::Free) => ControlState::Free,
            (false, CameraMode::Zoomed) => ControlState::Zoomed,
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    fn accepts_manual_input(&self) -> bool {
        !self.zoom.is_zoomed && self.transition.is_none()
    }

    /// Starts a transition into or out of the zoomed view. Ignored while a
    /// transition is already running.
    pub fn toggle_zoom(&mut self, now: Instant) -> bool {
        if self.transition.is_some() {
            debug!("zoom toggle ignored during transition");
            return false;
        }

        let to = if self.zoom.is_zoomed {
            self.zoom.is_zoomed = false;
            CameraPose {
                position: self.zoom.normal_position,
                target: self.zoom.normal_target,
                rotation_x: self.zoom.saved_rotation_x,
                rotation_y: self.zoom.saved_rotation_y,
            }
        } else {
            self.zoom.is_zoomed = true;
            self.zoom.normal_position = self.pose.position;
            self.zoom.normal_target = self.pose.target;
            self.zoom.saved_rotation_x = self.pose.rotation_x;
            self.zoom.saved_rotation_y = self.pose.rotation_y;
            self.zoom.target = self.monitor.target();
            CameraPose::looking_at(self.zoom.zoomed_position, self.zoom.target)
        };

        info!(zoomed = self.zoom.is_zoomed, "camera transition started");
        self.transition = Some(CameraTransition {
            started_at: now,
            duration: self.settings.transition,
            from: self.pose,
            to,
        });
        true
    }

    pub fn rotate(&mut self, dx: f32, dy: f32) -> bool {
        if !self.accepts_manual_input() {
            return false;
        }
        let k = self.settings.rotate_sensitivity;
        self.pose.rotation_y -= dx * k;
        self.pose.rotation_x = (self.pose.rotation_x - dy * k).clamp(-FRAC_PI_2, FRAC_PI_2);
        true
    }

    pub fn pan(&mut self, dx: f32, dy: f32) -> bool {
        if !self.accepts_manual_input() {
            return false;
        }
        let speed = self.settings.pan_speed;
        let offset = self.pose.right() * (-dx * speed) + self.pose.up() * (dy * speed);
        self.pose.position += offset;
        true
    }

    /// Moves along the view direction; negative notches (wheel up) move forward.
    pub fn dolly(&mut self, notches: i32) -> bool {
        if notches == 0 || !self.accepts_manual_input() {
            return false;
        }
        let distance = -(notches as f32) * self.settings.dolly_step;
        self.pose.position += self.pose.forward() * distance;
        true
    }

    fn fly(&mut self, direction: Vec3) -> bool {
        if direction == Vec3::ZERO || !self.accepts_manual_input() {
            return false;
        }
        let direction = direction.normalize() * self.settings.move_speed;
        let velocity =
            self.pose.right() * direction.x + Vec3::Y * direction.y + self.pose.forward() * direction.z;
        self.pose.position += velocity;
        true
    }

    /// Per-frame step: advances a running transition, otherwise applies the
    /// input gathered since the previous frame.
    pub fn update(&mut self, now: Instant, input: &mut InputState) -> FrameMotion {
        let mut motion = FrameMotion::default();

        if let Some(transition) = self.transition {
            self.pose = transition.sample(now);
            motion.moved = true;
            input.discard_motion();
            if transition.is_finished(now) {
                self.transition = None;
                motion.finished = Some(self.mode());
                info!(mode = ?self.mode(), "camera transition finished");
            }
            input.end_frame();
            return motion;
        }

        match self.mode() {
            CameraMode::Free => {
                let rotate = input.take_rotate_drag();
                let pan = input.take_pan_drag();
                let wheel = input.take_wheel();
                if rotate != Vec2::ZERO {
                    motion.moved |= self.rotate(rotate.x, rotate.y);
                }
                if pan != Vec2::ZERO {
                    motion.moved |= self.pan(pan.x, pan.y);
                }
                motion.moved |= self.dolly(wheel.notches);
                motion.moved |= self.fly(input.keys().direction());
            }
            CameraMode::Zoomed => {
                input.take_rotate_drag();
                input.take_pan_drag();
                motion.document_scroll = input.take_wheel().delta;
            }
        }

        input.end_frame();
        motion
    }

    /// Projects the monitor screen into the viewport. `None` when part of the
    /// screen is behind the camera or the screen is entirely off view.
    pub fn project_monitor(&self, aspect: f32) -> Option<NormalizedRect> {
        if !(aspect.is_finite() && aspect > 0.0) {
            return None;
        }
        let projection = Mat4::perspective_rh(
            self.settings.fov_degrees.to_radians(),
            aspect,
            self.settings.near,
            self.settings.far,
        );
        let view_projection = projection * self.pose.view_matrix();

        let mut left = f32::MAX;
        let mut right = f32::MIN;
        let mut top = f32::MAX;
        let mut bottom = f32::MIN;
        for corner in self.monitor.screen_corners() {
            let clip: Vec4 = view_projection * corner.extend(1.0);
            if clip.w <= self.settings.near * 0.5 {
                return None;
            }
            let x = (clip.x / clip.w + 1.0) * 0.5;
            let y = (1.0 - clip.y / clip.w) * 0.5;
            left = left.min(x);
            right = right.max(x);
            top = top.min(y);
            bottom = bottom.max(y);
        }

        if right <= 0.0 || left >= 1.0 || bottom <= 0.0 || top >= 1.0 {
            return None;
        }
        let rect = NormalizedRect {
            left,
            top,
            right,
            bottom,
        }
        .clamp();
        rect.is_valid().then_some(rect)
    }
}
