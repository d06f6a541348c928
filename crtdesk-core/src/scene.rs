use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::camera::{CameraControls, CameraMode};
use crate::config::Config;
use crate::input::{InputEvent, InputState};
use crate::printer::{Printer, PrinterTick};
use crate::{Command, NormalizedRect, SceneEvent};

/// Anything that consumes wheel input while the camera is zoomed in.
pub trait ScrollTarget {
    fn scroll(&mut self, delta: f32);
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    pub camera_moved: bool,
    pub scrolled: bool,
    pub printer: Option<PrinterTick>,
}

impl FrameReport {
    pub fn needs_redraw(&self) -> bool {
        self.camera_moved || self.scrolled || self.printer.is_some()
    }
}

pub struct Scene {
    controls: CameraControls,
    input: InputState,
    printer: Printer,
    scroll_factor: f32,
    events: Arc<Mutex<Vec<SceneEvent>>>,
}

impl Scene {
    pub fn new(config: &Config) -> Self {
        Self {
            controls: CameraControls::new(config.camera.clone(), config.monitor.clone()),
            input: InputState::new(),
            printer: Printer::new(config.printer.duration),
            scroll_factor: config.document.scroll_factor,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SceneEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn controls(&self) -> &CameraControls {
        &self.controls
    }

    pub fn printer(&self) -> &Printer {
        &self.printer
    }

    pub fn handle_input(&mut self, event: InputEvent) {
        self.input.apply(event);
    }

    pub fn monitor_rect(&self, aspect: f32) -> Option<NormalizedRect> {
        self.controls.project_monitor(aspect)
    }

    pub fn apply(&mut self, command: Command, now: Instant) {
        match command {
            Command::ToggleZoom => {
                if self.controls.toggle_zoom(now) {
                    let zoomed = self.controls.mode() == CameraMode::Zoomed;
                    self.events.lock().push(SceneEvent::ZoomChanged { zoomed });
                }
            }
            Command::Print => {
                if self.printer.start(now) {
                    self.events.lock().push(SceneEvent::PrintStarted);
                } else {
                    debug!("print request ignored, printer busy");
                }
            }
        }
    }

    #[instrument(level = "trace", skip(self, target))]
    pub fn frame<T: ScrollTarget>(&mut self, now: Instant, target: &mut T) -> FrameReport {
        let motion = self.controls.update(now, &mut self.input);
        let mut report = FrameReport {
            camera_moved: motion.moved,
            ..FrameReport::default()
        };

        if motion.document_scroll != 0.0 {
            target.scroll(motion.document_scroll * self.scroll_factor);
            report.scrolled = true;
        }

        if let Some(mode) = motion.finished {
            self.events.lock().push(SceneEvent::TransitionFinished(mode));
        }

        match self.printer.tick(now) {
            PrinterTick::Idle => {}
            PrinterTick::Completed => {
                self.events.lock().push(SceneEvent::PrintCompleted);
                report.printer = Some(PrinterTick::Completed);
            }
            tick @ PrinterTick::Printing { .. } => report.printer = Some(tick),
        }

        if report.needs_redraw() {
            self.events.lock().push(SceneEvent::RedrawNeeded);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingTarget {
        deltas: Vec<f32>,
    }

    impl ScrollTarget for RecordingTarget {
        fn scroll(&mut self, delta: f32) {
            self.deltas.push(delta);
        }
    }

    fn drain(scene: &Scene) -> Vec<SceneEvent> {
        std::mem::take(&mut *scene.events().lock())
    }

    #[test]
    fn wheel_reaches_document_only_when_zoomed() {
        let mut scene = Scene::new(&Config::default());
        let mut target = RecordingTarget::default();
        let t0 = Instant::now();

        scene.handle_input(InputEvent::Wheel { delta: 100.0 });
        scene.frame(t0, &mut target);
        assert!(target.deltas.is_empty());

        scene.apply(Command::ToggleZoom, t0);
        scene.frame(t0 + Duration::from_millis(1000), &mut target);
        scene.handle_input(InputEvent::Wheel { delta: 100.0 });
        let report = scene.frame(t0 + Duration::from_millis(1016), &mut target);

        assert!(report.scrolled);
        assert!(!report.camera_moved);
        assert_eq!(target.deltas, vec![50.0]);
    }

    #[test]
    fn zoom_and_transition_events_are_queued() {
        let mut scene = Scene::new(&Config::default());
        let mut target = RecordingTarget::default();
        let t0 = Instant::now();

        scene.apply(Command::ToggleZoom, t0);
        scene.apply(Command::ToggleZoom, t0);
        scene.frame(t0 + Duration::from_millis(1000), &mut target);

        let events = drain(&scene);
        assert_eq!(
            events,
            vec![
                SceneEvent::ZoomChanged { zoomed: true },
                SceneEvent::TransitionFinished(CameraMode::Zoomed),
                SceneEvent::RedrawNeeded,
            ]
        );
    }

    #[test]
    fn print_completes_after_configured_duration() {
        let mut config = Config::default();
        config.printer.duration = Duration::from_millis(200);
        let mut scene = Scene::new(&config);
        let mut target = RecordingTarget::default();
        let t0 = Instant::now();

        scene.apply(Command::Print, t0);
        scene.apply(Command::Print, t0);
        scene.frame(t0 + Duration::from_millis(100), &mut target);
        let report = scene.frame(t0 + Duration::from_millis(200), &mut target);
        assert_eq!(report.printer, Some(PrinterTick::Completed));

        let events = drain(&scene);
        assert_eq!(
            events
                .iter()
                .filter(|event| matches!(event, SceneEvent::PrintStarted))
                .count(),
            1
        );
        assert_eq!(
            events
                .iter()
                .filter(|event| matches!(event, SceneEvent::PrintCompleted))
                .count(),
            1
        );
        assert!(!scene.printer().is_printing());
    }

    #[test]
    fn idle_frame_requests_no_redraw() {
        let mut scene = Scene::new(&Config::default());
        let mut target = RecordingTarget::default();
        let report = scene.frame(Instant::now(), &mut target);
        assert!(!report.needs_redraw());
        assert!(drain(&scene).is_empty());
    }
}
