//! Input snapshot written by event handlers and drained once per frame.

use glam::{Vec2, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveKey {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyDown(MoveKey),
    KeyUp(MoveKey),
    /// Press without a matching release; held for a single frame.
    KeyTap(MoveKey),
    PointerDown { button: PointerButton, position: Vec2 },
    PointerMove { position: Vec2 },
    PointerUp { button: PointerButton },
    Wheel { delta: f32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardState {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl KeyboardState {
    pub fn set(&mut self, key: MoveKey, pressed: bool) {
        let slot = match key {
            MoveKey::Forward => &mut self.forward,
            MoveKey::Backward => &mut self.backward,
            MoveKey::Left => &mut self.left,
            MoveKey::Right => &mut self.right,
            MoveKey::Up => &mut self.up,
            MoveKey::Down => &mut self.down,
        };
        *slot = pressed;
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            forward: self.forward || other.forward,
            backward: self.backward || other.backward,
            left: self.left || other.left,
            right: self.right || other.right,
            up: self.up || other.up,
            down: self.down || other.down,
        }
    }

    /// Camera-space direction: +x right, +y up, +z forward. Not normalized.
    pub fn direction(&self) -> Vec3 {
        let mut direction = Vec3::ZERO;
        if self.forward {
            direction.z += 1.0;
        }
        if self.backward {
            direction.z -= 1.0;
        }
        if self.left {
            direction.x -= 1.0;
        }
        if self.right {
            direction.x += 1.0;
        }
        if self.up {
            direction.y += 1.0;
        }
        if self.down {
            direction.y -= 1.0;
        }
        direction
    }
}

/// Wheel input accumulated since the last frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelInput {
    pub delta: f32,
    /// Sum of the signs of every wheel event.
    pub notches: i32,
}

#[derive(Debug, Clone, Default)]
pub struct InputState {
    keys: KeyboardState,
    taps: KeyboardState,
    pressed: Option<PointerButton>,
    pointer: Vec2,
    rotate_drag: Vec2,
    pan_drag: Vec2,
    wheel: WheelInput,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: InputEvent) {
        match event {
            InputEvent::KeyDown(key) => self.keys.set(key, true),
            InputEvent::KeyUp(key) => self.keys.set(key, false),
            InputEvent::KeyTap(key) => self.taps.set(key, true),
            InputEvent::PointerDown { button, position } => {
                self.pressed = Some(button);
                self.pointer = position;
            }
            InputEvent::PointerMove { position } => {
                let delta = position - self.pointer;
                self.pointer = position;
                match self.pressed {
                    Some(PointerButton::Secondary) => self.rotate_drag += delta,
                    Some(PointerButton::Middle) => self.pan_drag += delta,
                    Some(PointerButton::Primary) | None => {}
                }
            }
            InputEvent::PointerUp { button } => {
                if self.pressed == Some(button) {
                    self.pressed = None;
                }
            }
            InputEvent::Wheel { delta } => {
                if delta != 0.0 && delta.is_finite() {
                    self.wheel.delta += delta;
                    self.wheel.notches += if delta > 0.0 { 1 } else { -1 };
                }
            }
        }
    }

    pub fn keys(&self) -> KeyboardState {
        self.keys.union(self.taps)
    }

    pub fn pressed(&self) -> Option<PointerButton> {
        self.pressed
    }

    pub fn pointer(&self) -> Vec2 {
        self.pointer
    }

    pub fn take_rotate_drag(&mut self) -> Vec2 {
        std::mem::take(&mut self.rotate_drag)
    }

    pub fn take_pan_drag(&mut self) -> Vec2 {
        std::mem::take(&mut self.pan_drag)
    }

    pub fn take_wheel(&mut self) -> WheelInput {
        std::mem::take(&mut self.wheel)
    }

    /// Drops accumulated drag and wheel motion; held keys stay held.
    pub fn discard_motion(&mut self) {
        self.rotate_drag = Vec2::ZERO;
        self.pan_drag = Vec2::ZERO;
        self.wheel = WheelInput::default();
    }

    pub fn end_frame(&mut self) {
        self.taps = KeyboardState::default();
    }
}
