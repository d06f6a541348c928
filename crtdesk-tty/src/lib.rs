use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{
        Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
        MouseEventKind,
    },
    terminal::{Clear, ClearType},
};
use crtdesk_core::{
    CameraMode, CameraPose, Command, ControlState, InputEvent, MoveKey, NormalizedRect,
    PointerButton, PrinterTick, RenderImage,
};
use glam::Vec2;
use png::{BitDepth, ColorType, Encoder};
use tracing::debug;

/// Wheel delta reported for one notch, in browser-style pixel units.
pub const WHEEL_NOTCH: f32 = 100.0;

const CHUNK_SIZE: usize = 4096;

/// Writes the monitor texture with the kitty graphics protocol. The image is
/// transmitted once per change and placed separately whenever the projected
/// rectangle moves.
pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
    placed: Option<DrawParams>,
}

/// Cell rectangle the texture is stretched over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawParams {
    pub column: u16,
    pub row: u16,
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(column: u16, row: u16, columns: u32, rows: u32) -> Self {
        Self {
            column,
            row,
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }

    /// Maps a normalized viewport rect onto a `columns` x `rows` cell grid.
    pub fn from_normalized(rect: &NormalizedRect, columns: u16, rows: u16) -> Option<Self> {
        if columns == 0 || rows == 0 || !rect.is_valid() {
            return None;
        }
        let (cols_f, rows_f) = (columns as f32, rows as f32);
        let left = (rect.left * cols_f).floor().clamp(0.0, cols_f - 1.0);
        let top = (rect.top * rows_f).floor().clamp(0.0, rows_f - 1.0);
        let right = (rect.right * cols_f).ceil().clamp(left + 1.0, cols_f);
        let bottom = (rect.bottom * rows_f).ceil().clamp(top + 1.0, rows_f);
        Some(Self::clamped(
            left as u16,
            top as u16,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }

    pub fn contains_cell(&self, column: u16, row: u16) -> bool {
        let (column, row) = (column as u32, row as u32);
        let (left, top) = (self.column as u32, self.row as u32);
        column >= left && column < left + self.columns && row >= top && row < top + self.rows
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
            placed: None,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn placement(&self) -> Option<DrawParams> {
        self.placed
    }

    /// Transmits `image` without displaying it. Existing placements of the same
    /// image id pick up the new pixels.
    pub fn upload(&mut self, image: &RenderImage) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(CHUNK_SIZE).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=t,f=100,q=2,i={},s={},v={},m={}",
                    self.image_id,
                    image.width,
                    image.height,
                    u8::from(more)
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", u8::from(more))?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        // a fresh transmission drops earlier placements
        if let Some(params) = self.placed.take() {
            self.place(params)?;
        }
        self.writer.flush()?;
        debug!(
            width = image.width,
            height = image.height,
            bytes = buffer.len(),
            "texture uploaded"
        );
        Ok(())
    }

    /// Shows the uploaded image over the given cells, replacing any previous
    /// placement.
    pub fn place(&mut self, params: DrawParams) -> Result<()> {
        crossterm::queue!(&mut self.writer, cursor::MoveTo(params.column, params.row))?;
        write!(
            self.writer,
            "\u{1b}_Ga=p,i={},p={},c={},r={},C=1,q=2,z=-1\u{1b}\\",
            self.image_id, self.placement_id, params.columns, params.rows
        )?;
        self.placed = Some(params);
        Ok(())
    }

    /// Removes the placement but keeps the image data.
    pub fn hide(&mut self) -> Result<()> {
        if self.placed.take().is_some() {
            write!(
                self.writer,
                "\u{1b}_Ga=d,d=i,i={},p={},q=2\u{1b}\\",
                self.image_id, self.placement_id
            )?;
        }
        Ok(())
    }

    /// Frees the image and all of its placements.
    pub fn delete_image(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", self.image_id)?;
        self.placed = None;
        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Clears the entire screen.
    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Input(InputEvent),
    Command(Command),
    /// Primary click released without dragging.
    Activate { column: u16, row: u16 },
    Resize { columns: u16, rows: u16 },
    Quit,
    None,
}

#[derive(Debug, Clone, Copy)]
struct PrimaryPress {
    column: u16,
    row: u16,
    dragged: bool,
}

#[derive(Debug)]
pub struct EventMapper {
    release_events: bool,
    cell_size: Vec2,
    primary: Option<PrimaryPress>,
}

impl Default for EventMapper {
    fn default() -> Self {
        Self {
            release_events: false,
            cell_size: Vec2::new(8.0, 16.0),
            primary: None,
        }
    }
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminals with the kitty keyboard protocol report key releases, so movement
    /// keys can be held. Without it every press becomes a one-frame tap.
    pub fn with_release_events(mut self, enabled: bool) -> Self {
        self.release_events = enabled;
        self
    }

    pub fn set_cell_size(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.cell_size = Vec2::new(width, height);
        }
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(key) => self.map_key(key),
            Event::Mouse(mouse) => self.map_mouse(mouse),
            Event::Resize(columns, rows) => UiEvent::Resize { columns, rows },
            _ => UiEvent::None,
        }
    }

    fn map_key(&mut self, event: KeyEvent) -> UiEvent {
        let KeyEvent {
            code,
            modifiers,
            kind,
            ..
        } = event;

        if kind == KeyEventKind::Release {
            return match move_key(code) {
                Some(key) if self.release_events => UiEvent::Input(InputEvent::KeyUp(key)),
                _ => UiEvent::None,
            };
        }

        match (code, modifiers) {
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            (KeyCode::Esc, _) => UiEvent::Quit,
            (KeyCode::Enter, _) if kind == KeyEventKind::Press => {
                UiEvent::Command(Command::ToggleZoom)
            }
            (KeyCode::Char('p') | KeyCode::Char('P'), _) if kind == KeyEventKind::Press => {
                UiEvent::Command(Command::Print)
            }
            (code, _) => match move_key(code) {
                Some(key) if self.release_events => UiEvent::Input(InputEvent::KeyDown(key)),
                Some(key) => UiEvent::Input(InputEvent::KeyTap(key)),
                None => UiEvent::None,
            },
        }
    }

    fn map_mouse(&mut self, event: MouseEvent) -> UiEvent {
        let MouseEvent {
            kind, column, row, ..
        } = event;
        let position = self.pixel_position(column, row);

        match kind {
            MouseEventKind::Down(MouseButton::Left) => {
                self.primary = Some(PrimaryPress {
                    column,
                    row,
                    dragged: false,
                });
                UiEvent::None
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                if let Some(press) = self.primary.as_mut() {
                    press.dragged |= press.column != column || press.row != row;
                }
                UiEvent::None
            }
            MouseEventKind::Up(MouseButton::Left) => match self.primary.take() {
                Some(press) if !press.dragged => UiEvent::Activate { column, row },
                _ => UiEvent::None,
            },
            MouseEventKind::Down(button) => UiEvent::Input(InputEvent::PointerDown {
                button: pointer_button(button),
                position,
            }),
            MouseEventKind::Drag(_) | MouseEventKind::Moved => {
                UiEvent::Input(InputEvent::PointerMove { position })
            }
            MouseEventKind::Up(button) => UiEvent::Input(InputEvent::PointerUp {
                button: pointer_button(button),
            }),
            MouseEventKind::ScrollDown => UiEvent::Input(InputEvent::Wheel { delta: WHEEL_NOTCH }),
            MouseEventKind::ScrollUp => UiEvent::Input(InputEvent::Wheel {
                delta: -WHEEL_NOTCH,
            }),
            MouseEventKind::ScrollLeft | MouseEventKind::ScrollRight => UiEvent::None,
        }
    }

    fn pixel_position(&self, column: u16, row: u16) -> Vec2 {
        Vec2::new(column as f32, row as f32) * self.cell_size
    }
}

fn move_key(code: KeyCode) -> Option<MoveKey> {
    let KeyCode::Char(c) = code else {
        return None;
    };
    match c.to_ascii_lowercase() {
        'w' => Some(MoveKey::Forward),
        's' => Some(MoveKey::Backward),
        'a' => Some(MoveKey::Left),
        'd' => Some(MoveKey::Right),
        'q' => Some(MoveKey::Up),
        'e' => Some(MoveKey::Down),
        _ => None,
    }
}

fn pointer_button(button: MouseButton) -> PointerButton {
    match button {
        MouseButton::Left => PointerButton::Primary,
        MouseButton::Middle => PointerButton::Middle,
        MouseButton::Right => PointerButton::Secondary,
    }
}

/// Everything the status line reports for one frame.
#[derive(Debug, Clone)]
pub struct StatusInfo<'a> {
    pub state: ControlState,
    pub pose: &'a CameraPose,
    pub scroll_progress: f32,
    pub printer: Option<PrinterTick>,
    pub message: Option<&'a str>,
}

fn mode_label(mode: CameraMode) -> &'static str {
    match mode {
        CameraMode::Free => "FREE",
        CameraMode::Zoomed => "ZOOMED",
    }
}

pub fn format_status(status: &StatusInfo<'_>) -> String {
    let mode = match status.state {
        ControlState::Free => mode_label(CameraMode::Free).to_owned(),
        ControlState::Zoomed => mode_label(CameraMode::Zoomed).to_owned(),
        ControlState::Transitioning { to } => format!("-> {}", mode_label(to)),
    };
    let position = status.pose.position;
    let mut line = format!(
        "[{}] cam {:.2} {:.2} {:.2} | scroll {:>3.0}%",
        mode,
        position.x,
        position.y,
        position.z,
        status.scroll_progress.clamp(0.0, 1.0) * 100.0
    );
    match status.printer {
        Some(PrinterTick::Printing { progress, .. }) => {
            line.push_str(&format!(" | printing {:>3.0}%", progress.clamp(0.0, 1.0) * 100.0));
        }
        Some(PrinterTick::Completed) => line.push_str(" | printed"),
        Some(PrinterTick::Idle) | None => {}
    }
    if let Some(message) = status.message {
        line.push_str(" | ");
        line.push_str(message);
    }
    line
}

/// Rewrites terminal row `row` with `label`, cut to `width` columns.
pub fn write_status_line<W: Write>(
    writer: &mut W,
    row: u16,
    width: u16,
    label: &str,
) -> io::Result<()> {
    crossterm::queue!(
        writer,
        cursor::MoveTo(0, row),
        Clear(ClearType::CurrentLine)
    )?;
    let visible: String = label.chars().take(width as usize).collect();
    write!(writer, "{}", visible)?;
    writer.flush()
}
