use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::terminal::{self, Clear, ClearType};
use crtdesk_core::{Command, Config, DocumentProvider, DownloadSink, Scene, SceneEvent};
use crtdesk_render::DocumentSurface;
use crtdesk_tty::{
    format_status, write_status_line, DrawParams, EventMapper, KittyRenderer, StatusInfo,
    UiEvent,
};
use directories::ProjectDirs;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod boot;
mod download;

use boot::BootSequence;
use download::DirectoryDownload;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Parser)]
#[command(
    name = "crtdesk",
    version,
    about = "Retro CRT desk that shows a PDF resume in the terminal"
)]
struct Args {
    /// PDF shown on the monitor: a path, file:// or http(s) URL
    #[arg(short = 'd', long = "document")]
    document: Option<String>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Directory the printed resume is saved to
    #[arg(long = "download-dir")]
    download_dir: Option<PathBuf>,

    /// Go straight to the desk
    #[arg(long = "skip-boot")]
    skip_boot: bool,
}

struct RawModeGuard {
    keyboard_enhanced: bool,
}

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, EnableMouseCapture)?;
        let keyboard_enhanced = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if keyboard_enhanced {
            crossterm::execute!(
                stdout,
                PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                        | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                )
            )?;
        }
        Ok(Self { keyboard_enhanced })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        if self.keyboard_enhanced {
            let _ = crossterm::execute!(stdout, PopKeyboardEnhancementFlags);
        }
        let _ = crossterm::execute!(stdout, DisableMouseCapture);
        let _ = terminal::disable_raw_mode();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

/// Terminal grid and the pixel size of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Viewport {
    columns: u16,
    rows: u16,
    cell_width: f32,
    cell_height: f32,
}

impl Viewport {
    fn query() -> Result<Self> {
        let window = terminal::window_size().context("failed to query terminal size")?;
        let columns = window.columns.max(1);
        let rows = window.rows.max(2);
        let (cell_width, cell_height) = if window.width > 0 && window.height > 0 {
            (
                window.width as f32 / columns as f32,
                window.height as f32 / rows as f32,
            )
        } else {
            (8.0, 16.0)
        };
        Ok(Self {
            columns,
            rows,
            cell_width,
            cell_height,
        })
    }

    /// Rows available to the scene; the last one holds the status line.
    fn scene_rows(&self) -> u16 {
        self.rows.saturating_sub(1).max(1)
    }

    fn status_row(&self) -> u16 {
        self.rows.saturating_sub(1)
    }

    fn aspect(&self) -> f32 {
        (self.columns as f32 * self.cell_width) / (self.scene_rows() as f32 * self.cell_height)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("dev", "crtdesk", "crtdesk")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| Config::default_path(&project_dirs));
    let mut config = Config::load(&config_path)?;
    if let Some(document) = &args.document {
        config.document.url = document.clone();
        config.document.download_url = document.clone();
    }
    info!(config = %config_path.display(), document = %config.document.url, "starting");

    let sink: Option<Arc<dyn DownloadSink>> =
        match DirectoryDownload::from_settings(&config.document, args.download_dir.clone()) {
            Ok(download) => Some(Arc::new(download)),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "printing will not save a copy");
                None
            }
        };

    let raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide, Clear(ClearType::All), cursor::MoveTo(0, 0))?;

    if !args.skip_boot {
        BootSequence::default().play(&mut stdout, wait_for_key)?;
    }

    let mut renderer = KittyRenderer::new(stdout);
    renderer.clear_all()?;
    let mut viewport = Viewport::query()?;
    let mut mapper = EventMapper::new().with_release_events(raw.keyboard_enhanced);
    mapper.set_cell_size(viewport.cell_width, viewport.cell_height);

    let mut scene = Scene::new(&config);
    let events = scene.events();
    let mut surface = DocumentSurface::new(config.document.clone(), config.crt.clone());
    present(&mut renderer, &mut surface, &scene, &viewport)?;

    let provider: Arc<dyn DocumentProvider> = Arc::from(crtdesk_render::default_provider());
    surface.begin_load(provider, &config.document.url);

    let mut status_message: Option<String> = None;
    let mut last_status = String::new();
    let mut pending_download: Option<JoinHandle<Result<PathBuf>>> = None;

    'frames: loop {
        let frame_start = Instant::now();

        while event::poll(Duration::ZERO)? {
            match mapper.map_event(event::read()?) {
                UiEvent::Quit => break 'frames,
                UiEvent::Input(input) => scene.handle_input(input),
                UiEvent::Command(command) => scene.apply(command, Instant::now()),
                UiEvent::Activate { column, row } => {
                    let on_monitor = renderer
                        .placement()
                        .is_some_and(|params| params.contains_cell(column, row));
                    if on_monitor {
                        scene.apply(Command::ToggleZoom, Instant::now());
                    }
                }
                UiEvent::Resize { .. } => {
                    viewport = Viewport::query()?;
                    mapper.set_cell_size(viewport.cell_width, viewport.cell_height);
                    renderer.clear_all()?;
                    renderer.hide()?;
                    last_status.clear();
                }
                UiEvent::None => {}
            }
        }

        surface.poll_load().await;
        let report = scene.frame(Instant::now(), &mut surface);

        let drained: Vec<SceneEvent> = std::mem::take(&mut *events.lock());
        for scene_event in drained {
            match scene_event {
                SceneEvent::ZoomChanged { zoomed } => info!(zoomed, "zoom toggled"),
                SceneEvent::PrintStarted => status_message = None,
                SceneEvent::PrintCompleted => match &sink {
                    Some(sink) if pending_download.is_none() => {
                        let sink = Arc::clone(sink);
                        pending_download =
                            Some(tokio::task::spawn_blocking(move || sink.deliver()));
                    }
                    Some(_) => {}
                    None => status_message = Some("no download directory".to_owned()),
                },
                SceneEvent::TransitionFinished(_) | SceneEvent::RedrawNeeded => {}
            }
        }

        if pending_download
            .as_ref()
            .is_some_and(|handle| handle.is_finished())
        {
            if let Some(handle) = pending_download.take() {
                status_message = Some(match handle.await {
                    Ok(Ok(path)) => format!("saved {}", path.display()),
                    Ok(Err(err)) => {
                        warn!(error = %format!("{err:#}"), "download failed");
                        "download failed".to_owned()
                    }
                    Err(err) => {
                        warn!(%err, "download task aborted");
                        "download failed".to_owned()
                    }
                });
            }
        }

        renderer.begin_sync_update()?;
        present(&mut renderer, &mut surface, &scene, &viewport)?;

        let status = format_status(&StatusInfo {
            state: scene.controls().state(),
            pose: scene.controls().pose(),
            scroll_progress: surface.scroll_progress(),
            printer: report.printer,
            message: status_message.as_deref(),
        });
        if status != last_status {
            write_status_line(
                renderer.writer(),
                viewport.status_row(),
                viewport.columns,
                &status,
            )?;
            last_status = status;
        }
        renderer.end_sync_update()?;

        tokio::time::sleep(FRAME_INTERVAL.saturating_sub(frame_start.elapsed())).await;
    }

    renderer.delete_image()?;
    renderer.clear_all()?;
    Ok(())
}

/// Uploads the texture when it changed and keeps the placement on the
/// projected monitor rectangle.
fn present<W: Write>(
    renderer: &mut KittyRenderer<W>,
    surface: &mut DocumentSurface,
    scene: &Scene,
    viewport: &Viewport,
) -> Result<()> {
    if surface.take_dirty() {
        renderer.upload(&surface.to_render_image())?;
    }
    let params = scene
        .monitor_rect(viewport.aspect())
        .and_then(|rect| DrawParams::from_normalized(&rect, viewport.columns, viewport.scene_rows()));
    match params {
        Some(params) if renderer.placement() != Some(params) => renderer.place(params)?,
        Some(_) => {}
        None => renderer.hide()?,
    }
    Ok(())
}

fn wait_for_key(timeout: Duration) -> Result<bool> {
    if event::poll(timeout)? {
        return Ok(matches!(event::read()?, Event::Key(_)));
    }
    Ok(false)
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "crtdesk.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // the terminal belongs to the kitty renderer, so logs only go to the file
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(columns: u16, rows: u16) -> Viewport {
        Viewport {
            columns,
            rows,
            cell_width: 10.0,
            cell_height: 20.0,
        }
    }

    #[test]
    fn status_row_is_excluded_from_scene() {
        let viewport = viewport(80, 25);
        assert_eq!(viewport.scene_rows(), 24);
        assert_eq!(viewport.status_row(), 24);
        assert!((viewport.aspect() - 800.0 / 480.0).abs() < 1e-6);
    }

    #[test]
    fn present_places_monitor_and_uploads_once() {
        let config = Config::default();
        let scene = Scene::new(&config);
        let mut surface = DocumentSurface::new(config.document.clone(), config.crt.clone());
        let mut renderer = KittyRenderer::new(Vec::new());
        let viewport = viewport(160, 50);

        present(&mut renderer, &mut surface, &scene, &viewport).unwrap();
        let placed = renderer.placement().expect("monitor visible from start pose");
        let first = String::from_utf8_lossy(renderer.writer()).into_owned();
        assert!(first.contains("a=t"));
        assert!(first.contains("a=p"));

        renderer.writer().clear();
        present(&mut renderer, &mut surface, &scene, &viewport).unwrap();
        assert!(renderer.writer().is_empty());
        assert_eq!(renderer.placement(), Some(placed));
    }

    #[test]
    fn args_parse_flags() {
        let args = Args::parse_from([
            "crtdesk",
            "--document",
            "https://example.com/cv.pdf",
            "--download-dir",
            "/tmp/out",
            "--skip-boot",
        ]);
        assert_eq!(args.document.as_deref(), Some("https://example.com/cv.pdf"));
        assert_eq!(args.download_dir, Some(PathBuf::from("/tmp/out")));
        assert!(args.skip_boot);
        assert!(args.config.is_none());
    }
}
