use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::Context;
use clap::Parser;
use clap_num::maybe_hex;
use pixels::{Pixels, SurfaceTexture};
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source, source::SquareWave};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, KeyCode, NamedKey, PhysicalKey},
    window::{Window, WindowId},
};

use chip8_vm::{
    emu::{
        Chip8, Chip8Config, Chip8Runner, Chip8RunnerResult, DEFAULT_INSTRUCTIONS_PER_SECOND,
        DISPLAY_X, DISPLAY_Y, RunState,
    },
    u4,
};

/// Mapping from physical keyboard keys to CHIP-8 hex keypad (0x0-0xF).
///
/// 1 2 3 C      1 2 3 4
/// 4 5 6 D  <-  Q W E R
/// 7 8 9 E      A S D F
/// A 0 B F      Z X C V
const KEY_MAP: [KeyCode; 16] = [
    KeyCode::KeyX,   // 0x00
    KeyCode::Digit1, // 0x01
    KeyCode::Digit2, // 0x02
    KeyCode::Digit3, // 0x03
    KeyCode::KeyQ,   // 0x04
    KeyCode::KeyW,   // 0x05
    KeyCode::KeyE,   // 0x06
    KeyCode::KeyA,   // 0x07
    KeyCode::KeyS,   // 0x08
    KeyCode::KeyD,   // 0x09
    KeyCode::KeyZ,   // 0x0A
    KeyCode::KeyC,   // 0x0B
    KeyCode::Digit4, // 0x0C
    KeyCode::KeyR,   // 0x0D
    KeyCode::KeyF,   // 0x0E
    KeyCode::KeyV,   // 0x0F
];

/// How a frame of the CHIP-8 display is painted into the window.
struct Palette {
    foreground: [u8; 4],
    background: [u8; 4],
    scale: u32,
    pixel_outlines: bool,
}

impl Palette {
    fn width(&self) -> u32 {
        DISPLAY_X as u32 * self.scale
    }

    fn height(&self) -> u32 {
        DISPLAY_Y as u32 * self.scale
    }

    /// Colour of the framebuffer pixel at (`px`, `py`) given the lit state of its cell.
    fn color(&self, lit: bool, px: u32, py: u32) -> [u8; 4] {
        if !lit {
            return self.background;
        }

        // Lit cells get a one pixel border in the background colour
        let on_edge = |p: u32| p % self.scale == 0 || p % self.scale == self.scale - 1;
        if self.pixel_outlines && self.scale > 2 && (on_edge(px) || on_edge(py)) {
            self.background
        } else {
            self.foreground
        }
    }
}

struct App {
    pixels: Option<Pixels<'static>>,
    window: Option<Arc<Window>>,
    palette: Palette,
    /// Set when the framebuffer must be repainted from the CHIP-8 display.
    needs_repaint: bool,

    /// Audio output stream (must be kept alive).
    _audio_stream: OutputStream,
    audio_sink: Sink,

    runner: Chip8Runner,
    /// Used for delta time calculation.
    last_frame_instant: Instant,

    /// Stores the result of the application to be returned from main.
    exit_result: anyhow::Result<()>,
}

impl App {
    fn new(rom: &[u8], args: &Args) -> anyhow::Result<Self> {
        // Initialize audio
        let mut _audio_stream = OutputStreamBuilder::open_default_stream()
            .context("Failed to open audio output stream")?;
        _audio_stream.log_on_drop(false);

        let audio_sink = Sink::connect_new(_audio_stream.mixer());
        audio_sink.pause();
        audio_sink.append(SquareWave::new(args.tone).amplify(args.volume));

        // Initialize CHIP-8
        let mut chip8 = Chip8::default();
        chip8
            .load(rom)
            .context("Failed to load ROM into CHIP-8 memory")?;
        let runner = Chip8Runner::new(
            chip8,
            Chip8Config {
                instructions_per_second: args.ips,
            },
        );

        Ok(Self {
            pixels: None,
            window: None,
            palette: Palette {
                foreground: args.fg.to_be_bytes(),
                background: args.bg.to_be_bytes(),
                scale: args.scale.max(1),
                pixel_outlines: !args.no_outlines,
            },
            needs_repaint: true,

            _audio_stream,
            audio_sink,

            runner,
            last_frame_instant: Instant::now(),
            exit_result: Ok(()),
        })
    }

    fn process_display(&mut self) -> anyhow::Result<()> {
        let pixels = self.pixels.as_mut().context("Pixels surface missing")?;
        let width = self.palette.width();

        for (i, pxl) in pixels.frame_mut().chunks_exact_mut(4).enumerate() {
            let px = i as u32 % width;
            let py = i as u32 / width;
            let lit = self.runner.get_display_pixel(
                (py / self.palette.scale) as usize,
                (px / self.palette.scale) as usize,
            );

            pxl.copy_from_slice(&self.palette.color(lit, px, py));
        }

        self.needs_repaint = false;
        Ok(())
    }

    fn try_resumed(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window = {
            let size = LogicalSize::new(self.palette.width(), self.palette.height());
            let min_size = LogicalSize::new(DISPLAY_X as u32, DISPLAY_Y as u32);

            Arc::new(
                event_loop
                    .create_window(
                        Window::default_attributes()
                            .with_title("CHIP-8")
                            .with_inner_size(size)
                            .with_min_inner_size(min_size),
                    )
                    .context("Failed to create window")?,
            )
        };

        self.window = Some(window.clone());
        self.pixels = {
            let window_size = window.inner_size();
            let surface_texture =
                SurfaceTexture::new(window_size.width, window_size.height, window.clone());

            let pixels = Pixels::new(
                self.palette.width(),
                self.palette.height(),
                surface_texture,
            )
            .context("Failed to create pixels surface")?;

            window.request_redraw();
            Some(pixels)
        };
        self.needs_repaint = true;

        // Avoid large dt on first frame
        self.last_frame_instant = Instant::now();
        Ok(())
    }

    fn try_window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        event: WindowEvent,
    ) -> anyhow::Result<()> {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        ..
                    },
                ..
            } => {
                self.runner.set_run_state(RunState::Quit);
                event_loop.exit();
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Space),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                self.runner.toggle_pause();
                log::info!("{:?}", self.runner.run_state());
            }

            WindowEvent::Resized(size) => {
                self.pixels
                    .as_mut()
                    .context("Pixels surface missing")?
                    .resize_surface(size.width, size.height)
                    .context("Failed to resize pixels surface")?;
                self.needs_repaint = true;
            }

            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = (now - self.last_frame_instant).as_secs_f32();
                self.last_frame_instant = now;

                match self.runner.update(dt).context("Chip8 Execution error")? {
                    Chip8RunnerResult::Quit => {
                        event_loop.exit();
                        return Ok(());
                    }
                    Chip8RunnerResult::Ok { display_updated } => {
                        self.needs_repaint |= display_updated;
                    }
                    Chip8RunnerResult::HitBreakpoint => {}
                }

                if self.runner.tone_active() {
                    self.audio_sink.play();
                } else {
                    self.audio_sink.pause();
                }

                if self.needs_repaint {
                    self.process_display()?;
                }

                self.pixels
                    .as_ref()
                    .context("Pixels surface missing")?
                    .render()
                    .context("Pixels render error")?;

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return Ok(());
                };

                if let Some(key) = KEY_MAP.iter().position(|&k| k == code) {
                    let pressed = event.state == ElementState::Pressed;
                    self.runner.set_key(u4::new(key as u8), pressed);
                }
            }

            _ => (),
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.try_resumed(event_loop) {
            self.exit_result = Err(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Err(e) = self.try_window_event(event_loop, event) {
            log::error!("{e:#}");
            self.exit_result = Err(e);
            event_loop.exit();
        }
    }
}

/// CHIP-8 virtual machine.
///
/// Keys 1-4, Q-R, A-F, Z-V map to CHIP-8 keys.
/// Space pauses and resumes, Escape exits.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Path to the CHIP-8 ROM file
    rom_path: PathBuf,

    /// Instructions executed per second
    #[arg(long, default_value_t = DEFAULT_INSTRUCTIONS_PER_SECOND)]
    ips: u32,

    /// Window pixels per CHIP-8 pixel
    #[arg(long, default_value_t = 20)]
    scale: u32,

    /// Foreground colour as 0xRRGGBBAA
    #[arg(long, default_value = "0xFFFFFFFF", value_parser = maybe_hex::<u32>)]
    fg: u32,

    /// Background colour as 0xRRGGBBAA
    #[arg(long, default_value = "0x000000FF", value_parser = maybe_hex::<u32>)]
    bg: u32,

    /// Draw lit pixels as solid blocks without outlines
    #[arg(long)]
    no_outlines: bool,

    /// Beep frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    tone: f32,

    /// Beep volume from 0.0 to 1.0
    #[arg(long, default_value_t = 0.5)]
    volume: f32,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;
    log::info!(
        "Starting {} at {} instructions per second",
        args.rom_path.display(),
        args.ips
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(&rom, &args).context("Failed to initialize application")?;
    event_loop
        .run_app(&mut app)
        .context("Error occurred during event loop execution")?;

    // Return the result captured during the event loop
    app.exit_result
}
