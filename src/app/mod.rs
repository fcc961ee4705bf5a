use std::sync::Arc;
use color_eyre::eyre::Report;
use color_eyre::Result;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use crate::renderer::Renderer;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::frame_ctx::DrawResult;

pub struct App {
    config: RenderConfig,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,

    // State
    request_redraws: bool,
    close_requested: bool,
    error: Option<Report>,
}

impl App {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,

            request_redraws: true,
            close_requested: false,
            error: None,
        }
    }

    /// Runs the event loop until the window closes or rendering fails
    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.run_app(&mut self)?;

        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Report) {
        log::error!("Stopping: {}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        self.close_requested = true;
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_none() {
            let attributes = Window::default_attributes().with_title("inflight");
            self.window = Some(Arc::new(event_loop.create_window(attributes)?));
        }

        if self.renderer.is_none() {
            if let Some(window) = self.window.clone() {
                self.renderer = Some(Renderer::new(window, self.config.clone())?);
            }
        }
        Ok(())
    }

    fn handle_window_event(&mut self, event: WindowEvent) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(new_size) => {
                renderer.resize(new_size)?;
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                renderer.request_resize();
            }
            WindowEvent::RedrawRequested => {
                if let DrawResult::Recreate = renderer.draw()? {
                    log::trace!("Frame skipped, swapchain generation {}", renderer.generation());
                }
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: key,
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => match key.as_ref() {
                Key::Character("r") => {
                    self.request_redraws = !self.request_redraws;
                    log::info!("request_redraws: {}", self.request_redraws);
                }
                Key::Named(NamedKey::Escape) => {
                    self.close_requested = true;
                }
                _ => {}
            },
            _ => {}
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        if self.window.as_ref().map(|w| w.id()) != Some(window_id) {
            return;
        }

        if let Err(e) = self.handle_window_event(event) {
            self.fail(event_loop, e);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            if let Some(mut renderer) = self.renderer.take() {
                if let Err(e) = renderer.shutdown() {
                    log::error!("Renderer did not shut down cleanly: {}", e);
                }
            }
            event_loop.exit();
            return;
        }

        if self.request_redraws {
            if let Some(window) = self.window.as_ref() {
                window.request_redraw();
            }
        }
    }
}
