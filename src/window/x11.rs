//! X11 presentation backend
//!
//! Each overlay display is an override-redirect, always-on-top window pinned
//! to its slot's screen corner. Content is never drawn; the window only
//! stands in for the display's on-screen footprint. A pump thread watches
//! structure events so windows killed from outside still report destruction.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as WrapperExt;

use super::{OverlayWindow, OverlayWindowFactory, WindowListener, WindowRequest};
use crate::constants::{timing, x11};
use crate::types::DisplayState;

type WindowRegistry = Arc<Mutex<HashMap<Window, Weak<X11OverlayWindow>>>>;

#[derive(Debug, Clone, Copy)]
struct ScreenInfo {
    root: Window,
    root_depth: u8,
    root_visual: Visualid,
    width: u16,
    height: u16,
}

#[derive(Debug, Clone, Copy)]
struct OverlayAtoms {
    net_wm_state: Atom,
    net_wm_state_above: Atom,
    net_wm_name: Atom,
    utf8_string: Atom,
}

impl OverlayAtoms {
    fn new(conn: &RustConnection) -> Result<Self> {
        let intern = |name: &[u8]| -> Result<Atom> {
            Ok(conn
                .intern_atom(false, name)
                .context(format!("Failed to intern {} atom", String::from_utf8_lossy(name)))?
                .reply()
                .context(format!("Failed to get reply for {} atom", String::from_utf8_lossy(name)))?
                .atom)
        };
        Ok(Self {
            net_wm_state: intern(b"_NET_WM_STATE")?,
            net_wm_state_above: intern(b"_NET_WM_STATE_ABOVE")?,
            net_wm_name: intern(b"_NET_WM_NAME")?,
            utf8_string: intern(b"UTF8_STRING")?,
        })
    }
}

pub struct X11WindowFactory {
    conn: Arc<RustConnection>,
    screen: ScreenInfo,
    atoms: OverlayAtoms,
    windows: WindowRegistry,
}

impl X11WindowFactory {
    /// Connect to the X server named by `DISPLAY` and start the event pump
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None)
            .context("Failed to connect to X11 server. Is DISPLAY set correctly?")?;
        let screen = &conn.setup().roots[screen_num];
        let screen = ScreenInfo {
            root: screen.root,
            root_depth: screen.root_depth,
            root_visual: screen.root_visual,
            width: screen.width_in_pixels,
            height: screen.height_in_pixels,
        };
        info!(
            screen = screen_num,
            width = screen.width,
            height = screen.height,
            "Connected to X11 server"
        );

        let atoms = OverlayAtoms::new(&conn).context("Failed to cache X11 atoms")?;
        let conn = Arc::new(conn);
        let windows: WindowRegistry = Arc::new(Mutex::new(HashMap::new()));

        let pump_conn = conn.clone();
        let pump_windows = windows.clone();
        thread::Builder::new()
            .name("x11-events".to_string())
            .spawn(move || pump_events(&pump_conn, &pump_windows))
            .context("Failed to spawn X11 event thread")?;

        Ok(Self { conn, screen, atoms, windows })
    }

    /// Window size on screen for a mode: scaled down and clamped to the screen
    fn window_size(&self, width: i32, height: i32) -> (u16, u16) {
        scaled_size((self.screen.width, self.screen.height), width, height)
    }

    fn create_window(&self, request: &WindowRequest) -> Result<(Window, (i16, i16), (u16, u16))> {
        let size = self.window_size(request.width, request.height);
        let (x, y) = request
            .gravity
            .anchor((self.screen.width, self.screen.height), size, x11::EDGE_MARGIN);

        let window = self.conn.generate_id().context("Failed to generate X11 window ID")?;
        self.conn
            .create_window(
                self.screen.root_depth,
                window,
                self.screen.root,
                x,
                y,
                size.0,
                size.1,
                0,
                WindowClass::INPUT_OUTPUT,
                self.screen.root_visual,
                &CreateWindowAux::new()
                    .background_pixel(x11::BACKGROUND_PIXEL)
                    .override_redirect(x11::OVERRIDE_REDIRECT)
                    .event_mask(EventMask::STRUCTURE_NOTIFY),
            )
            .context(format!("Failed to create overlay window for '{}'", request.name))?;
        Ok((window, (x, y), size))
    }

    fn setup_window_properties(&self, window: Window, request: &WindowRequest) -> Result<()> {
        self.conn
            .change_property8(PropMode::REPLACE, window, AtomEnum::WM_CLASS, AtomEnum::STRING, x11::WM_CLASS)
            .context(format!("Failed to set WM_CLASS for '{}'", request.name))?;

        self.conn
            .change_property32(
                PropMode::REPLACE,
                window,
                self.atoms.net_wm_state,
                AtomEnum::ATOM,
                &[self.atoms.net_wm_state_above],
            )
            .context(format!("Failed to set window always-on-top for '{}'", request.name))?;

        set_title(&self.conn, &self.atoms, window, &window_title(request, request.width, request.height, request.density_dpi))
    }
}

impl OverlayWindowFactory for X11WindowFactory {
    fn create(&self, request: WindowRequest, listener: WindowListener) -> Result<Arc<dyn OverlayWindow>> {
        let (window, position, size) = self.create_window(&request)?;
        self.setup_window_properties(window, &request)?;
        info!(window, name = %request.name, x = position.0, y = position.1, width = size.0, height = size.1, "Created overlay window");

        let overlay = Arc::new(X11OverlayWindow {
            conn: self.conn.clone(),
            atoms: self.atoms,
            screen: self.screen,
            window,
            listener,
            state: Mutex::new(X11WindowState {
                width: request.width,
                height: request.height,
                density_dpi: request.density_dpi,
                position,
                size,
                mapped: false,
                destroyed: false,
            }),
            request,
        });
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(window, Arc::downgrade(&overlay));
        Ok(overlay)
    }
}

#[derive(Debug)]
struct X11WindowState {
    width: i32,
    height: i32,
    density_dpi: i32,
    position: (i16, i16),
    size: (u16, u16),
    mapped: bool,
    destroyed: bool,
}

pub struct X11OverlayWindow {
    conn: Arc<RustConnection>,
    atoms: OverlayAtoms,
    screen: ScreenInfo,
    window: Window,
    request: WindowRequest,
    listener: WindowListener,
    state: Mutex<X11WindowState>,
}

impl X11OverlayWindow {
    fn lock(&self) -> MutexGuard<'_, X11WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The server destroyed the window (ours or someone else's doing)
    fn on_destroy_notify(&self) {
        {
            let mut state = self.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
        }
        warn!(window = self.window, name = %self.request.name, "Overlay window destroyed externally");
        self.listener.on_window_destroyed();
    }

    fn on_map_change(&self, mapped: bool) {
        {
            let mut state = self.lock();
            if state.destroyed || state.mapped == mapped {
                return;
            }
            state.mapped = mapped;
        }
        let display_state = if mapped { DisplayState::On } else { DisplayState::Off };
        self.listener.on_state_changed(display_state);
    }
}

impl OverlayWindow for X11OverlayWindow {
    fn show(&self) -> Result<()> {
        // Set first so our own MapNotify is not reported as a state change
        self.lock().mapped = true;
        self.conn
            .map_window(self.window)
            .inspect_err(|e| error!("Failed to map overlay window {}: {:?}", self.window, e))
            .context(format!("Failed to map overlay window for '{}'", self.request.name))?;
        self.conn.flush().context("Failed to flush X11 connection after mapping")?;
        info!(window = self.window, name = %self.request.name, "Mapped overlay window");

        self.listener.on_window_created(
            Some(u64::from(self.window)),
            timing::DEFAULT_REFRESH_RATE,
            timing::DEFAULT_PRESENTATION_DEADLINE_NANOS,
            DisplayState::On,
        );
        Ok(())
    }

    fn dismiss(&self) {
        {
            let mut state = self.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
        }
        if let Err(e) = self.conn.destroy_window(self.window).map(|_| ()).and_then(|_| self.conn.flush()) {
            error!(window = self.window, error = ?e, "Failed to destroy overlay window");
        }
        info!(window = self.window, name = %self.request.name, "Dismissed overlay window");
        self.listener.on_window_destroyed();
    }

    fn resize(&self, width: i32, height: i32, density_dpi: i32) {
        let size = scaled_size((self.screen.width, self.screen.height), width, height);
        let (x, y) = self
            .request
            .gravity
            .anchor((self.screen.width, self.screen.height), size, x11::EDGE_MARGIN);
        {
            let mut state = self.lock();
            if state.destroyed {
                return;
            }
            state.width = width;
            state.height = height;
            state.density_dpi = density_dpi;
            state.position = (x, y);
            state.size = size;
        }

        let result = self
            .conn
            .configure_window(
                self.window,
                &ConfigureWindowAux::new()
                    .x(i32::from(x))
                    .y(i32::from(y))
                    .width(u32::from(size.0))
                    .height(u32::from(size.1)),
            )
            .map(|_| ())
            .map_err(anyhow::Error::from)
            .and_then(|_| {
                set_title(
                    &self.conn,
                    &self.atoms,
                    self.window,
                    &window_title(&self.request, width, height, density_dpi),
                )
            })
            .and_then(|_| self.conn.flush().map_err(anyhow::Error::from));
        match result {
            Ok(()) => debug!(window = self.window, width, height, density_dpi, "Resized overlay window"),
            Err(e) => error!(window = self.window, error = ?e, "Failed to resize overlay window"),
        }
    }

    fn dump(&self) -> String {
        let state = self.lock();
        format!(
            "X11OverlayWindow: window={}, mode={}x{}/{}, position=({}, {}), size={}x{}, gravity={}, secure={}, mapped={}, destroyed={}",
            self.window,
            state.width,
            state.height,
            state.density_dpi,
            state.position.0,
            state.position.1,
            state.size.0,
            state.size.1,
            self.request.gravity,
            self.request.secure,
            state.mapped,
            state.destroyed,
        )
    }
}

fn window_title(request: &WindowRequest, width: i32, height: i32, density_dpi: i32) -> String {
    let mut title = format!("{}: {}x{}, {} dpi", request.name, width, height, density_dpi);
    if request.secure {
        title.push_str(", secure");
    }
    title
}

fn set_title(conn: &RustConnection, atoms: &OverlayAtoms, window: Window, title: &str) -> Result<()> {
    conn.change_property8(PropMode::REPLACE, window, AtomEnum::WM_NAME, AtomEnum::STRING, title.as_bytes())
        .context("Failed to set WM_NAME")?;
    conn.change_property8(PropMode::REPLACE, window, atoms.net_wm_name, atoms.utf8_string, title.as_bytes())
        .context("Failed to set _NET_WM_NAME")?;
    Ok(())
}

/// Scale a mode down for display and keep it inside the screen
fn scaled_size(screen: (u16, u16), width: i32, height: i32) -> (u16, u16) {
    let scale = |value: i32, limit: u16| -> u16 {
        let scaled = (value as f32 * x11::INITIAL_SCALE).round() as i32;
        scaled.clamp(1, i32::from(limit.max(1))) as u16
    };
    (scale(width, screen.0), scale(height, screen.1))
}

fn pump_events(conn: &RustConnection, windows: &WindowRegistry) {
    info!("X11 event pump started");
    loop {
        let event = match conn.wait_for_event() {
            Ok(event) => event,
            Err(e) => {
                error!(error = ?e, "X11 connection lost, stopping event pump");
                return;
            }
        };
        let (window, action): (Window, fn(&X11OverlayWindow)) = match event {
            Event::DestroyNotify(e) => (e.window, X11OverlayWindow::on_destroy_notify),
            Event::MapNotify(e) => (e.window, |w: &X11OverlayWindow| w.on_map_change(true)),
            Event::UnmapNotify(e) => (e.window, |w: &X11OverlayWindow| w.on_map_change(false)),
            _ => continue,
        };

        let target = {
            let mut registry = windows.lock().unwrap_or_else(PoisonError::into_inner);
            registry.retain(|_, w| w.strong_count() > 0);
            registry.get(&window).and_then(Weak::upgrade)
        };
        if let Some(target) = target {
            action(&target);
        }
    }
}
