//! retrovid desktop demo.
//!
//! Opens an SDL2 window with a GL 2.0 (or GLES 2.0) context and renders a
//! small scene through the video driver: primitives, paletted and direct
//! sprites with every blit flag, a masked blit and a minimap drawn into a
//! pushed render buffer.
//!
//! F11 toggles fullscreen, F10 toggles input grab, F12 saves a
//! screenshot to the working directory, Escape quits.
//!
//! Usage:
//!   cargo run -p retrovid-app [config.toml]
//!   RETROVID_CONFIG=video.toml cargo run -p retrovid-app

mod capture;
mod scene;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use retrovid_backend_sdl::{HostEvent, SdlGlBackend};
use retrovid_core::VideoDriver;
use retrovid_core::config::VideoConfig;
use retrovid_core::geometry::Region;

use scene::Scene;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    log::info!(
        "Starting retrovid demo ({}x{}, {:?})",
        config.screen_width,
        config.screen_height,
        config.gl_api
    );

    let backend = SdlGlBackend::new(&config)?;
    let mut driver = VideoDriver::new(backend, &config)?;
    let mut scene = Scene::new(&mut driver)?;
    let mut shots = 0u32;

    'running: loop {
        let mut screenshot = false;
        for event in driver.backend_mut().poll_events() {
            match event {
                HostEvent::Quit => break 'running,
                HostEvent::ToggleFullscreen => {
                    driver.toggle_fullscreen_mode();
                }
                HostEvent::ToggleGrab => {
                    driver.toggle_grab_input();
                }
                HostEvent::Screenshot => screenshot = true,
                HostEvent::Text(text) => log::debug!("text input: {text:?}"),
            }
        }

        scene.draw(&mut driver)?;
        if screenshot {
            shots += 1;
            let sprite = driver.get_screenshot(Region::new(0, 0, 0, 0))?;
            let path = PathBuf::from(format!("retrovid-{shots:03}.png"));
            if let Err(e) = capture::save_sprite(&path, &sprite) {
                log::error!("screenshot failed: {e}");
            }
            driver.free_sprite(sprite);
        }
        scene.present(&mut driver)?;

        if !config.vsync {
            std::thread::sleep(Duration::from_millis(16));
        }
    }

    scene.free(&mut driver)?;
    log::info!("retrovid demo shut down cleanly");
    Ok(())
}

/// Config from the first argument, `RETROVID_CONFIG`, or defaults.
fn load_config() -> Result<VideoConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RETROVID_CONFIG").ok());
    let mut config = match path {
        Some(path) => VideoConfig::load(&path)?,
        None => VideoConfig::default(),
    };

    // Running from the workspace: use the shaders shipped with the SDL backend.
    if !config.shader_dir.is_dir() {
        let bundled = Path::new(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../retrovid-backend-sdl/shaders"
        ));
        log::warn!(
            "Shader directory {} not found, using {}",
            config.shader_dir.display(),
            bundled.display()
        );
        config.shader_dir = bundled.to_path_buf();
    }
    Ok(config)
}
