//! Headless screenshot tool.
//!
//! Renders the demo scene on the software backend and saves PNGs, so the
//! driver output can be inspected without a window or a GL context.
//!
//! Usage:
//!   cargo run -p retrovid-app --bin retrovid-screenshot [out_dir]
//!   RETROVID_CONFIG=video.toml cargo run -p retrovid-app --bin retrovid-screenshot
//!
//! Output:
//!   {out_dir}/01_backbuffer.png   -- Display buffer before compositing
//!   {out_dir}/02_frame.png        -- Presented frame, minimap included

mod capture;
mod scene;

use std::fs;
use std::path::PathBuf;

use retrovid_backend_soft::SoftBackend;
use retrovid_core::VideoDriver;
use retrovid_core::config::VideoConfig;
use retrovid_core::geometry::Region;

use scene::Scene;

const FRAMES: u32 = 3;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let out_dir = PathBuf::from(
        std::env::args()
            .nth(1)
            .unwrap_or_else(|| "screenshots".to_string()),
    );
    let config = match std::env::var("RETROVID_CONFIG") {
        Ok(path) => VideoConfig::load(&path)?,
        Err(_) => VideoConfig::default(),
    };
    fs::create_dir_all(&out_dir)?;

    let size = config.screen_size();
    let mut driver = VideoDriver::new(SoftBackend::new(size.w, size.h), &config)?;
    let mut scene = Scene::new(&mut driver)?;

    for frame in 1..=FRAMES {
        scene.draw(&mut driver)?;
        if frame == FRAMES {
            let shot = driver.get_screenshot(Region::new(0, 0, 0, 0))?;
            capture::save_sprite(&out_dir.join("01_backbuffer.png"), &shot)?;
            driver.free_sprite(shot);
        }
        scene.present(&mut driver)?;
    }

    let presented = driver.backend().frame();
    capture::save_png(
        &out_dir.join("02_frame.png"),
        presented.width() as u32,
        presented.height() as u32,
        presented.pixels(),
    )?;

    scene.free(&mut driver)?;
    log::info!("Screenshots saved to {}", out_dir.display());
    Ok(())
}
