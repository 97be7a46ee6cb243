//! The demo scene shared by the interactive and headless binaries.
//!
//! A tiled backdrop with a row of creatures drawn with every blit flag, a
//! masked portrait, and a minimap in its own render buffer that is
//! composited over the display each frame.

use std::rc::Rc;

use retrovid_core::backend::GpuBackend;
use retrovid_core::color::Color;
use retrovid_core::error::Result;
use retrovid_core::geometry::{Point, Region, Size};
use retrovid_core::video::{BlitFlags, BufferFormat};
use retrovid_core::{BufferId, ChannelMasks, Palette, Sprite, VideoDriver};

const BACKDROP: Color = Color::rgb(24, 28, 40);
const GRID: Color = Color::rgba(80, 90, 120, 160);
const FRAME: Color = Color::rgb(200, 180, 120);
const MINIMAP_BG: Color = Color::rgba(10, 40, 20, 220);
const PLAYER: Color = Color::rgb(255, 220, 0);

const CREATURE: i32 = 32;
const PORTRAIT: i32 = 24;
const MINIMAP: Size = Size::new(124, 92);
const GRID_STEP: usize = 32;
/// Frames between creature palette swaps.
const RECOLOR_PERIOD: u32 = 120;

const VARIANTS: [(BlitFlags, Option<Color>); 8] = [
    (BlitFlags::empty(), None),
    (BlitFlags::MIRRORX, None),
    (BlitFlags::GREY, None),
    (BlitFlags::SEPIA, None),
    (BlitFlags::TRANSSHADOW, None),
    (BlitFlags::NOSHADOW, None),
    (BlitFlags::HALFTRANS, None),
    (BlitFlags::empty(), Some(Color::rgb(120, 200, 255))),
];

pub struct Scene {
    creature: Sprite,
    palettes: [Rc<Palette>; 2],
    portrait: Sprite,
    portrait_mask: Sprite,
    stars: Vec<Point>,
    minimap: BufferId,
    tick: u32,
}

fn creature_palette(skin: Color) -> Palette {
    let mut palette = Palette::gradient(skin);
    palette.set(0, Color::MAGIC);
    palette.set(1, Color::rgba(0, 0, 0, 160));
    palette
}

/// Body ellipse shaded by distance from its center, over an index-1
/// shadow, on an index-0 background.
fn creature_indices() -> Vec<u8> {
    let mut out = Vec::with_capacity((CREATURE * CREATURE) as usize);
    for y in 0..CREATURE {
        for x in 0..CREATURE {
            let (bx, by) = ((x - 16) as f32 / 10.0, (y - 13) as f32 / 12.0);
            let body = bx * bx + by * by;
            let (sx, sy) = ((x - 16) as f32 / 12.0, (y - 28) as f32 / 3.0);
            let index = if body <= 1.0 {
                (255.0 - body * 200.0) as u8
            } else if sx * sx + sy * sy <= 1.0 {
                1
            } else {
                0
            };
            out.push(index);
        }
    }
    out
}

fn portrait_pixels() -> Vec<u8> {
    let mut out = Vec::with_capacity((PORTRAIT * PORTRAIT * 4) as usize);
    for y in 0..PORTRAIT {
        for x in 0..PORTRAIT {
            out.extend_from_slice(&[(x * 10) as u8, (y * 10) as u8, 160, 255]);
        }
    }
    out
}

fn portrait_mask_indices() -> Vec<u8> {
    let r = PORTRAIT / 2;
    let mut out = Vec::with_capacity((PORTRAIT * PORTRAIT) as usize);
    for y in 0..PORTRAIT {
        for x in 0..PORTRAIT {
            let (dx, dy) = (x - r, y - r);
            out.push(u8::from(dx * dx + dy * dy <= r * r));
        }
    }
    out
}

/// Deterministic scatter of points over `size`.
fn stars(size: Size, count: usize) -> Vec<Point> {
    let mut seed: u32 = 0x2545_f491;
    let mut next = move |bound: i32| {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        ((seed >> 8) % bound.max(1) as u32) as i32
    };
    (0..count)
        .map(|_| {
            let x = next(size.w);
            let y = next(size.h);
            Point::new(x, y)
        })
        .collect()
}

impl Scene {
    pub fn new<B: GpuBackend>(driver: &mut VideoDriver<B>) -> Result<Self> {
        let screen = driver.screen_size();
        let palettes = [
            Rc::new(creature_palette(Color::rgb(220, 160, 90))),
            Rc::new(creature_palette(Color::rgb(120, 220, 140))),
        ];
        let creature = driver
            .create_sprite8(
                CREATURE,
                CREATURE,
                creature_indices(),
                Rc::clone(&palettes[0]),
                Some(0),
            )?
            .with_hotspot(CREATURE / 2, CREATURE - 2);
        let portrait = driver.create_sprite(
            PORTRAIT,
            PORTRAIT,
            32,
            ChannelMasks::RGBA8888,
            portrait_pixels(),
        )?;
        let portrait_mask = driver.create_sprite8(
            PORTRAIT,
            PORTRAIT,
            portrait_mask_indices(),
            Rc::new(Palette::default()),
            Some(0),
        )?;

        let size = Size::new(MINIMAP.w.min(screen.w), MINIMAP.h.min(screen.h));
        let minimap = driver.create_buffer(
            Region::new((screen.w - size.w - 8).max(0), 8.min(screen.h - size.h), size.w, size.h),
            BufferFormat::Rgba8888,
        )?;
        log::info!("Demo scene ready ({}x{} minimap)", size.w, size.h);

        Ok(Self {
            creature,
            palettes,
            portrait,
            portrait_mask,
            stars: stars(screen, 64),
            minimap,
            tick: 0,
        })
    }

    /// Draw one frame into the display and the minimap buffer.
    pub fn draw<B: GpuBackend>(&mut self, driver: &mut VideoDriver<B>) -> Result<()> {
        self.tick = self.tick.wrapping_add(1);
        if self.tick % RECOLOR_PERIOD == 0 {
            let next = Rc::clone(&self.palettes[(self.tick / RECOLOR_PERIOD % 2) as usize]);
            driver.set_sprite_palette(&mut self.creature, next)?;
        }

        let screen = driver.screen_size();
        driver.draw_rect(Region::from_size(screen), BACKDROP, true)?;
        let mut grid = Vec::new();
        for x in (0..screen.w).step_by(GRID_STEP) {
            grid.extend([Point::new(x, 0), Point::new(x, screen.h - 1)]);
        }
        for y in (0..screen.h).step_by(GRID_STEP) {
            grid.extend([Point::new(0, y), Point::new(screen.w - 1, y)]);
        }
        driver.draw_lines(&grid, GRID)?;
        driver.draw_points(&self.stars, Color::WHITE)?;

        let spacing = (screen.w / (VARIANTS.len() as i32 + 1)).max(1);
        for (i, (flags, tint)) in VARIANTS.iter().enumerate() {
            let phase = (self.tick as i32 + i as i32 * 8) % 32;
            let bob = (phase - 16).abs() / 4;
            let pos = Point::new(spacing * (i as i32 + 1), screen.h * 2 / 3 - bob);
            driver.blit_sprite(&mut self.creature, pos, *flags, *tint)?;
        }

        let dst = Region::new(16, 16, PORTRAIT, PORTRAIT);
        let src = Region::new(0, 0, PORTRAIT, PORTRAIT);
        driver.blit_sprite_clipped(
            &mut self.portrait,
            Some(&mut self.portrait_mask),
            src,
            dst,
            BlitFlags::empty(),
            None,
        )?;
        driver.draw_rect(dst, FRAME, false)?;

        self.draw_minimap(driver)
    }

    fn draw_minimap<B: GpuBackend>(&mut self, driver: &mut VideoDriver<B>) -> Result<()> {
        driver.push_drawing_buffer(self.minimap)?;
        let size = driver
            .buffer(self.minimap)
            .map_or(MINIMAP, |b| b.rect().size());
        let area = Region::from_size(size);
        driver.draw_rect(area, MINIMAP_BG, true)?;
        driver.draw_rect(area, Color::WHITE, false)?;

        let t = (self.tick % 360) as f32 * std::f32::consts::PI / 180.0;
        let player = Point::new(
            size.w / 2 + (t.cos() * size.w as f32 / 3.0) as i32,
            size.h / 2 + (t.sin() * size.h as f32 / 3.0) as i32,
        );
        driver.draw_rect(Region::new(player.x - 1, player.y - 1, 3, 3), PLAYER, true)?;
        driver.pop_drawing_buffer()?;
        Ok(())
    }

    /// Composite the display and minimap and present.
    pub fn present<B: GpuBackend>(&self, driver: &mut VideoDriver<B>) -> Result<()> {
        let display = driver.display_buffer();
        driver.swap_buffers(&[display, self.minimap])
    }

    /// Release every sprite and the minimap buffer.
    pub fn free<B: GpuBackend>(self, driver: &mut VideoDriver<B>) -> Result<()> {
        driver.free_sprite(self.creature);
        driver.free_sprite(self.portrait);
        driver.free_sprite(self.portrait_mask);
        driver.destroy_buffer(self.minimap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrovid_backend_soft::SoftBackend;
    use retrovid_core::config::VideoConfig;

    fn soft_driver(w: i32, h: i32) -> VideoDriver<SoftBackend> {
        VideoDriver::new(SoftBackend::new(w, h), &VideoConfig::default()).unwrap()
    }

    /// A pixel in column `x` that only the backdrop covers.
    fn backdrop_pixel(scene: &Scene, x: i32, rows: std::ops::Range<i32>) -> Point {
        rows.map(|y| Point::new(x, y))
            .find(|p| p.y % GRID_STEP as i32 != 0 && !scene.stars.contains(p))
            .unwrap()
    }

    #[test]
    fn creature_has_key_shadow_and_body() {
        let px = creature_indices();
        assert_eq!(px.len(), (CREATURE * CREATURE) as usize);
        assert_eq!(px[0], 0);
        assert_eq!(px[(28 * CREATURE + 16) as usize], 1);
        assert!(px[(13 * CREATURE + 16) as usize] >= 2);
    }

    #[test]
    fn stars_stay_on_screen() {
        let size = Size::new(40, 30);
        for p in stars(size, 200) {
            assert!(Region::from_size(size).contains(p), "{p:?}");
        }
    }

    #[test]
    fn frame_shows_minimap_over_display() {
        let mut driver = soft_driver(320, 200);
        let mut scene = Scene::new(&mut driver).unwrap();
        scene.draw(&mut driver).unwrap();
        scene.present(&mut driver).unwrap();

        let frame = driver.backend().frame();
        assert_eq!(driver.backend().frames_presented(), 1);
        let origin = driver.buffer(scene.minimap).unwrap().rect();
        assert_eq!(frame.get(origin.x, origin.y), Some([255, 255, 255, 255]));
        let open = backdrop_pixel(&scene, 100, 140..190);
        assert_eq!(frame.get(open.x, open.y), Some(BACKDROP.to_bytes()));
        scene.free(&mut driver).unwrap();
    }

    #[test]
    fn palette_swaps_keep_one_texture_per_palette() {
        let mut driver = soft_driver(64, 48);
        let mut scene = Scene::new(&mut driver).unwrap();
        for tick in [0, RECOLOR_PERIOD - 1, 2 * RECOLOR_PERIOD - 1] {
            scene.tick = tick;
            scene.draw(&mut driver).unwrap();
            scene.present(&mut driver).unwrap();
        }
        assert_eq!(scene.creature.palette().map(|p| **p == *scene.palettes[0]), Some(true));
        assert!(driver.palettes().texture_count() <= 2);
        scene.free(&mut driver).unwrap();
        driver.release_resources();
        assert_eq!(driver.backend().texture_count(), 0);
    }

    #[test]
    fn backbuffer_screenshot_matches_screen() {
        let mut driver = soft_driver(96, 64);
        let mut scene = Scene::new(&mut driver).unwrap();
        scene.draw(&mut driver).unwrap();
        let shot = driver.get_screenshot(Region::new(0, 0, 0, 0)).unwrap();
        assert_eq!(shot.size(), Size::new(96, 64));
        let open = backdrop_pixel(&scene, 90, 46..60);
        assert_eq!(shot.pixel(open.x, open.y), Some(BACKDROP));
        scene.free(&mut driver).unwrap();
    }
}
