//! Software RGBA surface and rasterization.
//!
//! Row 0 is the top row. Triangles cover the pixels whose centers fall
//! inside them; lines and points cover the pixel containing each
//! rasterized position.

use retrovid_core::geometry::Region;

/// Convert a normalized channel to a byte, rounding to nearest.
pub fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub fn to_unit(v: u8) -> f32 {
    f32::from(v) / 255.0
}

/// Plain RGBA8 pixel storage.
#[derive(Debug, Clone)]
pub struct Surface {
    width: i32,
    height: i32,
    pixels: Vec<u8>,
}

impl Surface {
    pub fn new(width: i32, height: i32) -> Self {
        let len = width.max(0) as usize * height.max(0) as usize * 4;
        Self {
            width,
            height,
            pixels: vec![0; len],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn bounds(&self) -> Region {
        Region::new(0, 0, self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * 4)
    }

    pub fn get(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        let o = self.offset(x, y)?;
        let mut px = [0; 4];
        px.copy_from_slice(&self.pixels[o..o + 4]);
        Some(px)
    }

    /// Write one fragment. With `blend`, source-over is applied to all four
    /// channels: `src * a + dst * (1 - a)`.
    pub fn put(&mut self, x: i32, y: i32, src: [f32; 4], blend: bool) {
        let Some(o) = self.offset(x, y) else {
            return;
        };
        let dst = &mut self.pixels[o..o + 4];
        if !blend {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = to_u8(s);
            }
            return;
        }
        let a = src[3].clamp(0.0, 1.0);
        if a <= 0.0 {
            return;
        }
        for (d, s) in dst.iter_mut().zip(src) {
            *d = to_u8(s * a + to_unit(*d) * (1.0 - a));
        }
    }

    /// Fill `region` (or everything) with `color`, ignoring blending.
    pub fn fill(&mut self, region: Option<Region>, color: [u8; 4]) {
        let area = match region {
            Some(r) => match r.intersect(&self.bounds()) {
                Some(r) => r,
                None => return,
            },
            None => self.bounds(),
        };
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                if let Some(o) = self.offset(x, y) {
                    self.pixels[o..o + 4].copy_from_slice(&color);
                }
            }
        }
    }

    /// Copy out `region`, top row first. Pixels outside the surface read
    /// as zero.
    pub fn read(&self, region: Region) -> Vec<u8> {
        let mut out = Vec::with_capacity(region.size().area() * 4);
        for y in region.y..region.bottom() {
            for x in region.x..region.right() {
                out.extend_from_slice(&self.get(x, y).unwrap_or([0; 4]));
            }
        }
        out
    }
}

fn edge(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

/// Visit every pixel of `clip` whose center lies inside the triangle,
/// with the barycentric weights of that center.
pub fn triangle(v: [[f32; 2]; 3], clip: Region, mut f: impl FnMut(i32, i32, [f32; 3])) {
    let area = edge(v[0], v[1], v[2]);
    if area == 0.0 {
        return;
    }
    let min_x = v.iter().map(|p| p[0]).fold(f32::INFINITY, f32::min);
    let max_x = v.iter().map(|p| p[0]).fold(f32::NEG_INFINITY, f32::max);
    let min_y = v.iter().map(|p| p[1]).fold(f32::INFINITY, f32::min);
    let max_y = v.iter().map(|p| p[1]).fold(f32::NEG_INFINITY, f32::max);
    let x0 = (min_x.floor() as i32).max(clip.x);
    let x1 = (max_x.ceil() as i32).min(clip.right());
    let y0 = (min_y.floor() as i32).max(clip.y);
    let y1 = (max_y.ceil() as i32).min(clip.bottom());

    for y in y0..y1 {
        for x in x0..x1 {
            let p = [x as f32 + 0.5, y as f32 + 0.5];
            let w0 = edge(v[1], v[2], p) / area;
            let w1 = edge(v[2], v[0], p) / area;
            let w2 = edge(v[0], v[1], p) / area;
            if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                f(x, y, [w0, w1, w2]);
            }
        }
    }
}

/// Bresenham between two pixels, both ends included.
pub fn line(from: (i32, i32), to: (i32, i32), mut f: impl FnMut(i32, i32)) {
    let (mut cx, mut cy) = from;
    let dx = (to.0 - cx).abs();
    let dy = -(to.1 - cy).abs();
    let sx = if cx < to.0 { 1 } else { -1 };
    let sy = if cy < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        f(cx, cy);
        if (cx, cy) == to {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            cx += sx;
        }
        if e2 <= dx {
            err += dx;
            cy += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_surface_is_zeroed() {
        let s = Surface::new(4, 3);
        assert_eq!(s.pixels().len(), 48);
        assert!(s.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn opaque_put_replaces() {
        let mut s = Surface::new(2, 2);
        s.fill(None, [9, 9, 9, 9]);
        s.put(1, 1, [1.0, 0.0, 0.0, 1.0], true);
        assert_eq!(s.get(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(s.get(0, 0), Some([9, 9, 9, 9]));
    }

    #[test]
    fn half_alpha_blends() {
        let mut s = Surface::new(1, 1);
        s.fill(None, [0, 0, 0, 255]);
        s.put(0, 0, [1.0, 1.0, 1.0, 0.5], true);
        assert_eq!(s.get(0, 0), Some([128, 128, 128, 191]));
    }

    #[test]
    fn unblended_put_writes_alpha_as_is() {
        let mut s = Surface::new(1, 1);
        s.put(0, 0, [1.0, 0.0, 0.0, 0.0], false);
        assert_eq!(s.get(0, 0), Some([255, 0, 0, 0]));
    }

    #[test]
    fn out_of_bounds_is_ignored() {
        let mut s = Surface::new(2, 2);
        s.put(-1, 0, [1.0; 4], false);
        s.put(2, 0, [1.0; 4], false);
        assert!(s.pixels().iter().all(|&b| b == 0));
        assert_eq!(s.get(5, 5), None);
    }

    #[test]
    fn scissored_fill() {
        let mut s = Surface::new(4, 4);
        s.fill(Some(Region::new(1, 1, 2, 2)), [7, 7, 7, 7]);
        assert_eq!(s.get(0, 0), Some([0; 4]));
        assert_eq!(s.get(1, 1), Some([7; 4]));
        assert_eq!(s.get(2, 2), Some([7; 4]));
        assert_eq!(s.get(3, 3), Some([0; 4]));
    }

    #[test]
    fn read_pads_outside_pixels() {
        let mut s = Surface::new(2, 1);
        s.fill(None, [1, 2, 3, 4]);
        let out = s.read(Region::new(1, 0, 2, 1));
        assert_eq!(out, vec![1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn quad_as_two_triangles_covers_exact_pixels() {
        let clip = Region::new(0, 0, 10, 10);
        let mut hits = std::collections::HashSet::new();
        let (tl, tr, bl, br) = ([2.0, 3.0], [6.0, 3.0], [2.0, 5.0], [6.0, 5.0]);
        triangle([tl, tr, bl], clip, |x, y, _| {
            hits.insert((x, y));
        });
        triangle([tr, bl, br], clip, |x, y, _| {
            hits.insert((x, y));
        });
        assert_eq!(hits.len(), 8);
        assert!(hits.contains(&(2, 3)));
        assert!(hits.contains(&(5, 4)));
        assert!(!hits.contains(&(6, 4)));
    }

    #[test]
    fn triangle_respects_clip() {
        let mut n = 0;
        triangle(
            [[-5.0, -5.0], [20.0, -5.0], [-5.0, 20.0]],
            Region::new(0, 0, 3, 3),
            |x, y, _| {
                assert!((0..3).contains(&x) && (0..3).contains(&y));
                n += 1;
            },
        );
        assert_eq!(n, 9);
    }

    #[test]
    fn barycentrics_sum_to_one() {
        triangle(
            [[0.0, 0.0], [8.0, 0.0], [0.0, 8.0]],
            Region::new(0, 0, 8, 8),
            |_, _, w| assert!((w[0] + w[1] + w[2] - 1.0).abs() < 1e-5),
        );
    }

    #[test]
    fn horizontal_line_includes_both_ends() {
        let mut pts = Vec::new();
        line((2, 5), (6, 5), |x, y| pts.push((x, y)));
        assert_eq!(pts, vec![(2, 5), (3, 5), (4, 5), (5, 5), (6, 5)]);
    }

    #[test]
    fn diagonal_line() {
        let mut pts = Vec::new();
        line((0, 0), (3, 3), |x, y| pts.push((x, y)));
        assert_eq!(pts, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn single_pixel_line() {
        let mut n = 0;
        line((4, 4), (4, 4), |_, _| n += 1);
        assert_eq!(n, 1);
    }
}
