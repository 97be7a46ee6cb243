//! PNG output for screenshots.

use std::fs;
use std::path::Path;

use retrovid_core::Sprite;

pub fn save_png(path: &Path, width: u32, height: u32, rgba: &[u8]) -> anyhow::Result<()> {
    let file = fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    let mut encoder = png::Encoder::new(writer, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(rgba)?;
    Ok(())
}

/// Write a screenshot sprite as an RGBA PNG.
pub fn save_sprite(path: &Path, sprite: &Sprite) -> anyhow::Result<()> {
    save_png(
        path,
        sprite.width() as u32,
        sprite.height() as u32,
        &sprite.to_rgba(),
    )?;
    log::info!(
        "Saved {}x{} screenshot to {}",
        sprite.width(),
        sprite.height(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrovid_core::ChannelMasks;

    fn decode(path: &Path) -> (u32, u32, Vec<u8>) {
        let decoder = png::Decoder::new(fs::File::open(path).unwrap());
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).unwrap();
        buf.truncate(info.buffer_size());
        (info.width, info.height, buf)
    }

    #[test]
    fn png_keeps_size_and_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let rgba = vec![255, 0, 0, 255, 0, 0, 255, 128];
        save_png(&path, 2, 1, &rgba).unwrap();
        assert_eq!(decode(&path), (2, 1, rgba));
    }

    #[test]
    fn readback_sprite_is_saved_opaque() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sprite.png");
        let sprite = Sprite::direct(1, 1, 32, ChannelMasks::RGBX8888, vec![10, 20, 30, 0]).unwrap();
        save_sprite(&path, &sprite).unwrap();
        assert_eq!(decode(&path).2, vec![10, 20, 30, 255]);
    }

    #[test]
    fn wrong_length_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.png");
        assert!(save_png(&path, 4, 4, &[0; 3]).is_err());
    }
}
