//! Tiling a multi-image batch into a single grid image.

use std::path::{Path, PathBuf};

use image::{imageops, RgbImage};
use tracing::info;

use super::OutputError;

/// Grid shape for `count` tiles: columns first, then however many rows
/// that needs. Columns are the ceiling of the square root, so batches
/// lay out square-ish (4 -> 2x2, 5 -> 3x2, 9 -> 3x3).
pub fn grid_dims(count: usize) -> (usize, usize) {
    if count == 0 {
        return (0, 0);
    }
    let cols = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(cols);
    (cols, rows)
}

/// Composite the images at `paths` into one grid file next to the first
/// image, named `<first-stem>_grid.webp`. All tiles are assumed to be the
/// size of the first; a single path is returned unchanged.
pub async fn composite_grid(paths: &[PathBuf]) -> Result<PathBuf, OutputError> {
    let first = match paths.first() {
        None => {
            return Err(OutputError::Internal(
                "no images to composite".to_string(),
            ))
        }
        Some(first) if paths.len() == 1 => return Ok(first.clone()),
        Some(first) => first.clone(),
    };

    let paths = paths.to_vec();
    let target = grid_path(&first);
    let result = target.clone();

    tokio::task::spawn_blocking(move || -> Result<(), OutputError> {
        let mut tiles = Vec::with_capacity(paths.len());
        for path in &paths {
            tiles.push(image::open(path)?.to_rgb8());
        }
        let (cols, rows) = grid_dims(tiles.len());
        let (width, height) = tiles[0].dimensions();

        let mut canvas = RgbImage::new(cols as u32 * width, rows as u32 * height);
        for (i, tile) in tiles.iter().enumerate() {
            let x = (i % cols) as i64 * i64::from(width);
            let y = (i / cols) as i64 * i64::from(height);
            imageops::replace(&mut canvas, tile, x, y);
        }
        canvas.save_with_format(&target, image::ImageFormat::WebP)?;
        Ok(())
    })
    .await
    .map_err(|e| OutputError::Internal(e.to_string()))??;

    info!(path = %result.display(), "image grid saved");
    Ok(result)
}

/// `<dir>/<stem>_grid.webp` next to the given image.
fn grid_path(first: &Path) -> PathBuf {
    let stem = first
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "batch".to_string());
    first.with_file_name(format!("{stem}_grid.webp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dims_are_square_ish() {
        assert_eq!(grid_dims(1), (1, 1));
        assert_eq!(grid_dims(2), (2, 1));
        assert_eq!(grid_dims(3), (2, 2));
        assert_eq!(grid_dims(4), (2, 2));
        assert_eq!(grid_dims(5), (3, 2));
        assert_eq!(grid_dims(9), (3, 3));
        assert_eq!(grid_dims(10), (4, 3));
    }

    #[test]
    fn grid_path_uses_first_stem() {
        let path = grid_path(Path::new("/out/17_abc_0.webp"));
        assert_eq!(path, PathBuf::from("/out/17_abc_0_grid.webp"));
    }

    #[tokio::test]
    async fn single_image_passes_through() {
        let path = PathBuf::from("/out/only.webp");
        let result = composite_grid(std::slice::from_ref(&path)).await.unwrap();
        assert_eq!(result, path);
    }

    #[tokio::test]
    async fn composites_four_tiles_into_two_by_two() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..4u8 {
            let path = dir.path().join(format!("tile_{i}.webp"));
            let tile = RgbImage::from_pixel(8, 8, image::Rgb([i * 60, 0, 0]));
            tile.save_with_format(&path, image::ImageFormat::WebP)
                .unwrap();
            paths.push(path);
        }

        let grid = composite_grid(&paths).await.unwrap();
        assert!(grid.file_name().unwrap().to_string_lossy().ends_with("tile_0_grid.webp"));
        let composed = image::open(&grid).unwrap();
        assert_eq!(composed.width(), 16);
        assert_eq!(composed.height(), 16);
    }

    #[tokio::test]
    async fn empty_input_is_an_error() {
        assert!(composite_grid(&[]).await.is_err());
    }
}
