//! Rasterization of a boundary against the pixel grid of a base raster.

use std::collections::VecDeque;

use image::{GrayImage, Luma};

use crate::model::{BaseRaster, Boundary, GeoTransform, Mask};

/// Ring segment in pixel space.
#[derive(Debug, Clone, Copy)]
struct Edge {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl Edge {
    /// Column where the edge crosses the horizontal line at `y`, if it does.
    ///
    /// Half-open on the y axis so a vertex shared by two edges is counted once.
    fn crossing(&self, y: f64) -> Option<f64> {
        if (self.y0 <= y) == (self.y1 <= y) {
            return None;
        }
        Some(self.x0 + (y - self.y0) * (self.x1 - self.x0) / (self.y1 - self.y0))
    }
}

/// Build the outside mask of `boundary` on the grid of `raster`.
///
/// A pixel is inside when its centre is inside the boundary under the even-odd
/// rule, so holes and disjoint parts are handled alike. When `nodata` is set, an
/// inside pixel whose bands all equal it is marked outside as well, provided it is
/// connected to the raster border through other no-data pixels: those are the
/// pixels the imagery service padded the image with. Isolated no-data pixels in
/// the interior are regular imagery.
///
/// An empty or degenerate boundary yields a mask where every pixel is outside.
#[must_use]
pub fn build_mask(raster: &BaseRaster, boundary: &Boundary, nodata: Option<u8>) -> Mask {
    let (width, height) = (raster.width(), raster.height());
    let mut grid = GrayImage::from_pixel(width, height, Luma([Mask::OUTSIDE]));
    if width == 0 || height == 0 {
        return Mask::new(grid);
    }

    let edges = pixel_edges(boundary, &raster.transform);
    if edges.is_empty() {
        return Mask::new(grid);
    }

    let row_len = width as usize;
    let mut crossings = Vec::new();

    for (row, mask_row) in grid.chunks_exact_mut(row_len).enumerate() {
        let centre = row as f64 + 0.5;

        crossings.clear();
        crossings.extend(edges.iter().filter_map(|edge| edge.crossing(centre)));
        crossings.sort_by(f64::total_cmp);

        for span in crossings.chunks_exact(2) {
            if let [start, end] = *span {
                let first = first_column(start, width);
                let last = first_column(end, width);
                if let Some(cells) = mask_row.get_mut(first..last) {
                    cells.fill(Mask::INSIDE);
                }
            }
        }
    }

    if let Some(value) = nodata {
        for (cell, padded) in grid.iter_mut().zip(border_padding(raster, value)) {
            if padded {
                *cell = Mask::OUTSIDE;
            }
        }
    }

    Mask::new(grid)
}

/// Pixels whose bands all equal `nodata` and that reach the raster border through
/// such pixels (4-connected), in row-major order.
fn border_padding(raster: &BaseRaster, nodata: u8) -> Vec<bool> {
    let (width, height) = (raster.width() as usize, raster.height() as usize);
    let is_nodata: Vec<bool> = raster
        .image
        .chunks_exact(3)
        .map(|pixel| pixel.iter().all(|&band| band == nodata))
        .collect();

    let mut padded = vec![false; is_nodata.len()];
    let mut queue = VecDeque::new();
    let border = (0..width)
        .flat_map(|col| [col, (height - 1) * width + col])
        .chain((0..height).flat_map(|row| [row * width, row * width + width - 1]));
    for index in border {
        mark(index, &is_nodata, &mut padded, &mut queue);
    }

    while let Some(index) = queue.pop_front() {
        let (row, col) = (index / width, index % width);
        let neighbours = [
            (col > 0).then(|| index - 1),
            (col + 1 < width).then(|| index + 1),
            (row > 0).then(|| index - width),
            (row + 1 < height).then(|| index + width),
        ];
        for next in neighbours.into_iter().flatten() {
            mark(next, &is_nodata, &mut padded, &mut queue);
        }
    }

    padded
}

fn mark(index: usize, is_nodata: &[bool], padded: &mut [bool], queue: &mut VecDeque<usize>) {
    if is_nodata.get(index) != Some(&true) {
        return;
    }
    if let Some(slot) = padded.get_mut(index).filter(|seen| !**seen) {
        *slot = true;
        queue.push_back(index);
    }
}

/// First column whose centre lies at or right of `x`, clamped to the grid.
fn first_column(x: f64, width: u32) -> usize {
    (x - 0.5).ceil().clamp(0.0, f64::from(width)) as usize
}

fn pixel_edges(boundary: &Boundary, transform: &GeoTransform) -> Vec<Edge> {
    boundary
        .polygons()
        .iter()
        .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
        .flat_map(|ring| ring.lines())
        .filter_map(|line| {
            let (x0, y0) = transform.to_pixel(line.start.x, line.start.y);
            let (x1, y1) = transform.to_pixel(line.end.x, line.end.y);
            let finite = [x0, y0, x1, y1].iter().all(|value| value.is_finite());
            finite.then_some(Edge { x0, y0, x1, y1 })
        })
        .collect()
}
