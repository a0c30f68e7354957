use std::fs;
use std::path::PathBuf;

use image::RgbImage;
use ndarray::Array3;

use crate::env::TabularEnv;
use crate::error::{Error, Result};
use crate::value::TabularValueFun;

/// RGB image. Indexes: row, column, channel
pub type Frame = Array3<u8>;

/// Draws value functions and assembles frame sequences.
pub trait Renderer<E: TabularEnv> {
    /// Picture of the current values. `save` marks the final picture of a run.
    fn contour(&mut self, env: &E, values: &TabularValueFun, iteration: usize, save: bool) -> Result<Option<Frame>>;

    /// Store a sequence of frames meant to be played at `fps`.
    fn write_video(&mut self, name: &str, frames: &[Frame], fps: u32) -> Result<()>;
}

/// Renderer that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRender;

impl<E: TabularEnv> Renderer<E> for NoRender {
    fn contour(&mut self, _env: &E, _values: &TabularValueFun, _iteration: usize, _save: bool) -> Result<Option<Frame>> {
        Ok(None)
    }

    fn write_video(&mut self, _name: &str, _frames: &[Frame], _fps: u32) -> Result<()> {
        Ok(())
    }
}

/// Arrangement of states on a rectangular board, numbered row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub rows: usize,
    pub cols: usize,
    /// Pixels per cell side
    pub scale: usize,
}

impl GridLayout {
    pub fn new(rows: usize, cols: usize, scale: usize) -> GridLayout {
        GridLayout { rows, cols, scale: scale.max(1) }
    }

    /// Paint every cell with the colour `color(state)` returns.
    pub fn paint<F: Fn(usize) -> [u8; 3]>(&self, color: F) -> Frame {
        let mut frame = Frame::zeros((self.rows * self.scale, self.cols * self.scale, 3));
        for ((y, x, c), px) in frame.indexed_iter_mut() {
            let state = (y / self.scale) * self.cols + x / self.scale;
            *px = color(state)[c];
        }
        frame
    }
}

/// Blue for the lowest value through red for the highest.
fn heat(value: f64, lo: f64, hi: f64) -> [u8; 3] {
    let t = if hi > lo { ((value - lo) / (hi - lo)).clamp(0.0, 1.0) } else { 0.5 };
    let red = (255.0 * t).round() as u8;
    [red, 0, 255 - red]
}

/// Renderer that draws values as a heat map and writes frames as PNG files.
pub struct HeatmapRenderer {
    dir: PathBuf,
    layout: GridLayout,
}

impl HeatmapRenderer {
    pub fn new(dir: PathBuf, layout: GridLayout) -> HeatmapRenderer {
        HeatmapRenderer { dir, layout }
    }

    fn save(&self, frame: &Frame, path: PathBuf) -> Result<()> {
        let (height, width, _) = frame.dim();
        let raw: Vec<u8> = frame.iter().copied().collect();
        let img = RgbImage::from_raw(width as u32, height as u32, raw)
            .ok_or_else(|| Error::InvalidConfig(String::from("frame does not match its dimensions")))?;
        img.save(&path)?;
        Ok(())
    }
}

impl<E: TabularEnv> Renderer<E> for HeatmapRenderer {
    fn contour(&mut self, env: &E, values: &TabularValueFun, iteration: usize, save: bool) -> Result<Option<Frame>> {
        if self.layout.rows * self.layout.cols != env.num_states() {
            return Err(Error::Shape {
                name: "layout",
                expected: vec![env.num_states()],
                found: vec![self.layout.rows * self.layout.cols],
            });
        }
        let v = values.values();
        let lo = v.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let frame = self.layout.paint(|s| heat(v[s], lo, hi));
        if save {
            fs::create_dir_all(&self.dir)?;
            self.save(&frame, self.dir.join(format!("values_{iteration:04}.png")))?;
        }
        Ok(Some(frame))
    }

    /// Frames go to `<dir>/<name>/frame_NNNNN.png`.
    fn write_video(&mut self, name: &str, frames: &[Frame], fps: u32) -> Result<()> {
        let target = self.dir.join(name);
        fs::create_dir_all(&target)?;
        for (i, frame) in frames.iter().enumerate() {
            self.save(frame, target.join(format!("frame_{i:05}.png")))?;
        }
        log::info!("wrote {} frames to {} ({fps} fps)", frames.len(), target.display());
        Ok(())
    }
}
