use crate::color::Rgba;
use crate::Float;
use image::ImageBuffer;
use std::collections::HashMap;

/// The image planes the film can accumulate and deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    Combined,
    Depth,
    GeometricNormal,
    ObjectIndex,
}

impl LayerType {
    pub fn from_name(name: &str) -> Option<LayerType> {
        match name {
            "combined" => Some(LayerType::Combined),
            "depth" | "z-depth" => Some(LayerType::Depth),
            "normal" | "geometric_normal" => Some(LayerType::GeometricNormal),
            "object_index" => Some(LayerType::ObjectIndex),
            _ => None,
        }
    }
}

/// Sink receiving resolved pixels from the film. Calls arrive serialized
/// under the film's output mutex, so implementations see consistent
/// snapshots without their own locking.
pub trait ColorOutput: Send {
    fn notify_layer(&mut self, _layer: LayerType, _width: usize, _height: usize) {}

    fn put_pixel(&mut self, layer: LayerType, x: usize, y: usize, color: Rgba);

    /// A tile finished; its pixels have all been put.
    fn flush_area(&mut self, _x0: usize, _y0: usize, _x1: usize, _y1: usize) {}

    /// A tile is about to be rendered (interactive hosts draw a marker).
    fn highlight_area(&mut self, _x0: usize, _y0: usize, _x1: usize, _y1: usize) {}

    /// Full-film flush completed.
    fn flush(&mut self) {}
}

/// In-memory float RGBA sink backed by `image` buffers, one per layer.
pub struct MemoryOutput {
    width: usize,
    height: usize,
    buffers: HashMap<LayerType, ImageBuffer<image::Rgba<f32>, Vec<f32>>>,
    flush_count: usize,
}

impl MemoryOutput {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            buffers: HashMap::new(),
            flush_count: 0,
        }
    }

    pub fn layer(&self, layer: LayerType) -> Option<&ImageBuffer<image::Rgba<f32>, Vec<f32>>> {
        self.buffers.get(&layer)
    }

    pub fn pixel(&self, layer: LayerType, x: usize, y: usize) -> Option<Rgba> {
        self.buffers.get(&layer).map(|buf| {
            let p = buf.get_pixel(x as u32, y as u32);
            Rgba::new(crate::Rgb::new(p[0], p[1], p[2]), p[3])
        })
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count
    }
}

impl ColorOutput for MemoryOutput {
    fn notify_layer(&mut self, layer: LayerType, width: usize, height: usize) {
        self.buffers
            .entry(layer)
            .or_insert_with(|| ImageBuffer::new(width as u32, height as u32));
        self.width = width;
        self.height = height;
    }

    fn put_pixel(&mut self, layer: LayerType, x: usize, y: usize, color: Rgba) {
        let (w, h) = (self.width as u32, self.height as u32);
        let buf = self
            .buffers
            .entry(layer)
            .or_insert_with(|| ImageBuffer::new(w, h));
        if (x as u32) < buf.width() && (y as u32) < buf.height() {
            buf.put_pixel(
                x as u32,
                y as u32,
                image::Rgba([color.col.r, color.col.g, color.col.b, color.a]),
            );
        }
    }

    fn flush(&mut self) {
        self.flush_count += 1;
    }
}

/// Callback-style sink adapting host-provided closures; mirrors the
/// function-pointer interface external frontends register.
pub struct CallbackOutput<F>
where
    F: FnMut(LayerType, usize, usize, Rgba) + Send,
{
    put_pixel_cb: F,
}

impl<F> CallbackOutput<F>
where
    F: FnMut(LayerType, usize, usize, Rgba) + Send,
{
    pub fn new(put_pixel_cb: F) -> Self {
        Self { put_pixel_cb }
    }
}

impl<F> ColorOutput for CallbackOutput<F>
where
    F: FnMut(LayerType, usize, usize, Rgba) + Send,
{
    fn put_pixel(&mut self, layer: LayerType, x: usize, y: usize, color: Rgba) {
        (self.put_pixel_cb)(layer, x, y, color);
    }
}

/// Progress reporting hook; the console implementation lives in the
/// render module.
pub trait ProgressMonitor: Send {
    fn init(&mut self, total: usize);
    fn update(&mut self, current: usize, total: usize, tag: &str);
    fn done(&mut self);
}

/// Silent monitor for tests and embedding.
#[derive(Default)]
pub struct NullProgress {
    pub updates: usize,
    pub last: (usize, usize),
}

impl ProgressMonitor for NullProgress {
    fn init(&mut self, _total: usize) {}

    fn update(&mut self, current: usize, total: usize, _tag: &str) {
        self.updates += 1;
        self.last = (current, total);
    }

    fn done(&mut self) {}
}

/// Depth values are packed into the alpha-carrying RGBA layer; expose the
/// scalar back out for hosts that want raw depth.
pub fn depth_to_rgba(depth: Float) -> Rgba {
    Rgba::new(crate::Rgb::gray(depth), 1.0)
}
