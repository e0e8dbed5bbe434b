//! Scrolling waveform display
//!
//! Keeps the most recent N live samples and paints them as a polyline.
//! The vertical scale starts at the recorder's resting ADC band and
//! widens to fit whatever the device actually sends.

use std::collections::VecDeque;

use egui::{Color32, CornerRadius, Pos2, Sense, Shape, Stroke, Ui, Vec2};

/// Default number of samples kept on screen
pub const DEFAULT_CAPACITY: usize = 250;

/// Resting ADC band the vertical scale always covers
const SUGGESTED_MIN: i32 = 1100;
const SUGGESTED_MAX: i32 = 1400;

/// Trace color
const TRACE_COLOR: Color32 = Color32::from_rgb(0x00, 0xd2, 0xff);

/// Fixed-capacity scrolling sample buffer
pub struct WaveformBuffer {
    samples: VecDeque<i32>,
    capacity: usize,
}

impl WaveformBuffer {
    /// Create an empty buffer holding up to `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(2),
        }
    }

    /// Append a sample, dropping the oldest once full
    pub fn push(&mut self, value: i32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Drop all samples
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no samples are held
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Change the on-screen sample count, trimming the oldest if needed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(2);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Vertical range covering both the resting band and the data
    fn value_range(&self) -> (i32, i32) {
        let mut min = SUGGESTED_MIN;
        let mut max = SUGGESTED_MAX;
        for &value in &self.samples {
            min = min.min(value);
            max = max.max(value);
        }
        (min, max)
    }

    /// Paint the trace into the available space
    pub fn draw(&self, ui: &mut Ui) {
        let size = Vec2::new(ui.available_width(), ui.available_height().max(120.0));
        let (response, painter) = ui.allocate_painter(size, Sense::hover());
        let rect = response.rect;

        painter.rect_filled(rect, CornerRadius::ZERO, Color32::from_gray(12));

        let (min, max) = self.value_range();
        let span = (max - min).max(1) as f32;
        let y_of = |value: i32| {
            let t = (value - min) as f32 / span;
            rect.bottom() - t * rect.height()
        };

        // Faint gridlines at the resting band edges
        let grid = Stroke::new(1.0, Color32::from_white_alpha(8));
        for level in [SUGGESTED_MIN, SUGGESTED_MAX] {
            let y = y_of(level);
            painter.line_segment([Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)], grid);
        }

        if self.samples.len() < 2 {
            return;
        }

        let step = rect.width() / (self.capacity - 1) as f32;
        let points: Vec<Pos2> = self
            .samples
            .iter()
            .enumerate()
            .map(|(i, &value)| Pos2::new(rect.left() + i as f32 * step, y_of(value)))
            .collect();

        painter.add(Shape::line(points, Stroke::new(2.0, TRACE_COLOR)));
    }
}

impl Default for WaveformBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
