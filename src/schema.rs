//! Output schema for recognized documents.
//!
//! The JSON shape produced here is the compatibility contract with downstream
//! consumers:
//!
//! ```json
//! {"pages": [{"page_number": 1, "blocks": [
//!   {"text": "...", "confidence": 0.9,
//!    "position": {"top_left": [x, y], "top_right": [x, y],
//!                 "bottom_right": [x, y], "bottom_left": [x, y]}}
//! ]}]}
//! ```

use serde::{Deserialize, Serialize};

/// A point as `[x, y]`.
pub type Point = [f64; 2];

/// Text region corners, in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl Position {
    /// Build from four corners ordered top_left, top_right, bottom_right, bottom_left.
    pub fn from_corners(corners: [Point; 4]) -> Self {
        let [top_left, top_right, bottom_right, bottom_left] = corners;
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// Round every coordinate to 2 decimals.
    pub fn rounded(self) -> Self {
        let r = |[x, y]: Point| [round_to(x, 2), round_to(y, 2)];
        Self {
            top_left: r(self.top_left),
            top_right: r(self.top_right),
            bottom_right: r(self.bottom_right),
            bottom_left: r(self.bottom_left),
        }
    }
}

/// One retained detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub text: String,
    pub confidence: f64,
    pub position: Position,
}

/// Recognized text of one page (1-indexed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub page_number: u32,
    pub blocks: Vec<Block>,
}

/// Root result for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub pages: Vec<Page>,
}

impl DocumentResult {
    pub fn page_numbers(&self) -> Vec<u32> {
        self.pages.iter().map(|p| p.page_number).collect()
    }

    pub fn block_count(&self) -> usize {
        self.pages.iter().map(|p| p.blocks.len()).sum()
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
