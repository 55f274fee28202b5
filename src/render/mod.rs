//! Report rendering.

pub mod text;

pub use text::render_text_report;
