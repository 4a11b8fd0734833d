//! 终端展示层：把快照变化转成逐行进度输出

pub mod render;

pub use render::ProgressPrinter;
