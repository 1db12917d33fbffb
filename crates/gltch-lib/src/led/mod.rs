//! Indicator ring colors and the bank-owning pipeline.

mod color;
mod pipeline;

pub use color::{Color, format_color, parse_color};
pub use pipeline::{
    BANK_SIZE, ColorQueue, DriverError, INDICATOR_QUEUE_CAPACITY, IndicatorBank, IndicatorDriver,
    IndicatorPipeline, QueueClosed, color_queue, mock, run_worker,
};
