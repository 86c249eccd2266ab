pub mod chunk;
pub mod convert;
pub mod docx;
pub mod jgbf;
pub mod pdf;
pub mod pipeline;
pub mod sheet;
