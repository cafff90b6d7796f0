//! Files produced from the map: vector exports of the user features and printed PDFs.

pub mod print;
mod vector;

pub use print::{
    LegendLayout, MapRenderer, Orientation, PaperSize, PdfSink, PrintConfiguration,
    PrintContext, PrintOutput, PrintRequest, PrintTask, ViewRestoreGuard, PRINT_TIMEOUT,
};
pub use vector::{export_features, ExportFormat, ExportedFile};
