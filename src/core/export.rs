// Plain-text category report for sharing outside the app.
use std::fs;
use std::path::Path;

use crate::core::error::{Error, ErrorKind};
use crate::core::filter::CategoryTotal;
use crate::core::product::{Category, Scalar};

pub const REPORT_TITLE: &str = "Distribución por Categorías";
pub const EMPTY_REPORT_LINE: &str = "No se encontraron productos con cantidad válida.";

pub fn render_category_report(totals: &[CategoryTotal]) -> String {
    let mut lines = vec![REPORT_TITLE.to_string(), String::new()];
    if totals.is_empty() {
        lines.push(EMPTY_REPORT_LINE.to_string());
    }
    for total in totals {
        let label = Category::parse(&total.category)
            .map(Category::label)
            .unwrap_or(total.category.as_str());
        lines.push(format!(
            "{label}: {} ({})",
            Scalar::from(total.total_quantity).display_text(),
            total.color
        ));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn write_category_report(path: &Path, totals: &[CategoryTotal]) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("failed to create report directory")
                .with_path(parent)
                .with_source(err)
        })?;
    }
    fs::write(path, render_category_report(totals)).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("failed to write category report")
            .with_path(path)
            .with_source(err)
    })
}
