//! XLSX workbook layout.

use rust_xlsxwriter::{Color, DataValidation, Format, Workbook, XlsxError};

use super::row::{SheetRow, HEADER};
use crate::config::SheetConfig;

const DEVELOPER_COLUMN: u16 = 8;
const QA_COLUMN: u16 = 9;
const COLUMN_WIDTHS: [f64; 10] = [32.0, 10.0, 48.0, 12.0, 48.0, 18.0, 16.0, 60.0, 20.0, 20.0];

/// Build the workbook in memory. Data rows start at row index 1.
pub fn build_workbook(rows: &[SheetRow], options: &SheetConfig) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&options.worksheet_name)?;

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xDDEBF7));
    let wrap = Format::new().set_text_wrap();

    for (col, title) in HEADER.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header_format)?;
        worksheet.set_column_width(col as u16, COLUMN_WIDTHS[col])?;
    }

    for (index, row) in rows.iter().enumerate() {
        let r = (index + 1) as u32;
        worksheet.write_string(r, 0, &row.name)?;
        worksheet.write_string(r, 1, &row.method)?;
        worksheet.write_string(r, 2, &row.url)?;
        match row.status_code {
            Some(code) => worksheet.write_number(r, 3, f64::from(code))?,
            None => worksheet.write_string(r, 3, "")?,
        };
        worksheet.write_string_with_format(r, 4, &row.test_result, &wrap)?;
        for (col, value) in [(5, row.response_time_ms), (6, row.body_size_bytes)] {
            match value {
                Some(n) => worksheet.write_number(r, col, n as f64)?,
                None => worksheet.write_string(r, col, "")?,
            };
        }
        worksheet.write_string_with_format(r, 7, &row.headers, &wrap)?;
        worksheet.write_string(r, DEVELOPER_COLUMN, &row.developer_comment)?;
        worksheet.write_string(r, QA_COLUMN, &row.qa_comment)?;
    }

    worksheet.set_freeze_panes(1, 0)?;

    if !rows.is_empty() {
        let last = rows.len() as u32;
        worksheet.autofilter(0, 0, last, (HEADER.len() - 1) as u16)?;

        let developer = DataValidation::new().allow_list_strings(options.developer_choices.as_slice())?;
        worksheet.add_data_validation(1, DEVELOPER_COLUMN, last, DEVELOPER_COLUMN, &developer)?;

        let qa = DataValidation::new().allow_list_strings(options.qa_choices.as_slice())?;
        worksheet.add_data_validation(1, QA_COLUMN, last, QA_COLUMN, &qa)?;
    }

    Ok(workbook)
}
