//! Output formatting for CLI results

use serde::Serialize;
use tabled::Tabled;

use crate::cli::OutputFormat;
use crate::error::Result;

pub mod json;
pub mod table;

/// Print rows as a table, or as a JSON array of `data` in JSON mode
pub fn print_rows<R, D>(rows: &[R], data: &D, format: OutputFormat) -> Result<()>
where
    R: Tabled,
    D: Serialize + ?Sized,
{
    match format {
        OutputFormat::Table => println!("{}", table::format_table(rows)),
        OutputFormat::Json => println!("{}", json::format_json(data)?),
    }
    Ok(())
}
