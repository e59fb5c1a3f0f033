//! Table output formatting

use tabled::{
    Table, Tabled,
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Rows},
};

/// Format rows as a table
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    if data.is_empty() {
        return "No entries.".to_string();
    }

    let mut table = Table::new(data);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    table.to_string()
}

/// Two-column table without a header, for settings and summaries
pub fn format_key_values<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> String {
    let mut builder = Builder::default();
    for (key, value) in pairs {
        builder.push_record([key.as_ref(), value.as_ref()]);
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Tabled)]
    struct KeyRow {
        #[tabled(rename = "KEY ID")]
        key_id: String,
        #[tabled(rename = "LABEL")]
        label: String,
    }

    #[test]
    fn test_format_table_empty() {
        let rows: Vec<KeyRow> = vec![];
        assert_eq!(format_table(&rows), "No entries.");
    }

    #[test]
    fn test_format_table_rows() {
        let rows = vec![
            KeyRow {
                key_id: "0x000000000000002a".to_string(),
                label: "Alice".to_string(),
            },
            KeyRow {
                key_id: "0xffffffffffffffff".to_string(),
                label: "Symmetric".to_string(),
            },
        ];

        let result = format_table(&rows);
        assert!(result.contains("KEY ID"));
        assert!(result.contains("Alice"));
        assert!(result.contains("Symmetric"));
        // Rounded style corners
        assert!(result.contains("╭"));
        assert!(result.contains("╰"));
    }

    #[test]
    fn test_format_key_values() {
        let result = format_key_values(&[("Cache TTL", "5 min"), ("Cache by subkey", "no")]);
        assert!(result.contains("Cache TTL"));
        assert!(result.contains("5 min"));
        assert!(!result.contains("KEY"));
    }
}
