//! CSV export.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use console::style;

use crate::cli::helpers::{format_number, open_db};
use crate::config::Settings;
use crate::models::{Contact, CSV_FIELDS};

/// Write a header row and one row per contact.
fn write_contacts<W: Write>(out: W, contacts: &[Contact]) -> csv::Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    writer.write_record(CSV_FIELDS)?;
    for contact in contacts {
        writer.write_record(contact.csv_values())?;
    }
    writer.flush()?;
    Ok(())
}

/// Write every contact to `output` (or stdout for "-").
pub async fn cmd_export(settings: &Settings, output: &Path) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let contacts = ctx.contacts().export_all().await?;

    if output == Path::new("-") {
        write_contacts(io::stdout().lock(), &contacts)?;
        return Ok(());
    }

    write_contacts(File::create(output)?, &contacts)?;
    println!(
        "{} Exported {} contacts to {}",
        style("✓").green(),
        format_number(contacts.len() as u64),
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::ContactRecord;

    fn contact(record: ContactRecord) -> Contact {
        Contact {
            id: 1,
            record,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_export_quotes_awkward_fields() {
        let contacts = vec![contact(ContactRecord {
            farm_name: "Smith, John & Sons".to_string(),
            breed: "the \"best\" Angus".to_string(),
            ..ContactRecord::new("john@smithranch.com")
        })];

        let mut buf = Vec::new();
        write_contacts(&mut buf, &contacts).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next().unwrap(), CSV_FIELDS.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("\"Smith, John & Sons\","));
        assert!(row.contains("\"the \"\"best\"\" Angus\""));
        assert!(row.contains("john@smithranch.com"));
        assert!(lines.next().is_none());

        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.len(), CSV_FIELDS.len());
    }
}
