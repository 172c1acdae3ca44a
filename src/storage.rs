use crate::merge::ChartRow;
use crate::store::LegendEntry;
use anyhow::Result;
use csv::WriterBuilder;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Save merged rows as CSV: `year` plus one column per series (headed by
/// indicator id, in legend order). Missing values are empty cells.
pub fn save_csv<P: AsRef<Path>>(rows: &[ChartRow], legend: &[LegendEntry], path: P) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    let mut header = vec!["year".to_string()];
    header.extend(legend.iter().map(|l| l.indicator_id.clone()));
    wtr.write_record(&header)?;
    for row in rows {
        let mut record = vec![row.year.to_string()];
        record.extend(
            legend
                .iter()
                .map(|l| row.get(&l.id).map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Save merged rows as a pretty JSON array of flat row objects.
pub fn save_json<P: AsRef<Path>>(rows: &[ChartRow], path: P) -> Result<()> {
    let mut f = File::create(path)?;
    let s = serde_json::to_string_pretty(rows)?;
    f.write_all(s.as_bytes())?;
    Ok(())
}
