use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{CellstreamError, Result};
use crate::traces::{CellRecord, TraceTable};

/// Columns preceding the per-channel feature columns.
pub const KEY_COLUMNS: [&str; 8] = [
    "fov",
    "time",
    "cell",
    "good",
    "exist",
    "position_x",
    "position_y",
    "area",
];

/// Write a trace table as CSV. Missing values are empty fields.
pub fn write_traces(path: &Path, table: &TraceTable) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_traces_to(file, table)?;
    debug!(path = %path.display(), rows = table.records.len(), "Wrote trace table");
    Ok(())
}

pub fn write_traces_to<W: Write>(writer: W, table: &TraceTable) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let header: Vec<&str> = KEY_COLUMNS
        .iter()
        .copied()
        .chain(table.feature_names.iter().map(String::as_str))
        .collect();
    wtr.write_record(&header)?;

    for r in &table.records {
        let mut row: Vec<String> = vec![
            r.fov.to_string(),
            r.frame.to_string(),
            r.cell.to_string(),
            r.good.to_string(),
            r.exist.to_string(),
            optional(r.position_x),
            optional(r.position_y),
            optional(r.area),
        ];
        row.extend(r.features.iter().map(|f| optional(*f)));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Read a trace table written by [`write_traces`].
pub fn read_traces(path: &Path) -> Result<TraceTable> {
    if !path.exists() {
        return Err(CellstreamError::MissingInput(path.to_path_buf()));
    }
    read_traces_from(File::open(path)?)
}

pub fn read_traces_from<R: Read>(reader: R) -> Result<TraceTable> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    for (i, expected) in KEY_COLUMNS.iter().enumerate() {
        if headers.get(i) != Some(*expected) {
            return Err(CellstreamError::Pipeline(format!(
                "trace table column {i} should be '{expected}', found '{}'",
                headers.get(i).unwrap_or("")
            )));
        }
    }
    let feature_names: Vec<String> = headers
        .iter()
        .skip(KEY_COLUMNS.len())
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    for result in rdr.records() {
        let row = result?;
        records.push(CellRecord {
            fov: parse(&row[0], "fov")?,
            frame: parse(&row[1], "time")?,
            cell: parse(&row[2], "cell")?,
            good: parse(&row[3], "good")?,
            exist: parse(&row[4], "exist")?,
            position_x: parse_optional(&row[5], "position_x")?,
            position_y: parse_optional(&row[6], "position_y")?,
            area: parse_optional(&row[7], "area")?,
            features: (KEY_COLUMNS.len()..headers.len())
                .map(|i| parse_optional(&row[i], &headers[i]))
                .collect::<Result<_>>()?,
        });
    }

    Ok(TraceTable {
        feature_names,
        records,
    })
}

fn parse<T: std::str::FromStr>(field: &str, column: &str) -> Result<T> {
    field.parse().map_err(|_| {
        CellstreamError::Pipeline(format!("invalid value '{field}' in column '{column}'"))
    })
}

fn parse_optional<T: std::str::FromStr>(field: &str, column: &str) -> Result<Option<T>> {
    if field.is_empty() {
        Ok(None)
    } else {
        parse(field, column).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_values_are_empty_fields() {
        let table = TraceTable {
            feature_names: vec!["intensity_total".into()],
            records: vec![CellRecord {
                fov: 0,
                frame: 1,
                cell: 4,
                good: true,
                exist: false,
                position_x: None,
                position_y: None,
                area: None,
                features: vec![None],
            }],
        };
        let mut buf = Vec::new();
        write_traces_to(&mut buf, &table).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("fov,time,cell,good,exist,position_x,position_y,area,intensity_total")
        );
        assert_eq!(lines.next(), Some("0,1,4,true,false,,,,"));
    }

    #[test]
    fn test_rejects_foreign_header() {
        let data = "a,b,c\n1,2,3\n";
        assert!(read_traces_from(data.as_bytes()).is_err());
    }
}
