use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use labelrelay_model::Record;
use serde_json::Value;

/// Read one JSON object per line. Blank lines are skipped; `-` reads stdin.
pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    let reader: Box<dyn BufRead> = if path == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(path)
            .with_context(|| format!("failed to open input {}", path.display()))?;
        Box::new(BufReader::new(file))
    };

    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line)
            .with_context(|| format!("line {} is not valid JSON", line_no + 1))?;
        let record = Record::try_from(value)
            .with_context(|| format!("line {} is not a JSON object", line_no + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Write records as JSONL to `path`, or stdout when `None`.
pub fn write_records(path: Option<&Path>, records: &[Record]) -> Result<()> {
    let writer: Box<dyn Write> = match path {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("failed to create output {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(writer);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
