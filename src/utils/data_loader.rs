//! Data loading utilities

use super::atomic::write_atomic;
use crate::error::{HarvestError, Result};
use crate::preprocessing::{Element, Measure, PivotedRecord, RawObservation};
use polars::prelude::*;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Columns every raw long-format file must carry
pub const RAW_COLUMNS: [&str; 5] = ["Area", "Year", "Element", "Item", "Value"];

/// Columns of the cleaned wide table, in file order
pub const CLEANED_COLUMNS: [&str; 6] = ["Area", "Year", "Item", "AreaHarvested", "Yield", "Production"];

/// Input file format, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Tsv,
    Parquet,
}

impl FileFormat {
    /// Detect the format from the extension; anything unknown is read as CSV
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("tsv") => FileFormat::Tsv,
            Some("parquet") | Some("pq") => FileFormat::Parquet,
            _ => FileFormat::Csv,
        }
    }
}

/// Data loader for raw observations and cleaned tables.
///
/// CSV schemas are inferred from every row, so a late non-numeric cell
/// cannot hide behind a numeric prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataLoader;

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self
    }

    fn load_delimited(&self, path: &Path, separator: u8) -> Result<DataFrame> {
        let file = File::open(path)
            .map_err(|e| HarvestError::LoadError(format!("{}: {}", path.display(), e)))?;

        let parse_opts = CsvParseOptions::default().with_separator(separator);

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(None)
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| HarvestError::LoadError(format!("{}: {}", path.display(), e)))
    }

    fn load_parquet(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path)
            .map_err(|e| HarvestError::LoadError(format!("{}: {}", path.display(), e)))?;

        ParquetReader::new(file)
            .finish()
            .map_err(|e| HarvestError::LoadError(format!("{}: {}", path.display(), e)))
    }

    /// Detect file format from extension and load
    pub fn load_frame(&self, path: &Path) -> Result<DataFrame> {
        let start = Instant::now();
        let df = match FileFormat::from_path(path) {
            FileFormat::Csv => self.load_delimited(path, b',')?,
            FileFormat::Tsv => self.load_delimited(path, b'\t')?,
            FileFormat::Parquet => self.load_parquet(path)?,
        };
        debug!(
            path = %path.display(),
            rows = df.height(),
            cols = df.width(),
            ms = start.elapsed().as_millis() as u64,
            "Loaded frame"
        );
        Ok(df)
    }

    /// Load long-format observations (`Area, Year, Element, Item, Value`).
    ///
    /// Extra columns are ignored. A missing required column, a null key
    /// cell, a cell that does not parse as its column's type, or a
    /// fractional `Year` is a [`HarvestError::LoadError`]; a null `Value` is
    /// kept as an absent measurement.
    pub fn load_raw(&self, path: &Path) -> Result<Vec<RawObservation>> {
        let df = self.load_frame(path)?;

        let areas = string_column(&df, "Area")?;
        let years = int_column(&df, "Year")?;
        let elements = string_column(&df, "Element")?;
        let items = string_column(&df, "Item")?;
        let values = float_column(&df, "Value")?;

        let mut rows = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let area = required(&areas[i], "Area", i)?;
            let year = required(&years[i], "Year", i)?;
            let element = required(&elements[i], "Element", i)?;
            let item = required(&items[i], "Item", i)?;
            rows.push(RawObservation::new(
                area.clone(),
                *year,
                Element::parse(element),
                item.clone(),
                values[i],
            ));
        }

        let labels: BTreeSet<&str> = elements.iter().flatten().map(String::as_str).collect();
        info!(
            path = %path.display(),
            rows = rows.len(),
            elements = ?labels,
            "Loaded raw observations"
        );
        Ok(rows)
    }

    /// Load a cleaned wide table written by [`DataSaver::save_cleaned`].
    ///
    /// Null measurements load as NaN and are later excluded by feature
    /// building.
    pub fn load_cleaned(&self, path: &Path) -> Result<Vec<PivotedRecord>> {
        let df = self.load_frame(path)?;

        let areas = string_column(&df, "Area")?;
        let years = int_column(&df, "Year")?;
        let items = string_column(&df, "Item")?;
        let area_harvested = float_column(&df, Measure::AreaHarvested.column_name())?;
        let crop_yield = float_column(&df, Measure::Yield.column_name())?;
        let production = float_column(&df, Measure::Production.column_name())?;

        let mut records = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            records.push(PivotedRecord::new(
                required(&areas[i], "Area", i)?.clone(),
                *required(&years[i], "Year", i)?,
                required(&items[i], "Item", i)?.clone(),
                area_harvested[i].unwrap_or(f64::NAN),
                crop_yield[i].unwrap_or(f64::NAN),
                production[i].unwrap_or(f64::NAN),
            ));
        }

        info!(path = %path.display(), rows = records.len(), "Loaded cleaned table");
        Ok(records)
    }
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    df.column(name)
        .map_err(|_| HarvestError::LoadError(format!("missing required column '{}'", name)))
}

fn cast_error(name: &str, e: PolarsError) -> HarvestError {
    HarvestError::LoadError(format!("column '{}' has an unusable type: {}", name, e))
}

/// Cast `name` to `dtype`, failing on any non-null cell the cast turns null
fn checked_cast(df: &DataFrame, name: &str, dtype: &DataType) -> Result<Column> {
    let source = column(df, name)?;
    let casted = source.cast(dtype).map_err(|e| cast_error(name, e))?;
    if casted.null_count() == source.null_count() {
        return Ok(casted);
    }

    let before = source.as_materialized_series().is_null();
    let after = casted.as_materialized_series().is_null();
    let row = before
        .into_iter()
        .zip(after.into_iter())
        .position(|(was_null, is_null)| was_null == Some(false) && is_null == Some(true))
        .unwrap_or(0);
    let cell = source
        .as_materialized_series()
        .get(row)
        .map(|v| v.to_string())
        .unwrap_or_default();
    Err(HarvestError::LoadError(format!(
        "column '{}' has non-{} value {} in data row {}",
        name,
        dtype,
        cell,
        row + 1
    )))
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let casted = checked_cast(df, name, &DataType::String)?;
    let values = casted
        .as_materialized_series()
        .str()
        .map_err(|e| cast_error(name, e))?
        .into_iter()
        .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
        .collect();
    Ok(values)
}

/// Integer column; float or text cells must hold whole numbers
fn int_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    if column(df, name)?.dtype().is_integer() {
        let casted = checked_cast(df, name, &DataType::Int64)?;
        let values = casted
            .as_materialized_series()
            .i64()
            .map_err(|e| cast_error(name, e))?
            .into_iter()
            .collect();
        return Ok(values);
    }

    float_column(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, cell)| match cell {
            None => Ok(None),
            Some(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
                Ok(Some(v as i64))
            }
            Some(v) => Err(HarvestError::LoadError(format!(
                "column '{}' has non-integer value {} in data row {}",
                name,
                v,
                row + 1
            ))),
        })
        .collect()
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let casted = checked_cast(df, name, &DataType::Float64)?;
    let values = casted
        .as_materialized_series()
        .f64()
        .map_err(|e| cast_error(name, e))?
        .into_iter()
        .collect();
    Ok(values)
}

fn required<'a, T>(cell: &'a Option<T>, name: &str, row: usize) -> Result<&'a T> {
    cell.as_ref().ok_or_else(|| {
        HarvestError::LoadError(format!("null '{}' in data row {}", name, row + 1))
    })
}

/// Tabular writers
pub struct DataSaver;

impl DataSaver {
    /// Save a frame to CSV, replacing `path` atomically
    pub fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
        write_atomic(path, |file| {
            CsvWriter::new(file)
                .include_header(true)
                .finish(df)
                .map_err(|e| HarvestError::PersistenceError(e.to_string()))
        })
    }

    /// Frame with the cleaned-table columns
    pub fn cleaned_frame(records: &[PivotedRecord]) -> Result<DataFrame> {
        let df = df!(
            CLEANED_COLUMNS[0] => records.iter().map(|r| r.area.as_str()).collect::<Vec<_>>(),
            CLEANED_COLUMNS[1] => records.iter().map(|r| r.year).collect::<Vec<_>>(),
            CLEANED_COLUMNS[2] => records.iter().map(|r| r.item.as_str()).collect::<Vec<_>>(),
            CLEANED_COLUMNS[3] => records.iter().map(|r| r.area_harvested).collect::<Vec<_>>(),
            CLEANED_COLUMNS[4] => records.iter().map(|r| r.crop_yield).collect::<Vec<_>>(),
            CLEANED_COLUMNS[5] => records.iter().map(|r| r.production).collect::<Vec<_>>()
        )?;
        Ok(df)
    }

    /// Write the cleaned wide table as CSV
    pub fn save_cleaned(records: &[PivotedRecord], path: &Path) -> Result<()> {
        let mut df = Self::cleaned_frame(records)?;
        Self::save_csv(&mut df, path)?;
        info!(path = %path.display(), rows = records.len(), "Saved cleaned table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_load_raw() {
        let file = write_csv(
            "Domain,Area,Element,Item,Year,Unit,Value\n\
             QCL,Kenya,Area harvested,Maize,2001,ha,100\n\
             QCL,Kenya,Yield,Maize,2001,kg/ha,2.5\n\
             QCL,Kenya,Production,Maize,2001,t,\n",
        );
        let rows = DataLoader::new().load_raw(file.path()).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].element, Element::AreaHarvested);
        assert_eq!(rows[1].value, Some(2.5));
        assert_eq!(rows[2].value, None);
        assert_eq!(rows[0].year, 2001);
    }

    #[test]
    fn test_missing_column_is_load_error() {
        let file = write_csv("Area,Element,Item,Value\nKenya,Yield,Maize,1\n");
        let err = DataLoader::new().load_raw(file.path()).unwrap_err();
        match err {
            HarvestError::LoadError(msg) => assert!(msg.contains("Year")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_null_key_is_load_error() {
        let file = write_csv("Area,Year,Element,Item,Value\n,2001,Yield,Maize,1\n");
        assert!(matches!(
            DataLoader::new().load_raw(file.path()),
            Err(HarvestError::LoadError(_))
        ));
    }

    #[test]
    fn test_non_numeric_value_is_load_error() {
        let file = write_csv(
            "Area,Year,Element,Item,Value\n\
             Kenya,2001,Yield,Maize,2.5\n\
             Kenya,2002,Yield,Maize,not-a-number\n",
        );
        match DataLoader::new().load_raw(file.path()).unwrap_err() {
            HarvestError::LoadError(msg) => {
                assert!(msg.contains("'Value'"), "{}", msg);
                assert!(msg.contains("data row 2"), "{}", msg);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_fractional_year_is_load_error() {
        for year in ["2001.7", "2001.2"] {
            let file = write_csv(&format!(
                "Area,Year,Element,Item,Value\nKenya,{},Yield,Maize,2.5\n",
                year
            ));
            match DataLoader::new().load_raw(file.path()).unwrap_err() {
                HarvestError::LoadError(msg) => assert!(msg.contains("'Year'"), "{}", msg),
                other => panic!("unexpected error {:?}", other),
            }
        }
    }

    #[test]
    fn test_whole_float_year_accepted() {
        let file = write_csv("Area,Year,Element,Item,Value\nKenya,2001.0,Yield,Maize,2.5\n");
        let rows = DataLoader::new().load_raw(file.path()).unwrap();
        assert_eq!(rows[0].year, 2001);
    }

    #[test]
    fn test_missing_file() {
        let err = DataLoader::new()
            .load_raw(Path::new("/nonexistent/raw.csv"))
            .unwrap_err();
        assert!(matches!(err, HarvestError::LoadError(_)));
    }

    #[test]
    fn test_cleaned_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaned_data.csv");
        let records = vec![
            PivotedRecord::new("Kenya", 2001, "Maize", 100.0, 2.5, 250.0),
            PivotedRecord::new("Peru", 2002, "Rice", 40.0, 3.0, 120.0),
        ];

        DataSaver::save_cleaned(&records, &path).unwrap();

        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("Area,Year,Item,AreaHarvested,Yield,Production"));

        let loaded = DataLoader::new().load_cleaned(&path).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_path(Path::new("a.TSV")), FileFormat::Tsv);
        assert_eq!(FileFormat::from_path(Path::new("a.parquet")), FileFormat::Parquet);
        assert_eq!(FileFormat::from_path(Path::new("a.txt")), FileFormat::Csv);
    }
}
