//! Conversion between [`Table`] and Arrow record batches, plus Parquet and
//! CSV file I/O.

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
    TimestampMillisecondArray,
};
use arrow::compute::cast;
use arrow::record_batch::{RecordBatch, RecordBatchOptions, RecordBatchReader};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::{DateTime, Duration, NaiveDate};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::table::{Column, ColumnData, Table};

fn arrow_type(data: &ColumnData) -> DataType {
    match data {
        ColumnData::Text(_) => DataType::Utf8,
        ColumnData::Int(_) => DataType::Int64,
        ColumnData::Float(_) => DataType::Float64,
        ColumnData::Bool(_) => DataType::Boolean,
        ColumnData::DateTime(_) => DataType::Timestamp(TimeUnit::Millisecond, None),
        ColumnData::Date(_) => DataType::Date32,
    }
}

fn epoch_day(date: NaiveDate) -> i32 {
    date.signed_duration_since(NaiveDate::default()).num_days() as i32
}

fn to_array(data: &ColumnData) -> ArrayRef {
    match data {
        ColumnData::Text(v) => Arc::new(v.iter().map(|x| x.as_deref()).collect::<StringArray>()),
        ColumnData::Int(v) => Arc::new(Int64Array::from(v.clone())),
        ColumnData::Float(v) => Arc::new(Float64Array::from(v.clone())),
        ColumnData::Bool(v) => Arc::new(BooleanArray::from(v.clone())),
        ColumnData::DateTime(v) => Arc::new(TimestampMillisecondArray::from(
            v.iter()
                .map(|x| x.map(|dt| dt.and_utc().timestamp_millis()))
                .collect::<Vec<_>>(),
        )),
        ColumnData::Date(v) => Arc::new(Date32Array::from(
            v.iter().map(|x| x.map(epoch_day)).collect::<Vec<_>>(),
        )),
    }
}

pub fn table_to_batch(table: &Table) -> Result<RecordBatch> {
    let fields: Vec<Field> = table
        .columns
        .iter()
        .map(|c| Field::new(&c.name, arrow_type(&c.data), true))
        .collect();
    let arrays: Vec<ArrayRef> = table.columns.iter().map(|c| to_array(&c.data)).collect();
    let options = RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &options,
    )?)
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, name: &str) -> Result<&'a T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        PipelineError::Config(format!("column '{name}' has an unexpected Arrow layout"))
    })
}

fn values_of<A: Array, T>(array: &A, value: impl Fn(usize) -> T) -> Vec<Option<T>> {
    (0..array.len())
        .map(|i| if array.is_null(i) { None } else { Some(value(i)) })
        .collect()
}

/// Convert one Arrow column, widening compatible types first.
fn from_array(name: &str, array: &ArrayRef) -> Result<ColumnData> {
    let target = match array.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => DataType::Utf8,
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => DataType::Int64,
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => DataType::Int64,
        DataType::Float16 | DataType::Float32 | DataType::Float64 => DataType::Float64,
        DataType::Boolean => DataType::Boolean,
        DataType::Timestamp(_, _) => DataType::Timestamp(TimeUnit::Millisecond, None),
        DataType::Date32 | DataType::Date64 => DataType::Date32,
        _ => DataType::Utf8,
    };
    let array = if array.data_type() == &target {
        array.clone()
    } else {
        cast(array.as_ref(), &target)?
    };

    Ok(match target {
        DataType::Int64 => {
            let a = downcast::<Int64Array>(&array, name)?;
            ColumnData::Int(values_of(a, |i| a.value(i)))
        }
        DataType::Float64 => {
            let a = downcast::<Float64Array>(&array, name)?;
            ColumnData::Float(values_of(a, |i| a.value(i)))
        }
        DataType::Boolean => {
            let a = downcast::<BooleanArray>(&array, name)?;
            ColumnData::Bool(values_of(a, |i| a.value(i)))
        }
        DataType::Timestamp(_, _) => {
            let a = downcast::<TimestampMillisecondArray>(&array, name)?;
            ColumnData::DateTime(
                values_of(a, |i| DateTime::from_timestamp_millis(a.value(i)).map(|d| d.naive_utc()))
                    .into_iter()
                    .map(Option::flatten)
                    .collect(),
            )
        }
        DataType::Date32 => {
            let a = downcast::<Date32Array>(&array, name)?;
            ColumnData::Date(
                values_of(a, |i| {
                    NaiveDate::default().checked_add_signed(Duration::days(a.value(i) as i64))
                })
                .into_iter()
                .map(Option::flatten)
                .collect(),
            )
        }
        _ => {
            let a = downcast::<StringArray>(&array, name)?;
            ColumnData::Text(values_of(a, |i| a.value(i).to_string()))
        }
    })
}

pub fn batches_to_table(name: &str, schema: &Schema, batches: &[RecordBatch]) -> Result<Table> {
    let mut table = Table::new(name);
    for (idx, field) in schema.fields().iter().enumerate() {
        let mut data: Option<ColumnData> = None;
        for batch in batches {
            let part = from_array(field.name(), batch.column(idx))?;
            data = Some(match data {
                None => part,
                Some(acc) => append(acc, part),
            });
        }
        let data = data.unwrap_or_else(|| from_array_empty(field.data_type()));
        table.columns.push(Column::new(field.name().clone(), data));
    }
    Ok(table)
}

fn append(acc: ColumnData, part: ColumnData) -> ColumnData {
    match (acc, part) {
        (ColumnData::Text(mut a), ColumnData::Text(b)) => {
            a.extend(b);
            ColumnData::Text(a)
        }
        (ColumnData::Int(mut a), ColumnData::Int(b)) => {
            a.extend(b);
            ColumnData::Int(a)
        }
        (ColumnData::Float(mut a), ColumnData::Float(b)) => {
            a.extend(b);
            ColumnData::Float(a)
        }
        (ColumnData::Bool(mut a), ColumnData::Bool(b)) => {
            a.extend(b);
            ColumnData::Bool(a)
        }
        (ColumnData::DateTime(mut a), ColumnData::DateTime(b)) => {
            a.extend(b);
            ColumnData::DateTime(a)
        }
        (ColumnData::Date(mut a), ColumnData::Date(b)) => {
            a.extend(b);
            ColumnData::Date(a)
        }
        // Batches of one file share a schema
        (acc, _) => acc,
    }
}

fn from_array_empty(data_type: &DataType) -> ColumnData {
    match data_type {
        DataType::Int64 => ColumnData::Int(Vec::new()),
        DataType::Float64 => ColumnData::Float(Vec::new()),
        DataType::Boolean => ColumnData::Bool(Vec::new()),
        DataType::Timestamp(_, _) => ColumnData::DateTime(Vec::new()),
        DataType::Date32 => ColumnData::Date(Vec::new()),
        _ => ColumnData::Text(Vec::new()),
    }
}

pub fn write_parquet(table: &Table, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let batch = table_to_batch(table)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

pub fn read_parquet(name: &str, path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let schema = reader.schema();
    let batches: Vec<RecordBatch> = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    batches_to_table(name, &schema, &batches)
}

/// Write `table` as CSV; nulls become empty cells.
pub fn write_csv(table: &Table, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.column_names())?;
    for row in 0..table.num_rows() {
        writer.write_record(
            table
                .row_display(row)
                .into_iter()
                .map(|v| v.unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    Ok(())
}
