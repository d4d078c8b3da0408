use polars::prelude::*;
use serde_json::{json, Map, Value};

use crate::error::QueryError;

const SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";
const BRUSH: &str = "brush";
const WIDTH: u32 = 600;
const DETAIL_HEIGHT: u32 = 400;
const OVERVIEW_HEIGHT: u32 = 90;

/// Build the chart for `columns` of `df`, indexed by `index_col`.
///
/// The detail pane's x domain follows an interval brush drawn on the
/// overview pane underneath.
pub fn build_chart(
    df: &DataFrame,
    index_col: &str,
    columns: &[String],
    title: &str,
) -> Result<Value, QueryError> {
    let values = chart_rows(df, index_col, columns)?;

    let x = |with_brush: bool| {
        let mut x = json!({
            "field": index_col,
            "type": "temporal",
            "title": index_col,
        });
        if with_brush {
            x["scale"] = json!({ "domain": { "param": BRUSH } });
        }
        x
    };
    let y = json!({
        "field": "value",
        "type": "quantitative",
        "scale": { "zero": false },
    });
    let color = json!({ "field": "key", "type": "nominal" });

    Ok(json!({
        "$schema": SCHEMA,
        "data": { "values": values },
        "transform": [{ "fold": columns }],
        "vconcat": [
            {
                "title": title,
                "width": WIDTH,
                "height": DETAIL_HEIGHT,
                "mark": "line",
                "encoding": {
                    "x": x(true),
                    "y": y,
                    "color": color,
                    "tooltip": [
                        { "field": index_col, "type": "temporal", "format": "%Y-%m-%d" },
                        { "field": "key", "type": "nominal" },
                        { "field": "value", "type": "quantitative" },
                    ],
                },
            },
            {
                "width": WIDTH,
                "height": OVERVIEW_HEIGHT,
                "mark": "line",
                "params": [{
                    "name": BRUSH,
                    "select": { "type": "interval", "encodings": ["x"] },
                }],
                "encoding": {
                    "x": x(false),
                    "y": y,
                    "color": color,
                },
            },
        ],
    }))
}

/// One JSON object per row: the index as `YYYY-MM-DD` plus each selected column.
fn chart_rows(df: &DataFrame, index_col: &str, columns: &[String]) -> Result<Vec<Value>, QueryError> {
    let index = df
        .column(index_col)
        .map_err(|_| QueryError::MissingColumn(index_col.to_string()))?
        .cast(&DataType::String)?;
    let index = index.str()?;

    let mut series = Vec::with_capacity(columns.len());
    for name in columns {
        let column = df
            .column(name)
            .map_err(|_| QueryError::MissingColumn(name.clone()))?
            .cast(&DataType::Float64)?;
        series.push((name, column));
    }

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let mut row = Map::new();
        row.insert(index_col.to_string(), index.get(i).map_or(Value::Null, Value::from));
        for (name, column) in &series {
            // Non-finite values serialize as null.
            let v = column.f64()?.get(i).map_or(Value::Null, Value::from);
            row.insert((*name).clone(), v);
        }
        rows.push(Value::Object(row));
    }
    Ok(rows)
}
