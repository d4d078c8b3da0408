use polars::prelude::*;
use std::fmt::Write as _;

use super::controller::{DashboardView, Stage};
use super::export::escape_xml as escape;

pub const PAGE_TITLE: &str = "Market Index Dashboard";
const MAX_TABLE_ROWS: usize = 1000;

const VEGA_SCRIPTS: &str = r#"<script src="https://cdn.jsdelivr.net/npm/vega@5"></script>
<script src="https://cdn.jsdelivr.net/npm/vega-lite@5"></script>
<script src="https://cdn.jsdelivr.net/npm/vega-embed@6"></script>"#;

const STYLE: &str = "body{font-family:sans-serif;margin:0;display:flex}\
aside{width:280px;padding:1rem;background:#f0f2f6;min-height:100vh}\
main{flex:1;padding:1rem 2rem}\
label{display:block;margin-top:.8rem}\
.error{background:#fde2e1;border:1px solid #e0b4b4;padding:1rem;color:#9f3a38}\
.info{background:#e8f1fb;padding:1rem}\
table{border-collapse:collapse;font-size:.85rem}\
td,th{border:1px solid #ddd;padding:2px 6px;text-align:right}";

pub fn render_page(view: &DashboardView) -> String {
    let mut html = String::with_capacity(16 * 1024);
    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{PAGE_TITLE}</title>\
         <style>{STYLE}</style>{VEGA_SCRIPTS}</head><body>"
    );
    sidebar(&mut html, view);

    let _ = write!(html, "<main><h1>{PAGE_TITLE}</h1>");
    if let Some(error) = &view.error {
        let _ = write!(
            html,
            "<div class=\"error\"><strong>Query failed.</strong> {}</div>",
            escape(error)
        );
    } else {
        body(&mut html, view);
    }
    html.push_str("</main></body></html>");
    html
}

fn sidebar(html: &mut String, view: &DashboardView) {
    let min = view.bounds.min.to_string();
    let max = view.bounds.max.to_string();
    let (start, end) = view
        .date_range
        .map_or((String::new(), String::new()), |r| (r.start_str(), r.end_str()));

    html.push_str("<aside><form method=\"get\" action=\"/\">");
    let _ = write!(
        html,
        "<label>Start date<input type=\"date\" name=\"start\" value=\"{start}\" min=\"{min}\" max=\"{max}\"></label>\
         <label>End date<input type=\"date\" name=\"end\" value=\"{end}\" min=\"{min}\" max=\"{max}\"></label>\
         <button type=\"submit\" name=\"reset\" value=\"1\">Reset dates</button>"
    );

    if !view.partitions.is_empty() {
        html.push_str("<label>Index<select name=\"index\">");
        for p in &view.partitions {
            let selected = if view.partition.as_ref() == Some(p) { " selected" } else { "" };
            let p = escape(p);
            let _ = write!(html, "<option value=\"{p}\"{selected}>{p}</option>");
        }
        html.push_str("</select></label>");
    }

    if !view.numeric_columns.is_empty() {
        html.push_str(
            "<input type=\"hidden\" name=\"columns_set\" value=\"1\">\
             <label>Columns<select name=\"columns\" multiple size=\"6\">",
        );
        for c in &view.numeric_columns {
            let selected = if view.columns.contains(c) { " selected" } else { "" };
            let c = escape(c);
            let _ = write!(html, "<option value=\"{c}\"{selected}>{c}</option>");
        }
        html.push_str("</select></label>");
    }

    let checked = if view.show_table { " checked" } else { "" };
    let _ = write!(
        html,
        "<label><input type=\"checkbox\" name=\"show_table\" value=\"1\"{checked}> Show DataFrame</label>\
         <button type=\"submit\">Apply</button></form></aside>"
    );
}

fn body(html: &mut String, view: &DashboardView) {
    let prompt = match view.stage {
        Stage::AwaitingDateRange => Some("Select a date range."),
        Stage::AwaitingPartitionSelection => Some("No index available for this table."),
        Stage::AwaitingColumnSelection => Some("Select at least one column to plot."),
        Stage::Rendering => None,
    };
    if let Some(prompt) = prompt {
        let _ = write!(html, "<div class=\"info\">{prompt}</div>");
    }

    if let Some(chart) = &view.chart {
        // `</` inside a script body would end the element early.
        let spec = chart.to_string().replace("</", "<\\/");
        let _ = write!(
            html,
            "<div id=\"chart\"></div><script>vegaEmbed('#chart', {spec});</script>"
        );
    }

    if let Some(df) = &view.table {
        table(html, df);
    }
    if let Some(link) = &view.export_link {
        let _ = write!(html, "<p>{link}</p>");
    }
}

fn table(html: &mut String, df: &DataFrame) {
    let shown = df.height().min(MAX_TABLE_ROWS);
    let columns: Vec<Option<Column>> = df
        .columns()
        .iter()
        .map(|c| c.cast(&DataType::String).ok())
        .collect();

    html.push_str("<table><thead><tr>");
    for name in df.get_column_names() {
        let _ = write!(html, "<th>{}</th>", escape(name.as_str()));
    }
    html.push_str("</tr></thead><tbody>");
    for i in 0..shown {
        html.push_str("<tr>");
        for column in &columns {
            let cell = column
                .as_ref()
                .and_then(|c| c.str().ok())
                .and_then(|s| s.get(i))
                .unwrap_or("");
            let _ = write!(html, "<td>{}</td>", escape(cell));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    if shown < df.height() {
        let _ = write!(html, "<p>Showing {shown} of {} rows.</p>", df.height());
    }
}
