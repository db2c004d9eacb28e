//! Reports over a list of comparisons: console lines, a self-contained HTML
//! page and a JSON summary.

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use base64::Engine;
use image::RgbImage;
use serde::Serialize;

use crate::diff::Comparison;
use crate::error::Result;

/// Print one line per failing comparison and a closing summary line
pub fn console_report<W: Write>(out: &mut W, comparisons: &[Comparison]) -> std::io::Result<()> {
    let mut failed = 0;
    for comparison in comparisons.iter().filter(|c| !c.passed()) {
        failed += 1;
        let key = &comparison.key;
        writeln!(
            out,
            "Test {} failed! Test {}:{} {} differs by {:.1}%",
            key.ordinal,
            key.test_name,
            key.local_index,
            key.window_name,
            comparison.changed_percentage.unwrap_or(0.0)
        )?;
    }
    if failed > 0 {
        writeln!(out, "{} out of {} tests failed!", failed, comparisons.len())
    } else {
        writeln!(out, "{} tests completed successfully.", comparisons.len())
    }
}

/// Machine-readable run summary
#[derive(Debug, Serialize)]
pub struct Summary {
    pub total: usize,
    pub failed: usize,
    pub comparisons: Vec<ComparisonSummary>,
}

#[derive(Debug, Serialize)]
pub struct ComparisonSummary {
    pub key: String,
    pub ordinal: u64,
    pub test: String,
    pub window: String,
    pub snapshot: u64,
    pub changed_pixels: u64,
    pub unchanged_pixels: u64,
    pub changed_percentage: Option<f64>,
}

impl Summary {
    pub fn new(comparisons: &[Comparison]) -> Self {
        Self {
            total: comparisons.len(),
            failed: comparisons.iter().filter(|c| !c.passed()).count(),
            comparisons: comparisons
                .iter()
                .map(|c| ComparisonSummary {
                    key: c.key.token(),
                    ordinal: c.key.ordinal,
                    test: c.key.test_name.clone(),
                    window: c.key.window_name.clone(),
                    snapshot: c.key.local_index,
                    changed_pixels: c.changed_pixels,
                    unchanged_pixels: c.unchanged_pixels,
                    changed_percentage: c.changed_percentage,
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

const HTML_HEAD: &str = r##"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8"/>
    <title>regrecss report</title>
    <script>
      function show(index, selected) {
        var images = document.querySelector("#_" + index).children;
        for (var i = 0; i < images.length; i++) {
          images[i].style.display = "none";
        }
        document.querySelector("#_" + index + " ." + selected).style.display = "initial";
      }
    </script>
  </head>
  <body>
"##;

const HTML_END: &str = "  </body>\n</html>\n";

/// Render the HTML report
pub fn html_report(comparisons: &[Comparison]) -> Result<String> {
    let failed: Vec<(usize, &Comparison)> = comparisons
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.passed())
        .collect();

    let mut html = String::from(HTML_HEAD);
    if failed.is_empty() {
        html.push_str(&format!(
            "  <h1>All {} comparisons passed</h1>\n",
            comparisons.len()
        ));
    }
    for (index, comparison) in failed {
        let Some(images) = &comparison.images else {
            continue;
        };
        let key = &comparison.key;
        html.push_str(&format!(
            r##"  <h1>Test {ordinal} failed</h1>
  <p>
    Snapshot: {token}<br/>
    Window: {window}<br/>
    Changed: {percentage:.1}% ({changed} px)
  </p>
  <button onclick="show({index}, 'highlight')">Highlight</button>
  <button onclick="show({index}, 'baseline')">Baseline</button>
  <button onclick="show({index}, 'candidate')">Candidate</button>
  <div id="_{index}">
    <img class="highlight" src="data:image/png;base64,{highlight}" style="display: initial"/>
    <img class="baseline" src="data:image/png;base64,{baseline}" style="display: none"/>
    <img class="candidate" src="data:image/png;base64,{candidate}" style="display: none"/>
  </div>
"##,
            ordinal = key.ordinal,
            token = escape_html(&key.token()),
            window = escape_html(&key.window_name),
            percentage = comparison.changed_percentage.unwrap_or(0.0),
            changed = comparison.changed_pixels,
            index = index,
            highlight = encode_png(&images.highlight)?,
            baseline = encode_png(&images.baseline)?,
            candidate = encode_png(&images.candidate)?,
        ));
    }
    html.push_str(HTML_END);
    Ok(html)
}

/// Render the HTML report and write it to `path`
pub fn write_html_report(path: &Path, comparisons: &[Comparison]) -> Result<()> {
    fs::write(path, html_report(comparisons)?)?;
    Ok(())
}

fn encode_png(image: &RgbImage) -> Result<String> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&bytes))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::compare;
    use crate::snapshot::SnapshotKey;
    use image::Rgb;
    use pretty_assertions::assert_eq;

    fn passing(ordinal: u64) -> Comparison {
        let image = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        compare(SnapshotKey::new(ordinal, "home", "default", 0), image.clone(), image).unwrap()
    }

    fn failing(ordinal: u64, window: &str) -> Comparison {
        let baseline = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let mut candidate = baseline.clone();
        candidate.put_pixel(0, 0, Rgb([9, 9, 9]));
        compare(SnapshotKey::new(ordinal, "login", window, 2), baseline, candidate).unwrap()
    }

    fn console(comparisons: &[Comparison]) -> String {
        let mut out = Vec::new();
        console_report(&mut out, comparisons).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_console_report_failures() {
        let text = console(&[passing(0), failing(1, "800x600")]);
        assert_eq!(
            text,
            "Test 1 failed! Test login:2 800x600 differs by 1.0%\n1 out of 2 tests failed!\n"
        );
    }

    #[test]
    fn test_console_report_success() {
        assert_eq!(console(&[passing(0), passing(1)]), "2 tests completed successfully.\n");
    }

    #[test]
    fn test_html_report_failures() {
        let html = html_report(&[passing(0), failing(1, "<phone>")]).unwrap();
        assert!(html.contains("show(1, 'highlight')"));
        assert!(html.contains("id=\"_1\""));
        assert!(html.contains("data:image/png;base64,"));
        assert!(html.contains("Window: &lt;phone&gt;"));
        assert!(!html.contains("id=\"_0\""));
        assert!(!html.contains("comparisons passed"));
    }

    #[test]
    fn test_html_report_carries_toggle_script() {
        let html = html_report(&[failing(0, "default")]).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("function show(index, selected)"));
        assert!(html.contains("document.querySelector(\"#_\" + index).children"));
        assert!(html.contains("<div id=\"_0\">"));
        assert!(html.ends_with("</html>\n"));
    }

    #[test]
    fn test_html_report_all_passed() {
        let html = html_report(&[passing(0)]).unwrap();
        assert!(html.contains("All 1 comparisons passed"));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn test_summary_json() {
        let summary = Summary::new(&[passing(0), failing(1, "800x600")]);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.failed, 1);
        let value: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(value["comparisons"][1]["key"], "1:login:800x600:2:");
        assert_eq!(value["comparisons"][1]["changed_percentage"], 1.0);
        assert!(value["comparisons"][0]["changed_percentage"].is_null());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&#39;");
    }
}
