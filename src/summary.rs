//! k6-style terminal summary renderer.
//!
//! [`render_summary`] is a pure function over a [`RunSummary`]: it returns
//! the formatted text and performs no I/O. Colors come from the `colored`
//! crate and honor `colored::control::set_override(false)`.

use colored::Colorize;

use crate::report::{MetricReport, RunSummary};

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 40;

/// Render the human-readable summary of a run.
///
/// # Layout
///
/// ```text
///           /\      |  stampede
///          /  \     |
///     /\  /    \    |  target:   https://api.example.com
///    /  \/      \   |  stages:   3 (max 20 VUs)
///   /    \       \  |  elapsed:  120.4s
///
///   █ Projects API
///     ✓ status is 200 or 304
///     ✗ duration < 1000ms
///       ↳  97% ✓ 1164 / ✗ 36
///
///   thresholds
///     ✓ http_req_duration: p(95)<1000 (812.31ms)
///     ✗ errors: rate<0.1 (0.12)
///
///   checks..................................: 98.50% ✓ 2364 ✗ 36
///   http_req_duration.......................: avg=412.1ms min=88.02ms ...
/// ```
pub fn render_summary(summary: &RunSummary) -> String {
    let mut lines = Vec::new();

    let max_vus = summary.stages.iter().map(|s| s.target).max().unwrap_or(0);
    lines.push(render_header(
        summary.base_url.as_deref().unwrap_or("(per-request URLs)"),
        summary.stages.len(),
        max_vus,
        summary.elapsed_secs,
    ));

    if summary.interrupted {
        lines.push(format!("  {}", "run interrupted by Ctrl+C".yellow()));
        lines.push(String::new());
    }

    // Checks, grouped
    let mut current_group: Option<&str> = None;
    for check in &summary.checks {
        if current_group != Some(check.group.as_str()) {
            if current_group.is_some() {
                lines.push(String::new());
            }
            let title = if check.group.is_empty() {
                "(no group)"
            } else {
                check.group.as_str()
            };
            lines.push(format!("  █ {}", title.bold()));
            current_group = Some(check.group.as_str());
        }
        if check.fails == 0 {
            lines.push(format!("    {} {}", "✓".green(), check.name));
        } else {
            lines.push(format!("    {} {}", "✗".red(), check.name));
            let total = check.passes + check.fails;
            let pct = check.passes as f64 * 100.0 / total as f64;
            lines.push(format!(
                "      ↳  {pct:.0}% ✓ {} / ✗ {}",
                check.passes, check.fails
            ));
        }
    }
    if current_group.is_some() {
        lines.push(String::new());
    }

    if !summary.thresholds.is_empty() {
        lines.push("  thresholds".to_string());
        for result in &summary.thresholds {
            let measured = match result.measured {
                Some(value) => format!(" ({})", format_number(value)),
                None => " (no data)".to_string(),
            };
            let mark = if result.passed {
                "✓".green()
            } else {
                "✗".red()
            };
            lines.push(format!(
                "    {mark} {}: {}{measured}",
                result.metric, result.expression
            ));
        }
        lines.push(String::new());
    }

    for (name, metric) in &summary.metrics {
        lines.push(format_metric_row(name, &format_metric(name, metric), PAD_WIDTH));
    }

    let verdict = if summary.passed {
        "all thresholds passed".green().bold()
    } else {
        "some thresholds have failed".red().bold()
    };
    lines.push(String::new());
    lines.push(format!("  {verdict}"));

    lines.join("\n")
}

fn format_metric(name: &str, metric: &MetricReport) -> String {
    match metric {
        MetricReport::Counter { count, rate } => {
            if name.starts_with("data_") {
                format!("{} {}/s", format_bytes(*count), format_bytes(*rate))
            } else {
                format!("{} {rate:.2}/s", format_number(*count))
            }
        }
        MetricReport::Gauge { value, min, max } => match (value, min, max) {
            (Some(value), Some(min), Some(max)) => format!(
                "{} min={} max={}",
                format_number(*value),
                format_number(*min),
                format_number(*max)
            ),
            _ => "-".to_string(),
        },
        MetricReport::Rate {
            rate,
            passes,
            fails,
        } => {
            let pct = rate.map_or_else(|| "-".to_string(), |r| format!("{:.2}%", r * 100.0));
            format!("{pct} ✓ {passes} ✗ {fails}")
        }
        MetricReport::Trend { values, .. } => values
            .iter()
            .map(|(stat, value)| match value {
                Some(ms) => format!("{stat}={}", format_ms(*ms)),
                None => format!("{stat}=-"),
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Render the ASCII art header with run details.
fn render_header(target: &str, stages: usize, max_vus: u32, elapsed_secs: f64) -> String {
    format!(
        r#"
          /\      |  {}
         /  \     |
    /\  /    \    |  target:   {}
   /  \/      \   |  stages:   {} (max {} VUs)
  /    \       \  |  elapsed:  {:.1}s
"#,
        "stampede".bold(),
        target,
        stages,
        max_vus,
        elapsed_secs,
    )
}

/// Format a single metric row with dot-padding.
///
/// Produces: `"  metric_name..................: value_string"`
fn format_metric_row(name: &str, value: &str, pad_width: usize) -> String {
    format!("  {name:.<pad_width$}: {value}")
}

fn format_ms(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else if ms >= 1.0 {
        format!("{ms:.2}ms")
    } else {
        format!("{:.2}µs", ms * 1000.0)
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 4] = ["B", "kB", "MB", "GB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
