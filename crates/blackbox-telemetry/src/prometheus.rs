//! Prometheus text exposition of registry contents.

use std::fmt::Write;

use crate::registry::MetricsView;

struct Gauge {
    name: &'static str,
    help: &'static str,
    value: fn(&MetricsView) -> String,
}

const GAUGES: [Gauge; 4] = [
    Gauge {
        name: "blackbox_vram_mean_percent",
        help: "Mean GPU memory utilization over the sample window (percent).",
        value: |v| format!("{:.2}", v.mean_usage_percent),
    },
    Gauge {
        name: "blackbox_vram_peak_percent",
        help: "Peak GPU memory utilization since registration (percent).",
        value: |v| format!("{:.2}", v.peak_usage_percent),
    },
    Gauge {
        name: "blackbox_vram_ceiling_ratio",
        help: "Configured GPU memory ceiling (0.0-1.0).",
        value: |v| format!("{:.4}", v.ceiling),
    },
    Gauge {
        name: "blackbox_vram_samples",
        help: "Samples currently retained in the window.",
        value: |v| v.sample_count().to_string(),
    },
];

/// Render registry views as gauges labelled by `container` and `gpu_class`.
pub fn render_prometheus(views: &[MetricsView]) -> String {
    let mut out = String::new();
    for gauge in &GAUGES {
        let _ = writeln!(out, "# HELP {} {}", gauge.name, gauge.help);
        let _ = writeln!(out, "# TYPE {} gauge", gauge.name);
        for v in views {
            let _ = writeln!(
                out,
                "{}{{container=\"{}\",gpu_class=\"{}\"}} {}",
                gauge.name,
                escape_label(&v.container_name),
                escape_label(v.gpu_class.as_str()),
                (gauge.value)(v)
            );
        }
    }
    out
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
