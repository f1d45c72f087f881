use anyhow::{Context, Result};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder,
    register_histogram_vec, register_int_counter_vec,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const METRIC_PREFIX: &str = "certpilot";

/// Metrics 注册结果，可能包含注册错误
type MetricRegistration<T> = Result<T, prometheus::Error>;

fn certificate_results_total() -> &'static MetricRegistration<IntCounterVec> {
    static METRIC: OnceLock<MetricRegistration<IntCounterVec>> = OnceLock::new();
    METRIC.get_or_init(|| {
        register_int_counter_vec!(
            Opts::new(
                format!("{METRIC_PREFIX}_certificate_results_total"),
                "证书处理结果总数"
            ),
            &["status"]
        )
    })
}

fn agent_duration_seconds() -> &'static MetricRegistration<HistogramVec> {
    static METRIC: OnceLock<MetricRegistration<HistogramVec>> = OnceLock::new();
    METRIC.get_or_init(|| {
        let opts = HistogramOpts::new(
            format!("{METRIC_PREFIX}_agent_duration_seconds"),
            "ACME 客户端运行耗时（秒）",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]);
        register_histogram_vec!(opts, &["operation"])
    })
}

fn restart_actions_total() -> &'static MetricRegistration<IntCounterVec> {
    static METRIC: OnceLock<MetricRegistration<IntCounterVec>> = OnceLock::new();
    METRIC.get_or_init(|| {
        register_int_counter_vec!(
            Opts::new(
                format!("{METRIC_PREFIX}_restart_actions_total"),
                "重启动作执行结果总数"
            ),
            &["kind", "result"]
        )
    })
}

/// 记录一张证书的最终结果，`status` 为状态码或 `not_due`
pub fn record_certificate_result(status: &str) {
    if let Ok(counter) = certificate_results_total() {
        counter.with_label_values(&[status]).inc();
    }
}

pub fn observe_agent_duration(operation: &str, seconds: f64) {
    if let Ok(histogram) = agent_duration_seconds() {
        histogram.with_label_values(&[operation]).observe(seconds);
    }
}

pub fn record_restart_action(kind: &str, result: &str) {
    if let Ok(counter) = restart_actions_total() {
        counter.with_label_values(&[kind, result]).inc();
    }
}

pub fn render_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("failed to encode metrics")?;
    Ok(String::from_utf8(buffer)?)
}

/// 写入 node_exporter textfile 目录使用的指标文件
pub fn write_textfile(path: &Path) -> Result<()> {
    let body = render_metrics()?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_contains_recorded_metrics() {
        record_certificate_result("200");
        record_restart_action("custom", "timeout");
        observe_agent_duration("issue", 2.5);

        let body = render_metrics().unwrap();
        assert!(body.contains("certpilot_certificate_results_total"));
        assert!(body.contains("certpilot_restart_actions_total"));
        assert!(body.contains("certpilot_agent_duration_seconds"));
    }

    #[test]
    fn test_write_textfile() {
        record_certificate_result("not_due");
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("certpilot.prom");
        write_textfile(&path).unwrap();
        let body = fs::read_to_string(&path).unwrap();
        assert!(body.contains("status=\"not_due\""));
    }
}
