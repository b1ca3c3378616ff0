//! Check results and their text rendering

use super::CheckKind;
use crate::validation::Comparison;

/// A labelled matrix excerpt printed for manual inspection
#[derive(Debug, Clone)]
pub struct Preview {
    /// What the excerpt shows
    pub label: String,
    /// Rendered values
    pub text: String,
}

/// Result of one check
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// Which check produced this report
    pub kind: CheckKind,
    /// Comparisons, the primary one first
    pub comparisons: Vec<Comparison>,
    /// Free-form observations (shapes, statistics, policies)
    pub notes: Vec<String>,
    /// Matrix excerpts
    pub previews: Vec<Preview>,
}

impl CheckReport {
    /// Empty report for `kind`
    pub fn new(kind: CheckKind) -> Self {
        Self {
            kind,
            comparisons: Vec::new(),
            notes: Vec::new(),
            previews: Vec::new(),
        }
    }

    /// The comparison the check is judged by
    pub fn primary(&self) -> Option<&Comparison> {
        self.comparisons.first()
    }

    /// Agreement fraction of the primary comparison
    pub fn fraction(&self) -> f64 {
        self.primary().map(Comparison::fraction).unwrap_or(1.0)
    }

    /// Render the report as printed on stdout
    pub fn render(&self, verbose: bool) -> String {
        let mut lines = Vec::new();

        for preview in &self.previews {
            lines.push(preview.label.clone());
            lines.push(preview.text.clone());
            lines.push("----".to_string());
        }

        lines.push(self.kind.label().to_string());
        for (i, comparison) in self.comparisons.iter().enumerate() {
            if i == 0 {
                lines.push(comparison.summary());
            } else {
                lines.push(format!("{}: {}", comparison.name, comparison.summary()));
            }
            if verbose {
                lines.push(comparison.details());
            }
        }
        for note in &self.notes {
            lines.push(format!("  {}", note));
        }

        lines.join("\n")
    }
}

/// Print a one-line-per-check summary
pub fn print_summary(reports: &[CheckReport]) {
    println!("\n=== Check Summary ===\n");

    let full = reports
        .iter()
        .filter(|r| r.primary().is_some_and(Comparison::all_equal))
        .count();

    for report in reports {
        let status = match report.primary() {
            Some(c) if c.all_equal() => "MATCH",
            Some(_) => "DIFF",
            None => "EMPTY",
        };
        println!(
            "[{}] {:<28} {:.6}",
            status,
            report.kind.label(),
            report.fraction()
        );
    }

    println!("\n{}/{} checks fully agree", full, reports.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{compare, ComparisonMode};
    use candle_core::{Device, Tensor};

    fn comparison(name: &str, stored: &[f32], expected: &[f32]) -> Comparison {
        let s = Tensor::from_vec(stored.to_vec(), (1, stored.len()), &Device::Cpu).unwrap();
        let e = Tensor::from_vec(expected.to_vec(), (1, expected.len()), &Device::Cpu).unwrap();
        compare(name, &s, &e, ComparisonMode::Exact).unwrap()
    }

    #[test]
    fn test_render_primary_then_secondary() {
        let mut report = CheckReport::new(CheckKind::Dropout);
        report.comparisons.push(comparison("sample", &[1.0, 0.0], &[1.0, 1.0]));
        report.comparisons.push(comparison("kept", &[1.0], &[1.0]));
        report.notes.push("best-effort".to_string());

        let text = report.render(false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Dropout");
        assert_eq!(lines[1], "Percentage of equal elements: 0.5");
        assert_eq!(lines[2], "kept: Percentage of equal elements: 1.0");
        assert_eq!(lines[3], "  best-effort");
        assert_eq!(report.fraction(), 0.5);
    }

    #[test]
    fn test_previews_come_first() {
        let mut report = CheckReport::new(CheckKind::LogSoftmax);
        report.previews.push(Preview {
            label: "input".to_string(),
            text: "1.0".to_string(),
        });
        let text = report.render(false);
        assert!(text.starts_with("input\n1.0\n----\nLog-softmax"));
    }

    #[test]
    fn test_empty_report_fraction() {
        assert_eq!(CheckReport::new(CheckKind::Relu).fraction(), 1.0);
    }
}
